//! The in-memory directory model: a linear stream of entries produced by a
//! depth-first walk of the archiving root. Entries are stored in a flat
//! vector; SystemImage topology links are indices into the same ID space,
//! assigned densely in enumeration order (root = 1).

use crate::entry::EntryKind;
use crate::fs::{FileKind, Filesystem};
use crate::{Error, Result};

/// Answer of the injected enumeration-error policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumerationDecision {
    /// Drop the unreadable subtree and keep walking its siblings.
    Continue,
    /// Abort the build.
    Quit,
}

/// Policy consulted when a directory cannot be enumerated. The CLI installs
/// an interactive prompt here; the library default aborts.
pub trait EnumerationPolicy {
    fn on_enumeration_error(&mut self, path: &str, error: &Error) -> EnumerationDecision;
}

/// Default policy: every enumeration error is fatal.
#[derive(Debug, Default, Clone, Copy)]
pub struct AbortOnError;

impl EnumerationPolicy for AbortOnError {
    fn on_enumeration_error(&mut self, _path: &str, _error: &Error) -> EnumerationDecision {
        EnumerationDecision::Quit
    }
}

#[derive(Debug, Clone)]
pub struct ModelEntry {
    pub kind: EntryKind,
    /// Full host path; see [`DirectoryModel::archive_path`] for the stored
    /// form.
    pub path: String,
    pub size: u64,
    /// 1-based ID in enumeration order; 0 when topology is not tracked.
    pub entry_id: u32,
    pub parent: u32,
    pub next_sibling: u32,
    pub first_child: u32,
    pub children: u32,
}

#[derive(Debug)]
pub struct DirectoryModel {
    pub entries: Vec<ModelEntry>,
    /// Sum of the data sizes of all non-directory entries.
    pub total_data_size: u64,
    /// Length of the root-path prefix stripped from stored paths.
    name_skip: usize,
}

impl DirectoryModel {
    /// Walks `root_directory` depth-first (directory first, children before
    /// the next sibling) into a linear entry stream. `track_topology` is set
    /// only for SystemImage archives.
    pub fn build<F: Filesystem, P: EnumerationPolicy>(
        fs: &F,
        root_directory: &str,
        track_topology: bool,
        policy: &mut P,
    ) -> Result<Self> {
        let root = normalize_root(root_directory);
        let name_skip = if root == "/" { 0 } else { root.len() };

        let mut builder = Builder {
            fs,
            policy,
            track_topology,
            entries: vec![ModelEntry {
                kind: EntryKind::Directory,
                path: root.clone(),
                size: 0,
                entry_id: if track_topology { 1 } else { 0 },
                parent: 0,
                next_sibling: 0,
                first_child: 0,
                children: 0,
            }],
            total_data_size: 0,
        };

        log::debug!("D /");
        if !builder.walk(0)? {
            // An unreadable root with a "continue" answer leaves only the
            // root entry; the archive will be empty.
            log::warn!("root directory '{}' could not be enumerated", root);
        }

        Ok(Self {
            entries: builder.entries,
            total_data_size: builder.total_data_size,
            name_skip,
        })
    }

    pub fn entry_count(&self) -> u64 {
        self.entries.len() as u64
    }

    /// The archive-relative form of an entry path: the root prefix is
    /// stripped, and the root itself renders as `/`.
    pub fn archive_path<'a>(&self, entry: &'a ModelEntry) -> &'a str {
        if entry.path.len() == self.name_skip {
            "/"
        } else {
            &entry.path[self.name_skip..]
        }
    }

    /// Strips the same root prefix from a caller-supplied absolute path,
    /// for role-entry comparison.
    pub fn strip_root<'a>(&self, path: &'a str) -> &'a str {
        if self.name_skip > 0 && path.len() > self.name_skip {
            &path[self.name_skip..]
        } else {
            path
        }
    }
}

fn normalize_root(root: &str) -> String {
    if root.len() > 1 && root.ends_with('/') {
        root[..root.len() - 1].to_string()
    } else {
        root.to_string()
    }
}

struct Builder<'a, F: Filesystem, P: EnumerationPolicy> {
    fs: &'a F,
    policy: &'a mut P,
    track_topology: bool,
    entries: Vec<ModelEntry>,
    total_data_size: u64,
}

impl<F: Filesystem, P: EnumerationPolicy> Builder<'_, F, P> {
    /// Walks the directory at `dir_index`. Returns `Ok(false)` when the
    /// directory could not be enumerated and the policy chose to continue;
    /// the caller then drops the directory's entry.
    fn walk(&mut self, dir_index: usize) -> Result<bool> {
        let dir_path = self.entries[dir_index].path.clone();
        let dir_id = self.entries[dir_index].entry_id;

        let names = match self.fs.read_dir(&dir_path) {
            Ok(names) => names,
            Err(error) => {
                log::warn!("could not enumerate '{}': {}", dir_path, error);
                return match self.policy.on_enumeration_error(&dir_path, &error) {
                    EnumerationDecision::Continue => Ok(false),
                    EnumerationDecision::Quit => Err(Error::EnumerationFailure(dir_path)),
                };
            }
        };

        let mut prev: Option<usize> = None;
        for name in names {
            if name == "." || name == ".." || name == ".DS_Store" {
                continue;
            }
            let path = if dir_path == "/" {
                format!("/{name}")
            } else {
                format!("{dir_path}/{name}")
            };
            let meta = self.fs.lstat(&path)?;
            let (kind, size) = match meta.kind {
                FileKind::File => (EntryKind::File, meta.size),
                FileKind::Directory => (EntryKind::Directory, 0),
                FileKind::Symlink => (EntryKind::Link, meta.size),
                FileKind::Other => {
                    log::debug!("S {path}");
                    continue;
                }
            };
            log::debug!("{} {}", kind.type_char(), path);

            let index = self.entries.len();
            let id = (index + 1) as u32;
            self.entries.push(ModelEntry {
                kind,
                path,
                size,
                entry_id: if self.track_topology { id } else { 0 },
                parent: dir_id,
                next_sibling: 0,
                first_child: 0,
                children: 0,
            });

            let had_first_child = self.entries[dir_index].first_child;
            if self.track_topology {
                if let Some(prev) = prev {
                    self.entries[prev].next_sibling = id;
                }
                if had_first_child == 0 {
                    self.entries[dir_index].first_child = id;
                }
                self.entries[dir_index].children += 1;
            }

            if kind == EntryKind::Directory && !self.walk(index)? {
                // Unreadable directory, policy said continue: the entry we
                // just pushed is the whole partial subtree. Undo it.
                self.entries.truncate(index);
                if self.track_topology {
                    if let Some(prev) = prev {
                        self.entries[prev].next_sibling = 0;
                    }
                    self.entries[dir_index].first_child = had_first_child;
                    self.entries[dir_index].children -= 1;
                }
                continue;
            }

            self.total_data_size += size;
            prev = Some(index);
        }

        Ok(true)
    }
}
