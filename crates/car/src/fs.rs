//! The filesystem adapter consumed by the engine. The archive code never
//! touches OS APIs directly; everything goes through [`Filesystem`], which
//! keeps the walker and extractor testable against an in-memory double.

use std::io::Read;
use std::path::Path;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
    /// Symbolic link; the reported size is the target length in bytes.
    Symlink,
    /// Sockets, fifos, devices. The walker skips these silently.
    Other,
}

#[derive(Debug, Clone, Copy)]
pub struct Metadata {
    pub kind: FileKind,
    pub size: u64,
}

pub trait Filesystem {
    fn lstat(&self, path: &str) -> Result<Metadata>;

    /// Lists the names inside a directory, sorted, so identical trees
    /// produce identical archives.
    fn read_dir(&self, path: &str) -> Result<Vec<String>>;

    /// Fills `buf` with exactly `buf.len()` bytes of file content.
    fn read_file(&self, path: &str, buf: &mut [u8]) -> Result<()>;

    /// Reads the symlink target into `buf`, returning the byte count.
    fn read_link(&self, path: &str, buf: &mut [u8]) -> Result<usize>;

    fn create_dir(&self, path: &str) -> Result<()>;

    fn create_file(&self, path: &str, data: &[u8]) -> Result<()>;

    fn create_symlink(&self, path: &str, target: &str) -> Result<()>;

    /// True only for an existing regular file with at least one byte.
    fn file_has_data(&self, path: &str) -> bool;

    /// True only for an existing directory.
    fn dir_exists(&self, path: &str) -> bool;
}

/// Adapter over the host filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostFilesystem;

impl Filesystem for HostFilesystem {
    fn lstat(&self, path: &str) -> Result<Metadata> {
        let meta = std::fs::symlink_metadata(path).map_err(|e| Error::io("lstat", path, e))?;
        let file_type = meta.file_type();
        let kind = if file_type.is_symlink() {
            FileKind::Symlink
        } else if file_type.is_dir() {
            FileKind::Directory
        } else if file_type.is_file() {
            FileKind::File
        } else {
            FileKind::Other
        };
        let size = match kind {
            FileKind::Symlink => {
                let target =
                    std::fs::read_link(path).map_err(|e| Error::io("readlink", path, e))?;
                target.as_os_str().len() as u64
            }
            FileKind::File => meta.len(),
            _ => 0,
        };
        Ok(Metadata { kind, size })
    }

    fn read_dir(&self, path: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for dirent in std::fs::read_dir(path).map_err(|e| Error::io("opendir", path, e))? {
            let dirent = dirent.map_err(|e| Error::io("readdir", path, e))?;
            match dirent.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(name) => log::warn!("skipping non-UTF-8 name {:?} in '{}'", name, path),
            }
        }
        names.sort();
        Ok(names)
    }

    fn read_file(&self, path: &str, buf: &mut [u8]) -> Result<()> {
        let mut file = std::fs::File::open(path).map_err(|e| Error::io("open", path, e))?;
        file.read_exact(buf).map_err(|e| Error::io("read", path, e))
    }

    fn read_link(&self, path: &str, buf: &mut [u8]) -> Result<usize> {
        let target = std::fs::read_link(path).map_err(|e| Error::io("readlink", path, e))?;
        let bytes = target.as_os_str().as_encoded_bytes();
        if bytes.len() > buf.len() {
            return Err(Error::io(
                "readlink",
                path,
                std::io::Error::other("symlink target changed size"),
            ));
        }
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(bytes.len())
    }

    fn create_dir(&self, path: &str) -> Result<()> {
        std::fs::create_dir(path).map_err(|e| Error::io("mkdir", path, e))
    }

    fn create_file(&self, path: &str, data: &[u8]) -> Result<()> {
        std::fs::write(path, data).map_err(|e| Error::io("write", path, e))
    }

    #[cfg(unix)]
    fn create_symlink(&self, path: &str, target: &str) -> Result<()> {
        std::os::unix::fs::symlink(target, path).map_err(|e| Error::io("symlink", path, e))
    }

    #[cfg(not(unix))]
    fn create_symlink(&self, path: &str, _target: &str) -> Result<()> {
        Err(Error::io(
            "symlink",
            path,
            std::io::Error::other("symbolic links are not supported on this platform"),
        ))
    }

    fn file_has_data(&self, path: &str) -> bool {
        match std::fs::symlink_metadata(path) {
            Ok(meta) => meta.file_type().is_file() && meta.len() > 0,
            Err(_) => false,
        }
    }

    fn dir_exists(&self, path: &str) -> bool {
        Path::new(path).is_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_predicates() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap().to_string();
        let fs = HostFilesystem;

        assert!(fs.dir_exists(&root));
        assert!(!fs.file_has_data(&root));
        assert!(!fs.file_has_data(&format!("{root}/missing")));

        let empty = format!("{root}/empty");
        std::fs::write(&empty, b"").unwrap();
        assert!(!fs.file_has_data(&empty));
        assert!(!fs.dir_exists(&empty));

        let full = format!("{root}/full");
        std::fs::write(&full, b"x").unwrap();
        assert!(fs.file_has_data(&full));
    }

    #[test]
    fn read_dir_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["zeta", "alpha", "mid"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let names = HostFilesystem
            .read_dir(dir.path().to_str().unwrap())
            .unwrap();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }
}
