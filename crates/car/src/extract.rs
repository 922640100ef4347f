//! Reconstructs a filesystem tree from an archive. Entries are materialized
//! in ToC order; the writer emits depth-first, so parent directories always
//! precede their children.

use crate::entry::EntryKind;
use crate::fs::Filesystem;
use crate::{Archive, Error, Result};

/// Extracts every entry into `root_directory`, creating it if absent.
/// Refuses to overwrite a non-empty regular file. Meta and unknown-typed
/// entries are skipped.
pub fn extract_archive<F: Filesystem>(
    archive: &Archive,
    fs: &F,
    root_directory: &str,
) -> Result<()> {
    if !fs.dir_exists(root_directory) {
        fs.create_dir(root_directory)?;
    }
    let root = root_directory.trim_end_matches('/');

    for entry in archive.entries()? {
        let relative = entry
            .path
            .strip_prefix('/')
            .ok_or_else(|| Error::invalid_format("entry path does not start with '/'"))?;
        let destination = format!("{root}/{relative}");

        match entry.kind {
            EntryKind::Directory => {
                // The archive root itself maps onto `root_directory`.
                if !relative.is_empty() {
                    fs.create_dir(&destination)?;
                }
            }
            EntryKind::File => {
                if fs.file_has_data(&destination) {
                    return Err(Error::DestinationExists(destination));
                }
                fs.create_file(&destination, archive.entry_data(&entry)?)?;
            }
            EntryKind::Link => {
                let target = archive.link_target(&entry)?;
                fs.create_symlink(&destination, &target)?;
            }
            EntryKind::Meta | EntryKind::Unknown(_) => continue,
        }
        log::debug!("{} {}", entry.kind.type_char(), entry.path);
    }

    Ok(())
}
