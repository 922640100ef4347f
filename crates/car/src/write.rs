//! Archive creation: plan the region offsets from the directory model, emit
//! ToC + entry records + data, then seal the header with both checksums.
//!
//! Layout is planned fully before anything is written, so every ToC slot and
//! data offset is known up front and the file is emitted front to back in
//! one pass per region.

use std::io::{Read, Seek, SeekFrom, Write};

use zerocopy::IntoBytes;
use zerocopy::little_endian::{U16, U32, U64};

use crate::checksum::{Crc32, region_checksum_skipping_slot};
use crate::entry::{
    EntryKind, RawEntryS1, RawEntryS2, RawEntryS2Short, RawSystemDirectoryEntry,
    RawSystemFileEntry, SYSTEM_FLAGS_DIRECTORY, SYSTEM_FLAGS_FILE, path_padding, record_len,
};
use crate::fs::Filesystem;
use crate::model::{DirectoryModel, EnumerationPolicy, ModelEntry};
use crate::options::{BootOptions, CreateOptions, CreateVariant, SystemImageOptions};
use crate::types::{
    BOOT_ENTRY_NONE, BOOTX_LOCK_A, BOOTX_LOCK_B, BLOCK_SIZE, ENTRY_TABLE_GAP, HEADER_MAGIC,
    HeaderBootX, HeaderS1, HeaderS2, HeaderSystemImage, Subtype, align_up,
};
use crate::{Error, Result};

/// Builds an archive at `archive_path` from the options' root directory.
///
/// Refuses to overwrite a non-empty file. Partial output is left behind on
/// failure; callers should create into a fresh path.
pub fn create_archive<F: Filesystem, P: EnumerationPolicy>(
    fs: &F,
    policy: &mut P,
    options: &CreateOptions,
    archive_path: &str,
) -> Result<u64> {
    if !fs.dir_exists(&options.root_directory) {
        return Err(Error::InvalidArgument(format!(
            "root directory '{}' does not exist",
            options.root_directory
        )));
    }
    if fs.file_has_data(archive_path) {
        return Err(Error::DestinationExists(archive_path.to_string()));
    }
    if !options.modifiers.is_empty() {
        if matches!(options.variant, CreateVariant::S1) {
            return Err(Error::InvalidArgument(
                "subtype 1 archives cannot carry data modifiers".to_string(),
            ));
        }
        log::warn!("data modifiers are recorded but not applied");
    }

    let track_topology = matches!(options.variant, CreateVariant::SystemImage(_));
    let model = DirectoryModel::build(fs, &options.root_directory, track_topology, policy)?;

    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(archive_path)
        .map_err(|e| Error::io("create", archive_path, e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o644))
            .map_err(|e| Error::io("chmod", archive_path, e))?;
    }

    let size = write_archive(&mut file, fs, &model, options, archive_path)?;
    file.flush().map_err(|e| Error::io("flush", archive_path, e))?;
    Ok(size)
}

/// Per-entry offsets fixed by the layout pass.
struct PlannedEntry {
    /// Record offset relative to the entry table anchor (the ToC slot
    /// value).
    record_offset: u64,
    /// Payload offset relative to the data section; 0 for directories.
    data_offset: u64,
}

struct PlannedLayout {
    toc_offset: u64,
    entry_table_offset: u64,
    data_section_offset: u64,
    file_size: u64,
    entries: Vec<PlannedEntry>,
}

fn plan_layout(subtype: Subtype, model: &DirectoryModel) -> PlannedLayout {
    let toc_offset = subtype.toc_offset();
    let mut entry_table_offset = toc_offset + 8 * model.entry_count();
    if subtype == Subtype::SystemImage {
        entry_table_offset = align_up(entry_table_offset, BLOCK_SIZE);
    }
    entry_table_offset += ENTRY_TABLE_GAP;

    let mut entries = Vec::with_capacity(model.entries.len());
    let mut record_offset = 0u64;
    let mut data_offset = 0u64;
    for entry in &model.entries {
        let planned = PlannedEntry {
            record_offset,
            data_offset: if entry.kind == EntryKind::Directory {
                0
            } else {
                let offset = data_offset;
                data_offset += entry.size;
                offset
            },
        };
        let path_len = model.archive_path(entry).len() as u64 + 1;
        let end = record_offset + record_len(subtype, entry.kind) as u64 + path_len;
        record_offset = end + path_padding(end);
        entries.push(planned);
    }

    let data_section_offset = align_up(
        entry_table_offset + record_offset,
        subtype.data_alignment(),
    );

    PlannedLayout {
        toc_offset,
        entry_table_offset,
        data_section_offset,
        file_size: data_section_offset + model.total_data_size,
        entries,
    }
}

/// Emits a complete archive into `target`, which must be empty and
/// zero-filled where unwritten (a freshly truncated file). Returns the
/// final size.
pub fn write_archive<W: Read + Write + Seek, F: Filesystem>(
    target: &mut W,
    fs: &F,
    model: &DirectoryModel,
    options: &CreateOptions,
    archive_path: &str,
) -> Result<u64> {
    let subtype = options.variant.subtype();
    let layout = plan_layout(subtype, model);
    let io = |e| Error::io("write", archive_path, e);

    // ToC: one u64 slot per entry. The 4-byte gap after it stays zero.
    target
        .seek(SeekFrom::Start(layout.toc_offset))
        .map_err(io)?;
    for planned in &layout.entries {
        target
            .write_all(&planned.record_offset.to_le_bytes())
            .map_err(io)?;
    }

    // Entry records, each followed by its NUL-terminated path and zero
    // padding out to the next 8-byte boundary.
    target
        .seek(SeekFrom::Start(layout.entry_table_offset))
        .map_err(io)?;
    for (entry, planned) in model.entries.iter().zip(&layout.entries) {
        write_record(target, subtype, entry, planned).map_err(io)?;
        let path = model.archive_path(entry);
        target.write_all(path.as_bytes()).map_err(io)?;
        target.write_all(&[0]).map_err(io)?;
        let end = planned.record_offset
            + record_len(subtype, entry.kind) as u64
            + path.len() as u64
            + 1;
        let padding = path_padding(end) as usize;
        target.write_all(&[0u8; 8][..padding]).map_err(io)?;
        log::debug!("E {path}");
    }

    // Data section: file bytes and symlink targets, contiguous in entry
    // order.
    target
        .seek(SeekFrom::Start(layout.data_section_offset))
        .map_err(io)?;
    for entry in &model.entries {
        match entry.kind {
            EntryKind::File => {
                let mut buf = vec![0u8; entry.size as usize];
                fs.read_file(&entry.path, &mut buf)?;
                target.write_all(&buf).map_err(io)?;
            }
            EntryKind::Link => {
                let mut buf = vec![0u8; entry.size as usize];
                let written = fs.read_link(&entry.path, &mut buf)?;
                if written as u64 != entry.size {
                    return Err(Error::io(
                        "readlink",
                        &entry.path,
                        std::io::Error::other("symlink changed size during archiving"),
                    ));
                }
                target.write_all(&buf).map_err(io)?;
            }
            _ => continue,
        }
        log::debug!("W {}", entry.path);
    }

    // Extend to the exact final size; with no payloads nothing was written
    // past the entry table.
    let end = target.seek(SeekFrom::End(0)).map_err(io)?;
    if end < layout.file_size {
        target
            .seek(SeekFrom::Start(layout.file_size - 1))
            .map_err(io)?;
        target.write_all(&[0]).map_err(io)?;
    }

    log::debug!("Generating checksums...");
    let data_checksum = {
        let mut crc = Crc32::new();
        let mut buf = [0u8; 64 * 1024];
        target
            .seek(SeekFrom::Start(subtype.header_len()))
            .map_err(|e| Error::io("read back", archive_path, e))?;
        loop {
            let read = target
                .read(&mut buf)
                .map_err(|e| Error::io("read back", archive_path, e))?;
            if read == 0 {
                break;
            }
            crc.update(&buf[..read]);
        }
        crc.finalize()
    };

    let header = build_header(model, options, &layout, data_checksum);
    log::debug!(
        "header: 0x{:08X}\ndata: 0x{:08X}",
        u32::from_le_bytes(header[header.len() - 4..].try_into().unwrap()),
        data_checksum
    );
    target.seek(SeekFrom::Start(0)).map_err(io)?;
    target.write_all(&header).map_err(io)?;

    Ok(layout.file_size)
}

fn write_record<W: Write>(
    target: &mut W,
    subtype: Subtype,
    entry: &ModelEntry,
    planned: &PlannedEntry,
) -> std::io::Result<()> {
    let kind = entry.kind.to_u8();
    match subtype {
        Subtype::S1 => target.write_all(
            RawEntryS1 {
                kind,
                reserved: [0; 7],
                data_offset: U64::new(planned.data_offset),
                data_size: U64::new(entry.size),
            }
            .as_bytes(),
        ),
        Subtype::S2 | Subtype::BootX => {
            if entry.kind == EntryKind::Directory {
                target.write_all(
                    RawEntryS2Short {
                        kind,
                        flags: 0,
                        reserved: [0; 6],
                    }
                    .as_bytes(),
                )
            } else {
                target.write_all(
                    RawEntryS2 {
                        kind,
                        flags: 0,
                        reserved: [0; 6],
                        data_offset: U64::new(planned.data_offset),
                        data_size: U64::new(entry.size),
                    }
                    .as_bytes(),
                )
            }
        }
        Subtype::SystemImage => {
            if entry.kind == EntryKind::Directory {
                target.write_all(
                    RawSystemDirectoryEntry {
                        kind,
                        special_flags: SYSTEM_FLAGS_DIRECTORY,
                        reserved: [0; 6],
                        parent_entry: U64::new(entry.parent as u64),
                        next_entry: U64::new(entry.next_sibling as u64),
                        first_entry: U64::new(entry.first_child as u64),
                        entry_count: U32::new(entry.children),
                        reserved2: [0; 4],
                    }
                    .as_bytes(),
                )
            } else {
                target.write_all(
                    RawSystemFileEntry {
                        kind,
                        special_flags: SYSTEM_FLAGS_FILE,
                        reserved: [0; 6],
                        parent_entry: U64::new(entry.parent as u64),
                        next_entry: U64::new(entry.next_sibling as u64),
                        data_offset: U64::new(planned.data_offset),
                        data_size: U64::new(entry.size),
                    }
                    .as_bytes(),
                )
            }
        }
    }
}

/// Finds the ToC slot of the first File entry whose stored path equals
/// `role_path` with the root prefix stripped.
fn resolve_role(model: &DirectoryModel, role_path: &str) -> Option<u64> {
    let wanted = model.strip_root(role_path);
    model
        .entries
        .iter()
        .position(|e| e.kind == EntryKind::File && model.archive_path(e) == wanted)
        .map(|slot| slot as u64)
}

fn bootx_roles(model: &DirectoryModel, options: &BootOptions) -> (u16, u16, u16) {
    let mut loader = 0u16;
    let mut kernel = 0u16;
    let mut config = 0u16;
    for (slot, entry) in model.entries.iter().enumerate() {
        if entry.kind != EntryKind::File {
            continue;
        }
        let path = model.archive_path(entry);
        let matches_role =
            |role: &Option<String>| role.as_deref().is_some_and(|r| model.strip_root(r) == path);
        if loader == 0 && matches_role(&options.kernel_loader_path) {
            loader = slot as u16;
            log::debug!("Kernel Loader Entry: {loader}");
        } else if kernel == 0 && matches_role(&options.kernel_path) {
            kernel = slot as u16;
            log::debug!("Kernel Entry: {kernel}");
        } else if config == 0 && matches_role(&options.boot_config_path) {
            config = slot as u16;
            log::debug!("Boot Config Entry: {config}");
        }
    }
    (loader, kernel, config)
}

fn system_boot_entry(model: &DirectoryModel, options: &SystemImageOptions) -> u64 {
    match &options.boot_archive_path {
        Some(path) => match resolve_role(model, path) {
            Some(slot) => {
                log::debug!("Boot Archive Entry: {slot}");
                slot
            }
            None => BOOT_ENTRY_NONE,
        },
        None => BOOT_ENTRY_NONE,
    }
}

/// Serializes the subtype header with `header_checksum` as the final step;
/// for SystemImage the checksummed region is the whole first block, whose
/// tail is zero.
fn build_header(
    model: &DirectoryModel,
    options: &CreateOptions,
    layout: &PlannedLayout,
    data_checksum: u32,
) -> Vec<u8> {
    let mut bytes = match &options.variant {
        CreateVariant::S1 => HeaderS1 {
            magic: HEADER_MAGIC,
            version: Subtype::S1.version(),
            entry_table_offset: U64::new(layout.entry_table_offset),
            data_section_offset: U64::new(layout.data_section_offset),
            data_checksum: U32::new(data_checksum),
            header_checksum: U32::new(0),
        }
        .as_bytes()
        .to_vec(),
        CreateVariant::S2 => HeaderS2 {
            magic: HEADER_MAGIC,
            version: Subtype::S2.version(),
            toc_offset: U64::new(layout.toc_offset),
            entry_table_offset: U64::new(layout.entry_table_offset),
            data_section_offset: U64::new(layout.data_section_offset),
            data_modification: U64::new(Subtype::S2.header_len()),
            archive_signature: U64::new(0),
            data_checksum: U32::new(data_checksum),
            header_checksum: U32::new(0),
        }
        .as_bytes()
        .to_vec(),
        CreateVariant::BootX(boot) => {
            let (loader, kernel, config) = bootx_roles(model, boot);
            HeaderBootX {
                magic: HEADER_MAGIC,
                version: Subtype::BootX.version(),
                processor_type: U16::new(boot.processor.to_u16()),
                boot_id: U32::new(boot.boot_id),
                lock_a: U16::new(BOOTX_LOCK_A),
                kernel_loader_entry: U16::new(loader),
                kernel_entry: U16::new(kernel),
                boot_config_entry: U16::new(config),
                lock_b: U16::new(BOOTX_LOCK_B),
                entry_table_offset: U64::new(layout.entry_table_offset),
                data_section_offset: U64::new(layout.data_section_offset),
                data_checksum: U32::new(data_checksum),
                header_checksum: U32::new(0),
            }
            .as_bytes()
            .to_vec()
        }
        CreateVariant::SystemImage(system) => HeaderSystemImage {
            magic: HEADER_MAGIC,
            version: Subtype::SystemImage.version(),
            system_version: system.version(),
            toc_offset: U64::new(layout.toc_offset),
            entry_table_offset: U64::new(layout.entry_table_offset),
            data_section_offset: U64::new(layout.data_section_offset),
            data_modification: U64::new(BLOCK_SIZE),
            archive_signature: U64::new(0),
            boot_entry: U64::new(system_boot_entry(model, system)),
            data_checksum: U32::new(data_checksum),
            header_checksum: U32::new(0),
        }
        .as_bytes()
        .to_vec(),
    };

    let slot = bytes.len() - 4;
    let header_checksum = if options.variant.subtype() == Subtype::SystemImage {
        let mut region = bytes.clone();
        region.resize(BLOCK_SIZE as usize, 0);
        region_checksum_skipping_slot(&region, slot)
    } else {
        region_checksum_skipping_slot(&bytes, slot)
    };
    bytes[slot..].copy_from_slice(&header_checksum.to_le_bytes());
    bytes
}
