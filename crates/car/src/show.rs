//! Human-readable rendering of archive headers and entry listings.

use std::io::Write;

use crate::entry::EntryKind;
use crate::options::{BuildType, SystemType};
use crate::types::{Subtype, SystemVersion};
use crate::{Archive, Error, Header, Result};

fn out_err(e: std::io::Error) -> Error {
    Error::io("write", "stdout", e)
}

/// Renders a SystemImage version like
/// `Corona-X version C.4 (Release). Build ID 0x00000000BEEF`.
pub fn version_string(version: &SystemVersion) -> String {
    let system = match SystemType::from_u8(version.system_type) {
        Some(system) => system.name(),
        None => "Unknown OS",
    };
    let build = match BuildType::from_u8(version.build_type) {
        Some(build) => build.name(),
        None => "?????",
    };
    let revision = if version.revision <= 25 {
        (b'A' + version.revision) as char
    } else {
        '?'
    };
    format!(
        "{} version {}.{} ({}). Build ID 0x{:012X}",
        system,
        revision,
        version.major_version,
        build,
        version.build_id.get()
    )
}

/// Prints the labeled header fields of an archive.
pub fn show_header<W: Write>(archive: &Archive, out: &mut W) -> Result<()> {
    let data = archive.data();
    writeln!(
        out,
        "Archive Signature:     '{}'",
        String::from_utf8_lossy(&data[0..4])
    )
    .map_err(out_err)?;
    writeln!(
        out,
        "CAR Version:           '{}'",
        String::from_utf8_lossy(&data[4..8])
    )
    .map_err(out_err)?;

    let shared = |out: &mut W, entry_table: u64, data_section: u64, data_crc: u32, header_crc: u32| -> Result<()> {
        writeln!(out, "Entry Table Offset:    {entry_table}").map_err(out_err)?;
        writeln!(out, "Data Section Offset:   {data_section}").map_err(out_err)?;
        writeln!(out, "Data Checksum:         0x{data_crc:08X}").map_err(out_err)?;
        writeln!(out, "Header Checksum:       0x{header_crc:08X}").map_err(out_err)?;
        Ok(())
    };

    match archive.header()? {
        Header::S1(h) => {
            writeln!(out, "ToC Offset (const):    {}", Subtype::S1.toc_offset())
                .map_err(out_err)?;
            shared(
                out,
                h.entry_table_offset.get(),
                h.data_section_offset.get(),
                h.data_checksum.get(),
                h.header_checksum.get(),
            )?;
        }
        Header::S2(h) => {
            writeln!(out, "ToC Offset:            {}", h.toc_offset.get()).map_err(out_err)?;
            shared(
                out,
                h.entry_table_offset.get(),
                h.data_section_offset.get(),
                h.data_checksum.get(),
                h.header_checksum.get(),
            )?;
            writeln!(out, "Data Modification:     {}", h.data_modification.get())
                .map_err(out_err)?;
            writeln!(out, "Signature:             {}", h.archive_signature.get())
                .map_err(out_err)?;
        }
        Header::BootX(h) => {
            writeln!(out, "Boot ID:               0x{:08X}", h.boot_id.get()).map_err(out_err)?;
            writeln!(out, "Processor Type:        0x{:04X}", h.processor_type.get())
                .map_err(out_err)?;
            writeln!(out, "Lock A:                0x{:04X}", h.lock_a.get()).map_err(out_err)?;
            shared(
                out,
                h.entry_table_offset.get(),
                h.data_section_offset.get(),
                h.data_checksum.get(),
                h.header_checksum.get(),
            )?;
            writeln!(out, "Kernel Loader Entry:   {}", h.kernel_loader_entry.get())
                .map_err(out_err)?;
            writeln!(out, "Kernel Entry:          {}", h.kernel_entry.get()).map_err(out_err)?;
            writeln!(out, "Boot Config Entry:     {}", h.boot_config_entry.get())
                .map_err(out_err)?;
            writeln!(out, "Lock B:                0x{:04X}", h.lock_b.get()).map_err(out_err)?;
        }
        Header::SystemImage(h) => {
            writeln!(
                out,
                "System Version:        {}",
                version_string(&h.system_version)
            )
            .map_err(out_err)?;
            writeln!(out, "ToC Offset:            {}", h.toc_offset.get()).map_err(out_err)?;
            shared(
                out,
                h.entry_table_offset.get(),
                h.data_section_offset.get(),
                h.data_checksum.get(),
                h.header_checksum.get(),
            )?;
            writeln!(out, "Data Modification:     {}", h.data_modification.get())
                .map_err(out_err)?;
            writeln!(out, "Signature:             {}", h.archive_signature.get())
                .map_err(out_err)?;
            if h.boot_entry.get() == crate::types::BOOT_ENTRY_NONE {
                writeln!(out, "Boot Archive Entry:    None").map_err(out_err)?;
            } else {
                writeln!(out, "Boot Archive Entry:    {}", h.boot_entry.get())
                    .map_err(out_err)?;
            }
        }
    }

    if let Some(modification) = archive.data_modification()? {
        writeln!(
            out,
            "Compression Count:     {}",
            modification.compression_count
        )
        .map_err(out_err)?;
        writeln!(
            out,
            "Encryption Count:      {}",
            modification.encryption_count
        )
        .map_err(out_err)?;
    }

    Ok(())
}

/// Prints one line per entry: the type letter and path, optionally the size
/// and, for links, the resolved target from the data region.
pub fn list_contents<W: Write>(
    archive: &Archive,
    out: &mut W,
    show_size: bool,
    show_links: bool,
) -> Result<()> {
    if let Some(modification) = archive.data_modification()? {
        if modification.compression_count != 0 || modification.encryption_count != 0 {
            log::warn!("archive may contain data modification");
        }
    }

    for entry in archive.entries()? {
        write!(out, "{} {}", entry.kind.type_char(), entry.path).map_err(out_err)?;
        if show_size {
            write!(out, " ({})", entry.data_size).map_err(out_err)?;
        }
        if show_links && entry.kind == EntryKind::Link {
            write!(out, " --> {}", archive.link_target(&entry)?).map_err(out_err)?;
        }
        writeln!(out).map_err(out_err)?;
    }
    Ok(())
}

/// Renders the header and/or contents of the archive at `path`, as `show`
/// and `list` drive it.
pub fn show_information<W: Write>(
    path: &str,
    out: &mut W,
    show_header_info: bool,
    show_contents: bool,
    show_size: bool,
    show_links: bool,
) -> Result<()> {
    let archive = Archive::open(path)?;
    if show_header_info {
        show_header(&archive, out)?;
    }
    if show_contents {
        writeln!(out, "Contents:").map_err(out_err)?;
        list_contents(&archive, out, show_size, show_links)?;
    }
    Ok(())
}
