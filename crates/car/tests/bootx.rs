//! BootX header layout and boot-role resolution.

use car::model::AbortOnError;
use car::{
    Archive, BootOptions, CreateOptions, CreateVariant, Header, HostFilesystem, ProcessorType,
    create_archive,
};

fn boot_tree() -> tempfile::TempDir {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir(root.path().join("boot")).unwrap();
    std::fs::write(root.path().join("boot/loader.bin"), b"LOADER").unwrap();
    std::fs::write(root.path().join("boot/kernel.bin"), b"KERNEL!!").unwrap();
    std::fs::write(root.path().join("boot/config"), b"cfg").unwrap();
    root
}

fn build(root: &std::path::Path, options: BootOptions) -> Vec<u8> {
    let out_dir = tempfile::tempdir().unwrap();
    let out = out_dir.path().join("boot.car");
    let create = CreateOptions::new(root.to_str().unwrap(), CreateVariant::BootX(options));
    create_archive(
        &HostFilesystem,
        &mut AbortOnError,
        &create,
        out.to_str().unwrap(),
    )
    .unwrap();
    std::fs::read(&out).unwrap()
}

#[test]
fn role_entries_resolve_to_toc_slots() {
    let root = boot_tree();
    let base = root.path().to_str().unwrap();
    let bytes = build(
        root.path(),
        BootOptions {
            processor: ProcessorType::X86_64,
            boot_id: 0xC0DE,
            kernel_loader_path: Some(format!("{base}/boot/loader.bin")),
            kernel_path: Some(format!("{base}/boot/kernel.bin")),
            boot_config_path: Some(format!("{base}/boot/config")),
        },
    );

    let archive = Archive::parse(bytes).unwrap();
    let entries = archive.entries().unwrap();
    // Sorted enumeration: /, /boot, /boot/config, /boot/kernel.bin,
    // /boot/loader.bin.
    assert_eq!(entries[2].path, "/boot/config");
    assert_eq!(entries[3].path, "/boot/kernel.bin");
    assert_eq!(entries[4].path, "/boot/loader.bin");

    let Header::BootX(header) = archive.header().unwrap() else {
        panic!("wrong header variant");
    };
    assert_eq!(header.kernel_loader_entry.get(), 4);
    assert_eq!(header.kernel_entry.get(), 3);
    assert_eq!(header.boot_config_entry.get(), 2);
    assert_eq!(header.processor_type.get(), 0);
    assert_eq!(header.boot_id.get(), 0xC0DE);
    assert_eq!(header.lock_a.get(), 0xA10C);
    assert_eq!(header.lock_b.get(), 0xB10C);
}

#[test]
fn archive_relative_role_paths_also_match() {
    let root = boot_tree();
    let bytes = build(
        root.path(),
        BootOptions {
            processor: ProcessorType::ArmV8,
            boot_id: 1,
            kernel_loader_path: Some("/boot/loader.bin".to_string()),
            kernel_path: None,
            boot_config_path: None,
        },
    );

    let archive = Archive::parse(bytes).unwrap();
    let Header::BootX(header) = archive.header().unwrap() else {
        panic!("wrong header variant");
    };
    assert_eq!(header.kernel_loader_entry.get(), 4);
    assert_eq!(header.kernel_entry.get(), 0);
    assert_eq!(header.boot_config_entry.get(), 0);
    assert_eq!(header.processor_type.get(), 1);
}

#[test]
fn missing_role_file_leaves_zero() {
    let root = boot_tree();
    let base = root.path().to_str().unwrap();
    let bytes = build(
        root.path(),
        BootOptions {
            processor: ProcessorType::X86_64,
            boot_id: 7,
            kernel_loader_path: Some(format!("{base}/boot/nonexistent")),
            kernel_path: None,
            boot_config_path: None,
        },
    );

    let archive = Archive::parse(bytes).unwrap();
    let Header::BootX(header) = archive.header().unwrap() else {
        panic!("wrong header variant");
    };
    assert_eq!(header.kernel_loader_entry.get(), 0);
}

#[test]
fn bootx_layout_follows_its_own_header() {
    let root = boot_tree();
    let bytes = build(
        root.path(),
        BootOptions {
            processor: ProcessorType::X86_64,
            boot_id: 7,
            kernel_loader_path: None,
            kernel_path: None,
            boot_config_path: None,
        },
    );

    let archive = Archive::parse(bytes).unwrap();
    let layout = archive.layout().unwrap();
    // Header (48) + data-modification record (8).
    assert_eq!(layout.toc_offset, 56);
    // Five entries, then the 4-byte gap.
    assert_eq!(layout.entry_table_offset, 56 + 5 * 8 + 4);
    // The reserved record is present and zeroed.
    let modification = archive.data_modification().unwrap().unwrap();
    assert_eq!(modification.compression_count, 0);
    assert_eq!(modification.encryption_count, 0);
}
