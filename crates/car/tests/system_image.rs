//! SystemImage topology, block alignment and boot-archive resolution.

use car::model::AbortOnError;
use car::{
    Archive, BuildType, CreateOptions, CreateVariant, EntryKind, Header, HostFilesystem,
    SystemImageOptions, SystemType, create_archive, show,
};

fn options(boot_archive_path: Option<String>) -> SystemImageOptions {
    SystemImageOptions {
        system: SystemType::CoronaX,
        build: BuildType::Release,
        revision: 2,
        major_version: 4,
        build_id: 0xBEEF,
        partition_info_path: None,
        boot_archive_path,
    }
}

fn build(root: &std::path::Path, options: SystemImageOptions) -> Vec<u8> {
    let out_dir = tempfile::tempdir().unwrap();
    let out = out_dir.path().join("system.car");
    let create = CreateOptions::new(root.to_str().unwrap(), CreateVariant::SystemImage(options));
    create_archive(
        &HostFilesystem,
        &mut AbortOnError,
        &create,
        out.to_str().unwrap(),
    )
    .unwrap();
    std::fs::read(&out).unwrap()
}

/// Root containing `A/` (holding `C`) and `B`.
fn topology_tree() -> tempfile::TempDir {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir(root.path().join("A")).unwrap();
    std::fs::write(root.path().join("A/C"), b"c-data").unwrap();
    std::fs::write(root.path().join("B"), b"b").unwrap();
    root
}

#[test]
fn entry_ids_and_links() {
    let root = topology_tree();
    let bytes = build(root.path(), options(None));
    let archive = Archive::parse(bytes).unwrap();

    let entries = archive.entries().unwrap();
    let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["/", "/A", "/A/C", "/B"]);

    let root_links = entries[0].topology.unwrap();
    assert_eq!(root_links.parent, 0);
    assert_eq!(root_links.first_child, 2);
    assert_eq!(root_links.children, 2);

    let a = entries[1].topology.unwrap();
    assert_eq!(a.parent, 1);
    assert_eq!(a.first_child, 3);
    assert_eq!(a.next_sibling, 4);
    assert_eq!(a.children, 1);

    let c = entries[2].topology.unwrap();
    assert_eq!(c.parent, 2);
    assert_eq!(c.next_sibling, 0);

    let b = entries[3].topology.unwrap();
    assert_eq!(b.parent, 1);
    assert_eq!(b.next_sibling, 0);

    // Directory records carry 0xDD, file records 0xFF.
    assert_eq!(entries[0].flags, 0xDD);
    assert_eq!(entries[3].flags, 0xFF);
}

#[test]
fn boot_entry_defaults_to_none() {
    let root = topology_tree();
    let bytes = build(root.path(), options(None));
    let archive = Archive::parse(bytes).unwrap();
    let Header::SystemImage(header) = archive.header().unwrap() else {
        panic!("wrong header variant");
    };
    assert_eq!(header.boot_entry.get(), !0u64);
}

#[test]
fn boot_entry_resolves_to_slot() {
    let root = topology_tree();
    let base = root.path().to_str().unwrap();
    let bytes = build(root.path(), options(Some(format!("{base}/B"))));
    let archive = Archive::parse(bytes).unwrap();
    let Header::SystemImage(header) = archive.header().unwrap() else {
        panic!("wrong header variant");
    };
    assert_eq!(header.boot_entry.get(), 3);
}

#[test]
fn regions_are_block_aligned() {
    let root = topology_tree();
    let bytes = build(root.path(), options(None));
    let archive = Archive::parse(bytes.clone()).unwrap();

    let layout = archive.layout().unwrap();
    assert_eq!(layout.toc_offset, 1024);
    assert_eq!((layout.entry_table_offset - 4) % 512, 0);
    assert_eq!(layout.data_section_offset % 512, 0);

    // Header block tail and data-modification record are zero.
    assert!(bytes[76..512].iter().all(|&b| b == 0));
    let modification = archive.data_modification().unwrap().unwrap();
    assert_eq!(modification.compression_count, 0);
    assert_eq!(modification.encryption_count, 0);
}

#[test]
fn version_renders_like_the_header_dump() {
    let root = topology_tree();
    let bytes = build(root.path(), options(None));
    let archive = Archive::parse(bytes).unwrap();
    let Header::SystemImage(header) = archive.header().unwrap() else {
        panic!("wrong header variant");
    };
    assert_eq!(
        show::version_string(&header.system_version),
        "Corona-X version C.4 (Release). Build ID 0x00000000BEEF"
    );
}
