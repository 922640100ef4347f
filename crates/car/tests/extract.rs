//! Round-trips, overwrite refusal and corruption detection.

use std::path::Path;

use car::model::AbortOnError;
use car::{
    Archive, BuildType, CreateOptions, CreateVariant, Error, HostFilesystem, SystemImageOptions,
    SystemType, create_archive, extract_archive,
};

fn build(variant: CreateVariant, root: &Path, out: &Path) -> Vec<u8> {
    let options = CreateOptions::new(root.to_str().unwrap(), variant);
    create_archive(
        &HostFilesystem,
        &mut AbortOnError,
        &options,
        out.to_str().unwrap(),
    )
    .unwrap();
    std::fs::read(out).unwrap()
}

fn sample_tree() -> tempfile::TempDir {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("docs/sub")).unwrap();
    std::fs::write(root.path().join("docs/readme.txt"), b"hello archive\n").unwrap();
    std::fs::write(root.path().join("docs/sub/data.bin"), vec![0xABu8; 777]).unwrap();
    std::fs::write(root.path().join("empty"), b"").unwrap();
    #[cfg(unix)]
    std::os::unix::fs::symlink("docs/readme.txt", root.path().join("shortcut")).unwrap();
    root
}

/// Compares two trees entry by entry: names, kinds, file bytes, link
/// targets.
fn assert_same_tree(left: &Path, right: &Path) {
    let mut left_names: Vec<_> = std::fs::read_dir(left)
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    let mut right_names: Vec<_> = std::fs::read_dir(right)
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    left_names.sort();
    right_names.sort();
    assert_eq!(left_names, right_names, "differs at {left:?} vs {right:?}");

    for name in left_names {
        let a = left.join(&name);
        let b = right.join(&name);
        let meta_a = std::fs::symlink_metadata(&a).unwrap();
        let meta_b = std::fs::symlink_metadata(&b).unwrap();
        assert_eq!(meta_a.file_type().is_dir(), meta_b.file_type().is_dir());
        assert_eq!(
            meta_a.file_type().is_symlink(),
            meta_b.file_type().is_symlink()
        );
        if meta_a.file_type().is_dir() {
            assert_same_tree(&a, &b);
        } else if meta_a.file_type().is_symlink() {
            assert_eq!(
                std::fs::read_link(&a).unwrap(),
                std::fs::read_link(&b).unwrap()
            );
        } else {
            assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
        }
    }
}

#[test]
fn round_trip_every_subtype() {
    let variants = [
        CreateVariant::S1,
        CreateVariant::S2,
        CreateVariant::SystemImage(SystemImageOptions {
            system: SystemType::CorOs,
            build: BuildType::Debug,
            revision: 0,
            major_version: 1,
            build_id: 1,
            partition_info_path: None,
            boot_archive_path: None,
        }),
    ];

    for variant in variants {
        let root = sample_tree();
        let work = tempfile::tempdir().unwrap();
        let out = work.path().join("tree.car");
        build(variant, root.path(), &out);

        let archive = Archive::open(out.to_str().unwrap()).unwrap();
        let dest = work.path().join("extracted");
        extract_archive(&archive, &HostFilesystem, dest.to_str().unwrap()).unwrap();

        assert_same_tree(root.path(), &dest);
    }
}

#[test]
fn extraction_refuses_nonempty_destination_file() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("f"), b"payload").unwrap();
    let work = tempfile::tempdir().unwrap();
    let out = work.path().join("a.car");
    build(CreateVariant::S1, root.path(), &out);

    let dest = work.path().join("dest");
    std::fs::create_dir(&dest).unwrap();
    std::fs::write(dest.join("f"), b"occupied").unwrap();

    let archive = Archive::open(out.to_str().unwrap()).unwrap();
    let err = extract_archive(&archive, &HostFilesystem, dest.to_str().unwrap()).unwrap_err();
    assert!(matches!(err, Error::DestinationExists(_)));
    // The occupant was left untouched.
    assert_eq!(std::fs::read(dest.join("f")).unwrap(), b"occupied");
}

#[test]
fn corrupt_data_is_detected() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("f"), b"payload").unwrap();
    let work = tempfile::tempdir().unwrap();
    let out = work.path().join("a.car");
    let mut bytes = build(CreateVariant::S1, root.path(), &out);

    // Flip one byte of the data region.
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    let err = Archive::parse(bytes).unwrap_err();
    assert!(matches!(err, Error::CorruptData));
}

#[test]
fn corrupt_header_is_detected() {
    let root = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let out = work.path().join("a.car");
    let mut bytes = build(CreateVariant::S1, root.path(), &out);

    // Flip a byte of the entry-table offset field.
    bytes[8] ^= 0x01;
    let err = Archive::parse(bytes).unwrap_err();
    assert!(matches!(err, Error::CorruptHeader));
}

#[test]
fn unknown_magic_is_invalid() {
    assert!(matches!(
        Archive::parse(b"NOPE0001xxxxxxxx".to_vec()).unwrap_err(),
        Error::InvalidFormat(_)
    ));
    assert!(matches!(
        Archive::parse(Vec::new()).unwrap_err(),
        Error::InvalidFormat(_)
    ));
}
