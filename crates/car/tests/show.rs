//! Rendering of headers and entry listings.

use car::model::AbortOnError;
use car::show::{list_contents, show_header};
use car::{Archive, CreateOptions, CreateVariant, HostFilesystem, create_archive};

fn build(variant: CreateVariant, root: &std::path::Path) -> Archive {
    let out_dir = tempfile::tempdir().unwrap();
    let out = out_dir.path().join("show.car");
    let options = CreateOptions::new(root.to_str().unwrap(), variant);
    create_archive(
        &HostFilesystem,
        &mut AbortOnError,
        &options,
        out.to_str().unwrap(),
    )
    .unwrap();
    Archive::open(out.to_str().unwrap()).unwrap()
}

#[test]
fn header_dump_labels_fields() {
    let root = tempfile::tempdir().unwrap();
    let archive = build(CreateVariant::S1, root.path());

    let mut out = Vec::new();
    show_header(&archive, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(text.contains("Archive Signature:     'CAR!'"));
    assert!(text.contains("CAR Version:           '0001'"));
    assert!(text.contains("ToC Offset (const):    32"));
    assert!(text.contains("Entry Table Offset:    44"));
    assert!(text.contains("Data Section Offset:   80"));
    assert!(text.contains("Data Checksum:         0x"));
    assert!(text.contains("Header Checksum:       0x"));
}

#[test]
fn s2_header_dump_includes_modification_counts() {
    let root = tempfile::tempdir().unwrap();
    let archive = build(CreateVariant::S2, root.path());

    let mut out = Vec::new();
    show_header(&archive, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(text.contains("ToC Offset:            64"));
    assert!(text.contains("Data Modification:     56"));
    assert!(text.contains("Compression Count:     0"));
    assert!(text.contains("Encryption Count:      0"));
}

#[test]
fn listing_shows_sizes_and_links() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("hello.txt"), b"hi\n").unwrap();
    #[cfg(unix)]
    std::os::unix::fs::symlink("hello.txt", root.path().join("link")).unwrap();
    let archive = build(CreateVariant::S1, root.path());

    let mut out = Vec::new();
    list_contents(&archive, &mut out, true, true).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(text.contains("D / (0)"));
    assert!(text.contains("F /hello.txt (3)"));
    #[cfg(unix)]
    assert!(text.contains("L /link (9) --> hello.txt"));
}
