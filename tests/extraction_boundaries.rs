//! Crate-level integration tests exercising the archive extractor
//! end-to-end against hand-built tar archives, covering the security
//! boundary cases a unit test colocated with the implementation
//! wouldn't: a full `Extract()` call driven the way the orchestrator
//! drives it, including the resource caps and symlink-escape checks.

use flate2::write::GzEncoder;
use flate2::Compression;
use goup::config::AppConfig;
use goup::fs::{FileSystem, RealFs};
use tar::EntryType;

fn build_archive(entries: &[(&str, &[u8], u32, EntryType, Option<&str>)]) -> Vec<u8> {
    let gz = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(gz);
    for &(name, data, mode, kind, link) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_path(name).unwrap();
        header.set_mode(mode);
        header.set_size(data.len() as u64);
        header.set_entry_type(kind);
        if let Some(link) = link {
            header.set_link_name(link).unwrap();
        }
        header.set_cksum();
        builder.append(&header, data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn write_archive(dir: &std::path::Path, name: &str, entries: &[(&str, &[u8], u32, EntryType, Option<&str>)]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, build_archive(entries)).unwrap();
    path
}

#[test]
fn rejects_dotdot_path_traversal() {
    let dir = tempfile::tempdir().unwrap();
    let archive = write_archive(
        dir.path(),
        "evil.tar.gz",
        &[("../../../../etc/passwd", b"pwned", 0o644, EntryType::Regular, None)],
    );

    let fs = RealFs;
    let dest = dir.path().join("install");
    fs.create_dir_all(&dest).unwrap();

    let err = goup::extract::extract(&fs, &AppConfig::default(), &archive, &dest).unwrap_err();
    assert!(matches!(err, goup::error::UpdaterError::PathTraversal { .. }));
}

#[test]
fn rejects_symlink_that_escapes_destination_then_writes_through_it() {
    let dir = tempfile::tempdir().unwrap();
    let archive = write_archive(
        dir.path(),
        "evil.tar.gz",
        &[
            ("escape", b"", 0, EntryType::Symlink, Some("../../../../etc")),
            ("escape/passwd", b"pwned", 0o644, EntryType::Regular, None),
        ],
    );

    let fs = RealFs;
    let dest = dir.path().join("install");
    fs.create_dir_all(&dest).unwrap();

    let err = goup::extract::extract(&fs, &AppConfig::default(), &archive, &dest).unwrap_err();
    assert!(matches!(err, goup::error::UpdaterError::PathTraversal { .. }));
}

#[test]
fn rejects_self_referential_symlink() {
    let dir = tempfile::tempdir().unwrap();
    let archive = write_archive(dir.path(), "evil.tar.gz", &[("a", b"", 0, EntryType::Symlink, Some("a"))]);

    let fs = RealFs;
    let dest = dir.path().join("install");
    fs.create_dir_all(&dest).unwrap();

    let err = goup::extract::extract(&fs, &AppConfig::default(), &archive, &dest).unwrap_err();
    assert!(matches!(err, goup::error::UpdaterError::PathTraversal { .. }));
}

#[test]
fn rejects_archive_exceeding_the_file_count_cap() {
    let dir = tempfile::tempdir().unwrap();
    let entries: Vec<(String, Vec<u8>)> = (0..10).map(|i| (format!("file-{i}"), Vec::new())).collect();
    let entry_refs: Vec<(&str, &[u8], u32, EntryType, Option<&str>)> = entries
        .iter()
        .map(|(name, data)| (name.as_str(), data.as_slice(), 0o644, EntryType::Regular, None))
        .collect();
    let archive = write_archive(dir.path(), "many.tar.gz", &entry_refs);

    let fs = RealFs;
    let mut config = AppConfig::default();
    config.max_files = 5;
    let dest = dir.path().join("install");
    fs.create_dir_all(&dest).unwrap();

    let err = goup::extract::extract(&fs, &config, &archive, &dest).unwrap_err();
    assert!(matches!(err, goup::error::UpdaterError::ResourceLimit { .. }));
}

#[test]
fn rejects_entry_exceeding_the_per_file_size_cap() {
    let dir = tempfile::tempdir().unwrap();
    let payload = vec![0u8; 1024];
    let archive = write_archive(
        dir.path(),
        "big.tar.gz",
        &[("big-file", &payload, 0o644, EntryType::Regular, None)],
    );

    let fs = RealFs;
    let mut config = AppConfig::default();
    config.max_file_size_mib = 0;
    let dest = dir.path().join("install");
    fs.create_dir_all(&dest).unwrap();

    let err = goup::extract::extract(&fs, &config, &archive, &dest).unwrap_err();
    assert!(matches!(err, goup::error::UpdaterError::ResourceLimit { .. }));
}

#[test]
fn extracts_a_well_formed_archive_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let archive = write_archive(
        dir.path(),
        "go.tar.gz",
        &[
            ("go/bin/", &[], 0o755, EntryType::Directory, None),
            ("go/bin/go", b"binary-contents", 0o755, EntryType::Regular, None),
            ("go/VERSION", b"go1.22.3\n", 0o644, EntryType::Regular, None),
        ],
    );

    let fs = RealFs;
    let dest = dir.path().join("install");
    fs.create_dir_all(&dest).unwrap();

    let stats = goup::extract::extract(&fs, &AppConfig::default(), &archive, &dest).unwrap();
    assert_eq!(stats.dirs, 1);
    assert_eq!(stats.files, 2);
    assert_eq!(std::fs::read(dest.join("go/bin/go")).unwrap(), b"binary-contents");
}
