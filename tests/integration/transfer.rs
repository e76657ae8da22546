use std::fs;

use dedupfs::session::{ExtensionFilter, ImportMode};
use dedupfs::ApiError;

use crate::integration::support::{fresh_session, names};

fn host_tree(base: &std::path::Path) -> std::path::PathBuf {
    let src = base.join("photos");
    fs::create_dir_all(src.join("2024/summer")).unwrap();
    fs::write(src.join("index.txt"), b"index").unwrap();
    fs::write(src.join("2024/beach.JPG"), b"jpeg bytes").unwrap();
    fs::write(src.join("2024/summer/notes.md"), b"notes").unwrap();
    fs::write(src.join("2024/summer/dup.txt"), b"index").unwrap();
    src
}

#[test]
fn import_directory_mirrors_host_layout() {
    let (temp_dir, mut vfs) = fresh_session("u1");
    let src = host_tree(temp_dir.path());

    let summary = vfs
        .import_host(&src, "/photos", ImportMode::Copy, &ExtensionFilter::all())
        .unwrap();
    assert_eq!(summary.files, 4);
    assert_eq!(summary.dirs, 3);
    assert_eq!(summary.new_entities, 3);
    assert_eq!(summary.skipped, 0);

    assert_eq!(names(&vfs, "/photos"), vec!["2024", "index.txt"]);
    assert_eq!(names(&vfs, "/photos/2024/summer"), vec!["dup.txt", "notes.md"]);
    assert_eq!(vfs.read("/photos/2024/beach.JPG").unwrap(), b"jpeg bytes");
    assert_eq!(vfs.refcounts().unwrap().len(), 3);
    assert!(src.join("index.txt").exists());
    vfs.commit().unwrap();
}

#[test]
fn import_filter_skips_other_extensions() {
    let (temp_dir, mut vfs) = fresh_session("u1");
    let src = host_tree(temp_dir.path());

    let summary = vfs
        .import_host(&src, "/pics", ImportMode::Copy, &ExtensionFilter::parse("jpg"))
        .unwrap();
    assert_eq!(summary.files, 1);
    assert_eq!(summary.skipped, 3);
    assert!(vfs.exists("/pics/2024/beach.JPG").unwrap());
    assert!(!vfs.exists("/pics/index.txt").unwrap());
    // Directories are created even when every file in them is filtered.
    assert!(vfs.list("/pics/2024/summer").unwrap().is_empty());
    vfs.abandon().unwrap();
}

#[test]
fn move_mode_deletes_imported_sources() {
    let (temp_dir, mut vfs) = fresh_session("u1");
    let src = host_tree(temp_dir.path());

    vfs.import_host(&src, "/moved", ImportMode::Move, &ExtensionFilter::parse("txt"))
        .unwrap();
    assert!(!src.join("index.txt").exists());
    assert!(!src.join("2024/summer/dup.txt").exists());
    assert!(src.join("2024/beach.JPG").exists());
    assert!(src.join("2024/summer/notes.md").exists());
    assert_eq!(vfs.read("/moved/2024/summer/dup.txt").unwrap(), b"index");

    let single = temp_dir.path().join("single.txt");
    fs::write(&single, b"one").unwrap();
    vfs.import_host(&single, "/single.txt", ImportMode::Move, &ExtensionFilter::all())
        .unwrap();
    assert!(!single.exists());
    vfs.commit().unwrap();
}

#[test]
fn import_rejects_paths_overlapping_the_root() {
    let (temp_dir, mut vfs) = fresh_session("u1");

    let err = vfs
        .import_host(temp_dir.path(), "/all", ImportMode::Copy, &ExtensionFilter::all())
        .unwrap_err();
    assert!(matches!(err, ApiError::HostPath(_)));

    let inside = temp_dir.path().join("root").join("refcounts.json");
    let err = vfs
        .import_host(&inside, "/counts", ImportMode::Copy, &ExtensionFilter::all())
        .unwrap_err();
    assert!(matches!(err, ApiError::HostPath(_)));
    assert!(vfs.list("/").unwrap().is_empty());
    vfs.abandon().unwrap();
}

#[test]
fn import_target_must_be_new() {
    let (temp_dir, mut vfs) = fresh_session("u1");
    let file = temp_dir.path().join("a.txt");
    fs::write(&file, b"a").unwrap();
    vfs.make_dir("/taken", false).unwrap();

    let err = vfs
        .import_host(&file, "/taken", ImportMode::Copy, &ExtensionFilter::all())
        .unwrap_err();
    assert!(matches!(err, ApiError::AlreadyExists(_)));
    let err = vfs
        .import_host(&file, "/missing/a.txt", ImportMode::Copy, &ExtensionFilter::all())
        .unwrap_err();
    assert!(matches!(err, ApiError::PathNotFound(_)));
    assert!(vfs.refcounts().unwrap().is_empty());
    vfs.abandon().unwrap();
}

#[test]
fn export_round_trips_and_never_overwrites() {
    let (temp_dir, mut vfs) = fresh_session("u1");
    let src = host_tree(temp_dir.path());
    vfs.import_host(&src, "/photos", ImportMode::Copy, &ExtensionFilter::all())
        .unwrap();

    let out = temp_dir.path().join("restored");
    let summary = vfs
        .export_host("/photos", &out, &ExtensionFilter::all())
        .unwrap();
    assert_eq!(summary.files, 4);
    assert_eq!(summary.dirs, 3);
    for rel in ["index.txt", "2024/beach.JPG", "2024/summer/notes.md", "2024/summer/dup.txt"] {
        assert_eq!(fs::read(out.join(rel)).unwrap(), fs::read(src.join(rel)).unwrap());
    }

    let err = vfs
        .export_host("/photos", &out, &ExtensionFilter::all())
        .unwrap_err();
    assert!(matches!(err, ApiError::HostPath(_)));

    let existing = temp_dir.path().join("existing.txt");
    fs::write(&existing, b"keep me").unwrap();
    let err = vfs
        .export_host("/photos/index.txt", &existing, &ExtensionFilter::all())
        .unwrap_err();
    assert!(matches!(err, ApiError::HostPath(_)));
    assert_eq!(fs::read(&existing).unwrap(), b"keep me");

    let into_root = temp_dir.path().join("root").join("leak.txt");
    let err = vfs
        .export_host("/photos/index.txt", &into_root, &ExtensionFilter::all())
        .unwrap_err();
    assert!(matches!(err, ApiError::HostPath(_)));
    vfs.abandon().unwrap();
}

#[test]
fn export_filter_and_missing_parent() {
    let (temp_dir, mut vfs) = fresh_session("u1");
    vfs.import_bytes("/docs/a.txt", b"a", true).unwrap();
    vfs.import_bytes("/docs/b.md", b"b", true).unwrap();

    let out = temp_dir.path().join("only-md");
    let summary = vfs
        .export_host("/docs", &out, &ExtensionFilter::parse("md"))
        .unwrap();
    assert_eq!(summary.files, 1);
    assert_eq!(summary.skipped, 1);
    assert!(out.join("b.md").exists());
    assert!(!out.join("a.txt").exists());

    let err = vfs
        .export_host("/docs", &temp_dir.path().join("no/such/dir"), &ExtensionFilter::all())
        .unwrap_err();
    assert!(matches!(err, ApiError::HostPath(_)));
    vfs.abandon().unwrap();
}
