//! End-to-end filesystem scenarios through the public API, run both
//! unbuffered and with a large write buffer.

use std::io::{Read, Write};
use std::sync::Arc;

use tablefs::{DirEntry, FsError, SqliteStore, TableFs};

fn write_file(fs: &mut TableFs, name: &str, data: &[u8]) {
    let mut w = fs.create(name);
    w.write_all(data).unwrap();
    w.finish().unwrap();
}

fn append_file(fs: &mut TableFs, name: &str, data: &[u8]) {
    let mut w = fs.append(name);
    w.write_all(data).unwrap();
    w.finish().unwrap();
}

fn read_file(fs: &mut TableFs, name: &str) -> Vec<u8> {
    let mut handle = fs.open(name).unwrap();
    let mut data = Vec::new();
    handle.read_to_end(&mut data).unwrap();
    data
}

fn names(entries: &[DirEntry]) -> Vec<&str> {
    entries.iter().map(|e| e.name.as_str()).collect()
}

/// The scenario every configuration must pass.
fn exercise(fs: &mut TableFs) {
    // Fresh container: reads fail, root listing is absent.
    assert!(matches!(fs.open("missing"), Err(FsError::NotFound(_))));
    assert!(matches!(fs.read_dir("missing"), Err(FsError::NotFound(_))));

    // Files at several depths.
    write_file(fs, "top.txt", b"top");
    write_file(fs, "docs/readme.md", b"# readme");
    write_file(fs, "docs/api/v1.md", b"v1");
    write_file(fs, "docs/api/v2.md", b"v2");

    assert_eq!(read_file(fs, "top.txt"), b"top");
    assert_eq!(read_file(fs, "docs/api/v1.md"), b"v1");

    // Listings at every level, lexicographic.
    assert_eq!(names(&fs.read_dir("").unwrap()), vec!["docs", "top.txt"]);
    assert_eq!(names(&fs.read_dir("docs").unwrap()), vec!["api", "readme.md"]);
    assert_eq!(names(&fs.read_dir("docs/api").unwrap()), vec!["v1.md", "v2.md"]);

    let root = fs.read_dir("").unwrap();
    assert!(root[0].is_dir);
    assert!(!root[1].is_dir);

    // Overwrite and append cycles.
    write_file(fs, "docs/readme.md", b"rewritten");
    append_file(fs, "docs/readme.md", b" twice");
    assert_eq!(read_file(fs, "docs/readme.md"), b"rewritten twice");

    // Appending to a file that never existed creates it.
    append_file(fs, "log.txt", b"line1\n");
    append_file(fs, "log.txt", b"line2\n");
    assert_eq!(read_file(fs, "log.txt"), b"line1\nline2\n");

    // Directory handles paginate and terminate.
    let mut dir = fs.open("docs/api").unwrap();
    let page = dir.read_dir_chunk(1).unwrap().unwrap();
    assert_eq!(names(&page), vec!["v1.md"]);
    let page = dir.read_dir_chunk(5).unwrap().unwrap();
    assert_eq!(names(&page), vec!["v2.md"]);
    assert_eq!(dir.read_dir_chunk(1).unwrap(), None);

    // Wipe and verify.
    fs.remove_all_files().unwrap();
    assert!(matches!(fs.open("top.txt"), Err(FsError::NotFound(_))));
    assert!(matches!(fs.read_dir(""), Err(FsError::NotFound(_))));
}

#[test]
fn unbuffered_filesystem() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    store.init_schema("files").unwrap();
    let mut fs = TableFs::new(store, "files", "container1", 0).unwrap();
    exercise(&mut fs);
}

#[test]
fn buffered_filesystem() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    store.init_schema("files").unwrap();
    // 5 MiB buffer: nothing in the scenario crosses the threshold, so
    // every read path exercises the forced flush.
    let mut fs = TableFs::new(store, "files", "container1", 5 << 20).unwrap();
    exercise(&mut fs);
}

#[test]
fn contents_survive_reopen_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("fs.db");

    {
        let store = Arc::new(SqliteStore::open(&db_path).unwrap());
        store.init_schema("files").unwrap();
        let mut fs = TableFs::new(store, "files", "c1", 0).unwrap();
        write_file(&mut fs, "notes/a.txt", b"hello ");
    }

    let store = Arc::new(SqliteStore::open(&db_path).unwrap());
    store.init_schema("files").unwrap();
    let mut fs = TableFs::new(store, "files", "c1", 0).unwrap();
    append_file(&mut fs, "notes/a.txt", b"again");
    assert_eq!(read_file(&mut fs, "notes/a.txt"), b"hello again");
    assert_eq!(names(&fs.read_dir("notes").unwrap()), vec!["a.txt"]);
}
