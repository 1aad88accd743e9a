use std::fs;

use exporter_engine::{ensure_output_dir, AtomicFileWriter};
use tempfile::TempDir;

#[test]
fn creates_missing_output_dir() {
    let temp = TempDir::new().unwrap();
    let new_dir = temp.path().join("out").join("DEMO");
    assert!(!new_dir.exists());
    ensure_output_dir(&new_dir).unwrap();
    assert!(new_dir.is_dir());
    // Idempotent.
    ensure_output_dir(&new_dir).unwrap();
}

#[test]
fn atomic_write_replaces_existing_file() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());

    let first = writer.write("Home.md", "hello").unwrap();
    assert_eq!(first.file_name().unwrap(), "Home.md");
    assert_eq!(fs::read_to_string(&first).unwrap(), "hello");

    let second = writer.write("Home.md", "world").unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read_to_string(&second).unwrap(), "world");
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
}

#[test]
fn attachment_bytes_land_in_their_subdirectory() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());

    let path = writer
        .write_bytes("attachments/logo.png", &[0x89, b'P', b'N', b'G'])
        .unwrap();
    assert_eq!(path, temp.path().join("attachments").join("logo.png"));
    assert_eq!(fs::read(&path).unwrap(), vec![0x89, b'P', b'N', b'G']);
}

#[test]
fn no_partial_file_on_error() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("not_a_dir");
    fs::write(&file_path, "x").unwrap();

    let writer = AtomicFileWriter::new(file_path.clone());
    let result = writer.write("doc.md", "data");
    assert!(result.is_err());
    assert!(!file_path.with_file_name("doc.md").exists());
    assert_eq!(fs::read_to_string(&file_path).unwrap(), "x");
}
