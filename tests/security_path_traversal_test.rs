//! Path traversal tests
//!
//! Entry names and bundle paths that try to climb out of the archive root.

use robundle_rs::{Bundle, Locator, MANIFEST_PATH};
use std::io::{Cursor, Write};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

fn hostile_zip(names: &[&str]) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut zip = ZipWriter::new(&mut buffer);
        for name in names {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(b"malicious").unwrap();
        }
        zip.finish().unwrap();
    }
    buffer.into_inner()
}

fn entry_names(bundle: &Bundle) -> Vec<String> {
    bundle
        .root()
        .unwrap()
        .read_dir()
        .unwrap()
        .iter()
        .map(|p| p.to_string())
        .collect()
}

#[test]
fn test_dot_dot_entries_are_skipped() {
    println!("\n🔒 Testing zip entries with ../");

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bundles").join("hostile.zip");
    std::fs::create_dir(path.parent().unwrap()).unwrap();
    std::fs::write(
        &path,
        hostile_zip(&["../../etc/passwd", "ok/../../escape.txt", "safe.txt"]),
    )
    .unwrap();

    let mut bundle = Bundle::open(&path).unwrap();
    assert_eq!(entry_names(&bundle), vec!["/safe.txt"]);
    bundle.close().unwrap();

    assert!(!dir.path().join("escape.txt").exists());
    assert!(!dir.path().join("etc").exists());
    println!("  ✅ Traversal entries skipped");
}

#[test]
fn test_absolute_and_backslash_names() {
    println!("\n🔒 Testing absolute and Windows-style entry names");

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("names.zip");
    std::fs::write(&path, hostile_zip(&["/etc/passwd", "windows\\system32\\evil.dll"])).unwrap();

    let bundle = Bundle::open(&path).unwrap();
    let root = bundle.root().unwrap();

    // Both land inside the archive root
    assert_eq!(root.resolve("etc/passwd").read().unwrap(), b"malicious");
    assert_eq!(
        root.resolve("windows/system32/evil.dll").read().unwrap(),
        b"malicious"
    );
    assert!(root.resolve("windows/system32").is_dir().unwrap());
    println!("  ✅ Names confined to the bundle");
}

#[test]
fn test_bundle_paths_cannot_climb_above_root() {
    println!("\n🔒 Testing writes through ../ bundle paths");

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("inner").join("write.zip");
    std::fs::create_dir(path.parent().unwrap()).unwrap();

    {
        let mut bundle = Bundle::create(&path).unwrap();
        let root = bundle.root().unwrap();
        root.resolve("../../outside.txt").write("data").unwrap();

        assert_eq!(root.resolve("/outside.txt").read_to_string().unwrap(), "data");
        assert_eq!(
            root.resolve("../../outside.txt").to_uri().unwrap(),
            bundle.file_system().base_uri().unwrap().resolve_str("outside.txt").unwrap()
        );
        bundle.close().unwrap();
    }

    assert!(!dir.path().join("outside.txt").exists());
    let bundle = Bundle::open(&path).unwrap();
    assert!(entry_names(&bundle).contains(&"/outside.txt".to_string()));
    println!("  ✅ Writes stay inside the bundle");
}

#[test]
fn test_manifest_aggregates_stay_inside_bundle() {
    println!("\n🔒 Testing manifest entries with ../");

    let mut bundle = Bundle::create_temporary().unwrap();
    let root = bundle.root().unwrap();
    root.resolve(".ro").create_dir().unwrap();
    root.resolve(MANIFEST_PATH)
        .write(r#"{ "aggregates": [ { "uri": "../../etc/passwd" } ] }"#)
        .unwrap();

    let manifest = bundle.manifest().unwrap();
    let record = manifest
        .aggregate(&Locator::parse("/etc/passwd").unwrap())
        .expect("aggregate keyed inside the bundle");
    assert!(record.is_bundle_path());
    assert_eq!(record.file().unwrap().to_string(), "/etc/passwd");

    // The path does not exist, so synchronization drops it
    manifest.populate_from_bundle().unwrap();
    assert_eq!(manifest.aggregates().count(), 0);
    println!("  ✅ Manifest keys confined to the bundle");
}
