/// Example demonstrating media type detection
///
/// Run with: cargo run --example detect -- <file>...
use anyhow::{bail, Result};
use robundle_rs::{Bundle, BundleFileTypeDetector, BundleOptions};

fn main() -> Result<()> {
    println!("=== robundle-rs Detection Example ===\n");

    let mut paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        println!("No files given, creating a sample bundle...");
        let options = BundleOptions::default().with_mime_type("application/vnd.example.bundle+zip");
        let mut bundle = Bundle::create_with_options("example_detect.zip", options)?;
        bundle.root()?.resolve("hello.txt").write("Hello")?;
        bundle.close()?;
        paths.push("example_detect.zip".to_string());
    }

    let detector = BundleFileTypeDetector::new();
    let mut failures = 0;
    for path in &paths {
        match detector.probe_content_type(path) {
            Ok(Some(media_type)) => println!("   {}: {}", path, media_type),
            Ok(None) => println!("   {}: not a zip archive", path),
            Err(e) => {
                println!("   {}: ✗ {}", path, e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{} file(s) could not be read", failures);
    }
    println!("\n✓ Example complete!");
    Ok(())
}
