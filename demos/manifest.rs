/// Example demonstrating bundle manifests
///
/// Run with: cargo run --example manifest
use anyhow::{Context, Result};
use robundle_rs::{Agent, Bundle, Locator, PathAnnotation, MANIFEST_PATH};

const BUNDLE: &str = "example_manifest.bundle.zip";

fn main() -> Result<()> {
    println!("=== robundle-rs Manifest Example ===\n");

    println!("1. Creating bundle...");
    create_bundle()?;

    println!("\n2. Reading manifest...");
    read_bundle()?;

    println!("\n✓ Example complete!");
    Ok(())
}

fn create_bundle() -> Result<()> {
    let mut bundle = Bundle::create(BUNDLE).context("creating bundle")?;
    let root = bundle.root()?;

    root.resolve("README.md").write("# Results\n\nSee data/.")?;
    root.resolve("data").create_dir()?;
    root.resolve("data/results.csv").write("x,y\n1,2\n")?;
    root.resolve("data/model.ttl").write("<a> <b> <c> .")?;

    let manifest = bundle.manifest()?;
    manifest.created_by = Some(
        Agent::new("Example Author")
            .with_orcid(Locator::parse("https://orcid.org/0000-0002-1825-0097")?),
    );

    // Resources outside the bundle can be aggregated too
    let external = Locator::parse("https://example.com/raw/measurements.nc")?;
    let record = manifest.get_or_create(&external)?;
    record.mediatype = Some("application/x-netcdf".to_string());
    record.retrieved_from = Some(external.clone());

    manifest.add_annotation(PathAnnotation::new(
        Locator::parse("../data/results.csv")?,
        Locator::parse("../README.md")?,
    ));

    bundle.write_manifest()?;
    bundle.close()?;
    println!("   ✓ Bundle created: {}", BUNDLE);
    Ok(())
}

fn read_bundle() -> Result<()> {
    let mut bundle = Bundle::open(BUNDLE).context("opening bundle")?;
    println!("   Media type: {}", bundle.mime_type()?);

    let manifest = bundle.manifest()?;
    println!("   Aggregates:");
    for aggregate in manifest.aggregates() {
        println!(
            "     - {} ({})",
            aggregate.uri(),
            aggregate.mediatype.as_deref().unwrap_or("unknown")
        );
    }

    let results = Locator::parse("/data/results.csv")?;
    for annotation in manifest.annotations_about(&results) {
        if let Some(content) = &annotation.content {
            println!("   {} is described by {}", results, content);
        }
    }

    let json = bundle.root()?.resolve(MANIFEST_PATH).read_to_string()?;
    println!("\n   {}:\n{}", MANIFEST_PATH, json);
    Ok(())
}
