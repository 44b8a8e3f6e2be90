#![no_main]

use libfuzzer_sys::fuzz_target;
use robundle_rs::{BundleFileSystem, Locator, Manifest, ZipContainer};

fuzz_target!(|data: &[u8]| {
    let fs = match BundleFileSystem::open(Box::new(ZipContainer::in_memory()), Locator::arcp_random())
    {
        Ok(fs) => fs,
        Err(_) => return,
    };

    // Parsing arbitrary documents should never panic
    let mut manifest = match Manifest::from_json(&fs, data) {
        Ok(m) => m,
        Err(_) => return, // Expected for invalid JSON
    };

    // Whatever parsed must serialize and survive a sync
    let _ = manifest.populate_from_bundle();
    let json = manifest.to_json().expect("parsed manifest serializes");
    Manifest::from_json(&fs, json.as_bytes()).expect("written manifest parses");
});
