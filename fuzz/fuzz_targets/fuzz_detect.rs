#![no_main]

use libfuzzer_sys::fuzz_target;
use robundle_rs::BundleFileTypeDetector;

fuzz_target!(|data: &[u8]| {
    // Sniffing arbitrary bytes should never panic
    let detected = BundleFileTypeDetector::new().probe_bytes(data);

    if let Some(media_type) = detected {
        assert!(!media_type.is_empty());
    }
});
