#![no_main]

use libfuzzer_sys::fuzz_target;
use robundle_rs::{
    BundleFileSystem, BundlePath, EntryMetadata, FileVisitor, Locator, Result, VirtualFilesystem,
    VisitResult, ZipContainer,
};

/// Reads every file it visits
struct ReadAll;

impl FileVisitor<BundlePath> for ReadAll {
    fn visit_file(&mut self, file: &BundlePath, _metadata: &EntryMetadata) -> Result<VisitResult> {
        let _ = file.read();
        let _ = file.to_uri();
        Ok(VisitResult::Continue)
    }
}

fuzz_target!(|data: &[u8]| {
    // Try to load the archive - should never panic
    let container = match ZipContainer::from_bytes(data.to_vec()) {
        Ok(c) => c,
        Err(_) => return, // Expected for invalid data
    };

    let fs = match BundleFileSystem::open(Box::new(container), Locator::arcp_random()) {
        Ok(fs) => fs,
        Err(_) => return,
    };

    // Walk and read everything - should never panic
    if let Ok(root) = fs.root_directory() {
        let _ = fs.walk(&root, &mut ReadAll);
    }

    // Lookups with hostile paths - should never panic
    for path in ["test.txt", "", "/", "../../../etc/passwd", "mimetype"] {
        if let Ok(p) = fs.get_path(path, &[]) {
            let _ = p.exists();
            let _ = p.read();
        }
    }

    let _ = fs.close();
});
