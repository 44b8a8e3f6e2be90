//! Media type sniffing for bundle archives
//!
//! Archives following the packaging convention start with an uncompressed
//! `mimetype` entry, so the declared media type can be read from a short
//! prefix without opening the whole archive.

use crate::error::Result;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::debug;

/// Media type reported for a zip archive without a usable `mimetype` entry
pub const APPLICATION_ZIP: &str = "application/zip";

/// Bytes read from the start of the probed file
const PREFIX_LEN: usize = 256;

/// Shortest prefix that can hold a local header plus an 8-byte name
const MIN_PREFIX_LEN: usize = 38;

const LOCAL_HEADER_SIGNATURE: [u8; 4] = *b"PK\x03\x04";

/// Offset of the first entry name in a local file header
const NAME_OFFSET: usize = 30;

const MIMETYPE: &[u8] = b"mimetype";

/// Detects the media type of bundle archives from their first bytes
#[derive(Debug, Default, Clone, Copy)]
pub struct BundleFileTypeDetector;

impl BundleFileTypeDetector {
    pub fn new() -> Self {
        Self
    }

    /// Probe the file at `path`.
    ///
    /// `Ok(None)` means the type could not be determined. Failing to open or
    /// read the file is an error.
    pub fn probe_content_type<P: AsRef<Path>>(&self, path: P) -> Result<Option<String>> {
        let file = File::open(path.as_ref())?;
        let mut prefix = Vec::with_capacity(PREFIX_LEN);
        file.take(PREFIX_LEN as u64).read_to_end(&mut prefix)?;
        let detected = self.probe_bytes(&prefix);
        debug!(path = %path.as_ref().display(), media_type = ?detected, "Probed content type");
        Ok(detected)
    }

    /// Probe an in-memory prefix of an archive
    pub fn probe_bytes(&self, prefix: &[u8]) -> Option<String> {
        let prefix = &prefix[..prefix.len().min(PREFIX_LEN)];
        if prefix.len() < MIN_PREFIX_LEN {
            return None;
        }
        if prefix[..4] != LOCAL_HEADER_SIGNATURE {
            return None;
        }
        if &prefix[NAME_OFFSET..NAME_OFFSET + MIMETYPE.len()] != MIMETYPE {
            return Some(APPLICATION_ZIP.to_string());
        }

        let mut stream = Cursor::new(prefix);
        let mut entry = match zip::read::read_zipfile_from_stream(&mut stream) {
            Ok(Some(entry)) => entry,
            Ok(None) => return Some(APPLICATION_ZIP.to_string()),
            Err(e) => {
                debug!(error = %e, "Archive prefix is not a readable zip stream");
                return None;
            }
        };
        if entry.name().as_bytes() != MIMETYPE {
            return Some(APPLICATION_ZIP.to_string());
        }

        let mut buf = [0u8; PREFIX_LEN];
        let size = match entry.read(&mut buf) {
            Ok(size) => size,
            Err(e) => {
                debug!(error = %e, "Can't read mimetype entry");
                return None;
            }
        };
        if size < 1 {
            return Some(APPLICATION_ZIP.to_string());
        }
        Some(String::from_utf8_lossy(&buf[..size]).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::{FileOptions, ZipWriter};
    use zip::CompressionMethod;

    fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options: FileOptions<'_, ()> =
            FileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_short_buffer_is_undetermined() {
        assert_eq!(BundleFileTypeDetector.probe_bytes(b"PK\x03\x04"), None);
    }

    #[test]
    fn test_not_a_zip() {
        let text = vec![b'x'; 100];
        assert_eq!(BundleFileTypeDetector.probe_bytes(&text), None);
    }

    #[test]
    fn test_plain_zip() {
        let bytes = zip_with(&[("hello.txt", b"Hello there")]);
        assert_eq!(
            BundleFileTypeDetector.probe_bytes(&bytes).as_deref(),
            Some(APPLICATION_ZIP)
        );
    }

    #[test]
    fn test_mimetype_first_entry() {
        let bytes = zip_with(&[("mimetype", b"image/png"), ("other.txt", b"data")]);
        assert_eq!(
            BundleFileTypeDetector.probe_bytes(&bytes).as_deref(),
            Some("image/png")
        );
    }

    #[test]
    fn test_name_only_starts_with_mimetype() {
        let bytes = zip_with(&[("mimetype.txt", b"image/png")]);
        assert_eq!(
            BundleFileTypeDetector.probe_bytes(&bytes).as_deref(),
            Some(APPLICATION_ZIP)
        );
    }

    #[test]
    fn test_empty_mimetype_entry() {
        let bytes = zip_with(&[("mimetype", b""), ("a.txt", b"a")]);
        assert_eq!(
            BundleFileTypeDetector.probe_bytes(&bytes).as_deref(),
            Some(APPLICATION_ZIP)
        );
    }

    #[test]
    fn test_corrupt_header_is_undetermined() {
        let mut bytes = zip_with(&[("mimetype", b"image/png")]);
        // File name length runs past the prefix
        bytes[26] = 0xff;
        bytes[27] = 0xff;
        assert_eq!(BundleFileTypeDetector.probe_bytes(&bytes), None);
    }

    #[test]
    fn test_probe_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("bundle.zip");
        std::fs::write(&path, zip_with(&[("mimetype", b"application/epub+zip")]))?;
        assert_eq!(
            BundleFileTypeDetector::new().probe_content_type(&path)?.as_deref(),
            Some("application/epub+zip")
        );

        let missing = dir.path().join("missing.zip");
        assert!(BundleFileTypeDetector::new().probe_content_type(missing).is_err());
        Ok(())
    }
}
