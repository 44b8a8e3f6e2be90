/// Fallback for names without a known extension
pub const OCTET_STREAM: &str = "application/octet-stream";

const EXTENSIONS: &[(&[&str], &str)] = &[
    (&[".txt"], "text/plain; charset=\"utf-8\""),
    (&[".ttl"], "text/turtle; charset=\"utf-8\""),
    (&[".rdf", ".owl"], "application/rdf+xml"),
    (&[".json"], "application/json"),
    (&[".jsonld"], "application/ld+json"),
    (&[".xml"], "application/xml"),
    (&[".png"], "image/png"),
    (&[".svg"], "image/svg+xml"),
    (&[".jpg", ".jpeg"], "image/jpeg"),
    (&[".pdf"], "application/pdf"),
];

/// Guess a media type from a file name extension, ignoring case
pub fn guess_media_type(file_name: &str) -> &'static str {
    let lower = file_name.to_ascii_lowercase();
    EXTENSIONS
        .iter()
        .find(|(suffixes, _)| suffixes.iter().any(|suffix| lower.ends_with(suffix)))
        .map(|(_, media_type)| *media_type)
        .unwrap_or(OCTET_STREAM)
}
