//! Locators: URI values naming bundle roots, paths inside a bundle, and
//! external resources.
//!
//! A bundle that has been opened is identified by an `arcp://` locator
//! (e.g. `arcp://uuid,2a0f.../`), and every path inside it maps to a locator
//! below that root. Zip files outside an opened bundle are named by composite
//! locators of the form `<scheme>:<inner>!/`. Manifests written by older tools
//! may still carry the legacy `app://` scheme, which is rewritten to `arcp://`
//! before any lookup.
//!
//! Resolution follows RFC 3986 section 5.2; relativization mirrors the
//! prefix-based rule used by most URI libraries (the child must live below the
//! base path, otherwise it is returned unchanged).

use crate::error::{BundleError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Canonical scheme for paths inside an opened bundle
pub const ARCP_SCHEME: &str = "arcp";

/// Legacy scheme still found in old manifests
pub const LEGACY_APP_SCHEME: &str = "app";

/// A parsed URI reference (absolute or relative)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    scheme: Option<String>,
    authority: Option<String>,
    path: String,
    query: Option<String>,
    fragment: Option<String>,
}

impl Locator {
    /// Parse a URI reference
    pub fn parse(input: &str) -> Result<Self> {
        if input
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '"' | '<' | '>' | '\\'))
        {
            return Err(BundleError::MalformedLocator(input.to_string()));
        }

        let (rest, fragment) = match input.split_once('#') {
            Some((rest, fragment)) => (rest, Some(fragment.to_string())),
            None => (input, None),
        };
        let (rest, query) = match rest.split_once('?') {
            Some((rest, query)) => (rest, Some(query.to_string())),
            None => (rest, None),
        };

        let (scheme, rest) = match split_scheme(rest) {
            Some((scheme, rest)) => (Some(scheme.to_string()), rest),
            None => (None, rest),
        };

        let (authority, path) = match rest.strip_prefix("//") {
            Some(after) => {
                let end = after.find('/').unwrap_or(after.len());
                (Some(after[..end].to_string()), after[end..].to_string())
            }
            None => (None, rest.to_string()),
        };

        if scheme.is_some() && authority.is_none() && path.is_empty() {
            // "scheme:" with nothing after it
            return Err(BundleError::MalformedLocator(input.to_string()));
        }

        Ok(Self {
            scheme,
            authority,
            path,
            query,
            fragment,
        })
    }

    /// A fresh `arcp://uuid,<random>/` root locator
    pub fn arcp_random() -> Self {
        Self {
            scheme: Some(ARCP_SCHEME.to_string()),
            authority: Some(format!("uuid,{}", uuid::Uuid::new_v4())),
            path: "/".to_string(),
            query: None,
            fragment: None,
        }
    }

    /// A fresh `urn:uuid:<random>` identifier
    pub fn urn_uuid() -> Self {
        Self {
            scheme: Some("urn".to_string()),
            authority: None,
            path: format!("uuid:{}", uuid::Uuid::new_v4()),
            query: None,
            fragment: None,
        }
    }

    /// A relative locator for a bundle path (percent-encoded)
    pub fn from_path(path: &str) -> Self {
        Self {
            scheme: None,
            authority: None,
            path: encode_path(path),
            query: None,
            fragment: None,
        }
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    pub fn authority(&self) -> Option<&str> {
        self.authority.as_deref()
    }

    /// Raw (still percent-encoded) path component
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Percent-decoded path component
    pub fn decoded_path(&self) -> String {
        decode_path(&self.path)
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// Whether this locator carries a scheme
    pub fn is_absolute(&self) -> bool {
        self.scheme.is_some()
    }

    /// Absolute locator whose scheme-specific part does not start with `/`
    /// (e.g. `jar:file:///tmp/a.zip!/`)
    pub fn is_opaque(&self) -> bool {
        self.scheme.is_some() && self.authority.is_none() && !self.path.starts_with('/')
    }

    /// Everything between `scheme:` and the fragment
    pub fn scheme_specific_part(&self) -> String {
        let mut out = String::new();
        if let Some(authority) = &self.authority {
            out.push_str("//");
            out.push_str(authority);
        }
        out.push_str(&self.path);
        if let Some(query) = &self.query {
            out.push('?');
            out.push_str(query);
        }
        out
    }

    /// Rewrite the legacy `app://` scheme to `arcp://`
    pub fn rewrite_legacy_scheme(&self) -> Self {
        if self.scheme.as_deref() == Some(LEGACY_APP_SCHEME) && self.authority.is_some() {
            let mut rewritten = self.clone();
            rewritten.scheme = Some(ARCP_SCHEME.to_string());
            return rewritten;
        }
        self.clone()
    }

    /// Resolve a reference against this locator (RFC 3986 section 5.2.2)
    pub fn resolve(&self, reference: &Locator) -> Locator {
        if reference.scheme.is_some() {
            let mut target = reference.clone();
            target.path = remove_dot_segments(&reference.path);
            return target;
        }
        if self.is_opaque() {
            return reference.clone();
        }

        let (authority, path, query) = if reference.authority.is_some() {
            (
                reference.authority.clone(),
                remove_dot_segments(&reference.path),
                reference.query.clone(),
            )
        } else if reference.path.is_empty() {
            (
                self.authority.clone(),
                self.path.clone(),
                reference.query.clone().or_else(|| self.query.clone()),
            )
        } else if reference.path.starts_with('/') {
            (
                self.authority.clone(),
                remove_dot_segments(&reference.path),
                reference.query.clone(),
            )
        } else {
            (
                self.authority.clone(),
                remove_dot_segments(&self.merge(&reference.path)),
                reference.query.clone(),
            )
        };

        Locator {
            scheme: self.scheme.clone(),
            authority,
            path,
            query,
            fragment: reference.fragment.clone(),
        }
    }

    /// Parse `reference` and resolve it against this locator
    pub fn resolve_str(&self, reference: &str) -> Result<Locator> {
        Ok(self.resolve(&Locator::parse(reference)?))
    }

    /// Express `child` relative to this locator.
    ///
    /// Returns `child` unchanged when either side is opaque, when scheme or
    /// authority differ, or when `child` is not below this locator's path.
    pub fn relativize(&self, child: &Locator) -> Locator {
        if self.is_opaque() || child.is_opaque() {
            return child.clone();
        }
        let same_scheme = match (&self.scheme, &child.scheme) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            (None, None) => true,
            _ => false,
        };
        if !same_scheme || self.authority != child.authority {
            return child.clone();
        }

        let base_path = remove_dot_segments(&self.path);
        let child_path = remove_dot_segments(&child.path);
        let remainder = if child_path == base_path {
            ""
        } else {
            let prefix = if base_path.ends_with('/') {
                base_path
            } else {
                format!("{}/", base_path)
            };
            match child_path.strip_prefix(prefix.as_str()) {
                Some(rest) => rest,
                None => return child.clone(),
            }
        };

        Locator {
            scheme: None,
            authority: None,
            path: remainder.to_string(),
            query: child.query.clone(),
            fragment: child.fragment.clone(),
        }
    }

    fn merge(&self, reference_path: &str) -> String {
        if self.authority.is_some() && self.path.is_empty() {
            return format!("/{}", reference_path);
        }
        match self.path.rfind('/') {
            Some(idx) => format!("{}{}", &self.path[..=idx], reference_path),
            None => reference_path.to_string(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scheme) = &self.scheme {
            write!(f, "{}:", scheme)?;
        }
        f.write_str(&self.scheme_specific_part())?;
        if let Some(fragment) = &self.fragment {
            write!(f, "#{}", fragment)?;
        }
        Ok(())
    }
}

impl FromStr for Locator {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self> {
        Locator::parse(s)
    }
}

impl Serialize for Locator {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Locator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Locator::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Split off a leading `scheme:` if the input has one
fn split_scheme(input: &str) -> Option<(&str, &str)> {
    let colon = input.find(':')?;
    let scheme = &input[..colon];
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        return None;
    }
    Some((scheme, &input[colon + 1..]))
}

/// RFC 3986 section 5.2.4
fn remove_dot_segments(path: &str) -> String {
    let mut input = path;
    let mut output = String::with_capacity(path.len());

    while !input.is_empty() {
        if let Some(rest) = input.strip_prefix("../") {
            input = rest;
        } else if let Some(rest) = input.strip_prefix("./") {
            input = rest;
        } else if input.starts_with("/./") {
            input = &input[2..];
        } else if input == "/." {
            input = "/";
        } else if input.starts_with("/../") {
            input = &input[3..];
            pop_last_segment(&mut output);
        } else if input == "/.." {
            input = "/";
            pop_last_segment(&mut output);
        } else if input == "." || input == ".." {
            input = "";
        } else {
            let start = usize::from(input.starts_with('/'));
            let end = input[start..]
                .find('/')
                .map(|i| i + start)
                .unwrap_or(input.len());
            output.push_str(&input[..end]);
            input = &input[end..];
        }
    }

    output
}

fn pop_last_segment(output: &mut String) {
    match output.rfind('/') {
        Some(idx) => output.truncate(idx),
        None => output.clear(),
    }
}

/// Percent-encode a path, keeping `/` and the RFC 3986 `pchar` set
pub(crate) fn encode_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for byte in path.bytes() {
        let keep = byte.is_ascii_alphanumeric()
            || matches!(
                byte,
                b'-' | b'.' | b'_' | b'~' | b'!' | b'$' | b'&' | b'\'' | b'(' | b')' | b'*'
                    | b'+' | b',' | b';' | b'=' | b':' | b'@' | b'/'
            );
        if keep {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

/// Decode `%XX` escapes; malformed escapes are kept verbatim
pub(crate) fn decode_path(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(value) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(s: &str) -> Locator {
        Locator::parse(s).unwrap()
    }

    #[test]
    fn test_parse_components() {
        let l = loc("arcp://uuid,1234/dir/a.txt?q=1#frag");
        assert_eq!(l.scheme(), Some("arcp"));
        assert_eq!(l.authority(), Some("uuid,1234"));
        assert_eq!(l.path(), "/dir/a.txt");
        assert_eq!(l.query(), Some("q=1"));
        assert_eq!(l.fragment(), Some("frag"));
        assert_eq!(l.to_string(), "arcp://uuid,1234/dir/a.txt?q=1#frag");
    }

    #[test]
    fn test_opaque_composite() {
        let l = loc("jar:file:///tmp/bundle.zip!/");
        assert!(l.is_absolute());
        assert!(l.is_opaque());
        assert_eq!(l.scheme_specific_part(), "file:///tmp/bundle.zip!/");
    }

    #[test]
    fn test_relative_path_is_not_absolute() {
        let l = loc("dir/b.json");
        assert!(!l.is_absolute());
        assert_eq!(l.path(), "dir/b.json");
    }

    #[test]
    fn test_parse_rejects_whitespace() {
        assert!(matches!(
            Locator::parse("arcp://x/a b"),
            Err(BundleError::MalformedLocator(_))
        ));
        assert!(Locator::parse("http:").is_err());
    }

    #[test]
    fn test_rfc3986_normal_examples() {
        let base = loc("http://a/b/c/d;p?q");
        let cases = [
            ("g", "http://a/b/c/g"),
            ("./g", "http://a/b/c/g"),
            ("g/", "http://a/b/c/g/"),
            ("/g", "http://a/g"),
            ("//g", "http://g"),
            ("?y", "http://a/b/c/d;p?y"),
            ("g?y", "http://a/b/c/g?y"),
            ("#s", "http://a/b/c/d;p?q#s"),
            ("", "http://a/b/c/d;p?q"),
            (".", "http://a/b/c/"),
            ("..", "http://a/b/"),
            ("../g", "http://a/b/g"),
            ("../..", "http://a/"),
            ("../../g", "http://a/g"),
            ("../../../g", "http://a/g"),
        ];
        for (reference, expected) in cases {
            assert_eq!(
                base.resolve(&loc(reference)).to_string(),
                expected,
                "resolving {reference}"
            );
        }
    }

    #[test]
    fn test_resolve_against_relative_root() {
        let root = loc("/");
        assert_eq!(root.resolve(&loc("a.txt")).to_string(), "/a.txt");
        assert_eq!(root.resolve(&loc("dir/")).to_string(), "/dir/");
    }

    #[test]
    fn test_relativize() {
        let base = loc("arcp://uuid,1/");
        assert_eq!(
            base.relativize(&loc("arcp://uuid,1/dir/b.json")).to_string(),
            "dir/b.json"
        );
        assert_eq!(base.relativize(&loc("arcp://uuid,1/")).to_string(), "");
        // different authority stays untouched
        assert_eq!(
            base.relativize(&loc("arcp://uuid,2/x")).to_string(),
            "arcp://uuid,2/x"
        );
        assert_eq!(
            base.relativize(&loc("http://example.com/x")).to_string(),
            "http://example.com/x"
        );
        // relative child against an absolute base stays untouched
        assert_eq!(base.relativize(&loc("a.txt")).to_string(), "a.txt");
    }

    #[test]
    fn test_rewrite_legacy_scheme() {
        assert_eq!(
            loc("app://host/x").rewrite_legacy_scheme(),
            loc("arcp://host/x").rewrite_legacy_scheme()
        );
        assert_eq!(
            loc("http://host/x").rewrite_legacy_scheme().to_string(),
            "http://host/x"
        );
    }

    #[test]
    fn test_percent_encoding_round_trip() {
        let encoded = encode_path("/dir/hello world.txt");
        assert_eq!(encoded, "/dir/hello%20world.txt");
        assert_eq!(decode_path(&encoded), "/dir/hello world.txt");
        assert_eq!(decode_path("/bad%zz"), "/bad%zz");
        assert_eq!(decode_path("/trailing%2"), "/trailing%2");
    }

    #[test]
    fn test_arcp_random_is_root() {
        let root = Locator::arcp_random();
        assert_eq!(root.scheme(), Some(ARCP_SCHEME));
        assert_eq!(root.path(), "/");
        assert!(root.authority().unwrap().starts_with("uuid,"));
    }

    #[test]
    fn test_urn_uuid_is_opaque() {
        let urn = Locator::urn_uuid();
        assert!(urn.is_absolute());
        assert!(urn.is_opaque());
        assert!(urn.to_string().starts_with("urn:uuid:"));
        assert_eq!(Locator::parse(&urn.to_string()).unwrap(), urn);
    }
}
