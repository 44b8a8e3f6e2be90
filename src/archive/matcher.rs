//! Path pattern matching
//!
//! Patterns carry a syntax prefix:
//! - `glob:` - `*` matches within one segment, `**` across segments, `?` one
//!   character, `[abc]`/`[!a-z]` character classes, `{a,b}` alternatives
//! - `regex:` - a regular expression matched against the whole path

use super::ContainerPath;
use crate::error::{BundleError, Result};
use regex::Regex;

/// Compiled matcher for container paths
#[derive(Debug, Clone)]
pub struct PathMatcher {
    regex: Regex,
}

impl PathMatcher {
    /// Compile a `syntax:pattern` string
    pub fn new(syntax_and_pattern: &str) -> Result<Self> {
        let (syntax, pattern) = syntax_and_pattern.split_once(':').ok_or_else(|| {
            BundleError::InvalidPattern(format!(
                "missing syntax prefix in '{}'",
                syntax_and_pattern
            ))
        })?;

        let expr = match syntax.to_ascii_lowercase().as_str() {
            "glob" => glob_to_regex(pattern)?,
            "regex" => pattern.to_string(),
            other => {
                return Err(BundleError::InvalidPattern(format!(
                    "unknown syntax '{}'",
                    other
                )))
            }
        };

        let regex = Regex::new(&format!("^(?:{})$", expr))?;
        Ok(Self { regex })
    }

    pub fn matches(&self, path: &ContainerPath) -> bool {
        self.regex.is_match(path.as_str())
    }
}

/// Translate a glob into a regular expression body
fn glob_to_regex(glob: &str) -> Result<String> {
    let mut out = String::with_capacity(glob.len() * 2);
    let mut chars = glob.chars().peekable();
    let mut in_group = false;

    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    out.push_str(".*");
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push_str("[^/]"),
            '{' => {
                if in_group {
                    return Err(BundleError::InvalidPattern(
                        "nested groups are not supported".to_string(),
                    ));
                }
                in_group = true;
                out.push_str("(?:");
            }
            '}' if in_group => {
                in_group = false;
                out.push(')');
            }
            ',' if in_group => out.push('|'),
            '[' => {
                out.push('[');
                if chars.peek() == Some(&'!') {
                    chars.next();
                    out.push('^');
                }
                let mut closed = false;
                for inner in chars.by_ref() {
                    match inner {
                        ']' => {
                            closed = true;
                            break;
                        }
                        '/' => {
                            return Err(BundleError::InvalidPattern(
                                "explicit '/' in character class".to_string(),
                            ))
                        }
                        '\\' | '[' | '^' | '&' | '~' => {
                            out.push('\\');
                            out.push(inner);
                        }
                        _ => out.push(inner),
                    }
                }
                if !closed {
                    return Err(BundleError::InvalidPattern(format!(
                        "missing ']' in '{}'",
                        glob
                    )));
                }
                out.push(']');
            }
            '\\' => match chars.next() {
                Some(escaped) => out.push_str(&regex::escape(&escaped.to_string())),
                None => {
                    return Err(BundleError::InvalidPattern(format!(
                        "dangling escape in '{}'",
                        glob
                    )))
                }
            },
            _ => out.push_str(&regex::escape(&c.to_string())),
        }
    }

    if in_group {
        return Err(BundleError::InvalidPattern(format!("missing '}}' in '{}'", glob)));
    }
    Ok(out)
}
