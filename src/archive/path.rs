use std::fmt;

/// A container-native path: `/`-separated, absolute when it starts with `/`.
///
/// Values are kept as given. Directory entries listed by a container end
/// with `/`; the bundle filesystem strips that artifact when it wraps them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerPath(String);

impl ContainerPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The container root
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Join segments the way `getPath` does: duplicate separators collapse and
    /// a trailing separator is dropped (except for the root).
    pub fn join(first: &str, more: &[&str]) -> Self {
        let absolute = first.starts_with('/');
        let segments: Vec<&str> = std::iter::once(first)
            .chain(more.iter().copied())
            .flat_map(|part| part.split('/'))
            .filter(|s| !s.is_empty())
            .collect();
        let joined = segments.join("/");
        if absolute {
            Self(format!("/{}", joined))
        } else {
            Self(joined)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_absolute(&self) -> bool {
        self.0.starts_with('/')
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Non-empty name segments
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Last name element, including a trailing `/` artifact if present
    pub fn file_name(&self) -> Option<&str> {
        let trimmed = self.0.strip_suffix('/').unwrap_or(&self.0);
        if trimmed.is_empty() {
            return None;
        }
        let start = trimmed.rfind('/').map(|i| i + 1).unwrap_or(0);
        Some(&self.0[start..])
    }

    pub fn parent(&self) -> Option<ContainerPath> {
        let trimmed = self.0.strip_suffix('/').unwrap_or(&self.0);
        if trimmed.is_empty() {
            return None;
        }
        match trimmed.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(trimmed[..idx].to_string())),
            None => None,
        }
    }

    pub fn resolve(&self, other: &str) -> ContainerPath {
        if other.starts_with('/') || self.0.is_empty() {
            return Self(other.to_string());
        }
        if other.is_empty() {
            return self.clone();
        }
        if self.0.ends_with('/') {
            Self(format!("{}{}", self.0, other))
        } else {
            Self(format!("{}/{}", self.0, other))
        }
    }

    pub fn resolve_sibling(&self, other: &str) -> ContainerPath {
        match self.parent() {
            Some(parent) => parent.resolve(other),
            None => Self(other.to_string()),
        }
    }

    pub fn to_absolute(&self) -> ContainerPath {
        if self.is_absolute() {
            self.clone()
        } else {
            Self(format!("/{}", self.0))
        }
    }

    /// Lexically remove `.` and `..` segments and any trailing separator
    pub fn normalize(&self) -> ContainerPath {
        let mut stack: Vec<&str> = Vec::new();
        for segment in self.segments() {
            match segment {
                "." => {}
                ".." => {
                    if matches!(stack.last(), Some(last) if *last != "..") {
                        stack.pop();
                    } else if !self.is_absolute() {
                        stack.push("..");
                    }
                }
                _ => stack.push(segment),
            }
        }
        let joined = stack.join("/");
        if self.is_absolute() {
            Self(format!("/{}", joined))
        } else {
            Self(joined)
        }
    }

    /// Segment-wise prefix test; absoluteness must agree
    pub fn starts_with(&self, other: &ContainerPath) -> bool {
        if self.is_absolute() != other.is_absolute() {
            return false;
        }
        let mine: Vec<&str> = self.segments().collect();
        let theirs: Vec<&str> = other.segments().collect();
        theirs.len() <= mine.len() && mine[..theirs.len()] == theirs[..]
    }

    /// Relative path from `self` to `other`
    pub fn relativize(&self, other: &ContainerPath) -> ContainerPath {
        let mine: Vec<&str> = self.segments().collect();
        let theirs: Vec<&str> = other.segments().collect();
        let common = mine
            .iter()
            .zip(theirs.iter())
            .take_while(|(a, b)| a == b)
            .count();
        let mut parts: Vec<&str> = vec![".."; mine.len() - common];
        parts.extend_from_slice(&theirs[common..]);
        Self(parts.join("/"))
    }
}

impl fmt::Display for ContainerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
