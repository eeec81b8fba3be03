//! Absolute prim paths.
//!
//! A `PrimPath` is a slash-delimited absolute path such as `/World/Geom`.
//! The single slash `/` names the pseudo-root that every stage has.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::stage::{StageError, StageResult};

/// An absolute, validated prim path.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PrimPath(String);

impl PrimPath {
    /// Parse and validate a path string.
    pub fn new(path: &str) -> StageResult<Self> {
        if path == "/" {
            return Ok(Self::root());
        }
        let Some(rest) = path.strip_prefix('/') else {
            return Err(StageError::InvalidPath(path.to_string()));
        };
        if !rest.split('/').all(is_valid_name) {
            return Err(StageError::InvalidPath(path.to_string()));
        }
        Ok(Self(path.to_string()))
    }

    /// The pseudo-root path `/`.
    pub fn root() -> Self {
        Self("/".to_string())
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path element; empty for the root.
    pub fn name(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => "",
        }
    }

    /// Parent path, or `None` for the root.
    pub fn parent(&self) -> Option<PrimPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) | None => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
        }
    }

    /// Append a child element.
    pub fn child(&self, name: &str) -> StageResult<PrimPath> {
        if !is_valid_name(name) {
            return Err(StageError::InvalidPath(format!("{}/{}", self.0, name)));
        }
        if self.is_root() {
            Ok(Self(format!("/{}", name)))
        } else {
            Ok(Self(format!("{}/{}", self.0, name)))
        }
    }

    /// Number of path elements (`/` has 0, `/A/B` has 2).
    pub fn element_count(&self) -> usize {
        if self.is_root() {
            0
        } else {
            self.0.matches('/').count()
        }
    }

    /// True if `prefix` is this path or one of its ancestors.
    ///
    /// Element-aware: `/AB` does not have the prefix `/A`.
    pub fn has_prefix(&self, prefix: &PrimPath) -> bool {
        if prefix.is_root() || self == prefix {
            return true;
        }
        self.0.len() > prefix.0.len()
            && self.0.starts_with(&prefix.0)
            && self.0.as_bytes()[prefix.0.len()] == b'/'
    }

    /// Ancestors from the parent up to and including the root.
    pub fn ancestors(&self) -> Ancestors {
        Ancestors {
            next: self.parent(),
        }
    }
}

/// Iterator over the ancestors of a path, nearest first.
pub struct Ancestors {
    next: Option<PrimPath>,
}

impl Iterator for Ancestors {
    type Item = PrimPath;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.next = current.parent();
        Some(current)
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl fmt::Display for PrimPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for PrimPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

impl TryFrom<String> for PrimPath {
    type Error = StageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PrimPath::new(&value)
    }
}

impl From<PrimPath> for String {
    fn from(path: PrimPath) -> Self {
        path.0
    }
}

impl std::str::FromStr for PrimPath {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PrimPath::new(s)
    }
}
