//! Scene paths.
//!
//! An [`SdfPath`] names a prim (`/World/Instancer`), a property on a prim
//! (`/World/Instancer.positions`), or a prim with a trailing variant selection
//! (`/World/Instancer{instance=3}`). Render cache paths reuse the same type:
//! a child rprim synthesized by an instancer is a property-like path under the
//! instancer's cache path.

use std::fmt;
use thiserror::Error;

/// Errors from [`SdfPath::parse`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path '{0}' is not absolute")]
    NotAbsolute(String),

    #[error("path '{0}' has an empty component")]
    EmptyComponent(String),

    #[error("invalid character '{ch}' in path '{path}'")]
    InvalidCharacter { path: String, ch: char },
}

/// An absolute scene path. The empty path means "no path".
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SdfPath(String);

impl SdfPath {
    /// The empty path.
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// The pseudo-root `/`.
    pub fn absolute_root() -> Self {
        Self("/".to_string())
    }

    /// Wrap text as a path without validation.
    ///
    /// Use [`SdfPath::parse`] for text that did not come from this crate.
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Parse and validate an absolute path.
    pub fn parse(text: &str) -> Result<Self, PathError> {
        if !text.starts_with('/') {
            return Err(PathError::NotAbsolute(text.to_string()));
        }
        if text == "/" {
            return Ok(Self::absolute_root());
        }
        if text.ends_with('/') || text.contains("//") {
            return Err(PathError::EmptyComponent(text.to_string()));
        }
        if let Some(ch) = text
            .chars()
            .find(|c| !(c.is_alphanumeric() || matches!(c, '/' | '_' | ':' | '.' | '{' | '}' | '=')))
        {
            return Err(PathError::InvalidCharacter {
                path: text.to_string(),
                ch,
            });
        }
        Ok(Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_absolute_root(&self) -> bool {
        self.0 == "/"
    }

    /// Byte offset of the `.` that starts a property name, if any.
    fn property_start(&self) -> Option<usize> {
        let last_slash = self.0.rfind('/')?;
        self.0[last_slash..].find('.').map(|i| last_slash + i)
    }

    /// True for `/Prim.property` style paths.
    pub fn is_property_path(&self) -> bool {
        self.property_start().is_some()
    }

    /// True for `/Prim{set=selection}` style paths.
    pub fn is_prim_variant_selection_path(&self) -> bool {
        !self.is_property_path() && self.0.ends_with('}')
    }

    /// The last element's name: the property name for property paths,
    /// otherwise the prim name without any variant selection.
    pub fn name(&self) -> &str {
        if let Some(start) = self.property_start() {
            return &self.0[start + 1..];
        }
        let Some(last_slash) = self.0.rfind('/') else {
            return "";
        };
        let tail = &self.0[last_slash + 1..];
        match tail.find('{') {
            Some(brace) => &tail[..brace],
            None => tail,
        }
    }

    /// The parent path. A property's parent is its prim (including any
    /// variant selection); a variant selection's parent is the bare prim.
    pub fn parent(&self) -> SdfPath {
        if self.is_empty() || self.is_absolute_root() {
            return SdfPath::empty();
        }
        if let Some(start) = self.property_start() {
            return Self(self.0[..start].to_string());
        }
        if self.0.ends_with('}') {
            if let Some(brace) = self.0.rfind('{') {
                return Self(self.0[..brace].to_string());
            }
        }
        match self.0.rfind('/') {
            Some(0) => SdfPath::absolute_root(),
            Some(idx) => Self(self.0[..idx].to_string()),
            None => SdfPath::empty(),
        }
    }

    /// Strip any property and trailing variant selections.
    pub fn prim_path(&self) -> SdfPath {
        let mut text = match self.property_start() {
            Some(start) => &self.0[..start],
            None => self.0.as_str(),
        };
        while text.ends_with('}') {
            match text.rfind('{') {
                Some(brace) => text = &text[..brace],
                None => break,
            }
        }
        Self(text.to_string())
    }

    pub fn append_child(&self, name: &str) -> SdfPath {
        if self.is_absolute_root() {
            Self(format!("/{}", name))
        } else {
            Self(format!("{}/{}", self.0, name))
        }
    }

    pub fn append_property(&self, name: &str) -> SdfPath {
        Self(format!("{}.{}", self.0, name))
    }

    pub fn append_variant_selection(&self, set: &str, selection: &str) -> SdfPath {
        Self(format!("{}{{{}={}}}", self.0, set, selection))
    }

    /// True if `prefix` is this path or one of its ancestors.
    ///
    /// Component boundaries are respected: `/A/B` is not a prefix of `/A/BC`.
    pub fn has_prefix(&self, prefix: &SdfPath) -> bool {
        if self.is_empty() || prefix.is_empty() {
            return false;
        }
        if prefix.is_absolute_root() {
            return self.0.starts_with('/');
        }
        if self.0 == prefix.0 {
            return true;
        }
        self.0.starts_with(&prefix.0)
            && matches!(self.0.as_bytes().get(prefix.0.len()), Some(b'/' | b'.' | b'{'))
    }

    /// Replace `old` with `new` at the front of this path.
    pub fn replace_prefix(&self, old: &SdfPath, new: &SdfPath) -> Option<SdfPath> {
        if !self.has_prefix(old) {
            return None;
        }
        if old.is_absolute_root() {
            return Some(new.append_child(self.0.trim_start_matches('/')));
        }
        let rest = &self.0[old.0.len()..];
        if new.is_absolute_root() {
            return Some(Self(format!("/{}", rest.trim_start_matches('/'))));
        }
        Some(Self(format!("{}{}", new.0, rest)))
    }

    /// This path followed by each of its ancestors up to the pseudo-root.
    pub fn ancestors(&self) -> impl Iterator<Item = SdfPath> {
        let start = (!self.is_empty()).then(|| self.clone());
        std::iter::successors(start, |p| {
            let parent = p.parent();
            (!parent.is_empty()).then_some(parent)
        })
    }

    /// Prim name components, outermost first.
    pub fn prim_names(&self) -> Vec<String> {
        self.prim_path()
            .0
            .split('/')
            .filter(|c| !c.is_empty())
            .map(|c| c.to_string())
            .collect()
    }
}

impl fmt::Display for SdfPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SdfPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

impl From<&str> for SdfPath {
    fn from(text: &str) -> Self {
        SdfPath::new(text)
    }
}
