//! # Hierarchical Names
//!
//! This module defines [`Name`], the addressing primitive for everything the
//! repository stores or retrieves. A name is an ordered sequence of opaque
//! byte components; one name is a *prefix* of another if it is a
//! component-wise prefix.
//!
//! ## Properties
//!
//! - P1: `Name::from_uri(n.to_uri()) == n` for names whose components are
//!   printable and free of `%` and `/`, the two bytes the URI form escapes
//!   (round-trip preservation)
//! - P2: `a.is_prefix_of(b)` iff `b` starts with every component of `a`
//! - P3: the derived `Ord` sorts a prefix immediately before everything it
//!   covers, so prefix queries are contiguous range scans

use serde::{Deserialize, Serialize};

/// Marker byte prefixing a segment-number component.
///
/// Segment components are `0x00` followed by the segment number as 8 big-endian
/// bytes, keeping segment order identical to component byte order.
const SEGMENT_MARKER: u8 = 0x00;

/// An ordered sequence of opaque components identifying content.
///
/// Components are compared bytewise; the derived lexicographic order over the
/// component sequence is what storage engines rely on for prefix-range scans.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Name {
    components: Vec<Vec<u8>>,
}

impl Name {
    /// The empty name, prefix of every name.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_components(components: Vec<Vec<u8>>) -> Self {
        Self { components }
    }

    /// Parse a `/`-separated URI form. Empty path segments are ignored, so
    /// `"/repo/data/X"` and `"repo/data/X"` parse identically. `%XX` escapes
    /// are not decoded; components parse as literal bytes.
    pub fn from_uri(uri: &str) -> Self {
        let components = uri
            .split('/')
            .filter(|part| !part.is_empty())
            .map(|part| part.as_bytes().to_vec())
            .collect();
        Self { components }
    }

    pub fn components(&self) -> &[Vec<u8>] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Returns a new name with `component` appended.
    pub fn append(&self, component: impl Into<Vec<u8>>) -> Self {
        let mut components = self.components.clone();
        components.push(component.into());
        Self { components }
    }

    /// Returns a new name with a segment-number component appended.
    pub fn append_segment(&self, segment: u64) -> Self {
        let mut component = Vec::with_capacity(9);
        component.push(SEGMENT_MARKER);
        component.extend_from_slice(&segment.to_be_bytes());
        self.append(component)
    }

    /// Decode the trailing component as a segment number, if it is one.
    pub fn segment(&self) -> Option<u64> {
        let last = self.components.last()?;
        if last.len() != 9 || last[0] != SEGMENT_MARKER {
            return None;
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&last[1..]);
        Some(u64::from_be_bytes(bytes))
    }

    /// Component-wise prefix test. Every name is a prefix of itself.
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        if self.components.len() > other.components.len() {
            return false;
        }
        self.components
            .iter()
            .zip(other.components.iter())
            .all(|(a, b)| a == b)
    }

    /// URI form, rendering non-printable component bytes as `%XX` escapes.
    pub fn to_uri(&self) -> String {
        if self.components.is_empty() {
            return "/".to_string();
        }
        let mut out = String::new();
        for component in &self.components {
            out.push('/');
            for &byte in component {
                if byte.is_ascii_graphic() && byte != b'%' && byte != b'/' {
                    out.push(byte as char);
                } else {
                    out.push('%');
                    out.push_str(&hex::encode_upper([byte]));
                }
            }
        }
        out
    }
}

impl std::fmt::Debug for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}
