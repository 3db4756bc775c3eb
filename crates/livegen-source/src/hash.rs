//! Source version identity
//!
//! Two artifacts with the same text share a [`ContentHash`], so a re-sent
//! `unitReady` for unchanged text is recognized as the same version.

use std::fmt::{self, Display, Formatter};

/// Blake3 digest of one version of a screen's source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    #[inline]
    #[must_use]
    pub fn compute(text: &[u8]) -> Self {
        Self(*blake3::hash(text).as_bytes())
    }

    /// First 8 bytes as hex, for log fields
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_text_same_version() {
        let a = ContentHash::compute(b"function App(){}");
        let b = ContentHash::compute(b"function App(){}");
        let c = ContentHash::compute(b"function App(){ }");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn short_form_prefixes_display() {
        let h = ContentHash::compute(b"x");
        assert_eq!(h.short().len(), 16);
        assert_eq!(h.to_string().len(), 64);
        assert!(h.to_string().starts_with(&h.short()));
    }
}
