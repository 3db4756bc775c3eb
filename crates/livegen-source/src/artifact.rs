//! Source artifacts
//!
//! A [`SourceArtifact`] is the textual description of one screen. It is
//! created when a generation job starts for that screen, grows while
//! fragments stream in, and is finalized when the final unit arrives. A
//! finalized artifact is never mutated again; a new generation replaces it.

use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};

/// How the artifact's text arrives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrivalMode {
    Whole,
    Streaming,
}

/// The source text of one screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceArtifact {
    mode: ArrivalMode,
    text: String,
    version: Option<ContentHash>,
}

impl SourceArtifact {
    /// Finalized artifact that arrived in one piece
    #[must_use]
    pub fn whole(text: impl Into<String>) -> Self {
        let text = text.into();
        let version = Some(ContentHash::compute(text.as_bytes()));
        Self {
            mode: ArrivalMode::Whole,
            text,
            version,
        }
    }

    /// Empty artifact that will grow by fragments
    #[must_use]
    pub fn streaming() -> Self {
        Self {
            mode: ArrivalMode::Streaming,
            text: String::new(),
            version: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn mode(&self) -> ArrivalMode {
        self.mode
    }

    /// Accumulated text (the current prefix while streaming)
    #[inline]
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Version hash, set once finalized
    #[inline]
    #[must_use]
    pub fn version(&self) -> Option<ContentHash> {
        self.version
    }

    #[inline]
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.version.is_some()
    }

    /// Append a fragment; ignored once finalized
    pub fn append(&mut self, fragment: &str) -> bool {
        if self.is_finalized() {
            tracing::warn!("fragment appended to finalized artifact, ignoring");
            return false;
        }
        self.text.push_str(fragment);
        true
    }

    /// Freeze the text and compute its version
    pub fn finalize(&mut self) -> ContentHash {
        *self
            .version
            .get_or_insert_with(|| ContentHash::compute(self.text.as_bytes()))
    }

    #[inline]
    #[must_use]
    pub fn into_text(self) -> String {
        self.text
    }
}
