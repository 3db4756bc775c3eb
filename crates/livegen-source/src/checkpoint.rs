//! Checkpoint protocol
//!
//! A streaming source may embed checkpoint marker pairs:
//!
//! ```text
//! function App() { return (<div><h1>Title</h1>/*@@checkpoint*/</div>); }/*@@end*/<p>more...
//! ```
//!
//! The text between the open and close marker is a completion suffix:
//! appended to everything received so far it yields complete source. The
//! parser moves through
//!
//! ```text
//! Accumulating --open--> CapturingSuffix --close--> (ready) --> Accumulating
//! ```
//!
//! and at each ready point emits `prefix + suffix` as a candidate snapshot.
//! Markers and suffixes never enter the accumulated prefix, so later
//! snapshots always extend earlier ones. Markers split across fragment
//! boundaries are held back until they can be told apart from source text.

use crate::artifact::SourceArtifact;
use crate::error::CheckpointRejection;
use crate::sanitize::{SanitizedSource, Sanitizer};
use crate::syntax::check_syntax;
use serde::{Deserialize, Serialize};

/// Checkpoint marker pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Markers {
    open: String,
    close: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            open: "/*@@checkpoint*/".to_string(),
            close: "/*@@end*/".to_string(),
        }
    }
}

impl Markers {
    #[must_use]
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn open(&self) -> &str {
        &self.open
    }

    #[inline]
    #[must_use]
    pub fn close(&self) -> &str {
        &self.close
    }

    /// Both markers non-empty and distinct
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.open.is_empty() && !self.close.is_empty() && self.open != self.close
    }
}

/// Parser state between fragments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    Accumulating,
    CapturingSuffix,
}

/// A syntactically complete snapshot of an in-progress source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    prefix: String,
    suffix: String,
    seq: u64,
    snapshot: SanitizedSource,
}

impl Checkpoint {
    /// Raw text received before the open marker
    #[inline]
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Completion suffix captured between the markers
    #[inline]
    #[must_use]
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    #[inline]
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// `prefix + suffix`, sanitized
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> &SanitizedSource {
        &self.snapshot
    }

    #[must_use]
    pub fn candidate(&self) -> String {
        format!("{}{}", self.prefix, self.suffix)
    }

    #[inline]
    #[must_use]
    pub fn into_snapshot(self) -> SanitizedSource {
        self.snapshot
    }
}

/// Result of one closed marker pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointOutcome {
    Ready(Checkpoint),
    Rejected {
        seq: u64,
        reason: CheckpointRejection,
    },
}

impl CheckpointOutcome {
    #[inline]
    #[must_use]
    pub fn seq(&self) -> u64 {
        match self {
            Self::Ready(cp) => cp.seq,
            Self::Rejected { seq, .. } => *seq,
        }
    }
}

/// Incremental checkpoint parser for one streaming artifact
#[derive(Debug, Clone)]
pub struct CheckpointParser {
    markers: Markers,
    sanitizer: Sanitizer,
    artifact: SourceArtifact,
    pending: String,
    state: ParserState,
    next_seq: u64,
    emitted: u64,
}

impl CheckpointParser {
    #[must_use]
    pub fn new(markers: Markers) -> Self {
        Self::with_sanitizer(markers, Sanitizer::default())
    }

    #[must_use]
    pub fn with_sanitizer(markers: Markers, sanitizer: Sanitizer) -> Self {
        let markers = if markers.is_valid() {
            markers
        } else {
            tracing::warn!(?markers, "invalid checkpoint markers, using defaults");
            Markers::default()
        };
        Self {
            markers,
            sanitizer,
            artifact: SourceArtifact::streaming(),
            pending: String::new(),
            state: ParserState::Accumulating,
            next_seq: 1,
            emitted: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Source text accumulated so far, markers and suffixes excluded
    #[inline]
    #[must_use]
    pub fn prefix(&self) -> &str {
        self.artifact.text()
    }

    #[inline]
    #[must_use]
    pub fn markers(&self) -> &Markers {
        &self.markers
    }

    /// Number of snapshots emitted as `Ready`
    #[inline]
    #[must_use]
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Feed one fragment, returning an outcome per marker pair it closed
    pub fn push(&mut self, fragment: &str) -> Vec<CheckpointOutcome> {
        let mut outcomes = Vec::new();
        if self.artifact.is_finalized() {
            tracing::warn!("fragment pushed after finish, ignoring");
            return outcomes;
        }
        self.pending.push_str(fragment);

        loop {
            match self.state {
                ParserState::Accumulating => {
                    let open = self.pending.find(self.markers.open.as_str());
                    let close = self.pending.find(self.markers.close.as_str());
                    match (open, close) {
                        (_, Some(c)) if open.map_or(true, |o| c < o) => {
                            tracing::warn!("stray checkpoint close marker dropped");
                            self.flush(c);
                            self.pending.drain(..self.markers.close.len());
                        }
                        (Some(o), _) => {
                            self.flush(o);
                            self.pending.drain(..self.markers.open.len());
                            self.state = ParserState::CapturingSuffix;
                        }
                        _ => {
                            let held = partial_tail(&self.pending, &self.markers.open)
                                .max(partial_tail(&self.pending, &self.markers.close));
                            self.flush(self.pending.len() - held);
                            break;
                        }
                    }
                }
                ParserState::CapturingSuffix => {
                    let Some(c) = self.pending.find(self.markers.close.as_str()) else {
                        break;
                    };
                    let suffix: String = self.pending.drain(..c).collect();
                    self.pending.drain(..self.markers.close.len());
                    self.state = ParserState::Accumulating;
                    outcomes.push(self.ready(suffix));
                }
            }
        }

        outcomes
    }

    /// End of stream: flush held text and freeze the artifact
    ///
    /// A suffix still being captured is discarded: its close marker never came.
    #[must_use]
    pub fn finish(mut self) -> SourceArtifact {
        match self.state {
            ParserState::Accumulating => {
                let rest = std::mem::take(&mut self.pending);
                self.artifact.append(&rest);
            }
            ParserState::CapturingSuffix => {
                tracing::warn!(
                    dropped = self.pending.len(),
                    "stream ended inside a checkpoint suffix"
                );
                self.pending.clear();
            }
        }
        self.artifact.finalize();
        self.artifact
    }

    /// Move the first `len` pending bytes into the prefix
    fn flush(&mut self, len: usize) {
        let text: String = self.pending.drain(..len).collect();
        self.artifact.append(&text);
    }

    fn ready(&mut self, suffix: String) -> CheckpointOutcome {
        let seq = self.next_seq;
        self.next_seq += 1;

        let candidate = format!("{}{}", self.artifact.text(), suffix);
        let validated = self
            .sanitizer
            .sanitize(&candidate)
            .map_err(CheckpointRejection::from)
            .and_then(|clean| {
                check_syntax(clean.text())
                    .map(|()| clean)
                    .map_err(CheckpointRejection::from)
            });

        match validated {
            Ok(snapshot) => {
                self.emitted += 1;
                tracing::debug!(seq, len = candidate.len(), "checkpoint ready");
                CheckpointOutcome::Ready(Checkpoint {
                    prefix: self.artifact.text().to_string(),
                    suffix,
                    seq,
                    snapshot,
                })
            }
            Err(reason) => {
                tracing::warn!(seq, error = %reason, "checkpoint candidate rejected");
                CheckpointOutcome::Rejected { seq, reason }
            }
        }
    }
}

/// Length of the longest proper prefix of `marker` that `text` ends with
fn partial_tail(text: &str, marker: &str) -> usize {
    (1..marker.len())
        .rev()
        .filter(|k| marker.is_char_boundary(*k))
        .find(|k| text.ends_with(&marker[..*k]))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPEN: &str = "/*@@checkpoint*/";
    const CLOSE: &str = "/*@@end*/";

    fn ready(outcomes: &[CheckpointOutcome]) -> Vec<&Checkpoint> {
        outcomes
            .iter()
            .filter_map(|o| match o {
                CheckpointOutcome::Ready(cp) => Some(cp),
                CheckpointOutcome::Rejected { .. } => None,
            })
            .collect()
    }

    #[test]
    fn single_fragment_checkpoint() {
        let mut p = CheckpointParser::new(Markers::default());
        let out = p.push(&format!(
            "function App(){{ return (<div><h1>Hi</h1>{OPEN}</div>); }}{CLOSE}"
        ));
        let cps = ready(&out);
        assert_eq!(cps.len(), 1);
        assert_eq!(cps[0].seq(), 1);
        assert_eq!(cps[0].suffix(), "</div>); }");
        assert_eq!(p.prefix(), "function App(){ return (<div><h1>Hi</h1>");
        assert_eq!(p.state(), ParserState::Accumulating);
    }

    #[test]
    fn marker_split_across_fragments() {
        let mut p = CheckpointParser::new(Markers::default());
        assert!(p.push("function App(){ return (<div>/*@@check").is_empty());
        assert_eq!(p.prefix(), "function App(){ return (<div>");
        assert!(p.push("point*/</div>); }/*@@e").is_empty());
        assert_eq!(p.state(), ParserState::CapturingSuffix);
        let out = p.push("nd*/<p>x</p>");
        assert_eq!(ready(&out).len(), 1);
        assert_eq!(p.prefix(), "function App(){ return (<div><p>x</p>");
        let art = p.finish();
        assert_eq!(art.text(), "function App(){ return (<div><p>x</p>");
        assert!(art.is_finalized());
    }

    #[test]
    fn no_markers_no_checkpoints() {
        let mut p = CheckpointParser::new(Markers::default());
        assert!(p.push("function App(){ return <div/> }").is_empty());
        assert_eq!(p.emitted(), 0);
        assert_eq!(p.finish().text(), "function App(){ return <div/> }");
    }

    #[test]
    fn invalid_candidate_is_rejected_not_emitted() {
        let mut p = CheckpointParser::new(Markers::default());
        let out = p.push(&format!("function App(){{ return (<div>{OPEN}</span>{CLOSE}"));
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], CheckpointOutcome::Rejected { seq: 1, .. }));
        assert_eq!(p.emitted(), 0);
    }

    #[test]
    fn stray_close_marker_is_dropped() {
        let mut p = CheckpointParser::new(Markers::default());
        assert!(p.push(&format!("function App{CLOSE}(){{ return null }}")).is_empty());
        assert_eq!(p.prefix(), "function App(){ return null }");
    }

    #[test]
    fn unclosed_suffix_is_discarded_on_finish() {
        let mut p = CheckpointParser::new(Markers::default());
        p.push(&format!("function App(){{ return null }}{OPEN}</div>"));
        let art = p.finish();
        assert_eq!(art.text(), "function App(){ return null }");
    }

    #[test]
    fn invalid_markers_fall_back_to_default() {
        let p = CheckpointParser::new(Markers::new("", ""));
        assert_eq!(p.markers(), &Markers::default());
    }

    #[test]
    fn partial_tail_lengths() {
        assert_eq!(partial_tail("abc/*@@", OPEN), 4);
        assert_eq!(partial_tail("abc", OPEN), 0);
        assert_eq!(partial_tail("x/", CLOSE), 1);
    }
}
