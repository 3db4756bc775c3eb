//! Error types for compilation and execution

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fatal compile outcome for one attempt
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SynthesisError {
    #[error("syntax error at {line}:{column} near `{snippet}`")]
    Syntax {
        line: usize,
        column: usize,
        snippet: String,
    },

    /// Bare-expression source shorter than the configured minimum
    #[error("expression source is {len} bytes, minimum is {min}")]
    TooShort { len: usize, min: usize },

    /// Source nested deeper than the compiler will lower
    #[error("nesting deeper than {limit} levels at line {line}")]
    TooDeep { limit: usize, line: usize },

    /// No top-level function and no trailing expression
    #[error("no entry unit: expected a top-level component or expression")]
    NoEntry,

    #[error("parser initialization failed: {0}")]
    Parser(String),
}

impl From<livegen_source::ParseError> for SynthesisError {
    fn from(err: livegen_source::ParseError) -> Self {
        match err {
            livegen_source::ParseError::SyntaxError {
                line,
                column,
                snippet,
            } => Self::Syntax {
                line,
                column,
                snippet,
            },
            livegen_source::ParseError::ParserInit(msg) => Self::Parser(msg),
            livegen_source::ParseError::ParseFailed => Self::Parser("parse failed".to_string()),
        }
    }
}

/// Advisory compiler findings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompileWarning {
    /// A component declared at top level next to the entry unit
    HelperOutsideEntry { name: String },
    /// Construct lowered to an inert node
    Unsupported { kind: String, line: usize },
}

impl fmt::Display for CompileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HelperOutsideEntry { name } => {
                write!(f, "helper component `{name}` is declared outside the entry unit")
            }
            Self::Unsupported { kind, line } => {
                write!(f, "unsupported `{kind}` at line {line} is ignored")
            }
        }
    }
}

/// A fault raised inside the sandbox boundary
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionFault {
    /// Uncaught exception from generated code
    #[error("uncaught {message}")]
    Thrown { message: String },

    #[error("step budget of {fuel} exhausted")]
    Budget { fuel: u64 },

    #[error("call depth limit of {limit} exceeded")]
    Depth { limit: usize },

    /// State updates kept triggering renders
    #[error("too many re-renders (limit {limit})")]
    RenderLoop { limit: usize },

    /// The entry resolved to something that cannot render
    #[error("entry is not renderable: {0}")]
    NotRenderable(String),

    /// Checkpoint render would drop content of the previous one
    #[error("checkpoint render is not a structural superset of the previous checkpoint")]
    Regressed,

    #[error("no handler {id} in the current render")]
    UnknownHandler { id: u32 },

    /// Session has no live instance
    #[error("session is not mounted")]
    NotMounted,

    #[error("host panic: {message}")]
    Panic { message: String },
}

impl ExecutionFault {
    /// Short one-line summary for fallback displays
    #[must_use]
    pub fn summary(&self) -> String {
        let full = self.to_string();
        match full.char_indices().nth(160) {
            Some((cut, _)) => format!("{}...", &full[..cut]),
            None => full,
        }
    }

    /// Faults from the generated code itself, as opposed to host limits
    #[inline]
    #[must_use]
    pub fn is_guest_error(&self) -> bool {
        matches!(self, Self::Thrown { .. } | Self::NotRenderable(_))
    }
}
