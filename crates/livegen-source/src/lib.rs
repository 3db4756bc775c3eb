//! livegen Source Layer
//!
//! Everything that happens to model-generated component text before it is
//! compiled.
//!
//! # Core Concepts
//!
//! - [`SourceArtifact`]: the text of one screen, whole or streaming
//! - [`Sanitizer`]: normalizes raw text into a [`SanitizedSource`]
//! - [`CheckpointParser`]: turns a fragment stream with embedded markers into
//!   independently parseable [`Checkpoint`] snapshots
//! - [`parse_tsx`]: the tree-sitter parse used for syntax validation
//!
//! # Example
//!
//! ```rust,ignore
//! use livegen_source::{Sanitizer, CheckpointParser, Markers};
//!
//! let clean = Sanitizer::default().sanitize("```jsx\nexport default function App(){ return null }\n```")?;
//! assert_eq!(clean.default_export(), Some("App"));
//!
//! let mut parser = CheckpointParser::new(Markers::default());
//! for outcome in parser.push("function App(){ return (<div>/*@@checkpoint*/</div>); }/*@@end*/") {
//!     println!("{:?}", outcome);
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod artifact;
mod checkpoint;
mod error;
mod hash;
mod literal;
mod sanitize;
mod syntax;

pub use artifact::{ArrivalMode, SourceArtifact};
pub use checkpoint::{Checkpoint, CheckpointOutcome, CheckpointParser, Markers, ParserState};
pub use error::{CheckpointRejection, ParseError, SanitizeError};
pub use hash::ContentHash;
pub use sanitize::{
    count_declarations, strip_markers, Dialect, SanitizationWarning, SanitizedSource, Sanitizer,
    SanitizerConfig,
};
pub use syntax::{check_syntax, parse_tsx};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
