//! Error types for the source layer

/// Fatal sanitization outcomes
///
/// Non-fatal findings are reported as
/// [`SanitizationWarning`](crate::SanitizationWarning)s on the output instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SanitizeError {
    /// Input exceeds the configured size limit
    #[error("source is {len} bytes, limit is {limit}")]
    TooLarge { len: usize, limit: usize },

    /// Nothing left once fences and declarations were stripped
    #[error("source is empty after sanitization")]
    Empty,

    /// No function, arrow function or explicit element invocation found
    #[error("no renderable shape: expected a function, an arrow function or a createElement call")]
    NoRenderableShape,
}

/// Errors from the tree-sitter parse
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("parser initialization failed: {0}")]
    ParserInit(String),

    #[error("parse failed")]
    ParseFailed,

    #[error("syntax error at {line}:{column} near `{snippet}`")]
    SyntaxError {
        line: usize,
        column: usize,
        snippet: String,
    },
}

/// Why a checkpoint candidate was not emitted
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckpointRejection {
    #[error("candidate failed to sanitize: {0}")]
    Sanitize(#[from] SanitizeError),

    #[error("candidate does not parse: {0}")]
    Parse(#[from] ParseError),
}
