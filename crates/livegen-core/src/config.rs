//! Configuration
//!
//! One TOML document with a table per stage. Every table and every key is
//! optional:
//!
//! ```toml
//! [sandbox]
//! fuel = 500000
//!
//! [checkpoint]
//! open = "/*@@checkpoint*/"
//! close = "/*@@end*/"
//!
//! [transport]
//! max_frame_bytes = 262144
//! ```

use crate::error::ConfigError;
use livegen_runtime::{CompilerConfig, SandboxConfig};
use livegen_source::{Markers, SanitizerConfig};
use livegen_transport::TransportConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Checkpoint parsing settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Render checkpoint snapshots while a screen streams in
    pub enabled: bool,
    pub open: String,
    pub close: String,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        let markers = Markers::default();
        Self {
            enabled: true,
            open: markers.open().to_string(),
            close: markers.close().to_string(),
        }
    }
}

impl CheckpointConfig {
    #[must_use]
    pub fn markers(&self) -> Markers {
        Markers::new(self.open.as_str(), self.close.as_str())
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivegenConfig {
    pub sanitizer: SanitizerConfig,
    pub compiler: CompilerConfig,
    pub sandbox: SandboxConfig,
    pub checkpoint: CheckpointConfig,
    pub transport: TransportConfig,
}

impl LivegenConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    /// `Parse` for malformed TOML or mistyped keys, `Invalid` for values
    /// out of range
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// `Read` if the file cannot be read, otherwise as [`Self::from_toml_str`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// # Errors
    /// The first out-of-range value found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sandbox.fuel == 0 {
            return Err(ConfigError::Invalid("sandbox.fuel must be positive".into()));
        }
        if self.sandbox.max_depth == 0 {
            return Err(ConfigError::Invalid("sandbox.max_depth must be positive".into()));
        }
        if self.sandbox.max_render_passes == 0 {
            return Err(ConfigError::Invalid(
                "sandbox.max_render_passes must be positive".into(),
            ));
        }
        if self.sandbox.max_array_len == 0 || self.sandbox.max_string_len == 0 {
            return Err(ConfigError::Invalid(
                "sandbox.max_array_len and sandbox.max_string_len must be positive".into(),
            ));
        }
        if self.compiler.max_nesting == 0 {
            return Err(ConfigError::Invalid("compiler.max_nesting must be positive".into()));
        }
        if self.transport.max_frame_bytes == 0 {
            return Err(ConfigError::Invalid(
                "transport.max_frame_bytes must be positive".into(),
            ));
        }
        if !self.checkpoint.markers().is_valid() {
            return Err(ConfigError::Invalid(
                "checkpoint markers must be non-empty and distinct".into(),
            ));
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn with_sanitizer(mut self, sanitizer: SanitizerConfig) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_compiler(mut self, compiler: CompilerConfig) -> Self {
        self.compiler = compiler;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_sandbox(mut self, sandbox: SandboxConfig) -> Self {
        self.sandbox = sandbox;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_checkpoint(mut self, checkpoint: CheckpointConfig) -> Self {
        self.checkpoint = checkpoint;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// Skip checkpoint renders and wait for final units
    #[inline]
    #[must_use]
    pub fn without_checkpoints(mut self) -> Self {
        self.checkpoint.enabled = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(LivegenConfig::from_toml_str("").unwrap(), LivegenConfig::default());
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let config = LivegenConfig::from_toml_str(
            "[sandbox]\nfuel = 1000\n\n[compiler]\nmin_expression_len = 4\n\n[checkpoint]\nenabled = false\n",
        )
        .unwrap();
        assert_eq!(config.sandbox.fuel, 1000);
        assert_eq!(config.sandbox.max_render_passes, SandboxConfig::default().max_render_passes);
        assert_eq!(config.compiler.min_expression_len, 4);
        assert_eq!(config.compiler.max_nesting, CompilerConfig::default().max_nesting);
        assert_eq!(config.sandbox.max_array_len, 1 << 20);
        assert!(!config.checkpoint.enabled);
        assert_eq!(config.checkpoint.markers(), Markers::default());
        assert_eq!(config.transport, TransportConfig::default());
    }

    #[test]
    fn invalid_values_are_refused() {
        let err = LivegenConfig::from_toml_str("[sandbox]\nfuel = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = LivegenConfig::from_toml_str("[checkpoint]\nopen = \"@@\"\nclose = \"@@\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = LivegenConfig::from_toml_str("[sandbox]\nmax_string_len = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = LivegenConfig::from_toml_str("[compiler]\nmax_nesting = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = LivegenConfig::from_toml_str("[sandbox]\nfuel = \"lots\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[transport]\nmax_frame_bytes = 4096").unwrap();
        let config = LivegenConfig::load(file.path()).unwrap();
        assert_eq!(config.transport.max_frame_bytes, 4096);

        let err = LivegenConfig::load("/nonexistent/livegen.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn builders() {
        let config = LivegenConfig::new()
            .with_sandbox(SandboxConfig::default().with_fuel(10))
            .without_checkpoints();
        assert_eq!(config.sandbox.fuel, 10);
        assert!(!config.checkpoint.enabled);
    }
}
