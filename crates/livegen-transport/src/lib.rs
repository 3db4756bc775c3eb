//! livegen Transport
//!
//! A duplex job channel: one connection requests one generation job and
//! receives its events, newline-delimited JSON in both directions.
//!
//! # Example
//!
//! ```rust,ignore
//! use livegen_transport::{JobRequest, TransportConfig, TransportSession};
//!
//! let mut session = TransportSession::connect("127.0.0.1:7070", token, TransportConfig::default()).await?;
//! let handle = session.submit(&JobRequest::for_screen("generate", "home")).await?;
//! while let Some(event) = session.next_event().await? {
//!     println!("{}", event.kind());
//! }
//! let outcome = handle.wait().await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod config;
mod error;
mod framing;
mod session;
mod wire;

pub use config::TransportConfig;
pub use error::TransportError;
pub use session::{JobHandle, JobOutcome, TransportSession};
pub use wire::{Handshake, JobData, JobRequest, ServerEvent};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
