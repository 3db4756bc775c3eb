//! livegen Core
//!
//! Glue between the transport and the runtime:
//! - [`LivegenConfig`]: one TOML document configuring every stage
//! - [`FlowRenderer`]: the single owner of the screen to session map,
//!   routing job events through checkpointing, compilation and the sandbox
//! - [`run_job`]: drives one job from a [`TransportSession`] into a
//!   [`FlowRenderer`]
//!
//! # Example
//!
//! ```rust,ignore
//! use livegen_core::{run_job, FlowRenderer, LivegenConfig};
//! use livegen_transport::{JobRequest, TransportSession};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LivegenConfig::load("livegen.toml")?;
//! let mut flow = FlowRenderer::new(&config);
//! let mut session = TransportSession::connect("127.0.0.1:7070", "token", config.transport).await?;
//! let request = JobRequest::for_screen("generate", "home");
//! let report = run_job(&mut session, &request, &mut flow, std::future::pending()).await?;
//! println!("{} updates", report.updates.len());
//! # Ok(())
//! # }
//! ```
//!
//! [`TransportSession`]: livegen_transport::TransportSession

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod client;
pub mod config;
pub mod error;
pub mod flow;
pub mod telemetry;

pub use client::{run_job, JobReport};
pub use config::{CheckpointConfig, LivegenConfig};
pub use error::{ConfigError, LivegenError};
pub use flow::{FlowRenderer, FlowUpdate};
pub use telemetry::init_tracing;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for embedding livegen
    pub use crate::{run_job, FlowRenderer, FlowUpdate, LivegenConfig, LivegenError};
    pub use livegen_runtime::{ExternalProps, HandlerId, RenderSession, VNode};
    pub use livegen_transport::{JobRequest, ServerEvent, TransportSession};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
