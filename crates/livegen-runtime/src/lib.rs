//! livegen Runtime
//!
//! Compilation and sandboxed execution of generated UI components.
//!
//! # Core Concepts
//!
//! - [`Compiler`]: lowers a [`SanitizedSource`](livegen_source::SanitizedSource)
//!   into an immutable [`CompiledUnit`] and resolves its [`UnitShape`]
//! - [`SandboxExecutor`]: mounts units into [`RenderSession`]s, inside a
//!   per-session [`Boundary`]
//! - [`VNode`]: the host-neutral element tree a session renders
//!
//! Generated code sees only the injected capability set
//! ([`CAPABILITIES`]) and a small set of language intrinsics. Execution is
//! bounded by [`SandboxConfig`].
//!
//! # Example
//!
//! ```rust,ignore
//! use livegen_runtime::{Compiler, ExternalProps, SandboxExecutor};
//! use livegen_source::Sanitizer;
//!
//! let clean = Sanitizer::default().sanitize("function App() { return <h1>Hi</h1> }")?;
//! let unit = Compiler::default().compile(&clean)?;
//! let session = SandboxExecutor::default().mount("home", unit, ExternalProps::new());
//! assert!(!session.is_fallback());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod capability;
mod compile;
mod error;
mod eval;
mod hooks;
mod intrinsics;
pub mod ir;
mod lower;
mod render;
mod sandbox;
mod session;
mod value;

pub use capability::CAPABILITIES;
pub use compile::{CompiledUnit, Compiler, CompilerConfig, UnitShape};
pub use error::{CompileWarning, ExecutionFault, SynthesisError};
pub use render::{
    find_in, is_structural_superset_of, text_of, AttrValue, ElementNode, HandlerId, VNode,
};
pub use sandbox::{Boundary, SandboxConfig, SandboxExecutor};
pub use session::{fallback_view, ExternalProps, RenderSession};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use livegen_source::Sanitizer;

    fn mount(raw: &str) -> RenderSession {
        let clean = Sanitizer::default().sanitize(raw).unwrap();
        let unit = Compiler::default().compile(&clean).unwrap();
        SandboxExecutor::default().mount("test", unit, ExternalProps::new())
    }

    #[test]
    fn mounts_a_simple_component() {
        let session = mount("function App() { return <h1 className=\"title\">Hello {1 + 1}</h1> }");
        assert!(!session.is_fallback(), "{:?}", session.fault_summary());
        let h1 = find_in(session.view(), "h1").unwrap();
        assert_eq!(h1.attr("className").and_then(AttrValue::as_str), Some("title"));
        assert_eq!(text_of(session.view()), "Hello 2");
    }

    #[test]
    fn construction_throw_is_fallback_only() {
        let session = mount("function App() { throw new Error('nope'); }");
        assert!(session.is_fallback());
        assert!(!session.is_mounted());
        assert_eq!(session.fault_summary(), Some("uncaught Error: nope"));
    }
}
