//! Sandbox executor and fault isolation
//!
//! Every construction, render and event dispatch for a screen runs inside
//! that screen's [`Boundary`], which turns evaluator faults and host panics
//! into [`ExecutionFault`]s. A fault only ever flips the one session it
//! happened in.

use crate::capability::{capability_set, navigate};
use crate::compile::CompiledUnit;
use crate::error::ExecutionFault;
use crate::eval::{Abrupt, Interpreter};
use crate::hooks;
use crate::render::{is_structural_superset_of, render_tree, HandlerId, VNode};
use crate::session::{ExternalProps, RenderSession};
use crate::value::{EvalResult, ObjectMap, Value};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Execution limits for one boundary operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Evaluation steps per mount, update or dispatch
    pub fuel: u64,
    pub max_depth: usize,
    /// Re-render passes allowed while state keeps changing
    pub max_render_passes: usize,
    /// Longest array generated code may build
    pub max_array_len: usize,
    /// Longest string generated code may build, in bytes
    pub max_string_len: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            fuel: 2_000_000,
            max_depth: 64,
            max_render_passes: 25,
            max_array_len: 1 << 20,
            max_string_len: 1 << 22,
        }
    }
}

impl SandboxConfig {
    #[must_use]
    pub fn with_fuel(mut self, fuel: u64) -> Self {
        self.fuel = fuel;
        self
    }

    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    #[must_use]
    pub fn with_max_render_passes(mut self, passes: usize) -> Self {
        self.max_render_passes = passes;
        self
    }

    #[must_use]
    pub fn with_max_array_len(mut self, len: usize) -> Self {
        self.max_array_len = len;
        self
    }

    #[must_use]
    pub fn with_max_string_len(mut self, len: usize) -> Self {
        self.max_string_len = len;
        self
    }
}

/// The isolation wrapper of one render session
///
/// Created once at mount and reused across hot-swaps.
#[derive(Debug)]
pub struct Boundary {
    screen_id: String,
    faults: u64,
}

impl Boundary {
    pub(crate) fn new(screen_id: &str) -> Self {
        Self {
            screen_id: screen_id.to_string(),
            faults: 0,
        }
    }

    /// Faults contained so far
    #[inline]
    #[must_use]
    pub fn faults(&self) -> u64 {
        self.faults
    }

    pub(crate) fn run<T>(
        &mut self,
        op: &'static str,
        f: impl FnOnce() -> EvalResult<T>,
    ) -> Result<T, ExecutionFault> {
        let result = match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(abrupt)) => Err(abrupt.into_fault()),
            Err(payload) => Err(ExecutionFault::Panic {
                message: panic_message(payload.as_ref()),
            }),
        };
        if let Err(fault) = &result {
            self.faults += 1;
            warn!(screen_id = %self.screen_id, op, fault = %fault, "fault contained");
        }
        result
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// A constructed, rendered component instance
pub(crate) struct Instance {
    interp: Interpreter,
    root: Value,
    props: Value,
    pub(crate) roots: Vec<VNode>,
    handlers: Vec<Value>,
}

impl Instance {
    fn construct(unit: &CompiledUnit, config: &SandboxConfig, props: &ExternalProps) -> EvalResult<Self> {
        let mut interp = Interpreter::new(config);
        let root = interp.run_program(unit.program(), capability_set())?;
        if let Value::Undefined | Value::Object(_) = root {
            return Err(Abrupt::Fault(ExecutionFault::NotRenderable(format!(
                "entry evaluated to {}",
                root.type_of()
            ))));
        }

        let mut merged = ObjectMap::new();
        merged.insert("onNavigate".to_string(), navigate());
        for (key, value) in props.iter() {
            merged.insert(key.to_string(), Value::from_json(value));
        }

        let mut instance = Self {
            interp,
            root,
            props: Value::object(merged),
            roots: Vec::new(),
            handlers: Vec::new(),
        };
        instance.render_cycle()?;
        Ok(instance)
    }

    /// Render until state settles, running effects after each commit
    fn render_cycle(&mut self) -> EvalResult<()> {
        let limit = self.interp.max_render_passes;
        for _ in 0..limit {
            let out = render_tree(&mut self.interp, &self.root, &self.props)?;
            let cleanups = self.interp.hooks.sweep();
            self.roots = out.roots;
            self.handlers = out.handlers;
            hooks::run_effects(&mut self.interp, cleanups)?;
            if !self.interp.hooks.take_dirty() {
                return Ok(());
            }
        }
        Err(Abrupt::Fault(ExecutionFault::RenderLoop { limit }))
    }

    fn handler(&self, id: HandlerId) -> Option<Value> {
        self.handlers.get(id.get() as usize).cloned()
    }

    fn dispatch(&mut self, handler: &Value, args: Vec<serde_json::Value>) -> EvalResult<()> {
        self.interp.refuel();
        let args = args.iter().map(Value::from_json).collect();
        self.interp.call(handler, args)?;
        if self.interp.hooks.take_dirty() {
            self.render_cycle()?;
        }
        Ok(())
    }

    pub(crate) fn take_navigations(&mut self) -> Vec<String> {
        std::mem::take(&mut self.interp.navigations)
    }

    fn teardown(mut self) -> Vec<Abrupt> {
        self.interp.refuel();
        hooks::teardown(&mut self.interp)
    }
}

/// Mounts compiled units into render sessions
#[derive(Debug, Clone, Copy, Default)]
pub struct SandboxExecutor {
    config: SandboxConfig,
}

impl SandboxExecutor {
    #[must_use]
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    fn construct(
        &self,
        session: &mut RenderSession,
        unit: &CompiledUnit,
        op: &'static str,
    ) -> Result<Instance, ExecutionFault> {
        let config = &self.config;
        let props = &session.props;
        session
            .boundary
            .run(op, || Instance::construct(unit, config, props))
    }

    fn retire(session: &mut RenderSession, instance: Instance) {
        let errors = session
            .boundary
            .run("teardown", || Ok(instance.teardown()))
            .unwrap_or_default();
        for error in errors {
            debug!(screen_id = %session.screen_id, fault = %error.into_fault(), "cleanup failed");
        }
    }

    /// Construct `unit` for a new session
    ///
    /// A construction fault yields a session that is in fallback from the
    /// start; it never holds a partially built instance.
    pub fn mount(
        &self,
        screen_id: impl Into<String>,
        unit: Arc<CompiledUnit>,
        props: ExternalProps,
    ) -> RenderSession {
        let mut session = RenderSession::new(screen_id, props);
        match self.construct(&mut session, &unit, "mount") {
            Ok(instance) => {
                info!(screen_id = %session.screen_id, unit = %unit.id().short(), "mounted");
                session.install(unit, instance);
            }
            Err(fault) => session.fall_back(Some(unit), fault),
        }
        session
    }

    /// Hot-swap a final unit into `session`
    ///
    /// # Errors
    /// Returns the construction fault; the session is then in fallback
    pub fn update(&self, session: &mut RenderSession, unit: Arc<CompiledUnit>) -> Result<(), ExecutionFault> {
        match self.construct(session, &unit, "update") {
            Ok(instance) => {
                if let Some(old) = session.install(Arc::clone(&unit), instance) {
                    Self::retire(session, old);
                }
                session.checkpoint_baseline = None;
                info!(screen_id = %session.screen_id, unit = %unit.id().short(), "updated");
                Ok(())
            }
            Err(fault) => {
                if let Some(old) = session.instance.take() {
                    Self::retire(session, old);
                }
                session.fall_back(Some(unit), fault.clone());
                Err(fault)
            }
        }
    }

    /// Swap in a checkpoint snapshot if it renders and keeps the last one's content
    ///
    /// # Errors
    /// Returns the fault or [`ExecutionFault::Regressed`]; the session is
    /// left exactly as it was
    pub fn update_checkpoint(
        &self,
        session: &mut RenderSession,
        unit: Arc<CompiledUnit>,
    ) -> Result<(), ExecutionFault> {
        let instance = self.construct(session, &unit, "checkpoint")?;
        if let Some(baseline) = &session.checkpoint_baseline {
            if !is_structural_superset_of(&instance.roots, baseline) {
                warn!(screen_id = %session.screen_id, unit = %unit.id().short(), "checkpoint render regressed, keeping last good");
                Self::retire(session, instance);
                return Err(ExecutionFault::Regressed);
            }
        }
        let baseline = instance.roots.clone();
        if let Some(old) = session.install(Arc::clone(&unit), instance) {
            Self::retire(session, old);
        }
        session.checkpoint_baseline = Some(baseline);
        debug!(screen_id = %session.screen_id, unit = %unit.id().short(), "checkpoint rendered");
        Ok(())
    }

    /// Put `session` into fallback for a failure outside the boundary,
    /// such as a final artifact that does not compile
    pub fn fail(&self, session: &mut RenderSession, reason: impl std::fmt::Display) {
        if let Some(old) = session.instance.take() {
            Self::retire(session, old);
        }
        session.fall_back_with(reason.to_string(), None);
    }

    /// Deliver a host event to handler `id` of the current render
    ///
    /// # Errors
    /// `NotMounted` and `UnknownHandler` leave the session untouched; a
    /// fault raised by the handler or the re-render flips it to fallback
    pub fn dispatch(
        &self,
        session: &mut RenderSession,
        id: HandlerId,
        args: Vec<serde_json::Value>,
    ) -> Result<(), ExecutionFault> {
        let Some(instance) = session.instance.as_mut() else {
            return Err(ExecutionFault::NotMounted);
        };
        let Some(handler) = instance.handler(id) else {
            return Err(ExecutionFault::UnknownHandler { id: id.get() });
        };
        match session
            .boundary
            .run("dispatch", || instance.dispatch(&handler, args))
        {
            Ok(()) => Ok(()),
            Err(fault) => {
                if let Some(old) = session.instance.take() {
                    Self::retire(session, old);
                }
                session.fall_back(None, fault.clone());
                Err(fault)
            }
        }
    }

    /// Tear down `session`, running outstanding effect cleanups
    pub fn unmount(&self, mut session: RenderSession) {
        if let Some(instance) = session.instance.take() {
            Self::retire(&mut session, instance);
        }
        info!(screen_id = %session.screen_id, faults = session.boundary.faults(), "unmounted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builders() {
        let config = SandboxConfig::default()
            .with_fuel(10)
            .with_max_depth(4)
            .with_max_render_passes(2)
            .with_max_array_len(8)
            .with_max_string_len(16);
        assert_eq!(config.fuel, 10);
        assert_eq!(config.max_array_len, 8);
        assert_eq!(config.max_string_len, 16);
        assert_eq!(config.max_depth, 4);
        assert_eq!(config.max_render_passes, 2);
    }

    #[test]
    fn config_fills_defaults_from_partial_input() {
        let config: SandboxConfig = serde_json::from_str(r#"{"fuel": 99}"#).unwrap();
        assert_eq!(config.fuel, 99);
        assert_eq!(config.max_depth, SandboxConfig::default().max_depth);
    }

    #[test]
    fn boundary_converts_panics() {
        let mut boundary = Boundary::new("s1");
        let result: Result<(), _> = boundary.run("test", || panic!("kaboom"));
        assert_eq!(
            result,
            Err(ExecutionFault::Panic {
                message: "kaboom".to_string()
            })
        );
        assert_eq!(boundary.faults(), 1);
    }

    #[test]
    fn boundary_passes_values_through() {
        let mut boundary = Boundary::new("s1");
        assert_eq!(boundary.run("test", || Ok(7)), Ok(7));
        assert_eq!(boundary.faults(), 0);
    }
}
