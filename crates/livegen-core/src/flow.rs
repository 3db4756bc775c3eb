//! Flow renderer
//!
//! Owns the map from screen id to [`RenderSession`] and routes job events
//! into it:
//!
//! - `checkpoint` fragments go through the screen's [`CheckpointParser`];
//!   each ready snapshot is compiled and offered to
//!   [`SandboxExecutor::update_checkpoint`]. Failures are logged and the
//!   screen keeps its last good render. A streaming screen has no session
//!   until one of its checkpoints renders.
//! - `unitReady` text has its markers stripped, then is sanitized, compiled
//!   and mounted (or hot-swapped). Failures put the screen in fallback.
//! - `unitError` puts the screen in fallback with the server's reason.
//!
//! Nothing here runs concurrently: every method takes `&mut self` and
//! completes synchronously.

use crate::config::LivegenConfig;
use indexmap::IndexMap;
use livegen_runtime::{
    CompiledUnit, Compiler, ExecutionFault, ExternalProps, HandlerId, RenderSession,
    SandboxExecutor, VNode,
};
use livegen_source::{strip_markers, CheckpointOutcome, CheckpointParser, Markers, Sanitizer};
use livegen_transport::ServerEvent;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What one event did to the screens
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FlowUpdate {
    Progress {
        stage: String,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    CheckpointRendered { screen_id: String, seq: u64 },
    /// Snapshot that failed to compile, render or keep earlier content
    #[serde(rename_all = "camelCase")]
    CheckpointSkipped {
        screen_id: String,
        seq: u64,
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    UnitMounted { screen_id: String },
    #[serde(rename_all = "camelCase")]
    UnitFailed { screen_id: String, summary: String },
    Completed {
        result: serde_json::Value,
    },
    Failed {
        reason: String,
    },
}

struct Screen {
    /// Absent while a stream has not rendered a checkpoint yet
    session: Option<RenderSession>,
    /// Parser for the generation currently streaming in
    stream: Option<CheckpointParser>,
}

impl Screen {
    const fn empty() -> Self {
        Self {
            session: None,
            stream: None,
        }
    }
}

pub struct FlowRenderer {
    sanitizer: Sanitizer,
    compiler: Compiler,
    executor: SandboxExecutor,
    markers: Markers,
    checkpoints: bool,
    props: ExternalProps,
    screens: IndexMap<String, Screen>,
}

impl std::fmt::Debug for FlowRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowRenderer")
            .field("screens", &self.screens.keys().collect::<Vec<_>>())
            .field("checkpoints", &self.checkpoints)
            .finish_non_exhaustive()
    }
}

impl Default for FlowRenderer {
    fn default() -> Self {
        Self::new(&LivegenConfig::default())
    }
}

impl FlowRenderer {
    #[must_use]
    pub fn new(config: &LivegenConfig) -> Self {
        Self {
            sanitizer: Sanitizer::new(config.sanitizer.clone()),
            compiler: Compiler::new(config.compiler),
            executor: SandboxExecutor::new(config.sandbox),
            markers: config.checkpoint.markers(),
            checkpoints: config.checkpoint.enabled,
            props: ExternalProps::new(),
            screens: IndexMap::new(),
        }
    }

    /// Host props injected into every session created from now on
    #[must_use]
    pub fn with_props(mut self, props: ExternalProps) -> Self {
        self.props = props;
        self
    }

    #[inline]
    #[must_use]
    pub fn executor(&self) -> &SandboxExecutor {
        &self.executor
    }

    #[must_use]
    pub fn session(&self, screen_id: &str) -> Option<&RenderSession> {
        self.screens.get(screen_id).and_then(|s| s.session.as_ref())
    }

    pub fn session_mut(&mut self, screen_id: &str) -> Option<&mut RenderSession> {
        self.screens
            .get_mut(screen_id)
            .and_then(|s| s.session.as_mut())
    }

    /// Sessions in the order their screens first appeared
    pub fn sessions(&self) -> impl Iterator<Item = &RenderSession> {
        self.screens.values().filter_map(|s| s.session.as_ref())
    }

    /// Current view of a screen; empty for unknown screens
    #[must_use]
    pub fn view(&self, screen_id: &str) -> &[VNode] {
        self.session(screen_id).map_or(&[][..], RenderSession::view)
    }

    /// Apply one job event
    pub fn apply(&mut self, event: &ServerEvent) -> Vec<FlowUpdate> {
        match event {
            ServerEvent::Progress { stage, message } => {
                info!(%stage, %message, "progress");
                vec![FlowUpdate::Progress {
                    stage: stage.clone(),
                    message: message.clone(),
                }]
            }
            ServerEvent::Checkpoint {
                screen_id, text, ..
            } => self.push_fragment(screen_id, text),
            ServerEvent::UnitReady {
                screen_id, text, ..
            } => vec![self.render_final(screen_id, text)],
            ServerEvent::UnitError { screen_id, error } => {
                vec![self.fail_screen(screen_id, error)]
            }
            ServerEvent::Complete { result } => vec![FlowUpdate::Completed {
                result: result.clone(),
            }],
            ServerEvent::Error { reason } => {
                warn!(%reason, "job failed, screens keep their last state");
                vec![FlowUpdate::Failed {
                    reason: reason.clone(),
                }]
            }
        }
    }

    /// Append a streamed fragment and render every checkpoint it completes
    pub fn push_fragment(&mut self, screen_id: &str, fragment: &str) -> Vec<FlowUpdate> {
        if !self.checkpoints {
            debug!(screen_id, "checkpoints disabled, fragment ignored");
            return Vec::new();
        }
        let (markers, sanitizer) = (&self.markers, &self.sanitizer);
        let screen = self
            .screens
            .entry(screen_id.to_string())
            .or_insert_with(Screen::empty);
        let parser = screen
            .stream
            .get_or_insert_with(|| CheckpointParser::with_sanitizer(markers.clone(), sanitizer.clone()));
        let outcomes = parser.push(fragment);

        let mut updates = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            let seq = outcome.seq();
            let rendered = match outcome {
                CheckpointOutcome::Ready(cp) => self
                    .compiler
                    .compile(cp.snapshot())
                    .map_err(|e| e.to_string())
                    .and_then(|unit| {
                        Self::render_checkpoint(
                            &self.executor,
                            &mut screen.session,
                            || RenderSession::new(screen_id, self.props.clone()),
                            unit,
                        )
                        .map_err(|e| e.summary())
                    }),
                CheckpointOutcome::Rejected { reason, .. } => Err(reason.to_string()),
            };
            match rendered {
                Ok(()) => updates.push(FlowUpdate::CheckpointRendered {
                    screen_id: screen_id.to_string(),
                    seq,
                }),
                Err(reason) => {
                    debug!(screen_id, seq, %reason, "checkpoint skipped");
                    updates.push(FlowUpdate::CheckpointSkipped {
                        screen_id: screen_id.to_string(),
                        seq,
                        reason,
                    });
                }
            }
        }
        updates
    }

    /// Render the final text of a screen
    ///
    /// Ends the screen's stream. Any remaining markers are stripped first.
    pub fn render_final(&mut self, screen_id: &str, text: &str) -> FlowUpdate {
        let text = strip_markers(text, &self.markers);
        let compiled = self
            .sanitizer
            .sanitize(&text)
            .map_err(|e| e.to_string())
            .and_then(|clean| self.compiler.compile(&clean).map_err(|e| e.to_string()));

        let Some(session) = self
            .screens
            .get_mut(screen_id)
            .and_then(|s| s.session.as_mut())
        else {
            let session = match compiled {
                Ok(unit) => self.executor.mount(screen_id, unit, self.props.clone()),
                Err(reason) => {
                    let mut session = RenderSession::new(screen_id, self.props.clone());
                    self.executor.fail(&mut session, &reason);
                    session
                }
            };
            let update = Self::outcome(&session);
            let screen = self
                .screens
                .entry(screen_id.to_string())
                .or_insert_with(Screen::empty);
            Self::finish_stream(screen_id, screen);
            screen.session = Some(session);
            return update;
        };

        match compiled {
            Ok(unit) => {
                // The fault is recorded on the session
                let _ = self.executor.update(session, unit);
            }
            Err(reason) => self.executor.fail(session, reason),
        }
        let update = Self::outcome(session);
        if let Some(screen) = self.screens.get_mut(screen_id) {
            Self::finish_stream(screen_id, screen);
        }
        update
    }

    fn finish_stream(screen_id: &str, screen: &mut Screen) {
        if let Some(parser) = screen.stream.take() {
            let emitted = parser.emitted();
            let streamed = parser.finish();
            debug!(
                screen_id,
                checkpoints = emitted,
                version = ?streamed.version().map(|v| v.short()),
                "stream finalized"
            );
        }
    }

    /// Show `reason` as the screen's fallback
    pub fn fail_screen(&mut self, screen_id: &str, reason: &str) -> FlowUpdate {
        let props = &self.props;
        let screen = self
            .screens
            .entry(screen_id.to_string())
            .or_insert_with(Screen::empty);
        screen.stream = None;
        warn!(screen_id, %reason, "unit failed");
        let session = screen
            .session
            .get_or_insert_with(|| RenderSession::new(screen_id, props.clone()));
        self.executor.fail(session, reason);
        Self::outcome(session)
    }

    /// Deliver a host event to a screen's handler
    ///
    /// # Errors
    /// `NotMounted` for an unknown screen, otherwise as
    /// [`SandboxExecutor::dispatch`]
    pub fn dispatch(
        &mut self,
        screen_id: &str,
        handler: HandlerId,
        args: Vec<serde_json::Value>,
    ) -> Result<(), ExecutionFault> {
        let session = self
            .screens
            .get_mut(screen_id)
            .and_then(|s| s.session.as_mut())
            .ok_or(ExecutionFault::NotMounted)?;
        self.executor.dispatch(session, handler, args)
    }

    /// Navigation requests raised by a screen since the last call
    pub fn take_navigations(&mut self, screen_id: &str) -> Vec<String> {
        self.session_mut(screen_id)
            .map(RenderSession::take_navigations)
            .unwrap_or_default()
    }

    /// Tear a screen down; false if it was not known
    pub fn unmount(&mut self, screen_id: &str) -> bool {
        match self.screens.shift_remove(screen_id) {
            Some(screen) => {
                if let Some(session) = screen.session {
                    self.executor.unmount(session);
                }
                true
            }
            None => false,
        }
    }

    /// The first checkpoint that renders creates the session
    fn render_checkpoint(
        executor: &SandboxExecutor,
        slot: &mut Option<RenderSession>,
        fresh: impl FnOnce() -> RenderSession,
        unit: Arc<CompiledUnit>,
    ) -> Result<(), ExecutionFault> {
        if let Some(session) = slot {
            return executor.update_checkpoint(session, unit);
        }
        let mut session = fresh();
        executor.update_checkpoint(&mut session, unit)?;
        *slot = Some(session);
        Ok(())
    }

    fn outcome(session: &RenderSession) -> FlowUpdate {
        let screen_id = session.screen_id().to_string();
        match session.fault_summary() {
            Some(summary) => FlowUpdate::UnitFailed {
                screen_id,
                summary: summary.to_string(),
            },
            None => FlowUpdate::UnitMounted { screen_id },
        }
    }
}

impl Drop for FlowRenderer {
    fn drop(&mut self) {
        for session in self.screens.drain(..).filter_map(|(_, s)| s.session) {
            self.executor.unmount(session);
        }
    }
}
