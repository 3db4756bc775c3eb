//! Render sessions
//!
//! A [`RenderSession`] is the live binding of one compiled unit to one
//! screen region. It owns the current instance, the fallback state and
//! the props the host injects.

use crate::compile::CompiledUnit;
use crate::error::ExecutionFault;
use crate::render::{AttrValue, ElementNode, VNode};
use crate::sandbox::{Boundary, Instance};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Host-supplied props, merged over the unit's own defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalProps {
    values: IndexMap<String, serde_json::Value>,
}

impl ExternalProps {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.values.insert(key.into(), value.into());
    }

    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Fixed placeholder shown while a session is in fallback
#[must_use]
pub fn fallback_view(summary: &str) -> Vec<VNode> {
    vec![VNode::Element(
        ElementNode::new("div")
            .with_attr("data-fallback", AttrValue::Str("true".to_string()))
            .with_child(VNode::Element(
                ElementNode::new("p").with_child(VNode::text(summary)),
            )),
    )]
}

/// One screen region and the unit rendered into it
pub struct RenderSession {
    pub(crate) screen_id: String,
    pub(crate) boundary: Boundary,
    pub(crate) instance: Option<Instance>,
    unit: Option<Arc<CompiledUnit>>,
    fault: Option<ExecutionFault>,
    fault_summary: Option<String>,
    pub(crate) props: ExternalProps,
    pub(crate) checkpoint_baseline: Option<Vec<VNode>>,
    placeholder: Vec<VNode>,
}

impl std::fmt::Debug for RenderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSession")
            .field("screen_id", &self.screen_id)
            .field("unit", &self.unit.as_ref().map(|u| u.id().short()))
            .field("mounted", &self.instance.is_some())
            .field("fault_summary", &self.fault_summary)
            .finish_non_exhaustive()
    }
}

impl RenderSession {
    /// An unbound session: nothing rendered, not in fallback
    #[must_use]
    pub fn new(screen_id: impl Into<String>, props: ExternalProps) -> Self {
        let screen_id = screen_id.into();
        Self {
            boundary: Boundary::new(&screen_id),
            screen_id,
            instance: None,
            unit: None,
            fault: None,
            fault_summary: None,
            props,
            checkpoint_baseline: None,
            placeholder: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn screen_id(&self) -> &str {
        &self.screen_id
    }

    #[inline]
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.fault_summary.is_some()
    }

    /// The execution fault behind the fallback, if it came from the sandbox
    #[inline]
    #[must_use]
    pub fn fault(&self) -> Option<&ExecutionFault> {
        self.fault.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn fault_summary(&self) -> Option<&str> {
        self.fault_summary.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.instance.is_some()
    }

    /// Live tree, or the placeholder while in fallback
    #[must_use]
    pub fn view(&self) -> &[VNode] {
        if self.is_fallback() {
            return &self.placeholder;
        }
        self.instance.as_ref().map_or(&[], |i| i.roots.as_slice())
    }

    /// The unit last bound to this session
    #[inline]
    #[must_use]
    pub fn unit(&self) -> Option<&Arc<CompiledUnit>> {
        self.unit.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn props(&self) -> &ExternalProps {
        &self.props
    }

    #[inline]
    #[must_use]
    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    /// Navigation requests made by the generated code since the last call
    pub fn take_navigations(&mut self) -> Vec<String> {
        self.instance
            .as_mut()
            .map(Instance::take_navigations)
            .unwrap_or_default()
    }

    /// Bind a freshly constructed instance and clear any fallback
    pub(crate) fn install(&mut self, unit: Arc<CompiledUnit>, instance: Instance) -> Option<Instance> {
        self.unit = Some(unit);
        self.fault = None;
        self.fault_summary = None;
        self.placeholder.clear();
        self.instance.replace(instance)
    }

    pub(crate) fn fall_back(&mut self, unit: Option<Arc<CompiledUnit>>, fault: ExecutionFault) {
        if unit.is_some() {
            self.unit = unit;
        }
        let summary = fault.summary();
        self.fall_back_with(summary, Some(fault));
    }

    pub(crate) fn fall_back_with(&mut self, summary: String, fault: Option<ExecutionFault>) {
        let summary = if summary.trim().is_empty() {
            "render failed".to_string()
        } else {
            summary
        };
        self.placeholder = fallback_view(&summary);
        self.fault_summary = Some(summary);
        self.fault = fault;
        self.checkpoint_baseline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_unbound() {
        let session = RenderSession::new("home", ExternalProps::new());
        assert_eq!(session.screen_id(), "home");
        assert!(!session.is_fallback());
        assert!(!session.is_mounted());
        assert!(session.view().is_empty());
    }

    #[test]
    fn fallback_shows_placeholder_with_summary() {
        let mut session = RenderSession::new("home", ExternalProps::new());
        session.fall_back(
            None,
            ExecutionFault::Thrown {
                message: "Error: boom".to_string(),
            },
        );
        assert!(session.is_fallback());
        assert_eq!(session.fault_summary(), Some("uncaught Error: boom"));
        let view = session.view();
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].text_content(), "uncaught Error: boom");
        let root = view[0].as_element().unwrap();
        assert_eq!(root.attr("data-fallback").and_then(AttrValue::as_str), Some("true"));
    }

    #[test]
    fn props_builder() {
        let props = ExternalProps::new().with("title", "Hi").with("count", 3);
        assert_eq!(props.get("title"), Some(&serde_json::json!("Hi")));
        assert_eq!(props.iter().count(), 2);
        let json = serde_json::to_string(&props).unwrap();
        assert_eq!(json, r#"{"title":"Hi","count":3}"#);
    }
}
