//! Host-neutral render output
//!
//! A render expands the element values produced by generated code into a
//! tree of [`VNode`]s. Function-valued attributes are replaced by
//! [`HandlerId`]s that the host passes back through
//! [`SandboxExecutor::dispatch`](crate::SandboxExecutor::dispatch).

use crate::eval::{type_error, Abrupt, Interpreter};
use crate::error::ExecutionFault;
use crate::intrinsics::{children_value, own_keys};
use crate::value::{json_number, ElementKind, EvalResult, ObjectMap, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// Nesting limit for expanded trees
const MAX_TREE_DEPTH: usize = 256;

/// Index of an event handler in the current render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerId(u32);

impl HandlerId {
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An attribute on a rendered element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Handler { handler: HandlerId },
    Bool(bool),
    #[serde(serialize_with = "serialize_num")]
    Num(f64),
    Str(String),
    /// Objects and arrays, such as `style`
    Json(serde_json::Value),
}

fn serialize_num<S: serde::Serializer>(n: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    json_number(*n).serialize(serializer)
}

impl AttrValue {
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn handler(&self) -> Option<HandlerId> {
        match self {
            Self::Handler { handler } => Some(*handler),
            _ => None,
        }
    }
}

/// A host element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    pub tag: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attrs: IndexMap<String, AttrValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<VNode>,
}

impl ElementNode {
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: IndexMap::new(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: AttrValue) -> Self {
        self.attrs.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: VNode) -> Self {
        self.children.push(child);
        self
    }

    #[inline]
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }

    /// Handler bound to an event attribute such as `onClick`
    #[inline]
    #[must_use]
    pub fn handler(&self, event: &str) -> Option<HandlerId> {
        self.attr(event).and_then(AttrValue::handler)
    }
}

/// One node of a rendered tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VNode {
    Text(String),
    Element(ElementNode),
}

impl VNode {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    #[inline]
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::Element(el) => Some(&el.tag),
            Self::Text(_) => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            Self::Element(el) => Some(el),
            Self::Text(_) => None,
        }
    }

    /// Concatenated text of this node and its descendants
    #[must_use]
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Self::Text(t) => out.push_str(t),
            Self::Element(el) => el.children.iter().for_each(|c| c.collect_text(out)),
        }
    }

    /// First element with `tag`, depth first
    #[must_use]
    pub fn find(&self, tag: &str) -> Option<&ElementNode> {
        match self {
            Self::Text(_) => None,
            Self::Element(el) if el.tag == tag => Some(el),
            Self::Element(el) => el.children.iter().find_map(|c| c.find(tag)),
        }
    }

    /// Every element with `tag`, depth first
    #[must_use]
    pub fn find_all<'a>(&'a self, tag: &str) -> Vec<&'a ElementNode> {
        let mut out = Vec::new();
        self.collect_tag(tag, &mut out);
        out
    }

    fn collect_tag<'a>(&'a self, tag: &str, out: &mut Vec<&'a ElementNode>) {
        if let Self::Element(el) = self {
            if el.tag == tag {
                out.push(el);
            }
            el.children.iter().for_each(|c| c.collect_tag(tag, out));
        }
    }
}

/// Text of a whole forest
#[must_use]
pub fn text_of(nodes: &[VNode]) -> String {
    nodes.iter().map(VNode::text_content).collect()
}

/// Find the first element with `tag` in a forest
#[must_use]
pub fn find_in<'a>(nodes: &'a [VNode], tag: &str) -> Option<&'a ElementNode> {
    nodes.iter().find_map(|n| n.find(tag))
}

/// Whether `new` keeps every node of `old`, in order
///
/// Matching is an ordered subsequence: each old node must be matched by a
/// later new node with the same tag whose children are in turn a superset.
/// Text matches when the new text extends the old one.
#[must_use]
pub fn is_structural_superset_of(new: &[VNode], old: &[VNode]) -> bool {
    let mut candidates = new.iter();
    old.iter()
        .all(|wanted| candidates.by_ref().any(|node| node_covers(node, wanted)))
}

fn node_covers(new: &VNode, old: &VNode) -> bool {
    match (new, old) {
        (VNode::Text(n), VNode::Text(o)) => n.starts_with(o.as_str()),
        (VNode::Element(n), VNode::Element(o)) => {
            n.tag == o.tag && is_structural_superset_of(&n.children, &o.children)
        }
        _ => false,
    }
}

/// A finished render
pub(crate) struct RenderOutput {
    pub(crate) roots: Vec<VNode>,
    pub(crate) handlers: Vec<Value>,
}

/// Expand `root` with `props`, calling components as they are reached
pub(crate) fn render_tree(interp: &mut Interpreter, root: &Value, props: &Value) -> EvalResult<RenderOutput> {
    interp.hooks.begin_pass();
    let mut renderer = Renderer {
        interp,
        handlers: Vec::new(),
        nesting: 0,
    };
    let mut roots = Vec::new();
    match root {
        Value::Func(f) => renderer.component(f, props_object(props), "root", &mut roots)?,
        other => renderer.expand(other, "root", &mut roots)?,
    }
    Ok(RenderOutput {
        roots,
        handlers: renderer.handlers,
    })
}

fn props_object(props: &Value) -> ObjectMap {
    match props {
        Value::Object(map) => map.borrow().clone(),
        _ => ObjectMap::new(),
    }
}

struct Renderer<'i> {
    interp: &'i mut Interpreter,
    handlers: Vec<Value>,
    nesting: usize,
}

fn push_text(out: &mut Vec<VNode>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(VNode::Text(last)) = out.last_mut() {
        last.push_str(text);
    } else {
        out.push(VNode::text(text));
    }
}

impl Renderer<'_> {
    fn expand(&mut self, value: &Value, path: &str, out: &mut Vec<VNode>) -> EvalResult<()> {
        self.interp.tick()?;
        match value {
            Value::Undefined | Value::Null | Value::Bool(_) | Value::Func(_) => Ok(()),
            Value::Str(s) => {
                self.interp.alloc_string(s.len())?;
                push_text(out, s);
                Ok(())
            }
            Value::Num(_) => {
                push_text(out, &value.to_display());
                Ok(())
            }
            Value::Array(items) => {
                self.nesting += 1;
                if self.nesting > MAX_TREE_DEPTH {
                    return Err(Abrupt::Fault(ExecutionFault::Depth {
                        limit: MAX_TREE_DEPTH,
                    }));
                }
                let items = items.borrow().clone();
                let result = self.expand_list(&items, path, out);
                self.nesting -= 1;
                result
            }
            Value::Object(_) => Err(type_error(format!(
                "Objects are not valid as a React child (found: object with keys {{{}}})",
                own_keys(value).join(", ")
            ))),
            Value::Element(el) => {
                self.nesting += 1;
                if self.nesting > MAX_TREE_DEPTH {
                    return Err(Abrupt::Fault(ExecutionFault::Depth {
                        limit: MAX_TREE_DEPTH,
                    }));
                }
                let result = match &el.kind {
                    ElementKind::Fragment => self.expand_list(&el.children, path, out),
                    ElementKind::Host(tag) => self.host(tag, &el.props, &el.children, path, out),
                    ElementKind::Component(f) => {
                        let mut props = el.props.clone();
                        if !el.children.is_empty() {
                            props.insert("children".to_string(), children_value(&el.children));
                        }
                        self.component(f, props, path, out)
                    }
                };
                self.nesting -= 1;
                result
            }
        }
    }

    fn expand_list(&mut self, items: &[Value], path: &str, out: &mut Vec<VNode>) -> EvalResult<()> {
        for (i, item) in items.iter().enumerate() {
            let segment = match item {
                Value::Element(el) => el
                    .key
                    .as_ref()
                    .map_or_else(|| i.to_string(), |k| format!("k:{k}")),
                _ => i.to_string(),
            };
            self.expand(item, &format!("{path}.{segment}"), out)?;
        }
        Ok(())
    }

    fn component(
        &mut self,
        func: &Rc<crate::value::Function>,
        mut props: ObjectMap,
        path: &str,
        out: &mut Vec<VNode>,
    ) -> EvalResult<()> {
        if let Some(Value::Object(defaults)) = func.props.borrow().get("defaultProps") {
            for (k, v) in defaults.borrow().iter() {
                let missing = props.get(k).map_or(true, |v| matches!(v, Value::Undefined));
                if missing {
                    props.insert(k.clone(), v.clone());
                }
            }
        }
        let key = format!("{path}<{}>", func.name());
        self.interp.hooks.enter(&key);
        let rendered = self.interp.call_function(func, vec![Value::object(props)]);
        let left = self.interp.hooks.leave();
        let rendered = rendered?;
        left?;
        self.expand(&rendered, &key, out)
    }

    fn host(
        &mut self,
        tag: &str,
        props: &ObjectMap,
        children: &[Value],
        path: &str,
        out: &mut Vec<VNode>,
    ) -> EvalResult<()> {
        let mut node = ElementNode::new(tag);
        for (name, value) in props {
            if name == "children" {
                continue;
            }
            let attr = match value {
                Value::Undefined | Value::Null | Value::Element(_) => continue,
                Value::Bool(b) => AttrValue::Bool(*b),
                Value::Num(n) => AttrValue::Num(*n),
                Value::Str(s) => AttrValue::Str(s.to_string()),
                Value::Func(_) => {
                    let id = HandlerId::new(self.handlers.len() as u32);
                    self.handlers.push(value.clone());
                    AttrValue::Handler { handler: id }
                }
                Value::Array(_) | Value::Object(_) => {
                    let (json, cost) = value.to_json_metered();
                    self.interp.charge(cost)?;
                    match json {
                        Some(json) => AttrValue::Json(json),
                        None => continue,
                    }
                }
            };
            node.attrs.insert(name.clone(), attr);
        }

        let path = format!("{path}/{tag}");
        if children.is_empty() {
            if let Some(inner) = props.get("children") {
                let inner = inner.clone();
                match &inner {
                    Value::Array(items) => {
                        let items = items.borrow().clone();
                        self.expand_list(&items, &path, &mut node.children)?;
                    }
                    other => self.expand(other, &format!("{path}.0"), &mut node.children)?,
                }
            }
        } else {
            self.expand_list(children, &path, &mut node.children)?;
        }
        out.push(VNode::Element(node));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn el(tag: &str, children: Vec<VNode>) -> VNode {
        VNode::Element(ElementNode {
            tag: tag.to_string(),
            attrs: IndexMap::new(),
            children,
        })
    }

    #[test]
    fn superset_accepts_appended_content() {
        let old = vec![el("ul", vec![el("li", vec![VNode::text("a")])])];
        let new = vec![el(
            "ul",
            vec![
                el("li", vec![VNode::text("a")]),
                el("li", vec![VNode::text("b")]),
            ],
        )];
        assert!(is_structural_superset_of(&new, &old));
        assert!(!is_structural_superset_of(&old, &new));
    }

    #[test]
    fn superset_rejects_changed_tags() {
        let old = vec![el("div", vec![el("p", vec![])])];
        let new = vec![el("div", vec![el("span", vec![])])];
        assert!(!is_structural_superset_of(&new, &old));
    }

    #[test]
    fn superset_accepts_extended_text() {
        let old = vec![el("p", vec![VNode::text("Hel")])];
        let new = vec![el("p", vec![VNode::text("Hello")])];
        assert!(is_structural_superset_of(&new, &old));
        assert!(is_structural_superset_of(&new, &[]));
    }

    #[test]
    fn vnode_serializes_compactly() {
        let node = VNode::Element(
            ElementNode::new("button")
                .with_attr("onClick", AttrValue::Handler { handler: HandlerId::new(0) })
                .with_attr("disabled", AttrValue::Bool(false))
                .with_attr("tabIndex", AttrValue::Num(2.0))
                .with_child(VNode::text("Go")),
        );
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(
            serde_json::to_string(&json["attrs"]["tabIndex"]).unwrap(),
            "2"
        );
        assert_eq!(
            json,
            serde_json::json!({
                "tag": "button",
                "attrs": { "onClick": { "handler": 0 }, "disabled": false, "tabIndex": 2 },
                "children": ["Go"]
            })
        );
        let back: VNode = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn queries() {
        let tree = el(
            "div",
            vec![
                el("p", vec![VNode::text("one")]),
                el("p", vec![VNode::text("two")]),
            ],
        );
        assert_eq!(tree.text_content(), "onetwo");
        assert_eq!(tree.find_all("p").len(), 2);
        assert_eq!(tree.find("p").map(|p| p.children.len()), Some(1));
    }
}
