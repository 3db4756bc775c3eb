//! The capability set injected into every compiled factory
//!
//! Generated code receives these as factory parameters, in this order.
//! They are the only names it can reach besides the language intrinsics.

use crate::eval::{make_element, type_error, Interpreter};
use crate::hooks;
use crate::intrinsics::get_member;
use crate::value::{ElementKind, ObjectMap, Value};
use std::rc::Rc;

/// Parameter names of the factory, in injection order
pub const CAPABILITIES: [&str; 7] = [
    "useState",
    "useEffect",
    "useMemo",
    "useRef",
    "useCallback",
    "navigate",
    "React",
];

/// Record a navigation request from generated code
pub(crate) fn navigate() -> Value {
    Value::native("navigate", |interp: &mut Interpreter, args: Vec<Value>| {
        let target = args.first().cloned().unwrap_or_default();
        if target.is_nullish() {
            return Err(type_error("navigate requires a transition id"));
        }
        let transition = target.to_display();
        tracing::info!(transition = %transition, "navigation requested");
        interp.navigations.push(transition);
        Ok(Value::Undefined)
    })
}

/// Build the ordered capability list for one instance
pub(crate) fn capability_set() -> Vec<(&'static str, Value)> {
    let use_state = Value::native("useState", hooks::use_state);
    let use_effect = Value::native("useEffect", hooks::use_effect);
    let use_memo = Value::native("useMemo", hooks::use_memo);
    let use_ref = Value::native("useRef", hooks::use_ref);
    let use_callback = Value::native("useCallback", hooks::use_callback);
    let navigate = navigate();

    let fragment = Value::native("Fragment", |_, args| {
        let props = args.first().cloned().unwrap_or_default();
        if props.is_nullish() {
            return Ok(Value::Undefined);
        }
        get_member(&props, "children")
    });
    let fragment_fn = match &fragment {
        Value::Func(f) => Some(Rc::clone(f)),
        _ => None,
    };

    let create_element = Value::native("createElement", move |_, args| {
        let mut args = args.into_iter();
        let kind = match args.next().unwrap_or_default() {
            Value::Str(tag) => ElementKind::Host(tag),
            Value::Func(f) if fragment_fn.as_ref().is_some_and(|frag| Rc::ptr_eq(frag, &f)) => {
                ElementKind::Fragment
            }
            Value::Func(f) => ElementKind::Component(f),
            other => {
                return Err(type_error(format!(
                    "React.createElement: type is invalid, got {}",
                    other.type_of()
                )))
            }
        };
        let mut props = match args.next().unwrap_or_default() {
            Value::Object(map) => map.borrow().clone(),
            _ => ObjectMap::new(),
        };
        let mut children: Vec<Value> = args.collect();
        if children.is_empty() {
            if let Some(inner) = props.shift_remove("children") {
                children = match inner {
                    Value::Array(items) => items.borrow().clone(),
                    single => vec![single],
                };
            }
        } else {
            props.shift_remove("children");
        }
        Ok(make_element(kind, props, children))
    });

    let memo = Value::native("memo", |_, args| Ok(args.first().cloned().unwrap_or_default()));
    let children = Value::native("toArray", |_, args| {
        Ok(match args.first().cloned().unwrap_or_default() {
            v @ Value::Array(_) => v,
            v if v.is_nullish() => Value::array(Vec::new()),
            v => Value::array(vec![v]),
        })
    });
    let mut children_ns = ObjectMap::new();
    children_ns.insert("toArray".to_string(), children);

    let mut react = ObjectMap::new();
    for (name, value) in [
        ("useState", &use_state),
        ("useEffect", &use_effect),
        ("useMemo", &use_memo),
        ("useRef", &use_ref),
        ("useCallback", &use_callback),
        ("createElement", &create_element),
        ("Fragment", &fragment),
        ("memo", &memo),
    ] {
        react.insert(name.to_string(), value.clone());
    }
    react.insert("Children".to_string(), Value::object(children_ns));

    vec![
        ("useState", use_state),
        ("useEffect", use_effect),
        ("useMemo", use_memo),
        ("useRef", use_ref),
        ("useCallback", use_callback),
        ("navigate", navigate),
        ("React", Value::object(react)),
    ]
}
