//! Evaluator values
//!
//! Values are reference counted and single-threaded. They never leave the
//! render session that created them; the host sees only [`VNode`] trees
//! and JSON.
//!
//! [`VNode`]: crate::VNode

use crate::eval::{Abrupt, Interpreter, Scope};
use crate::ir::FuncDef;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

pub(crate) type EvalResult<T = Value> = Result<T, Abrupt>;

pub(crate) type NativeFn = dyn Fn(&mut Interpreter, Vec<Value>) -> EvalResult;

pub(crate) type ObjectMap = IndexMap<String, Value>;

/// Deepest value nesting walked by display, JSON and flattening
pub(crate) const MAX_NESTING: usize = 64;

/// Upper bound on display text built outside a string-limited context
const DISPLAY_CAP: usize = 1 << 24;

/// JSON conversion work allowed per value, in nodes plus string bytes
const MAX_JSON_UNITS: usize = 1 << 24;

#[derive(Clone, Default)]
pub(crate) enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(Rc<str>),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<ObjectMap>>),
    Func(Rc<Function>),
    Element(Rc<Element>),
}

pub(crate) struct Function {
    pub(crate) kind: FunctionKind,
    /// Static properties such as `defaultProps`
    pub(crate) props: RefCell<ObjectMap>,
}

pub(crate) enum FunctionKind {
    Closure { def: Arc<FuncDef>, scope: Scope },
    Native { name: Rc<str>, call: Rc<NativeFn> },
}

impl Function {
    pub(crate) fn name(&self) -> &str {
        match &self.kind {
            FunctionKind::Closure { def, .. } => def.name.as_deref().unwrap_or("anonymous"),
            FunctionKind::Native { name, .. } => name,
        }
    }
}

/// A created element, before expansion into host nodes
pub(crate) struct Element {
    pub(crate) kind: ElementKind,
    pub(crate) props: ObjectMap,
    pub(crate) children: Vec<Value>,
    pub(crate) key: Option<String>,
}

pub(crate) enum ElementKind {
    Host(Rc<str>),
    Component(Rc<Function>),
    Fragment,
}

impl Value {
    pub(crate) fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub(crate) fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub(crate) fn object(map: ObjectMap) -> Self {
        Value::Object(Rc::new(RefCell::new(map)))
    }

    pub(crate) fn native(
        name: &str,
        call: impl Fn(&mut Interpreter, Vec<Value>) -> EvalResult + 'static,
    ) -> Self {
        Value::Func(Rc::new(Function {
            kind: FunctionKind::Native {
                name: Rc::from(name),
                call: Rc::new(call),
            },
            props: RefCell::new(ObjectMap::new()),
        }))
    }

    pub(crate) fn closure(def: Arc<FuncDef>, scope: Scope) -> Self {
        Value::Func(Rc::new(Function {
            kind: FunctionKind::Closure { def, scope },
            props: RefCell::new(ObjectMap::new()),
        }))
    }

    #[inline]
    pub(crate) fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    #[inline]
    pub(crate) fn is_callable(&self) -> bool {
        matches!(self, Value::Func(_))
    }

    pub(crate) fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub(crate) fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::Func(_) => "function",
            Value::Null | Value::Array(_) | Value::Object(_) | Value::Element(_) => "object",
        }
    }

    pub(crate) fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Num(n) => *n,
            Value::Str(s) => {
                let t = s.trim();
                if t.is_empty() {
                    0.0
                } else {
                    crate::lower::parse_number(t)
                }
            }
            Value::Array(items) => {
                let items = items.borrow();
                match items.as_slice() {
                    [] => 0.0,
                    [single] => single.to_number(),
                    _ => f64::NAN,
                }
            }
            _ => f64::NAN,
        }
    }

    /// JS `ToString`
    ///
    /// Cyclic entries display as empty, as in `Array.prototype.join`; the
    /// text stops growing at `DISPLAY_CAP` bytes.
    pub(crate) fn to_display(&self) -> String {
        let mut out = String::new();
        self.write_display(&mut out, DISPLAY_CAP, &mut Vec::new());
        out
    }

    /// `to_display`, or `None` when the text is longer than `limit` bytes
    pub(crate) fn display_within(&self, limit: usize) -> Option<String> {
        let mut out = String::new();
        self.write_display(&mut out, limit, &mut Vec::new()).then_some(out)
    }

    /// Append the display text; false once `out` would pass `limit`
    fn write_display(
        &self,
        out: &mut String,
        limit: usize,
        open: &mut Vec<Rc<RefCell<Vec<Value>>>>,
    ) -> bool {
        match self {
            Value::Array(items) => {
                if open.len() >= MAX_NESTING || open.iter().any(|o| Rc::ptr_eq(o, items)) {
                    return true;
                }
                open.push(Rc::clone(items));
                let fits = items.borrow().iter().enumerate().all(|(i, item)| {
                    if i > 0 {
                        out.push(',');
                    }
                    (item.is_nullish() || item.write_display(out, limit, open))
                        && out.len() <= limit
                });
                open.pop();
                fits
            }
            Value::Str(s) => {
                if out.len() + s.len() > limit {
                    return false;
                }
                out.push_str(s);
                true
            }
            scalar => {
                out.push_str(&match scalar {
                    Value::Undefined => "undefined".to_string(),
                    Value::Null => "null".to_string(),
                    Value::Bool(b) => b.to_string(),
                    Value::Num(n) => number_to_string(*n),
                    Value::Func(f) => format!("function {}() {{ [code] }}", f.name()),
                    _ => "[object Object]".to_string(),
                });
                out.len() <= limit
            }
        }
    }

    /// Property key form of a computed member
    pub(crate) fn to_key(&self) -> String {
        self.to_display()
    }

    pub(crate) fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Func(a), Value::Func(b)) => Rc::ptr_eq(a, b),
            (Value::Element(a), Value::Element(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `Object.is` semantics: like `===` but `NaN` equals itself
    pub(crate) fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Num(a), Value::Num(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_equals(other),
        }
    }

    pub(crate) fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Num(_), Value::Str(_))
            | (Value::Str(_), Value::Num(_))
            | (Value::Bool(_), _)
            | (_, Value::Bool(_)) => self.to_number() == other.to_number(),
            (Value::Array(_) | Value::Object(_), Value::Str(_) | Value::Num(_)) => {
                Value::str(self.to_display()).loose_equals(other)
            }
            (Value::Str(_) | Value::Num(_), Value::Array(_) | Value::Object(_)) => {
                self.loose_equals(&Value::str(other.to_display()))
            }
            _ => self.strict_equals(other),
        }
    }

    /// Items of an iterable value, if it is one
    pub(crate) fn iter_items(&self) -> Option<Vec<Value>> {
        match self {
            Value::Array(items) => Some(items.borrow().clone()),
            Value::Str(s) => Some(s.chars().map(|c| Value::str(c.to_string())).collect()),
            _ => None,
        }
    }

    pub(crate) fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Num(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::str(s),
            serde_json::Value::Array(items) => {
                Value::array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// JSON view; `None` for values JSON cannot carry
    ///
    /// Nesting past `MAX_NESTING`, and anything reached once `MAX_JSON_UNITS`
    /// are spent, becomes `null`.
    pub(crate) fn to_json(&self) -> Option<serde_json::Value> {
        self.to_json_metered().0
    }

    /// `to_json` plus the units of work it took
    pub(crate) fn to_json_metered(&self) -> (Option<serde_json::Value>, usize) {
        let mut budget = MAX_JSON_UNITS;
        let json = self.to_json_at(0, &mut budget);
        (json, MAX_JSON_UNITS - budget)
    }

    fn to_json_at(&self, depth: usize, budget: &mut usize) -> Option<serde_json::Value> {
        if depth > MAX_NESTING || *budget == 0 {
            return Some(serde_json::Value::Null);
        }
        *budget -= 1;
        Some(match self {
            Value::Undefined | Value::Func(_) => return None,
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Num(n) => json_number(*n),
            Value::Str(s) => {
                if s.len() >= *budget {
                    *budget = 0;
                    return Some(serde_json::Value::Null);
                }
                *budget -= s.len();
                serde_json::Value::String(s.to_string())
            }
            Value::Array(items) => serde_json::Value::Array(
                items
                    .borrow()
                    .iter()
                    .map(|v| {
                        v.to_json_at(depth + 1, budget)
                            .unwrap_or(serde_json::Value::Null)
                    })
                    .collect(),
            ),
            Value::Object(map) => serde_json::Value::Object(
                map.borrow()
                    .iter()
                    .filter_map(|(k, v)| v.to_json_at(depth + 1, budget).map(|j| (k.clone(), j)))
                    .collect(),
            ),
            Value::Element(_) => serde_json::Value::Object(serde_json::Map::new()),
        })
    }
}

/// Integral values in the exact `f64` range serialize as JSON integers
pub(crate) fn json_number(n: f64) -> serde_json::Value {
    const EXACT: f64 = 9_007_199_254_740_992.0;
    if n.fract() == 0.0 && n.abs() <= EXACT {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Num(n) => f.write_str(&number_to_string(*n)),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Array(items) => f.debug_list().entries(items.borrow().iter()).finish(),
            Value::Object(map) => f.debug_map().entries(map.borrow().iter()).finish(),
            Value::Func(func) => write!(f, "[Function {}]", func.name()),
            Value::Element(el) => match &el.kind {
                ElementKind::Host(tag) => write!(f, "<{tag}>"),
                ElementKind::Component(c) => write!(f, "<{}>", c.name()),
                ElementKind::Fragment => f.write_str("<>"),
            },
        }
    }
}

/// JS number formatting for the common cases
pub(crate) fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        format!("{n}")
    }
}

/// Error object as thrown by `new Error(message)`
pub(crate) fn error_object(name: &str, message: &str) -> Value {
    let mut map = ObjectMap::new();
    map.insert("name".to_string(), Value::str(name));
    map.insert("message".to_string(), Value::str(message));
    Value::object(map)
}

/// One-line description of a thrown value
pub(crate) fn describe_thrown(value: &Value) -> String {
    if let Value::Object(map) = value {
        let map = map.borrow();
        if let (Some(name), Some(message)) = (map.get("name"), map.get("message")) {
            return format!("{}: {}", name.to_display(), message.to_display());
        }
    }
    value.to_display()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_formatting() {
        assert_eq!(number_to_string(3.0), "3");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.5), "0.5");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn truthiness() {
        assert!(!Value::str("").truthy());
        assert!(Value::str("0").truthy());
        assert!(!Value::Num(f64::NAN).truthy());
        assert!(Value::array(vec![]).truthy());
    }

    #[test]
    fn equality() {
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(!Value::Null.strict_equals(&Value::Undefined));
        assert!(Value::str("1").loose_equals(&Value::Num(1.0)));
        assert!(Value::Num(f64::NAN).same_value(&Value::Num(f64::NAN)));
        let a = Value::array(vec![]);
        assert!(a.strict_equals(&a.clone()));
        assert!(!a.strict_equals(&Value::array(vec![])));
    }

    #[test]
    fn json_round_trip_drops_functions() {
        let json = serde_json::json!({"a": [1, "x", null], "b": true});
        let v = Value::from_json(&json);
        assert_eq!(v.to_json(), Some(json));
        assert_eq!(Value::native("f", |_, _| Ok(Value::Undefined)).to_json(), None);
    }

    #[test]
    fn integral_numbers_serialize_as_integers() {
        let v = Value::from_json(&serde_json::json!({"a": 1, "b": [2, 2.5], "c": -0.0}));
        assert_eq!(
            serde_json::to_string(&v.to_json().unwrap()).unwrap(),
            r#"{"a":1,"b":[2,2.5],"c":0}"#
        );
        assert_eq!(Value::Num(f64::NAN).to_json(), Some(serde_json::Value::Null));
    }

    #[test]
    fn cyclic_array_displays_empty() {
        let arr = Value::array(vec![Value::Num(1.0)]);
        if let Value::Array(items) = &arr {
            items.borrow_mut().push(arr.clone());
        }
        assert_eq!(arr.to_display(), "1,");
        assert_eq!(arr.display_within(1), None);
    }

    #[test]
    fn display() {
        let arr = Value::array(vec![Value::Num(1.0), Value::Null, Value::str("a")]);
        assert_eq!(arr.to_display(), "1,,a");
        assert_eq!(
            describe_thrown(&error_object("TypeError", "x is not a function")),
            "TypeError: x is not a function"
        );
    }
}
