//! Language intrinsics
//!
//! The root scope of every instance: `Math`, `JSON`, the primitive
//! conversion functions, `Array`, `Object`, the error constructors and
//! `console`. Methods on arrays, strings, numbers and functions are
//! resolved here on member access and bound to their receiver.

use crate::eval::{throw_error, type_error, Interpreter, Scope};
use crate::value::{
    error_object, number_to_string, ElementKind, EvalResult, ObjectMap, Value, MAX_NESTING,
};
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::rc::Rc;

const GUEST_TARGET: &str = "livegen::guest";

#[inline]
fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

fn with_props(func: Value, props: Vec<(&str, Value)>) -> Value {
    if let Value::Func(f) = &func {
        let mut map = f.props.borrow_mut();
        for (name, value) in props {
            map.insert(name.to_string(), value);
        }
    }
    func
}

fn object_of(entries: Vec<(&str, Value)>) -> Value {
    Value::object(
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    )
}

fn math_fn(name: &'static str, f: fn(f64) -> f64) -> (&'static str, Value) {
    (
        name,
        Value::native(name, move |_, args| Ok(Value::Num(f(arg(&args, 0).to_number())))),
    )
}

/// Populate the root scope
pub(crate) fn install(globals: &Scope) {
    let seed = Rc::new(Cell::new(0x2545_F491_4F6C_DD1D_u64));
    let mut math = vec![
        math_fn("floor", f64::floor),
        math_fn("ceil", f64::ceil),
        math_fn("round", |x| (x + 0.5).floor()),
        math_fn("abs", f64::abs),
        math_fn("sqrt", f64::sqrt),
        math_fn("trunc", f64::trunc),
        math_fn("sign", |x| if x == 0.0 || x.is_nan() { x } else { x.signum() }),
        math_fn("log", f64::ln),
        math_fn("exp", f64::exp),
        math_fn("sin", f64::sin),
        math_fn("cos", f64::cos),
        (
            "pow",
            Value::native("pow", |_, args| {
                Ok(Value::Num(arg(&args, 0).to_number().powf(arg(&args, 1).to_number())))
            }),
        ),
        (
            "min",
            Value::native("min", |_, args| {
                Ok(Value::Num(args.iter().map(Value::to_number).fold(
                    f64::INFINITY,
                    |acc, x| if x.is_nan() || acc.is_nan() { f64::NAN } else { acc.min(x) },
                )))
            }),
        ),
        (
            "max",
            Value::native("max", |_, args| {
                Ok(Value::Num(args.iter().map(Value::to_number).fold(
                    f64::NEG_INFINITY,
                    |acc, x| if x.is_nan() || acc.is_nan() { f64::NAN } else { acc.max(x) },
                )))
            }),
        ),
        ("PI", Value::Num(std::f64::consts::PI)),
        ("E", Value::Num(std::f64::consts::E)),
    ];
    // xorshift; deterministic per instance
    math.push((
        "random",
        Value::native("random", move |_, _| {
            let mut x = seed.get();
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            seed.set(x);
            Ok(Value::Num((x >> 11) as f64 / (1u64 << 53) as f64))
        }),
    ));
    globals.declare("Math", object_of(math), false);

    globals.declare(
        "JSON",
        object_of(vec![
            (
                "stringify",
                Value::native("stringify", |interp, args| {
                    let (json, cost) = arg(&args, 0).to_json_metered();
                    interp.charge(cost)?;
                    let Some(json) = json else {
                        return Ok(Value::Undefined);
                    };
                    let pretty = match arg(&args, 2) {
                        Value::Num(n) => n > 0.0,
                        Value::Str(s) => !s.is_empty(),
                        _ => false,
                    };
                    let text = if pretty {
                        serde_json::to_string_pretty(&json)
                    } else {
                        serde_json::to_string(&json)
                    };
                    text.map(Value::str)
                        .map_err(|e| type_error(format!("JSON.stringify: {e}")))
                }),
            ),
            (
                "parse",
                Value::native("parse", |_, args| {
                    serde_json::from_str::<serde_json::Value>(&arg(&args, 0).to_display())
                        .map(|json| Value::from_json(&json))
                        .map_err(|e| throw_error("SyntaxError", format!("JSON.parse: {e}")))
                }),
            ),
        ]),
        false,
    );

    globals.declare(
        "String",
        Value::native("String", |_, args| {
            Ok(Value::str(args.first().map_or(String::new(), Value::to_display)))
        }),
        false,
    );

    let number = Value::native("Number", |_, args| {
        Ok(Value::Num(args.first().map_or(0.0, Value::to_number)))
    });
    globals.declare(
        "Number",
        with_props(
            number,
            vec![
                (
                    "isNaN",
                    Value::native("isNaN", |_, args| {
                        Ok(Value::Bool(matches!(arg(&args, 0), Value::Num(n) if n.is_nan())))
                    }),
                ),
                (
                    "isFinite",
                    Value::native("isFinite", |_, args| {
                        Ok(Value::Bool(matches!(arg(&args, 0), Value::Num(n) if n.is_finite())))
                    }),
                ),
                (
                    "isInteger",
                    Value::native("isInteger", |_, args| {
                        Ok(Value::Bool(
                            matches!(arg(&args, 0), Value::Num(n) if n.is_finite() && n.fract() == 0.0),
                        ))
                    }),
                ),
                ("parseFloat", Value::native("parseFloat", parse_float)),
                ("parseInt", Value::native("parseInt", parse_int)),
                ("MAX_SAFE_INTEGER", Value::Num(9_007_199_254_740_991.0)),
            ],
        ),
        false,
    );
    globals.declare("parseFloat", Value::native("parseFloat", parse_float), false);
    globals.declare("parseInt", Value::native("parseInt", parse_int), false);
    globals.declare(
        "isNaN",
        Value::native("isNaN", |_, args| Ok(Value::Bool(arg(&args, 0).to_number().is_nan()))),
        false,
    );
    globals.declare("NaN", Value::Num(f64::NAN), false);
    globals.declare("Infinity", Value::Num(f64::INFINITY), false);

    globals.declare(
        "Boolean",
        Value::native("Boolean", |_, args| Ok(Value::Bool(arg(&args, 0).truthy()))),
        false,
    );

    let array = Value::native("Array", |interp, args| match args.as_slice() {
        [Value::Num(n)] if *n >= 0.0 && n.fract() == 0.0 => {
            let len = *n as usize;
            interp.alloc_array(len)?;
            Ok(Value::array(vec![Value::Undefined; len]))
        }
        [Value::Num(_)] => Err(throw_error("RangeError", "Invalid array length")),
        _ => Ok(Value::array(args)),
    });
    globals.declare(
        "Array",
        with_props(
            array,
            vec![
                (
                    "isArray",
                    Value::native("isArray", |_, args| {
                        Ok(Value::Bool(matches!(arg(&args, 0), Value::Array(_))))
                    }),
                ),
                ("from", Value::native("from", array_from)),
                ("of", Value::native("of", |_, args| Ok(Value::array(args)))),
            ],
        ),
        false,
    );

    let object = Value::native("Object", |_, args| match arg(&args, 0) {
        v @ (Value::Object(_) | Value::Array(_) | Value::Func(_)) => Ok(v),
        _ => Ok(Value::object(ObjectMap::new())),
    });
    globals.declare(
        "Object",
        with_props(
            object,
            vec![
                (
                    "keys",
                    Value::native("keys", |_, args| {
                        Ok(Value::array(
                            own_keys(&arg(&args, 0)).into_iter().map(Value::str).collect(),
                        ))
                    }),
                ),
                (
                    "values",
                    Value::native("values", |_, args| {
                        Ok(Value::array(
                            own_entries(&arg(&args, 0)).into_iter().map(|(_, v)| v).collect(),
                        ))
                    }),
                ),
                (
                    "entries",
                    Value::native("entries", |_, args| {
                        Ok(Value::array(
                            own_entries(&arg(&args, 0))
                                .into_iter()
                                .map(|(k, v)| Value::array(vec![Value::str(k), v]))
                                .collect(),
                        ))
                    }),
                ),
                (
                    "assign",
                    Value::native("assign", |interp, args| {
                        let target = arg(&args, 0);
                        for source in args.iter().skip(1) {
                            for (k, v) in own_entries(source) {
                                interp.set_member(&target, &k, v)?;
                            }
                        }
                        Ok(target)
                    }),
                ),
                (
                    "fromEntries",
                    Value::native("fromEntries", |_, args| {
                        let mut map = ObjectMap::new();
                        for pair in arg(&args, 0).iter_items().unwrap_or_default() {
                            let pair = pair.iter_items().unwrap_or_default();
                            map.insert(arg(&pair, 0).to_key(), arg(&pair, 1));
                        }
                        Ok(Value::object(map))
                    }),
                ),
                ("freeze", Value::native("freeze", |_, args| Ok(arg(&args, 0)))),
            ],
        ),
        false,
    );

    for name in ["Error", "TypeError", "RangeError", "SyntaxError"] {
        globals.declare(
            name,
            Value::native(name, move |_, args| {
                let message = match arg(&args, 0) {
                    Value::Undefined => String::new(),
                    other => other.to_display(),
                };
                Ok(error_object(name, &message))
            }),
            false,
        );
    }

    globals.declare(
        "console",
        object_of(vec![
            ("log", console("log")),
            ("info", console("info")),
            ("debug", console("debug")),
            ("warn", console("warn")),
            ("error", console("error")),
        ]),
        false,
    );
}

fn console(level: &'static str) -> Value {
    Value::native(level, move |interp, args| {
        let mut parts = Vec::with_capacity(args.len());
        for v in &args {
            parts.push(match v {
                Value::Str(s) => s.to_string(),
                Value::Object(_) | Value::Array(_) => {
                    let (json, cost) = v.to_json_metered();
                    interp.charge(cost)?;
                    json.map_or_else(|| v.to_display(), |j| j.to_string())
                }
                other => other.to_display(),
            });
        }
        let line = parts.join(" ");
        match level {
            "error" => tracing::error!(target: GUEST_TARGET, "{line}"),
            "warn" => tracing::warn!(target: GUEST_TARGET, "{line}"),
            "debug" => tracing::debug!(target: GUEST_TARGET, "{line}"),
            _ => tracing::info!(target: GUEST_TARGET, "{line}"),
        }
        Ok(Value::Undefined)
    })
}

fn parse_float(_: &mut Interpreter, args: Vec<Value>) -> EvalResult {
    let text = arg(&args, 0).to_display();
    let text = text.trim_start();
    let end = text
        .char_indices()
        .take_while(|(i, c)| {
            c.is_ascii_digit() || *c == '.' || ((*c == '-' || *c == '+') && *i == 0) || *c == 'e'
        })
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    let mut candidate = &text[..end];
    while !candidate.is_empty() {
        if let Ok(n) = candidate.parse::<f64>() {
            return Ok(Value::Num(n));
        }
        candidate = &candidate[..candidate.len() - 1];
    }
    Ok(Value::Num(f64::NAN))
}

fn parse_int(_: &mut Interpreter, args: Vec<Value>) -> EvalResult {
    let text = arg(&args, 0).to_display();
    let mut text = text.trim();
    let radix = match arg(&args, 1) {
        Value::Undefined => 10,
        r => r.to_number() as u32,
    };
    let negative = text.starts_with('-');
    text = text.trim_start_matches(['-', '+']);
    let radix = if radix == 16 || (radix == 10 && text.starts_with("0x")) {
        text = text.trim_start_matches("0x");
        16
    } else {
        radix
    };
    if !(2..=36).contains(&radix) {
        return Ok(Value::Num(f64::NAN));
    }
    let digits: String = text.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return Ok(Value::Num(f64::NAN));
    }
    let value = digits
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .fold(0.0, |acc, d| acc * f64::from(radix) + f64::from(d));
    Ok(Value::Num(if negative { -value } else { value }))
}

fn array_from(interp: &mut Interpreter, args: Vec<Value>) -> EvalResult {
    let source = arg(&args, 0);
    let items = match source.iter_items() {
        Some(items) => items,
        None => {
            let len = get_member(&source, "length")?.to_number();
            if len.is_finite() && len > 0.0 {
                let len = len as usize;
                interp.alloc_array(len)?;
                vec![Value::Undefined; len]
            } else {
                Vec::new()
            }
        }
    };
    let map = arg(&args, 1);
    if !map.is_callable() {
        return Ok(Value::array(items));
    }
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        out.push(interp.call(&map, vec![item, Value::Num(i as f64)])?);
    }
    Ok(Value::array(out))
}

/// Enumerable own keys
pub(crate) fn own_keys(value: &Value) -> Vec<String> {
    own_entries(value).into_iter().map(|(k, _)| k).collect()
}

/// Enumerable own entries
pub(crate) fn own_entries(value: &Value) -> Vec<(String, Value)> {
    match value {
        Value::Object(map) => map
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        Value::Array(items) => items
            .borrow()
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect(),
        Value::Str(s) => s
            .chars()
            .enumerate()
            .map(|(i, c)| (i.to_string(), Value::str(c.to_string())))
            .collect(),
        Value::Func(f) => f
            .props
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        _ => Vec::new(),
    }
}

pub(crate) fn instance_of(value: &Value, ctor: &Value) -> bool {
    let Value::Func(f) = ctor else {
        return false;
    };
    match (f.name(), value) {
        ("Array", Value::Array(_)) => true,
        ("Object", Value::Object(_) | Value::Array(_) | Value::Func(_)) => true,
        (name, Value::Object(map)) if name.ends_with("Error") => {
            let map = map.borrow();
            map.contains_key("message")
                && map
                    .get("name")
                    .is_some_and(|n| name == "Error" || n.to_display() == name)
        }
        _ => false,
    }
}

/// Property lookup, binding methods to their receiver
pub(crate) fn get_member(target: &Value, key: &str) -> EvalResult {
    match target {
        Value::Undefined | Value::Null => Err(type_error(format!(
            "Cannot read properties of {} (reading '{key}')",
            target.to_display()
        ))),
        Value::Object(map) => {
            if let Some(v) = map.borrow().get(key) {
                return Ok(v.clone());
            }
            Ok(match key {
                "hasOwnProperty" => {
                    let map = Rc::clone(map);
                    Value::native("hasOwnProperty", move |_, args| {
                        Ok(Value::Bool(map.borrow().contains_key(&arg(&args, 0).to_key())))
                    })
                }
                _ => Value::Undefined,
            })
        }
        Value::Array(items) => {
            if key == "length" {
                return Ok(Value::Num(items.borrow().len() as f64));
            }
            if let Ok(index) = key.parse::<usize>() {
                return Ok(items.borrow().get(index).cloned().unwrap_or_default());
            }
            Ok(array_method(items, key).unwrap_or_default())
        }
        Value::Str(s) => {
            if key == "length" {
                return Ok(Value::Num(s.chars().count() as f64));
            }
            if let Ok(index) = key.parse::<usize>() {
                return Ok(s
                    .chars()
                    .nth(index)
                    .map_or(Value::Undefined, |c| Value::str(c.to_string())));
            }
            Ok(string_method(s, key).unwrap_or_default())
        }
        Value::Num(n) => Ok(number_method(*n, key).unwrap_or_default()),
        Value::Bool(b) => Ok(match key {
            "toString" => {
                let b = *b;
                Value::native("toString", move |_, _| Ok(Value::str(b.to_string())))
            }
            _ => Value::Undefined,
        }),
        Value::Func(f) => {
            if let Some(v) = f.props.borrow().get(key) {
                return Ok(v.clone());
            }
            let func = target.clone();
            Ok(match key {
                "name" => Value::str(f.name()),
                "call" => Value::native("call", move |interp, args| {
                    interp.call(&func, args.into_iter().skip(1).collect())
                }),
                "apply" => Value::native("apply", move |interp, args| {
                    interp.call(&func, arg(&args, 1).iter_items().unwrap_or_default())
                }),
                "bind" => Value::native("bind", move |_, args| {
                    let func = func.clone();
                    let bound: Vec<Value> = args.into_iter().skip(1).collect();
                    Ok(Value::native("bound", move |interp, more| {
                        let mut all = bound.clone();
                        all.extend(more);
                        interp.call(&func, all)
                    }))
                }),
                _ => Value::Undefined,
            })
        }
        Value::Element(el) => Ok(match key {
            "key" => el.key.as_deref().map_or(Value::Null, Value::str),
            "type" => match &el.kind {
                ElementKind::Host(tag) => Value::Str(Rc::clone(tag)),
                ElementKind::Component(f) => Value::Func(Rc::clone(f)),
                ElementKind::Fragment => Value::str("Fragment"),
            },
            "props" => {
                let mut props = el.props.clone();
                if !el.children.is_empty() {
                    props.insert("children".to_string(), children_value(&el.children));
                }
                Value::object(props)
            }
            _ => Value::Undefined,
        }),
    }
}

/// `props.children` form: a single child unwrapped, several as an array
pub(crate) fn children_value(children: &[Value]) -> Value {
    match children {
        [single] => single.clone(),
        many => Value::array(many.to_vec()),
    }
}

fn relative_index(raw: &Value, len: usize, default: usize) -> usize {
    match raw {
        Value::Undefined => default,
        v => {
            let n = v.to_number();
            let n = if n.is_nan() { 0.0 } else { n.trunc() };
            if n < 0.0 {
                (len as f64 + n).max(0.0) as usize
            } else {
                (n as usize).min(len)
            }
        }
    }
}

type Items = Rc<RefCell<Vec<Value>>>;

fn callback_each(
    interp: &mut Interpreter,
    items: &Items,
    callback: &Value,
    mut visit: impl FnMut(usize, Value, Value) -> Option<EvalResult<()>>,
) -> EvalResult<()> {
    let snapshot = items.borrow().clone();
    for (i, item) in snapshot.into_iter().enumerate() {
        interp.tick()?;
        let result = interp.call(
            callback,
            vec![item.clone(), Value::Num(i as f64), Value::Array(Rc::clone(items))],
        )?;
        if let Some(done) = visit(i, item, result) {
            return done;
        }
    }
    Ok(())
}

fn default_compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Undefined, Value::Undefined) => Ordering::Equal,
        (Value::Undefined, _) => Ordering::Greater,
        (_, Value::Undefined) => Ordering::Less,
        _ => a.to_display().cmp(&b.to_display()),
    }
}

fn sort_values(interp: &mut Interpreter, items: &mut [Value], cmp: &Value) -> EvalResult<()> {
    // stable insertion sort; comparisons are metered
    for i in 1..items.len() {
        let mut j = i;
        while j > 0 {
            interp.tick()?;
            let ordering = if cmp.is_callable() {
                let r = interp.call(cmp, vec![items[j - 1].clone(), items[j].clone()])?;
                r.to_number().partial_cmp(&0.0).unwrap_or(Ordering::Equal)
            } else {
                default_compare(&items[j - 1], &items[j])
            };
            if ordering != Ordering::Greater {
                break;
            }
            items.swap(j - 1, j);
            j -= 1;
        }
    }
    Ok(())
}

/// Flatten `items` up to `depth` levels, within the array limit
fn flatten_into(
    interp: &mut Interpreter,
    out: &mut Vec<Value>,
    items: &[Value],
    depth: usize,
) -> EvalResult<()> {
    for item in items {
        match item {
            Value::Array(inner) if depth > 0 => {
                let inner = inner.borrow().clone();
                flatten_into(interp, out, &inner, depth - 1)?;
            }
            other => {
                interp.ensure_array_len(out.len() + 1)?;
                out.push(other.clone());
            }
        }
    }
    Ok(())
}

fn array_method(items: &Items, name: &str) -> Option<Value> {
    let arr = Rc::clone(items);
    let method = match name {
        "map" => Value::native("map", move |interp, args| {
            let mut out = Vec::new();
            callback_each(interp, &arr, &arg(&args, 0), |_, _, r| {
                out.push(r);
                None
            })?;
            Ok(Value::array(out))
        }),
        "filter" => Value::native("filter", move |interp, args| {
            let mut out = Vec::new();
            callback_each(interp, &arr, &arg(&args, 0), |_, item, r| {
                if r.truthy() {
                    out.push(item);
                }
                None
            })?;
            Ok(Value::array(out))
        }),
        "forEach" => Value::native("forEach", move |interp, args| {
            callback_each(interp, &arr, &arg(&args, 0), |_, _, _| None)?;
            Ok(Value::Undefined)
        }),
        "find" | "findIndex" | "some" | "every" => {
            let kind = name.to_string();
            Value::native(name, move |interp, args| {
                let mut hit: Option<(usize, Value)> = None;
                let every = kind == "every";
                callback_each(interp, &arr, &arg(&args, 0), |i, item, r| {
                    if r.truthy() != every {
                        hit = Some((i, item));
                        Some(Ok(()))
                    } else {
                        None
                    }
                })?;
                Ok(match (kind.as_str(), hit) {
                    ("find", Some((_, item))) => item,
                    ("find", None) => Value::Undefined,
                    ("findIndex", Some((i, _))) => Value::Num(i as f64),
                    ("findIndex", None) => Value::Num(-1.0),
                    ("some", hit) => Value::Bool(hit.is_some()),
                    (_, hit) => Value::Bool(hit.is_none()),
                })
            })
        }
        "reduce" => Value::native("reduce", move |interp, args| {
            let callback = arg(&args, 0);
            let snapshot = arr.borrow().clone();
            let mut iter = snapshot.into_iter().enumerate();
            let mut acc = if args.len() > 1 {
                arg(&args, 1)
            } else {
                match iter.next() {
                    Some((_, first)) => first,
                    None => return Err(type_error("Reduce of empty array with no initial value")),
                }
            };
            for (i, item) in iter {
                interp.tick()?;
                acc = interp.call(
                    &callback,
                    vec![acc, item, Value::Num(i as f64), Value::Array(Rc::clone(&arr))],
                )?;
            }
            Ok(acc)
        }),
        "includes" => Value::native("includes", move |_, args| {
            let needle = arg(&args, 0);
            Ok(Value::Bool(arr.borrow().iter().any(|v| v.same_value(&needle))))
        }),
        "indexOf" => Value::native("indexOf", move |_, args| {
            let needle = arg(&args, 0);
            Ok(Value::Num(
                arr.borrow()
                    .iter()
                    .position(|v| v.strict_equals(&needle))
                    .map_or(-1.0, |i| i as f64),
            ))
        }),
        "join" => Value::native("join", move |interp, args| {
            let sep = match arg(&args, 0) {
                Value::Undefined => ",".to_string(),
                s => s.to_display(),
            };
            let items = arr.borrow().clone();
            let mut out = String::new();
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    interp.ensure_string_len(out.len() + sep.len())?;
                    out.push_str(&sep);
                }
                if !item.is_nullish() {
                    let text = interp.display(item, out.len())?;
                    out.push_str(&text);
                }
            }
            interp.alloc_string(out.len())?;
            Ok(Value::str(out))
        }),
        "slice" => Value::native("slice", move |_, args| {
            let items = arr.borrow();
            let start = relative_index(&arg(&args, 0), items.len(), 0);
            let end = relative_index(&arg(&args, 1), items.len(), items.len());
            Ok(Value::array(
                items.get(start..end.max(start)).map_or_else(Vec::new, <[Value]>::to_vec),
            ))
        }),
        "concat" => Value::native("concat", move |interp, args| {
            let added: usize = args
                .iter()
                .map(|a| match a {
                    Value::Array(inner) => inner.borrow().len(),
                    _ => 1,
                })
                .sum();
            let mut out = arr.borrow().clone();
            interp.alloc_array(out.len() + added)?;
            for a in args {
                match a {
                    Value::Array(inner) => out.extend(inner.borrow().iter().cloned()),
                    other => out.push(other),
                }
            }
            Ok(Value::array(out))
        }),
        "push" => Value::native("push", move |interp, args| {
            let mut items = arr.borrow_mut();
            interp.ensure_array_len(items.len() + args.len())?;
            items.extend(args);
            Ok(Value::Num(items.len() as f64))
        }),
        "pop" => Value::native("pop", move |_, _| Ok(arr.borrow_mut().pop().unwrap_or_default())),
        "shift" => Value::native("shift", move |_, _| {
            let mut items = arr.borrow_mut();
            Ok(if items.is_empty() {
                Value::Undefined
            } else {
                items.remove(0)
            })
        }),
        "unshift" => Value::native("unshift", move |interp, args| {
            let mut items = arr.borrow_mut();
            interp.ensure_array_len(items.len() + args.len())?;
            for (i, a) in args.into_iter().enumerate() {
                items.insert(i, a);
            }
            Ok(Value::Num(items.len() as f64))
        }),
        "reverse" => Value::native("reverse", move |_, _| {
            arr.borrow_mut().reverse();
            Ok(Value::Array(Rc::clone(&arr)))
        }),
        "sort" => Value::native("sort", move |interp, args| {
            let mut items = arr.borrow().clone();
            sort_values(interp, &mut items, &arg(&args, 0))?;
            *arr.borrow_mut() = items;
            Ok(Value::Array(Rc::clone(&arr)))
        }),
        "flat" => Value::native("flat", move |interp, args| {
            let depth = match arg(&args, 0) {
                Value::Undefined => 1,
                d => (d.to_number().max(0.0) as usize).min(MAX_NESTING),
            };
            let items = arr.borrow().clone();
            let mut out = Vec::new();
            flatten_into(interp, &mut out, &items, depth)?;
            Ok(Value::array(out))
        }),
        "flatMap" => Value::native("flatMap", move |interp, args| {
            let mut mapped = Vec::new();
            callback_each(interp, &arr, &arg(&args, 0), |_, _, r| {
                mapped.push(r);
                None
            })?;
            let mut out = Vec::new();
            flatten_into(interp, &mut out, &mapped, 1)?;
            Ok(Value::array(out))
        }),
        "at" => Value::native("at", move |_, args| {
            let items = arr.borrow();
            let n = arg(&args, 0).to_number().trunc();
            let index = if n < 0.0 { items.len() as f64 + n } else { n };
            Ok(if index >= 0.0 {
                items.get(index as usize).cloned().unwrap_or_default()
            } else {
                Value::Undefined
            })
        }),
        "toString" => Value::native("toString", move |_, _| {
            Ok(Value::str(Value::Array(Rc::clone(&arr)).to_display()))
        }),
        _ => return None,
    };
    Some(method)
}

fn char_slice(s: &str, start: usize, end: usize) -> String {
    s.chars().skip(start).take(end.saturating_sub(start)).collect()
}

fn string_method(s: &Rc<str>, name: &str) -> Option<Value> {
    let s = Rc::clone(s);
    let method = match name {
        "toUpperCase" => Value::native(name, move |_, _| Ok(Value::str(s.to_uppercase()))),
        "toLowerCase" => Value::native(name, move |_, _| Ok(Value::str(s.to_lowercase()))),
        "trim" => Value::native(name, move |_, _| Ok(Value::str(s.trim()))),
        "trimStart" => Value::native(name, move |_, _| Ok(Value::str(s.trim_start()))),
        "trimEnd" => Value::native(name, move |_, _| Ok(Value::str(s.trim_end()))),
        "toString" | "valueOf" => Value::native(name, move |_, _| Ok(Value::Str(Rc::clone(&s)))),
        "includes" => Value::native(name, move |_, args| {
            Ok(Value::Bool(s.contains(arg(&args, 0).to_display().as_str())))
        }),
        "startsWith" => Value::native(name, move |_, args| {
            Ok(Value::Bool(s.starts_with(arg(&args, 0).to_display().as_str())))
        }),
        "endsWith" => Value::native(name, move |_, args| {
            Ok(Value::Bool(s.ends_with(arg(&args, 0).to_display().as_str())))
        }),
        "indexOf" => Value::native(name, move |_, args| {
            let needle = arg(&args, 0).to_display();
            Ok(Value::Num(s.find(needle.as_str()).map_or(-1.0, |byte| {
                s[..byte].chars().count() as f64
            })))
        }),
        "split" => Value::native(name, move |interp, args| {
            let parts: Vec<Value> = match arg(&args, 0) {
                Value::Undefined => vec![Value::Str(Rc::clone(&s))],
                sep => {
                    let sep = sep.to_display();
                    if sep.is_empty() {
                        interp.alloc_array(s.chars().count())?;
                        s.chars().map(|c| Value::str(c.to_string())).collect()
                    } else {
                        s.split(sep.as_str()).map(Value::str).collect()
                    }
                }
            };
            Ok(Value::array(parts))
        }),
        "slice" => Value::native(name, move |_, args| {
            let len = s.chars().count();
            let start = relative_index(&arg(&args, 0), len, 0);
            let end = relative_index(&arg(&args, 1), len, len);
            Ok(Value::str(char_slice(&s, start, end)))
        }),
        "substring" => Value::native(name, move |_, args| {
            let len = s.chars().count();
            let clamp = |v: Value, default: usize| match v {
                Value::Undefined => default,
                v => {
                    let n = v.to_number();
                    if n.is_nan() || n < 0.0 {
                        0
                    } else {
                        (n as usize).min(len)
                    }
                }
            };
            let a = clamp(arg(&args, 0), 0);
            let b = clamp(arg(&args, 1), len);
            Ok(Value::str(char_slice(&s, a.min(b), a.max(b))))
        }),
        "charAt" | "at" => {
            let at = name == "at";
            Value::native(name, move |_, args| {
                let n = arg(&args, 0).to_number();
                let n = if n.is_nan() { 0.0 } else { n.trunc() };
                let len = s.chars().count() as f64;
                let index = if at && n < 0.0 { len + n } else { n };
                let found = (index >= 0.0)
                    .then(|| s.chars().nth(index as usize))
                    .flatten();
                Ok(match found {
                    Some(c) => Value::str(c.to_string()),
                    None if at => Value::Undefined,
                    None => Value::str(""),
                })
            })
        }
        "replace" | "replaceAll" => {
            let all = name == "replaceAll";
            Value::native(name, move |interp, args| {
                let pattern = arg(&args, 0).to_display();
                let replacement = arg(&args, 1);
                let mut out = String::new();
                let mut rest: &str = &s;
                while let Some(pos) = rest.find(pattern.as_str()) {
                    out.push_str(&rest[..pos]);
                    let piece = if replacement.is_callable() {
                        interp.call(&replacement, vec![Value::str(&pattern)])?
                    } else {
                        replacement.clone()
                    };
                    let piece = interp.display(&piece, out.len())?;
                    out.push_str(&piece);
                    rest = &rest[pos + pattern.len()..];
                    if !all || pattern.is_empty() {
                        break;
                    }
                }
                interp.alloc_string(out.len() + rest.len())?;
                out.push_str(rest);
                Ok(Value::str(out))
            })
        }
        "padStart" | "padEnd" => {
            let start = name == "padStart";
            Value::native(name, move |interp, args| {
                let width = arg(&args, 0).to_number().max(0.0) as usize;
                let fill = match arg(&args, 1) {
                    Value::Undefined => " ".to_string(),
                    f => f.to_display(),
                };
                let len = s.chars().count();
                if len >= width || fill.is_empty() {
                    return Ok(Value::Str(Rc::clone(&s)));
                }
                interp.alloc_string(s.len() + (width - len))?;
                let pad: String = fill.chars().cycle().take(width - len).collect();
                Ok(Value::str(if start {
                    format!("{pad}{s}")
                } else {
                    format!("{s}{pad}")
                }))
            })
        }
        "repeat" => Value::native(name, move |interp, args| {
            let n = arg(&args, 0).to_number();
            if !(0.0..=10_000.0).contains(&n) {
                return Err(throw_error("RangeError", "Invalid count value"));
            }
            interp.tick()?;
            interp.alloc_string(s.len().saturating_mul(n as usize))?;
            Ok(Value::str(s.repeat(n as usize)))
        }),
        "concat" => Value::native(name, move |interp, args| {
            let mut out = s.to_string();
            for a in args {
                let text = interp.display(&a, out.len())?;
                out.push_str(&text);
            }
            interp.alloc_string(out.len())?;
            Ok(Value::str(out))
        }),
        "localeCompare" => Value::native(name, move |_, args| {
            let other = arg(&args, 0).to_display();
            Ok(Value::Num(match s.as_ref().cmp(other.as_str()) {
                Ordering::Less => -1.0,
                Ordering::Equal => 0.0,
                Ordering::Greater => 1.0,
            }))
        }),
        _ => return None,
    };
    Some(method)
}

fn group_thousands(n: f64) -> String {
    let rounded = (n.abs() * 1000.0).round() / 1000.0;
    let text = number_to_string(rounded);
    let (int, frac) = text.split_once('.').unwrap_or((&text, ""));
    let mut grouped = String::new();
    for (i, c) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if n < 0.0 && rounded != 0.0 { "-" } else { "" };
    if frac.is_empty() {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped}.{frac}")
    }
}

fn number_method(n: f64, name: &str) -> Option<Value> {
    let method = match name {
        "toFixed" => Value::native(name, move |_, args| {
            let digits = arg(&args, 0).to_number();
            let digits = if digits.is_nan() { 0 } else { digits.clamp(0.0, 100.0) as usize };
            Ok(Value::str(if n.is_finite() {
                format!("{n:.digits$}")
            } else {
                number_to_string(n)
            }))
        }),
        "toString" => Value::native(name, move |_, args| {
            let radix = match arg(&args, 0) {
                Value::Undefined => 10,
                r => r.to_number() as u32,
            };
            if radix == 10 || !n.is_finite() || n.fract() != 0.0 {
                return Ok(Value::str(number_to_string(n)));
            }
            if !(2..=36).contains(&radix) {
                return Err(throw_error("RangeError", "toString() radix must be between 2 and 36"));
            }
            let mut value = n.abs() as u64;
            let mut digits = Vec::new();
            loop {
                digits.push(std::char::from_digit((value % u64::from(radix)) as u32, radix).unwrap_or('0'));
                value /= u64::from(radix);
                if value == 0 {
                    break;
                }
            }
            if n < 0.0 {
                digits.push('-');
            }
            Ok(Value::str(digits.iter().rev().collect::<String>()))
        }),
        "toLocaleString" => Value::native(name, move |_, _| {
            Ok(Value::str(if n.is_finite() {
                group_thousands(n)
            } else {
                number_to_string(n)
            }))
        }),
        _ => return None,
    };
    Some(method)
}
