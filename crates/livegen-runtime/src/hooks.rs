//! Hook state for component instances
//!
//! Each rendered component instance is keyed by its position in the tree
//! and owns an ordered list of slots. Hooks claim slots in call order; a
//! different hook kind in a claimed slot is an error thrown into the guest.

use crate::eval::{throw_error, Interpreter};
use crate::value::{EvalResult, ObjectMap, Value};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::rc::Rc;

enum Slot {
    State {
        value: Value,
        setter: Value,
    },
    Effect {
        deps: Option<Vec<Value>>,
        cleanup: Option<Value>,
        pending: Option<Value>,
    },
    Memo {
        deps: Option<Vec<Value>>,
        value: Value,
    },
    Ref(Value),
}

impl Slot {
    fn kind(&self) -> &'static str {
        match self {
            Slot::State { .. } => "useState",
            Slot::Effect { .. } => "useEffect",
            Slot::Memo { .. } => "useMemo",
            Slot::Ref(_) => "useRef",
        }
    }
}

struct Cursor {
    key: Rc<str>,
    index: usize,
    mounted: bool,
}

/// An effect ready to run after commit
pub(crate) struct PendingEffect {
    key: Rc<str>,
    index: usize,
    effect: Value,
    cleanup: Option<Value>,
}

#[derive(Default)]
pub(crate) struct HookRuntime {
    instances: IndexMap<Rc<str>, Vec<Slot>>,
    stack: Vec<Cursor>,
    visited: HashSet<Rc<str>>,
    dirty: bool,
}

impl HookRuntime {
    /// Start a render pass
    pub(crate) fn begin_pass(&mut self) {
        self.visited.clear();
        self.stack.clear();
    }

    /// Start rendering the instance at `key`
    pub(crate) fn enter(&mut self, key: &str) {
        let key: Rc<str> = Rc::from(key);
        let mounted = self.instances.contains_key(&key);
        if !mounted {
            self.instances.insert(Rc::clone(&key), Vec::new());
        }
        self.visited.insert(Rc::clone(&key));
        self.stack.push(Cursor {
            key,
            index: 0,
            mounted,
        });
    }

    /// Finish the current instance, checking it used every hook it owns
    pub(crate) fn leave(&mut self) -> EvalResult<()> {
        let Some(cursor) = self.stack.pop() else {
            return Ok(());
        };
        let owned = self.instances.get(&cursor.key).map_or(0, Vec::len);
        if cursor.mounted && cursor.index < owned {
            return Err(throw_error(
                "Error",
                "Rendered fewer hooks than expected. This may be caused by an accidental early return statement.",
            ));
        }
        Ok(())
    }

    fn claim(&mut self, hook: &str) -> EvalResult<(Rc<str>, usize)> {
        let Some(cursor) = self.stack.last_mut() else {
            return Err(throw_error(
                "Error",
                format!("Invalid hook call: {hook} can only be called inside the body of a function component"),
            ));
        };
        let index = cursor.index;
        cursor.index += 1;
        let key = Rc::clone(&cursor.key);
        if let Some(slot) = self.instances.get(&key).and_then(|slots| slots.get(index)) {
            if slot.kind() != hook {
                return Err(throw_error(
                    "Error",
                    format!(
                        "Hooks were called in a different order: expected {} at position {index}, got {hook}",
                        slot.kind()
                    ),
                ));
            }
        }
        Ok((key, index))
    }

    fn slot(&self, key: &str, index: usize) -> Option<&Slot> {
        self.instances.get(key).and_then(|slots| slots.get(index))
    }

    fn slot_mut(&mut self, key: &str, index: usize) -> Option<&mut Slot> {
        self.instances.get_mut(key).and_then(|slots| slots.get_mut(index))
    }

    fn put(&mut self, key: &str, index: usize, slot: Slot) {
        if let Some(slots) = self.instances.get_mut(key) {
            if index < slots.len() {
                slots[index] = slot;
            } else {
                slots.push(slot);
            }
        }
    }

    /// Whether a state update is waiting for a re-render
    pub(crate) fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Drop instances the last pass did not render, returning their cleanups
    pub(crate) fn sweep(&mut self) -> Vec<Value> {
        let mut cleanups = Vec::new();
        let visited = &self.visited;
        self.instances.retain(|key, slots| {
            let keep = visited.contains(key);
            if !keep {
                cleanups.extend(slots.drain(..).filter_map(|slot| match slot {
                    Slot::Effect { cleanup, .. } => cleanup,
                    _ => None,
                }));
            }
            keep
        });
        cleanups
    }

    /// Take every effect whose deps changed in the last pass
    pub(crate) fn drain_effects(&mut self) -> Vec<PendingEffect> {
        let mut ready = Vec::new();
        for (key, slots) in &mut self.instances {
            for (index, slot) in slots.iter_mut().enumerate() {
                if let Slot::Effect {
                    pending, cleanup, ..
                } = slot
                {
                    if let Some(effect) = pending.take() {
                        ready.push(PendingEffect {
                            key: Rc::clone(key),
                            index,
                            effect,
                            cleanup: cleanup.take(),
                        });
                    }
                }
            }
        }
        ready
    }

    fn set_cleanup(&mut self, key: &str, index: usize, value: Value) {
        if let Some(Slot::Effect { cleanup, .. }) = self.slot_mut(key, index) {
            *cleanup = Some(value);
        }
    }

    /// Remove all instances, returning every outstanding cleanup
    pub(crate) fn all_cleanups(&mut self) -> Vec<Value> {
        self.visited.clear();
        self.sweep()
    }

    #[cfg(test)]
    pub(crate) fn instance_count(&self) -> usize {
        self.instances.len()
    }
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

fn deps_of(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::Undefined | Value::Null => None,
        other => other.iter_items(),
    }
}

fn deps_changed(old: Option<&Vec<Value>>, new: Option<&Vec<Value>>) -> bool {
    match (old, new) {
        (Some(old), Some(new)) => {
            old.len() != new.len() || old.iter().zip(new).any(|(a, b)| !a.same_value(b))
        }
        _ => true,
    }
}

fn make_setter(key: Rc<str>, index: usize) -> Value {
    Value::native("setState", move |interp, args| {
        let Some(Slot::State { value, .. }) = interp.hooks.slot(&key, index) else {
            // instance already unmounted
            return Ok(Value::Undefined);
        };
        let current = value.clone();
        let next = arg(&args, 0);
        let next = if next.is_callable() {
            interp.call(&next, vec![current.clone()])?
        } else {
            next
        };
        if !next.same_value(&current) {
            if let Some(Slot::State { value, .. }) = interp.hooks.slot_mut(&key, index) {
                *value = next;
            }
            interp.hooks.dirty = true;
        }
        Ok(Value::Undefined)
    })
}

pub(crate) fn use_state(interp: &mut Interpreter, args: Vec<Value>) -> EvalResult {
    let (key, index) = interp.hooks.claim("useState")?;
    if let Some(Slot::State { value, setter }) = interp.hooks.slot(&key, index) {
        return Ok(Value::array(vec![value.clone(), setter.clone()]));
    }
    let initial = arg(&args, 0);
    let value = if initial.is_callable() {
        interp.call(&initial, Vec::new())?
    } else {
        initial
    };
    let setter = make_setter(Rc::clone(&key), index);
    interp.hooks.put(
        &key,
        index,
        Slot::State {
            value: value.clone(),
            setter: setter.clone(),
        },
    );
    Ok(Value::array(vec![value, setter]))
}

pub(crate) fn use_effect(interp: &mut Interpreter, args: Vec<Value>) -> EvalResult {
    let (key, index) = interp.hooks.claim("useEffect")?;
    let effect = arg(&args, 0);
    let deps = deps_of(&arg(&args, 1));
    match interp.hooks.slot_mut(&key, index) {
        Some(Slot::Effect {
            deps: old,
            pending,
            ..
        }) => {
            if deps_changed(old.as_ref(), deps.as_ref()) {
                *old = deps;
                *pending = Some(effect);
            }
        }
        _ => interp.hooks.put(
            &key,
            index,
            Slot::Effect {
                deps,
                cleanup: None,
                pending: Some(effect),
            },
        ),
    }
    Ok(Value::Undefined)
}

fn memoize(
    interp: &mut Interpreter,
    hook: &str,
    deps: Option<Vec<Value>>,
    compute: impl FnOnce(&mut Interpreter) -> EvalResult,
) -> EvalResult {
    let (key, index) = interp.hooks.claim(hook)?;
    if let Some(Slot::Memo { deps: old, value }) = interp.hooks.slot(&key, index) {
        if !deps_changed(old.as_ref(), deps.as_ref()) {
            return Ok(value.clone());
        }
    }
    let value = compute(interp)?;
    interp.hooks.put(
        &key,
        index,
        Slot::Memo {
            deps,
            value: value.clone(),
        },
    );
    Ok(value)
}

pub(crate) fn use_memo(interp: &mut Interpreter, args: Vec<Value>) -> EvalResult {
    let factory = arg(&args, 0);
    memoize(interp, "useMemo", deps_of(&arg(&args, 1)), |interp| {
        interp.call(&factory, Vec::new())
    })
}

pub(crate) fn use_callback(interp: &mut Interpreter, args: Vec<Value>) -> EvalResult {
    let callback = arg(&args, 0);
    memoize(interp, "useMemo", deps_of(&arg(&args, 1)), |_| Ok(callback))
}

pub(crate) fn use_ref(interp: &mut Interpreter, args: Vec<Value>) -> EvalResult {
    let (key, index) = interp.hooks.claim("useRef")?;
    if let Some(Slot::Ref(obj)) = interp.hooks.slot(&key, index) {
        return Ok(obj.clone());
    }
    let mut map = ObjectMap::new();
    map.insert("current".to_string(), arg(&args, 0));
    let obj = Value::object(map);
    interp.hooks.put(&key, index, Slot::Ref(obj.clone()));
    Ok(obj)
}

/// Run `cleanups`, then each pending effect, storing the cleanup it returns
pub(crate) fn run_effects(interp: &mut Interpreter, cleanups: Vec<Value>) -> EvalResult<()> {
    for cleanup in cleanups {
        interp.call(&cleanup, Vec::new())?;
    }
    for pending in interp.hooks.drain_effects() {
        if let Some(cleanup) = &pending.cleanup {
            interp.call(cleanup, Vec::new())?;
        }
        let returned = interp.call(&pending.effect, Vec::new())?;
        if returned.is_callable() {
            interp
                .hooks
                .set_cleanup(&pending.key, pending.index, returned);
        }
    }
    Ok(())
}

/// Run every outstanding cleanup; errors are collected, not propagated
pub(crate) fn teardown(interp: &mut Interpreter) -> Vec<crate::eval::Abrupt> {
    let cleanups = interp.hooks.all_cleanups();
    cleanups
        .into_iter()
        .filter_map(|cleanup| interp.call(&cleanup, Vec::new()).err())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::SandboxConfig;

    fn interp() -> Interpreter {
        Interpreter::new(&SandboxConfig::default())
    }

    fn state_pair(value: &Value) -> (Value, Value) {
        let items = value.iter_items().unwrap();
        (items[0].clone(), items[1].clone())
    }

    #[test]
    fn hook_outside_component_throws() {
        let mut interp = interp();
        let err = use_state(&mut interp, vec![Value::Num(1.0)]).unwrap_err();
        let message = err.into_fault().to_string();
        assert!(message.contains("Invalid hook call"), "{message}");
    }

    #[test]
    fn state_persists_across_renders() {
        let mut interp = interp();
        interp.hooks.begin_pass();
        interp.hooks.enter("root<App>");
        let (value, setter) = state_pair(&use_state(&mut interp, vec![Value::Num(1.0)]).unwrap());
        interp.hooks.leave().unwrap();
        assert_eq!(value.to_number(), 1.0);

        interp.call(&setter, vec![Value::Num(5.0)]).unwrap();
        assert!(interp.hooks.take_dirty());

        interp.hooks.begin_pass();
        interp.hooks.enter("root<App>");
        let (value, again) = state_pair(&use_state(&mut interp, vec![Value::Num(1.0)]).unwrap());
        interp.hooks.leave().unwrap();
        assert_eq!(value.to_number(), 5.0);
        assert!(again.strict_equals(&setter));
    }

    #[test]
    fn setting_same_value_is_not_dirty() {
        let mut interp = interp();
        interp.hooks.begin_pass();
        interp.hooks.enter("k");
        let (_, setter) = state_pair(&use_state(&mut interp, vec![Value::str("a")]).unwrap());
        interp.hooks.leave().unwrap();
        interp.call(&setter, vec![Value::str("a")]).unwrap();
        assert!(!interp.hooks.take_dirty());
    }

    #[test]
    fn hook_order_mismatch_throws() {
        let mut interp = interp();
        interp.hooks.begin_pass();
        interp.hooks.enter("k");
        use_state(&mut interp, vec![]).unwrap();
        interp.hooks.leave().unwrap();

        interp.hooks.begin_pass();
        interp.hooks.enter("k");
        assert!(use_ref(&mut interp, vec![]).is_err());
    }

    #[test]
    fn sweep_drops_unvisited_instances() {
        let mut interp = interp();
        interp.hooks.begin_pass();
        interp.hooks.enter("a");
        use_ref(&mut interp, vec![]).unwrap();
        interp.hooks.leave().unwrap();
        interp.hooks.enter("b");
        use_ref(&mut interp, vec![]).unwrap();
        interp.hooks.leave().unwrap();
        assert_eq!(interp.hooks.instance_count(), 2);

        interp.hooks.begin_pass();
        interp.hooks.enter("a");
        use_ref(&mut interp, vec![]).unwrap();
        interp.hooks.leave().unwrap();
        interp.hooks.sweep();
        assert_eq!(interp.hooks.instance_count(), 1);
    }

    #[test]
    fn effects_run_once_per_deps_change() {
        let mut interp = interp();
        let log = Value::array(vec![]);
        let push = {
            let log = log.clone();
            Value::native("effect", move |_, _| {
                if let Value::Array(items) = &log {
                    items.borrow_mut().push(Value::Num(1.0));
                }
                Ok(Value::Undefined)
            })
        };
        for _ in 0..3 {
            interp.hooks.begin_pass();
            interp.hooks.enter("k");
            use_effect(&mut interp, vec![push.clone(), Value::array(vec![Value::Num(1.0)])])
                .unwrap();
            interp.hooks.leave().unwrap();
            run_effects(&mut interp, Vec::new()).unwrap();
        }
        assert_eq!(log.iter_items().unwrap().len(), 1);
    }
}
