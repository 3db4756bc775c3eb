//! Bounded tree-walking evaluator
//!
//! Executes a lowered [`Program`] against a scope chain whose root holds
//! the language intrinsics and whose factory frame holds the injected
//! capabilities. Every statement and expression consumes one unit of fuel;
//! calls count against a depth limit. Both limits surface as
//! [`ExecutionFault`]s that generated code cannot catch. Arrays and strings
//! are capped in length; bulk allocations also consume fuel, one unit per
//! `ALLOC_SLAB` elements or bytes.

use crate::error::ExecutionFault;
use crate::hooks::HookRuntime;
use crate::intrinsics;
use crate::ir::{
    ArrayItem, AssignOp, BinaryOp, DeclKind, Entry, Expr, FuncBody, FuncDef, IterKind, JsxAttr,
    JsxChild, JsxElement, JsxName, LogicalOp, MemberProp, ObjectProp, Pattern, Program, PropKey,
    Stmt, SwitchCase, UnaryOp,
};
use crate::sandbox::SandboxConfig;
use crate::value::{
    describe_thrown, error_object, Element, ElementKind, EvalResult, Function, FunctionKind,
    ObjectMap, Value,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

/// Non-normal completion of an evaluation
#[derive(Debug, Clone)]
pub(crate) enum Abrupt {
    /// Catchable exception
    Throw(Value),
    /// Host limit or internal fault; never catchable
    Fault(ExecutionFault),
}

impl Abrupt {
    pub(crate) fn into_fault(self) -> ExecutionFault {
        match self {
            Abrupt::Throw(value) => ExecutionFault::Thrown {
                message: describe_thrown(&value),
            },
            Abrupt::Fault(fault) => fault,
        }
    }
}

pub(crate) fn throw_error(name: &str, message: impl AsRef<str>) -> Abrupt {
    Abrupt::Throw(error_object(name, message.as_ref()))
}

pub(crate) fn type_error(message: impl AsRef<str>) -> Abrupt {
    throw_error("TypeError", message)
}

/// Allocation size bought by one unit of fuel
const ALLOC_SLAB: usize = 64;

#[derive(Debug, Clone)]
struct Binding {
    value: Value,
    mutable: bool,
}

struct Frame {
    vars: RefCell<HashMap<String, Binding>>,
    parent: Option<Scope>,
}

/// Lexical scope chain
#[derive(Clone)]
pub(crate) struct Scope(Rc<Frame>);

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("vars", &self.0.vars.borrow().len())
            .finish()
    }
}

enum AssignFailure {
    Undeclared,
    Constant,
}

impl Scope {
    pub(crate) fn root() -> Self {
        Scope(Rc::new(Frame {
            vars: RefCell::new(HashMap::new()),
            parent: None,
        }))
    }

    pub(crate) fn child(&self) -> Self {
        Scope(Rc::new(Frame {
            vars: RefCell::new(HashMap::new()),
            parent: Some(self.clone()),
        }))
    }

    /// Sibling frame with copies of this frame's bindings (per-iteration `let`)
    fn fork(&self) -> Self {
        Scope(Rc::new(Frame {
            vars: RefCell::new(self.0.vars.borrow().clone()),
            parent: self.0.parent.clone(),
        }))
    }

    pub(crate) fn declare(&self, name: &str, value: Value, mutable: bool) {
        self.0
            .vars
            .borrow_mut()
            .insert(name.to_string(), Binding { value, mutable });
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<Value> {
        let mut frame = Some(self);
        while let Some(scope) = frame {
            if let Some(binding) = scope.0.vars.borrow().get(name) {
                return Some(binding.value.clone());
            }
            frame = scope.0.parent.as_ref();
        }
        None
    }

    fn assign(&self, name: &str, value: Value) -> Result<(), AssignFailure> {
        let mut frame = Some(self);
        while let Some(scope) = frame {
            if let Some(binding) = scope.0.vars.borrow_mut().get_mut(name) {
                if !binding.mutable {
                    return Err(AssignFailure::Constant);
                }
                binding.value = value;
                return Ok(());
            }
            frame = scope.0.parent.as_ref();
        }
        Err(AssignFailure::Undeclared)
    }
}

enum Completion {
    Normal,
    Return(Value),
    Break,
    Continue,
}

#[derive(Clone, Copy)]
enum Bind {
    Declare { mutable: bool },
    Assign,
}

/// Evaluator state for one component instance
pub(crate) struct Interpreter {
    globals: Scope,
    fuel: u64,
    fuel_left: u64,
    depth: usize,
    max_depth: usize,
    max_array_len: usize,
    max_string_len: usize,
    pub(crate) max_render_passes: usize,
    pub(crate) hooks: HookRuntime,
    pub(crate) navigations: Vec<String>,
}

impl Interpreter {
    pub(crate) fn new(config: &SandboxConfig) -> Self {
        let globals = Scope::root();
        intrinsics::install(&globals);
        Self {
            globals,
            fuel: config.fuel,
            fuel_left: config.fuel,
            depth: 0,
            max_depth: config.max_depth,
            max_array_len: config.max_array_len,
            max_string_len: config.max_string_len,
            max_render_passes: config.max_render_passes,
            hooks: HookRuntime::default(),
            navigations: Vec::new(),
        }
    }

    /// Restore the full step budget for a new boundary operation
    pub(crate) fn refuel(&mut self) {
        self.fuel_left = self.fuel;
        self.depth = 0;
    }

    #[inline]
    pub(crate) fn tick(&mut self) -> EvalResult<()> {
        if self.fuel_left == 0 {
            return Err(Abrupt::Fault(ExecutionFault::Budget { fuel: self.fuel }));
        }
        self.fuel_left -= 1;
        Ok(())
    }

    /// Charge a bulk allocation of `len` elements or bytes
    pub(crate) fn charge(&mut self, len: usize) -> EvalResult<()> {
        let units = u64::try_from(len / ALLOC_SLAB).unwrap_or(u64::MAX);
        if units > self.fuel_left {
            self.fuel_left = 0;
            return Err(Abrupt::Fault(ExecutionFault::Budget { fuel: self.fuel }));
        }
        self.fuel_left -= units;
        Ok(())
    }

    /// Refuse arrays longer than the configured limit
    pub(crate) fn ensure_array_len(&self, len: usize) -> EvalResult<()> {
        if len > self.max_array_len {
            return Err(throw_error("RangeError", "Invalid array length"));
        }
        Ok(())
    }

    /// Refuse strings longer than the configured limit
    pub(crate) fn ensure_string_len(&self, len: usize) -> EvalResult<()> {
        if len > self.max_string_len {
            return Err(throw_error("RangeError", "Invalid string length"));
        }
        Ok(())
    }

    /// Check and charge a new array of `len` elements
    pub(crate) fn alloc_array(&mut self, len: usize) -> EvalResult<()> {
        self.ensure_array_len(len)?;
        self.charge(len)
    }

    /// Check and charge a new string of `len` bytes
    pub(crate) fn alloc_string(&mut self, len: usize) -> EvalResult<()> {
        self.ensure_string_len(len)?;
        self.charge(len)
    }

    /// `ToString` of `value` appended to `used` bytes, within the string limit
    pub(crate) fn display(&self, value: &Value, used: usize) -> EvalResult<String> {
        let room = self.max_string_len.saturating_sub(used);
        value
            .display_within(room)
            .ok_or_else(|| throw_error("RangeError", "Invalid string length"))
    }

    /// Binary operators, with string `+` held to the string limit
    fn apply_binary(&mut self, op: BinaryOp, left: &Value, right: &Value) -> EvalResult {
        if matches!(op, BinaryOp::Add) && (is_textual(left) || is_textual(right)) {
            let mut text = self.display(left, 0)?;
            let tail = self.display(right, text.len())?;
            self.charge(tail.len())?;
            text.push_str(&tail);
            return Ok(Value::str(text));
        }
        binary(op, left, right)
    }

    /// Run the factory: bind capabilities, execute the body, resolve the entry
    pub(crate) fn run_program(
        &mut self,
        program: &Program,
        capabilities: Vec<(&'static str, Value)>,
    ) -> EvalResult {
        let scope = self.globals.child();
        for (name, value) in capabilities {
            scope.declare(name, value, false);
        }
        match self.exec_block(&program.body, &scope)? {
            Completion::Return(value) => return Ok(value),
            Completion::Normal | Completion::Break | Completion::Continue => {}
        }
        match &program.entry {
            Entry::Named(name) => scope
                .lookup(name)
                .ok_or_else(|| throw_error("ReferenceError", format!("{name} is not defined"))),
            Entry::Expression(expr) => self.eval(expr, &scope),
        }
    }

    // Calls

    pub(crate) fn call(&mut self, callee: &Value, args: Vec<Value>) -> EvalResult {
        match callee {
            Value::Func(f) => self.call_function(f, args),
            other => Err(type_error(format!("{} is not a function", other.type_of()))),
        }
    }

    pub(crate) fn call_function(&mut self, func: &Rc<Function>, args: Vec<Value>) -> EvalResult {
        self.depth += 1;
        if self.depth > self.max_depth {
            self.depth -= 1;
            return Err(Abrupt::Fault(ExecutionFault::Depth {
                limit: self.max_depth,
            }));
        }
        let result = match &func.kind {
            FunctionKind::Native { call, .. } => {
                let call = Rc::clone(call);
                call(self, args)
            }
            FunctionKind::Closure { def, scope } => self.call_closure(def, scope, args),
        };
        self.depth -= 1;
        result
    }

    fn call_closure(&mut self, def: &Arc<FuncDef>, scope: &Scope, args: Vec<Value>) -> EvalResult {
        let frame = scope.child();
        let mut args = args.into_iter();
        for param in &def.params {
            let value = args.next().unwrap_or_default();
            self.bind(param, value, &frame, Bind::Declare { mutable: true })?;
        }
        if let Some(rest) = &def.rest {
            let remaining = Value::array(args.collect());
            self.bind(rest, remaining, &frame, Bind::Declare { mutable: true })?;
        }
        match &def.body {
            FuncBody::Expr(expr) => self.eval(expr, &frame),
            FuncBody::Block(stmts) => match self.exec_block(stmts, &frame)? {
                Completion::Return(value) => Ok(value),
                _ => Ok(Value::Undefined),
            },
        }
    }

    // Statements

    fn hoist(&mut self, stmts: &[Stmt], scope: &Scope) {
        for stmt in stmts {
            if let Stmt::Function(def) = stmt {
                if let Some(name) = &def.name {
                    scope.declare(name, Value::closure(Arc::clone(def), scope.clone()), true);
                }
            }
        }
    }

    fn exec_block(&mut self, stmts: &[Stmt], scope: &Scope) -> EvalResult<Completion> {
        self.hoist(stmts, scope);
        for stmt in stmts {
            match self.exec(stmt, scope)? {
                Completion::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Completion::Normal)
    }

    fn exec(&mut self, stmt: &Stmt, scope: &Scope) -> EvalResult<Completion> {
        self.tick()?;
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr, scope)?;
                Ok(Completion::Normal)
            }
            Stmt::Decl { kind, decls } => {
                for (target, init) in decls {
                    let value = match init {
                        Some(expr) => self.eval(expr, scope)?,
                        None => Value::Undefined,
                    };
                    let mutable = kind.is_mutable();
                    self.bind(target, value, scope, Bind::Declare { mutable })?;
                }
                Ok(Completion::Normal)
            }
            Stmt::Function(_) | Stmt::Empty | Stmt::Opaque(_) => Ok(Completion::Normal),
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::Undefined,
                };
                Ok(Completion::Return(value))
            }
            Stmt::If {
                test,
                then,
                otherwise,
            } => {
                if self.eval(test, scope)?.truthy() {
                    self.exec(then, scope)
                } else if let Some(otherwise) = otherwise {
                    self.exec(otherwise, scope)
                } else {
                    Ok(Completion::Normal)
                }
            }
            Stmt::Block(stmts) => self.exec_block(stmts, &scope.child()),
            Stmt::For {
                init,
                test,
                update,
                body,
            } => self.exec_for(init.as_deref(), test.as_ref(), update.as_ref(), body, scope),
            Stmt::ForEach {
                kind,
                over,
                target,
                iterable,
                body,
            } => self.exec_for_each(*kind, *over, target, iterable, body, scope),
            Stmt::While { test, body } => {
                while self.eval(test, scope)?.truthy() {
                    match self.exec(body, &scope.child())? {
                        Completion::Break => break,
                        Completion::Return(v) => return Ok(Completion::Return(v)),
                        Completion::Normal | Completion::Continue => {}
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::DoWhile { body, test } => {
                loop {
                    match self.exec(body, &scope.child())? {
                        Completion::Break => break,
                        Completion::Return(v) => return Ok(Completion::Return(v)),
                        Completion::Normal | Completion::Continue => {}
                    }
                    if !self.eval(test, scope)?.truthy() {
                        break;
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::Break => Ok(Completion::Break),
            Stmt::Continue => Ok(Completion::Continue),
            Stmt::Throw(expr) => Err(Abrupt::Throw(self.eval(expr, scope)?)),
            Stmt::Try {
                block,
                param,
                handler,
                finalizer,
            } => self.exec_try(block, param.as_ref(), handler.as_deref(), finalizer.as_deref(), scope),
            Stmt::Switch {
                discriminant,
                cases,
            } => self.exec_switch(discriminant, cases, scope),
        }
    }

    fn exec_for(
        &mut self,
        init: Option<&Stmt>,
        test: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
        scope: &Scope,
    ) -> EvalResult<Completion> {
        let mut iteration = scope.child();
        if let Some(init) = init {
            self.exec(init, &iteration)?;
        }
        loop {
            if let Some(test) = test {
                if !self.eval(test, &iteration)?.truthy() {
                    break;
                }
            }
            match self.exec(body, &iteration.child())? {
                Completion::Break => break,
                Completion::Return(v) => return Ok(Completion::Return(v)),
                Completion::Normal | Completion::Continue => {}
            }
            iteration = iteration.fork();
            if let Some(update) = update {
                self.eval(update, &iteration)?;
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_for_each(
        &mut self,
        kind: Option<DeclKind>,
        over: IterKind,
        target: &Pattern,
        iterable: &Expr,
        body: &Stmt,
        scope: &Scope,
    ) -> EvalResult<Completion> {
        let source = self.eval(iterable, scope)?;
        let items = match over {
            IterKind::Of => source
                .iter_items()
                .ok_or_else(|| type_error(format!("{} is not iterable", source.type_of())))?,
            IterKind::In => intrinsics::own_keys(&source)
                .into_iter()
                .map(Value::str)
                .collect(),
        };
        for item in items {
            let iteration = scope.child();
            let mode = match kind {
                Some(kind) => Bind::Declare {
                    mutable: kind.is_mutable(),
                },
                None => Bind::Assign,
            };
            self.bind(target, item, &iteration, mode)?;
            match self.exec(body, &iteration)? {
                Completion::Break => break,
                Completion::Return(v) => return Ok(Completion::Return(v)),
                Completion::Normal | Completion::Continue => {}
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_try(
        &mut self,
        block: &[Stmt],
        param: Option<&Pattern>,
        handler: Option<&[Stmt]>,
        finalizer: Option<&[Stmt]>,
        scope: &Scope,
    ) -> EvalResult<Completion> {
        let mut outcome = self.exec_block(block, &scope.child());
        if let Some(handler) = handler {
            outcome = match outcome {
                Err(Abrupt::Throw(thrown)) => {
                    let catch_scope = scope.child();
                    if let Some(param) = param {
                        self.bind(param, thrown, &catch_scope, Bind::Declare { mutable: true })?;
                    }
                    self.exec_block(handler, &catch_scope)
                }
                other => other,
            };
        }
        if let Some(finalizer) = finalizer {
            match self.exec_block(finalizer, &scope.child())? {
                Completion::Normal => {}
                other => return Ok(other),
            }
        }
        outcome
    }

    fn exec_switch(
        &mut self,
        discriminant: &Expr,
        cases: &[SwitchCase],
        scope: &Scope,
    ) -> EvalResult<Completion> {
        let value = self.eval(discriminant, scope)?;
        let mut start = None;
        for (i, case) in cases.iter().enumerate() {
            if let Some(test) = &case.test {
                if self.eval(test, scope)?.strict_equals(&value) {
                    start = Some(i);
                    break;
                }
            }
        }
        let start = start.or_else(|| cases.iter().position(|c| c.test.is_none()));
        let Some(start) = start else {
            return Ok(Completion::Normal);
        };
        let inner = scope.child();
        for case in &cases[start..] {
            match self.exec_block(&case.body, &inner)? {
                Completion::Normal => {}
                Completion::Break => break,
                other => return Ok(other),
            }
        }
        Ok(Completion::Normal)
    }

    // Bindings

    fn bind(&mut self, pattern: &Pattern, value: Value, scope: &Scope, mode: Bind) -> EvalResult<()> {
        match pattern {
            Pattern::Ident(name) => match mode {
                Bind::Declare { mutable } => {
                    scope.declare(name, value, mutable);
                    Ok(())
                }
                Bind::Assign => scope.assign(name, value).map_err(|e| match e {
                    AssignFailure::Undeclared => {
                        throw_error("ReferenceError", format!("{name} is not defined"))
                    }
                    AssignFailure::Constant => type_error("Assignment to constant variable."),
                }),
            },
            Pattern::Member(expr) => match expr.as_ref() {
                Expr::Member { object, prop, .. } => {
                    let target = self.eval(object, scope)?;
                    let key = self.member_key(prop, scope)?;
                    self.set_member(&target, &key, value)
                }
                _ => Err(throw_error("SyntaxError", "Invalid assignment target")),
            },
            Pattern::Object { props, rest } => {
                if value.is_nullish() {
                    return Err(type_error(format!(
                        "Cannot destructure '{}' as it is {}.",
                        value.to_display(),
                        value.to_display()
                    )));
                }
                let mut used = Vec::with_capacity(props.len());
                for (key, target) in props {
                    let key = match key {
                        PropKey::Static(k) => k.clone(),
                        PropKey::Computed(expr) => self.eval(expr, scope)?.to_key(),
                    };
                    let field = self.get_member(&value, &key)?;
                    self.bind(target, field, scope, mode)?;
                    used.push(key);
                }
                if let Some(rest) = rest {
                    let remaining: ObjectMap = intrinsics::own_entries(&value)
                        .into_iter()
                        .filter(|(k, _)| !used.contains(k))
                        .collect();
                    self.bind(rest, Value::object(remaining), scope, mode)?;
                }
                Ok(())
            }
            Pattern::Array { items, rest } => {
                let values = value
                    .iter_items()
                    .ok_or_else(|| type_error(format!("{} is not iterable", value.type_of())))?;
                let mut values = values.into_iter();
                for item in items {
                    let next = values.next().unwrap_or_default();
                    if let Some(target) = item {
                        self.bind(target, next, scope, mode)?;
                    }
                }
                if let Some(rest) = rest {
                    self.bind(rest, Value::array(values.collect()), scope, mode)?;
                }
                Ok(())
            }
            Pattern::Default { target, value: fallback } => {
                let value = if matches!(value, Value::Undefined) {
                    self.eval(fallback, scope)?
                } else {
                    value
                };
                self.bind(target, value, scope, mode)
            }
            Pattern::Opaque(_) => Ok(()),
        }
    }

    // Expressions

    pub(crate) fn eval(&mut self, expr: &Expr, scope: &Scope) -> EvalResult {
        self.tick()?;
        match expr {
            Expr::Undefined | Expr::Opaque(_) => Ok(Value::Undefined),
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Num(n) => Ok(Value::Num(*n)),
            Expr::Str(s) => Ok(Value::str(s)),
            Expr::Template { quasis, exprs } => self.eval_template(quasis, exprs, scope),
            Expr::Ident(name) => scope
                .lookup(name)
                .ok_or_else(|| throw_error("ReferenceError", format!("{name} is not defined"))),
            Expr::Array(items) => Ok(Value::array(self.eval_items(items, scope)?)),
            Expr::Object(props) => self.eval_object(props, scope),
            Expr::Function(def) => Ok(Value::closure(Arc::clone(def), scope.clone())),
            Expr::Unary { op, arg } => self.eval_unary(*op, arg, scope),
            Expr::Update {
                increment,
                prefix,
                target,
            } => self.eval_update(*increment, *prefix, target, scope),
            Expr::Binary { op, left, right } => {
                let l = self.eval(left, scope)?;
                let r = self.eval(right, scope)?;
                self.apply_binary(*op, &l, &r)
            }
            Expr::Logical { op, left, right } => {
                let l = self.eval(left, scope)?;
                if short_circuits(*op, &l) {
                    Ok(l)
                } else {
                    self.eval(right, scope)
                }
            }
            Expr::Assign { op, target, value } => self.eval_assign(*op, target, value, scope),
            Expr::Cond {
                test,
                then,
                otherwise,
            } => {
                if self.eval(test, scope)?.truthy() {
                    self.eval(then, scope)
                } else {
                    self.eval(otherwise, scope)
                }
            }
            Expr::Call { .. } | Expr::Member { .. } => {
                Ok(self.eval_chain(expr, scope)?.unwrap_or_default())
            }
            Expr::New { callee, args } => {
                let ctor = self.eval(callee, scope)?;
                let args = self.eval_items(args, scope)?;
                match &ctor {
                    Value::Func(f) if matches!(f.kind, FunctionKind::Native { .. }) => {
                        self.call_function(f, args)
                    }
                    _ => Err(type_error(format!(
                        "{} is not a constructor",
                        describe_callee(callee)
                    ))),
                }
            }
            Expr::Seq(exprs) => {
                let mut last = Value::Undefined;
                for e in exprs {
                    last = self.eval(e, scope)?;
                }
                Ok(last)
            }
            Expr::Jsx(el) => self.eval_jsx(el, scope),
        }
    }

    /// Member and call chains; `None` when an optional link short-circuits
    fn eval_chain(&mut self, expr: &Expr, scope: &Scope) -> EvalResult<Option<Value>> {
        match expr {
            Expr::Member {
                object,
                prop,
                optional,
            } => {
                let Some(target) = self.eval_chain(object, scope)? else {
                    return Ok(None);
                };
                if *optional && target.is_nullish() {
                    return Ok(None);
                }
                let key = self.member_key(prop, scope)?;
                if target.is_nullish() {
                    return Err(type_error(format!(
                        "Cannot read properties of {} (reading '{key}')",
                        target.to_display()
                    )));
                }
                self.get_member(&target, &key).map(Some)
            }
            Expr::Call {
                callee,
                args,
                optional,
            } => {
                let Some(func) = self.eval_chain(callee, scope)? else {
                    return Ok(None);
                };
                if *optional && func.is_nullish() {
                    return Ok(None);
                }
                let args = self.eval_items(args, scope)?;
                match &func {
                    Value::Func(f) => self.call_function(f, args).map(Some),
                    _ => Err(type_error(format!(
                        "{} is not a function",
                        describe_callee(callee)
                    ))),
                }
            }
            _ => self.eval(expr, scope).map(Some),
        }
    }

    fn member_key(&mut self, prop: &MemberProp, scope: &Scope) -> EvalResult<String> {
        match prop {
            MemberProp::Static(name) => Ok(name.clone()),
            MemberProp::Computed(expr) => Ok(self.eval(expr, scope)?.to_key()),
        }
    }

    pub(crate) fn get_member(&mut self, target: &Value, key: &str) -> EvalResult {
        intrinsics::get_member(target, key)
    }

    pub(crate) fn set_member(&mut self, target: &Value, key: &str, value: Value) -> EvalResult<()> {
        match target {
            Value::Object(map) => {
                map.borrow_mut().insert(key.to_string(), value);
                Ok(())
            }
            Value::Array(items) => {
                let mut items = items.borrow_mut();
                if key == "length" {
                    let len = value.to_number();
                    if !(len >= 0.0 && len.fract() == 0.0) {
                        return Err(throw_error("RangeError", "Invalid array length"));
                    }
                    let len = len as usize;
                    if len > items.len() {
                        self.alloc_array(len)?;
                    }
                    items.resize(len, Value::Undefined);
                } else if let Ok(index) = key.parse::<usize>() {
                    if index >= items.len() {
                        let len = index.saturating_add(1);
                        self.alloc_array(len)?;
                        items.resize(len, Value::Undefined);
                    }
                    items[index] = value;
                }
                Ok(())
            }
            Value::Func(f) => {
                f.props.borrow_mut().insert(key.to_string(), value);
                Ok(())
            }
            Value::Undefined | Value::Null => Err(type_error(format!(
                "Cannot set properties of {} (setting '{key}')",
                target.to_display()
            ))),
            _ => Ok(()),
        }
    }

    fn eval_items(&mut self, items: &[ArrayItem], scope: &Scope) -> EvalResult<Vec<Value>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                ArrayItem::Item(expr) => out.push(self.eval(expr, scope)?),
                ArrayItem::Spread(expr) => {
                    let value = self.eval(expr, scope)?;
                    let spread = value.iter_items().ok_or_else(|| {
                        type_error(format!("{} is not iterable", describe_callee(expr)))
                    })?;
                    self.alloc_array(out.len() + spread.len())?;
                    out.extend(spread);
                }
            }
        }
        Ok(out)
    }

    fn eval_object(&mut self, props: &[ObjectProp], scope: &Scope) -> EvalResult {
        let mut map = ObjectMap::new();
        for prop in props {
            match prop {
                ObjectProp::KeyValue(key, expr) => {
                    let key = match key {
                        PropKey::Static(k) => k.clone(),
                        PropKey::Computed(expr) => self.eval(expr, scope)?.to_key(),
                    };
                    let value = self.eval(expr, scope)?;
                    map.insert(key, value);
                }
                ObjectProp::Spread(expr) => {
                    let source = self.eval(expr, scope)?;
                    map.extend(intrinsics::own_entries(&source));
                }
            }
        }
        Ok(Value::object(map))
    }

    fn eval_template(&mut self, quasis: &[String], exprs: &[Expr], scope: &Scope) -> EvalResult {
        let mut out = String::new();
        for (i, quasi) in quasis.iter().enumerate() {
            self.ensure_string_len(out.len() + quasi.len())?;
            out.push_str(quasi);
            if let Some(expr) = exprs.get(i) {
                let value = self.eval(expr, scope)?;
                let text = self.display(&value, out.len())?;
                out.push_str(&text);
            }
        }
        self.charge(out.len())?;
        Ok(Value::str(out))
    }

    fn eval_unary(&mut self, op: UnaryOp, arg: &Expr, scope: &Scope) -> EvalResult {
        if op == UnaryOp::TypeOf {
            if let Expr::Ident(name) = arg {
                return Ok(Value::str(
                    scope.lookup(name).map_or("undefined", |v| v.type_of()),
                ));
            }
        }
        if op == UnaryOp::Delete {
            if let Expr::Member { object, prop, .. } = arg {
                let target = self.eval(object, scope)?;
                let key = self.member_key(prop, scope)?;
                if let Value::Object(map) = &target {
                    map.borrow_mut().shift_remove(&key);
                }
                return Ok(Value::Bool(true));
            }
            return Ok(Value::Bool(true));
        }
        let value = self.eval(arg, scope)?;
        Ok(match op {
            UnaryOp::Not => Value::Bool(!value.truthy()),
            UnaryOp::Neg => Value::Num(-value.to_number()),
            UnaryOp::Plus => Value::Num(value.to_number()),
            UnaryOp::BitNot => Value::Num(f64::from(!to_int32(value.to_number()))),
            UnaryOp::TypeOf => Value::str(value.type_of()),
            UnaryOp::Void | UnaryOp::Delete => Value::Undefined,
        })
    }

    fn read_target(&mut self, target: &Pattern, scope: &Scope) -> EvalResult {
        match target {
            Pattern::Ident(name) => scope
                .lookup(name)
                .ok_or_else(|| throw_error("ReferenceError", format!("{name} is not defined"))),
            Pattern::Member(expr) => self.eval(expr, scope),
            _ => Err(throw_error("SyntaxError", "Invalid assignment target")),
        }
    }

    /// Assign to a simple target whose object was already evaluated once
    fn write_target(&mut self, target: &Pattern, value: Value, scope: &Scope) -> EvalResult<()> {
        self.bind(target, value, scope, Bind::Assign)
    }

    fn eval_update(
        &mut self,
        increment: bool,
        prefix: bool,
        target: &Pattern,
        scope: &Scope,
    ) -> EvalResult {
        let old = self.read_target(target, scope)?.to_number();
        let new = if increment { old + 1.0 } else { old - 1.0 };
        self.write_target(target, Value::Num(new), scope)?;
        Ok(Value::Num(if prefix { new } else { old }))
    }

    fn eval_assign(
        &mut self,
        op: AssignOp,
        target: &Pattern,
        value: &Expr,
        scope: &Scope,
    ) -> EvalResult {
        let result = match op {
            AssignOp::Assign => self.eval(value, scope)?,
            AssignOp::Compound(bin) => {
                let current = self.read_target(target, scope)?;
                let rhs = self.eval(value, scope)?;
                self.apply_binary(bin, &current, &rhs)?
            }
            AssignOp::Logical(logical) => {
                let current = self.read_target(target, scope)?;
                if short_circuits(logical, &current) {
                    return Ok(current);
                }
                self.eval(value, scope)?
            }
        };
        self.write_target(target, result.clone(), scope)?;
        Ok(result)
    }

    fn eval_jsx(&mut self, el: &JsxElement, scope: &Scope) -> EvalResult {
        let kind = match &el.name {
            JsxName::Fragment => ElementKind::Fragment,
            JsxName::Host(tag) => ElementKind::Host(Rc::from(tag.as_str())),
            JsxName::Component(expr) => match self.eval(expr, scope)? {
                Value::Func(f) => ElementKind::Component(f),
                Value::Str(tag) => ElementKind::Host(tag),
                other => {
                    return Err(type_error(format!(
                        "Element type is invalid: expected a string or a function but got: {}",
                        other.type_of()
                    )))
                }
            },
        };

        let mut props = ObjectMap::new();
        for attr in &el.attrs {
            match attr {
                JsxAttr::Named { name, value } => {
                    let value = match value {
                        Some(expr) => self.eval(expr, scope)?,
                        None => Value::Bool(true),
                    };
                    props.insert(name.clone(), value);
                }
                JsxAttr::Spread(expr) => {
                    let source = self.eval(expr, scope)?;
                    props.extend(intrinsics::own_entries(&source));
                }
            }
        }

        let mut children = Vec::with_capacity(el.children.len());
        for child in &el.children {
            children.push(match child {
                JsxChild::Text(text) => Value::str(text),
                JsxChild::Expr(expr) => self.eval(expr, scope)?,
            });
        }

        Ok(make_element(kind, props, children))
    }
}

/// Build an element value, lifting `key` and dropping `ref`
pub(crate) fn make_element(kind: ElementKind, mut props: ObjectMap, children: Vec<Value>) -> Value {
    let key = props
        .shift_remove("key")
        .filter(|k| !k.is_nullish())
        .map(|k| k.to_display());
    props.shift_remove("ref");
    Value::Element(Rc::new(Element {
        kind,
        props,
        children,
        key,
    }))
}

fn describe_callee(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.clone(),
        Expr::Member {
            object,
            prop: MemberProp::Static(name),
            ..
        } => format!("{}.{name}", describe_callee(object)),
        Expr::Member { object, .. } => format!("{}[...]", describe_callee(object)),
        Expr::Call { callee, .. } => format!("{}(...)", describe_callee(callee)),
        _ => "expression".to_string(),
    }
}

fn short_circuits(op: LogicalOp, left: &Value) -> bool {
    match op {
        LogicalOp::And => !left.truthy(),
        LogicalOp::Or => left.truthy(),
        LogicalOp::Nullish => !left.is_nullish(),
    }
}

fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    (n.trunc() as i64 & 0xFFFF_FFFF) as u32 as i32
}

fn to_primitive(value: &Value) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) | Value::Func(_) | Value::Element(_) => {
            Value::str(value.to_display())
        }
        other => other.clone(),
    }
}

/// Whether `+` treats the operand as text
fn is_textual(value: &Value) -> bool {
    !matches!(
        value,
        Value::Undefined | Value::Null | Value::Bool(_) | Value::Num(_)
    )
}

pub(crate) fn binary(op: BinaryOp, left: &Value, right: &Value) -> EvalResult {
    let num = |f: fn(f64, f64) -> f64| Ok(Value::Num(f(left.to_number(), right.to_number())));
    let int = |f: fn(i32, i32) -> i32| {
        Ok(Value::Num(f64::from(f(
            to_int32(left.to_number()),
            to_int32(right.to_number()),
        ))))
    };
    match op {
        BinaryOp::Add => {
            if is_textual(left) || is_textual(right) {
                Ok(Value::str(format!("{}{}", left.to_display(), right.to_display())))
            } else {
                Ok(Value::Num(left.to_number() + right.to_number()))
            }
        }
        BinaryOp::Sub => num(|a, b| a - b),
        BinaryOp::Mul => num(|a, b| a * b),
        BinaryOp::Div => num(|a, b| a / b),
        BinaryOp::Rem => num(|a, b| a % b),
        BinaryOp::Exp => num(f64::powf),
        BinaryOp::Eq => Ok(Value::Bool(left.loose_equals(right))),
        BinaryOp::NotEq => Ok(Value::Bool(!left.loose_equals(right))),
        BinaryOp::StrictEq => Ok(Value::Bool(left.strict_equals(right))),
        BinaryOp::StrictNotEq => Ok(Value::Bool(!left.strict_equals(right))),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let (l, r) = (to_primitive(left), to_primitive(right));
            let ordering = match (&l, &r) {
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => l.to_number().partial_cmp(&r.to_number()),
            };
            let Some(ordering) = ordering else {
                return Ok(Value::Bool(false));
            };
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::LtEq => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        BinaryOp::BitAnd => int(|a, b| a & b),
        BinaryOp::BitOr => int(|a, b| a | b),
        BinaryOp::BitXor => int(|a, b| a ^ b),
        BinaryOp::Shl => int(|a, b| a.wrapping_shl(b as u32 & 31)),
        BinaryOp::Shr => int(|a, b| a.wrapping_shr(b as u32 & 31)),
        BinaryOp::UShr => {
            let a = to_int32(left.to_number()) as u32;
            let b = to_int32(right.to_number()) as u32 & 31;
            Ok(Value::Num(f64::from(a >> b)))
        }
        BinaryOp::In => match right {
            Value::Object(map) => Ok(Value::Bool(map.borrow().contains_key(&left.to_key()))),
            Value::Array(items) => Ok(Value::Bool(
                left.to_key() == "length"
                    || left
                        .to_key()
                        .parse::<usize>()
                        .is_ok_and(|i| i < items.borrow().len()),
            )),
            Value::Func(f) => Ok(Value::Bool(f.props.borrow().contains_key(&left.to_key()))),
            other => Err(type_error(format!(
                "Cannot use 'in' operator to search for '{}' in {}",
                left.to_display(),
                other.to_display()
            ))),
        },
        BinaryOp::InstanceOf => Ok(Value::Bool(intrinsics::instance_of(left, right))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> Result<Value, ExecutionFault> {
        run_with(src, &SandboxConfig::default())
    }

    fn run_with(src: &str, config: &SandboxConfig) -> Result<Value, ExecutionFault> {
        let tree = livegen_source::parse_tsx(src).expect("parse");
        let mut lowerer = crate::lower::Lowerer::new(src);
        let mut body = lowerer.statements(&crate::lower::named(tree.root_node()));
        let entry = match body.pop() {
            Some(Stmt::Expr(expr)) => Entry::Expression(expr),
            other => panic!("test source must end in an expression, got {other:?}"),
        };
        let program = Program { body, entry };
        let mut interp = Interpreter::new(config);
        interp
            .run_program(&program, Vec::new())
            .map_err(Abrupt::into_fault)
    }

    fn num(src: &str) -> f64 {
        match run(src) {
            Ok(Value::Num(n)) => n,
            other => panic!("expected number from {src}: {other:?}"),
        }
    }

    fn string(src: &str) -> String {
        match run(src) {
            Ok(Value::Str(s)) => s.to_string(),
            other => panic!("expected string from {src}: {other:?}"),
        }
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(num("1 + 2 * 3"), 7.0);
        assert_eq!(num("(1 + 2) * 3"), 9.0);
        assert_eq!(num("2 ** 10"), 1024.0);
        assert_eq!(num("7 % 4"), 3.0);
        assert_eq!(string("'a' + 1"), "a1");
        assert_eq!(num("5 >>> 1"), 2.0);
    }

    #[test]
    fn closures_capture_scope() {
        assert_eq!(
            num("function counter() { let n = 0; return () => ++n; }\nconst c = counter(); c(); c();\nc()"),
            3.0
        );
    }

    #[test]
    fn loops_and_control_flow() {
        assert_eq!(
            num("let total = 0;\nfor (let i = 0; i < 10; i++) { if (i % 2) continue; if (i > 6) break; total += i; }\ntotal"),
            12.0
        );
        assert_eq!(num("let s = 0; for (const x of [1, 2, 3]) s += x;\ns"), 6.0);
        assert_eq!(string("let keys = ''; for (const k in {a: 1, b: 2}) keys += k;\nkeys"), "ab");
        assert_eq!(num("let i = 0; while (i < 5) i++;\ni"), 5.0);
    }

    #[test]
    fn per_iteration_bindings() {
        assert_eq!(
            string("const fs = []; for (let i = 0; i < 3; i++) fs.push(() => i);\nfs.map(f => f()).join(',')"),
            "0,1,2"
        );
    }

    #[test]
    fn destructuring_and_defaults() {
        assert_eq!(
            num("const { a, b: { c = 4 } = {}, ...rest } = { a: 1, d: 2 };\na + c + rest.d"),
            7.0
        );
        assert_eq!(num("const [x, , y = 3, ...zs] = [1, 2];\nx + y + zs.length"), 4.0);
        assert_eq!(num("function f({ n } = { n: 9 }) { return n }\nf()"), 9.0);
    }

    #[test]
    fn optional_chaining_and_nullish() {
        assert!(matches!(run("const o = null;\no?.a.b.c"), Ok(Value::Undefined)));
        assert_eq!(num("const o = { f: null };\no.f ?? 5"), 5.0);
        assert!(matches!(run("const o = {};\no.g?.()"), Ok(Value::Undefined)));
    }

    #[test]
    fn try_catch_finally() {
        assert_eq!(
            string("let log = '';\ntry { null.x } catch (e) { log += e.name } finally { log += '!' }\nlog"),
            "TypeError!"
        );
        assert_eq!(
            string("function f() { try { throw new Error('boom') } catch ({ message }) { return message } }\nf()"),
            "boom"
        );
    }

    #[test]
    fn switch_falls_through() {
        assert_eq!(
            string("function f(x) { let r = ''; switch (x) { case 1: r += 'a'; case 2: r += 'b'; break; default: r += 'z' } return r }\nf(1) + f(2) + f(3)"),
            "abbz"
        );
    }

    #[test]
    fn reference_error_for_unknown_names() {
        let fault = run("fetch('/x')").unwrap_err();
        assert_eq!(
            fault,
            ExecutionFault::Thrown {
                message: "ReferenceError: fetch is not defined".into()
            }
        );
    }

    #[test]
    fn const_reassignment_is_type_error() {
        let fault = run("const a = 1; a = 2;\na").unwrap_err();
        assert!(fault.to_string().contains("Assignment to constant variable"));
    }

    #[test]
    fn fuel_exhaustion_is_uncatchable() {
        let config = SandboxConfig::default().with_fuel(5_000);
        let fault = run_with("try { while (true) {} } catch (e) {}\n1", &config).unwrap_err();
        assert_eq!(fault, ExecutionFault::Budget { fuel: 5_000 });
    }

    #[test]
    fn depth_limit() {
        let config = SandboxConfig::default().with_max_depth(16);
        let fault = run_with("function f(n) { return f(n + 1) }\nf(0)", &config).unwrap_err();
        assert_eq!(fault, ExecutionFault::Depth { limit: 16 });
    }

    fn range_error(message: &str) -> ExecutionFault {
        ExecutionFault::Thrown {
            message: format!("RangeError: {message}"),
        }
    }

    #[test]
    fn oversized_arrays_are_range_errors() {
        for src in [
            "const a = Array(1e15);\na.length",
            "const a = [];\na[4000000000] = 1;\na.length",
            "const a = [1];\na.length = 1e12;\na.length",
            "Array.from({ length: 1e12 }).length",
            "let a = [1];\nwhile (true) { a = [...a, ...a] }\na.length",
        ] {
            assert_eq!(run(src).unwrap_err(), range_error("Invalid array length"), "{src}");
        }
        assert_eq!(num("const a = [];\na[3] = 1;\na.length"), 4.0);
    }

    #[test]
    fn string_growth_is_capped() {
        let config = SandboxConfig::default().with_max_string_len(1024);
        for src in [
            "let s = 'ab';\nwhile (true) { s = s + s }\ns",
            "let s = 'ab';\nwhile (true) { s += `${s}` }\ns",
            "'x'.padStart(5000)",
            "'abcd'.repeat(1000)",
            "Array.from({ length: 600 }, () => 'ab').join('')",
        ] {
            assert_eq!(
                run_with(src, &config).unwrap_err(),
                range_error("Invalid string length"),
                "{src}"
            );
        }
    }

    #[test]
    fn bulk_allocation_consumes_fuel() {
        let config = SandboxConfig::default().with_fuel(1_000);
        let fault = run_with("const a = Array(1000000);\na.length", &config).unwrap_err();
        assert_eq!(fault, ExecutionFault::Budget { fuel: 1_000 });
    }

    #[test]
    fn json_stringify_keeps_integers() {
        assert_eq!(
            string("JSON.stringify({ a: 1, b: [2, 2.5], c: -3 })"),
            r#"{"a":1,"b":[2,2.5],"c":-3}"#
        );
    }

    #[test]
    fn typeof_undeclared_is_safe() {
        assert_eq!(string("typeof window"), "undefined");
    }

    #[test]
    fn template_literals() {
        assert_eq!(string("const n = 2;\n`n=${n} and ${n * 2}`"), "n=2 and 4");
    }
}
