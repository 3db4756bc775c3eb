//! CST lowering
//!
//! Walks the tree-sitter TSX tree and builds the owned [`ir`](crate::ir)
//! program. Type-level syntax is skipped, TypeScript expression wrappers
//! (`as`, `satisfies`, `!`) are transparent, and anything the evaluator
//! does not model becomes an `Opaque` node plus a
//! [`CompileWarning::Unsupported`].

use crate::error::CompileWarning;
use crate::ir::{
    ArrayItem, AssignOp, BinaryOp, DeclKind, Expr, FuncBody, FuncDef, IterKind, JsxAttr,
    JsxChild, JsxElement, JsxName, LogicalOp, MemberProp, ObjectProp, Pattern, PropKey, Stmt,
    SwitchCase, UnaryOp,
};
use std::sync::Arc;
use tree_sitter::Node;

/// Named children, comments excluded
pub(crate) fn named(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|c| c.kind() != "comment")
        .collect()
}

fn all_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

fn first_named(node: Node<'_>) -> Option<Node<'_>> {
    named(node).into_iter().next()
}

/// Default bound on nested statements, expressions and patterns
pub(crate) const DEFAULT_MAX_NESTING: usize = 128;

pub(crate) struct Lowerer<'s> {
    src: &'s str,
    warnings: Vec<CompileWarning>,
    depth: usize,
    max_nesting: usize,
    /// Line of the first node past the nesting bound
    too_deep: Option<usize>,
}

impl<'s> Lowerer<'s> {
    pub(crate) fn new(src: &'s str) -> Self {
        Self {
            src,
            warnings: Vec::new(),
            depth: 0,
            max_nesting: DEFAULT_MAX_NESTING,
            too_deep: None,
        }
    }

    pub(crate) fn with_max_nesting(mut self, max: usize) -> Self {
        self.max_nesting = max;
        self
    }

    pub(crate) fn max_nesting(&self) -> usize {
        self.max_nesting
    }

    /// Line past which lowering stopped descending, if it ever did
    pub(crate) fn too_deep(&self) -> Option<usize> {
        self.too_deep
    }

    pub(crate) fn into_warnings(self) -> Vec<CompileWarning> {
        self.warnings
    }

    /// Enter one nesting level; false (and recorded) past the bound
    fn descend(&mut self, node: Node<'_>) -> bool {
        if self.depth >= self.max_nesting {
            self.too_deep.get_or_insert(node.start_position().row + 1);
            return false;
        }
        self.depth += 1;
        true
    }

    pub(crate) fn text(&self, node: Node<'_>) -> &'s str {
        node.utf8_text(self.src.as_bytes()).unwrap_or("")
    }

    fn warn(&mut self, node: Node<'_>) -> String {
        let kind = node.kind().to_string();
        tracing::debug!(kind = %kind, line = node.start_position().row + 1, "unsupported syntax");
        self.warnings.push(CompileWarning::Unsupported {
            kind: kind.clone(),
            line: node.start_position().row + 1,
        });
        kind
    }

    fn opaque_expr(&mut self, node: Node<'_>) -> Expr {
        Expr::Opaque(self.warn(node))
    }

    // Statements

    pub(crate) fn statements(&mut self, nodes: &[Node<'_>]) -> Vec<Stmt> {
        nodes.iter().map(|n| self.stmt(*n)).collect()
    }

    fn block(&mut self, node: Node<'_>) -> Vec<Stmt> {
        if node.kind() == "statement_block" {
            self.statements(&named(node))
        } else {
            vec![self.stmt(node)]
        }
    }

    pub(crate) fn stmt(&mut self, node: Node<'_>) -> Stmt {
        if !self.descend(node) {
            return Stmt::Empty;
        }
        let stmt = self.lower_stmt(node);
        self.depth -= 1;
        stmt
    }

    fn lower_stmt(&mut self, node: Node<'_>) -> Stmt {
        match node.kind() {
            "expression_statement" => match first_named(node) {
                Some(e) => Stmt::Expr(self.expr(e)),
                None => Stmt::Empty,
            },
            "lexical_declaration" | "variable_declaration" => self.declaration(node),
            "function_declaration" => Stmt::Function(Arc::new(self.function(node, false))),
            "return_statement" => Stmt::Return(first_named(node).map(|e| self.expr(e))),
            "if_statement" => self.if_statement(node),
            "statement_block" => Stmt::Block(self.statements(&named(node))),
            "for_statement" => self.for_statement(node),
            "for_in_statement" => self.for_in_statement(node),
            "while_statement" => Stmt::While {
                test: self.field_expr(node, "condition"),
                body: Box::new(self.field_stmt(node, "body")),
            },
            "do_statement" => Stmt::DoWhile {
                body: Box::new(self.field_stmt(node, "body")),
                test: self.field_expr(node, "condition"),
            },
            "break_statement" => Stmt::Break,
            "continue_statement" => Stmt::Continue,
            "throw_statement" => match first_named(node) {
                Some(e) => Stmt::Throw(self.expr(e)),
                None => Stmt::Throw(Expr::Undefined),
            },
            "try_statement" => self.try_statement(node),
            "switch_statement" => self.switch_statement(node),
            "labeled_statement" => node
                .child_by_field_name("body")
                .map_or(Stmt::Empty, |b| self.stmt(b)),
            "export_statement" => {
                if let Some(decl) = node.child_by_field_name("declaration") {
                    self.stmt(decl)
                } else if let Some(value) = node.child_by_field_name("value") {
                    Stmt::Expr(self.expr(value))
                } else {
                    Stmt::Empty
                }
            }
            "empty_statement"
            | "import_statement"
            | "interface_declaration"
            | "type_alias_declaration"
            | "ambient_declaration"
            | "abstract_class_declaration"
            | "module"
            | "internal_module"
            | "debugger_statement" => Stmt::Empty,
            _ => Stmt::Opaque(self.warn(node)),
        }
    }

    fn field_stmt(&mut self, node: Node<'_>, field: &str) -> Stmt {
        node.child_by_field_name(field)
            .map_or(Stmt::Empty, |n| self.stmt(n))
    }

    fn field_expr(&mut self, node: Node<'_>, field: &str) -> Expr {
        node.child_by_field_name(field)
            .map_or(Expr::Undefined, |n| self.expr(n))
    }

    fn decl_kind(&self, node: Node<'_>) -> DeclKind {
        match node.child_by_field_name("kind").map(|k| self.text(k)) {
            Some("let") => DeclKind::Let,
            Some("var") => DeclKind::Var,
            Some("const") => DeclKind::Const,
            _ => {
                let head = self.text(node);
                if head.starts_with("let") {
                    DeclKind::Let
                } else if head.starts_with("var") {
                    DeclKind::Var
                } else {
                    DeclKind::Const
                }
            }
        }
    }

    fn declaration(&mut self, node: Node<'_>) -> Stmt {
        let kind = self.decl_kind(node);
        let decls = named(node)
            .into_iter()
            .filter(|c| c.kind() == "variable_declarator")
            .map(|d| {
                let target = d
                    .child_by_field_name("name")
                    .map_or(Pattern::Opaque("declarator".into()), |n| self.pattern(n));
                let value = d.child_by_field_name("value").map(|v| self.expr(v));
                (target, value)
            })
            .collect();
        Stmt::Decl { kind, decls }
    }

    fn if_statement(&mut self, node: Node<'_>) -> Stmt {
        let test = self.field_expr(node, "condition");
        let then = Box::new(self.field_stmt(node, "consequence"));
        let otherwise = node.child_by_field_name("alternative").map(|alt| {
            let inner = if alt.kind() == "else_clause" {
                first_named(alt)
            } else {
                Some(alt)
            };
            Box::new(inner.map_or(Stmt::Empty, |s| self.stmt(s)))
        });
        Stmt::If {
            test,
            then,
            otherwise,
        }
    }

    fn for_statement(&mut self, node: Node<'_>) -> Stmt {
        let init = node.child_by_field_name("initializer").and_then(|n| {
            match n.kind() {
                "empty_statement" => None,
                k if k.ends_with("declaration") || k == "expression_statement" => {
                    Some(Box::new(self.stmt(n)))
                }
                _ => Some(Box::new(Stmt::Expr(self.expr(n)))),
            }
        });
        let test = node
            .child_by_field_name("condition")
            .and_then(|n| match n.kind() {
                "empty_statement" => None,
                "expression_statement" => first_named(n).map(|e| self.expr(e)),
                _ => Some(self.expr(n)),
            });
        let update = node.child_by_field_name("increment").map(|n| self.expr(n));
        Stmt::For {
            init,
            test,
            update,
            body: Box::new(self.field_stmt(node, "body")),
        }
    }

    fn for_in_statement(&mut self, node: Node<'_>) -> Stmt {
        let mut kind = node.child_by_field_name("kind").map(|k| match self.text(k) {
            "let" => DeclKind::Let,
            "var" => DeclKind::Var,
            _ => DeclKind::Const,
        });
        let mut over = node
            .child_by_field_name("operator")
            .map(|op| if self.text(op) == "in" { IterKind::In } else { IterKind::Of });
        for child in all_children(node).into_iter().filter(|c| !c.is_named()) {
            match self.text(child) {
                "const" if kind.is_none() => kind = Some(DeclKind::Const),
                "let" if kind.is_none() => kind = Some(DeclKind::Let),
                "var" if kind.is_none() => kind = Some(DeclKind::Var),
                "of" if over.is_none() => over = Some(IterKind::Of),
                "in" if over.is_none() => over = Some(IterKind::In),
                _ => {}
            }
        }
        let target = node
            .child_by_field_name("left")
            .map_or(Pattern::Opaque("for".into()), |n| self.pattern(n));
        Stmt::ForEach {
            kind,
            over: over.unwrap_or(IterKind::Of),
            target,
            iterable: self.field_expr(node, "right"),
            body: Box::new(self.field_stmt(node, "body")),
        }
    }

    fn try_statement(&mut self, node: Node<'_>) -> Stmt {
        let block = node
            .child_by_field_name("body")
            .map_or_else(Vec::new, |b| self.block(b));
        let (param, handler) = match node.child_by_field_name("handler") {
            Some(h) => (
                h.child_by_field_name("parameter").map(|p| self.pattern(p)),
                Some(
                    h.child_by_field_name("body")
                        .map_or_else(Vec::new, |b| self.block(b)),
                ),
            ),
            None => (None, None),
        };
        let finalizer = node.child_by_field_name("finalizer").map(|f| {
            f.child_by_field_name("body")
                .map_or_else(Vec::new, |b| self.block(b))
        });
        Stmt::Try {
            block,
            param,
            handler,
            finalizer,
        }
    }

    fn switch_statement(&mut self, node: Node<'_>) -> Stmt {
        let discriminant = self.field_expr(node, "value");
        let mut cases = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            for case in named(body) {
                let value = case.child_by_field_name("value");
                let test = match (case.kind(), value) {
                    ("switch_case", Some(v)) => Some(self.expr(v)),
                    _ => None,
                };
                let stmts: Vec<_> = named(case)
                    .into_iter()
                    .filter(|c| value.map_or(true, |v| v.id() != c.id()))
                    .collect();
                cases.push(SwitchCase {
                    test,
                    body: self.statements(&stmts),
                });
            }
        }
        Stmt::Switch {
            discriminant,
            cases,
        }
    }

    // Functions and patterns

    pub(crate) fn function(&mut self, node: Node<'_>, arrow: bool) -> FuncDef {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n).to_string());

        let mut params = Vec::new();
        let mut rest = None;
        if let Some(single) = node.child_by_field_name("parameter") {
            params.push(self.pattern(single));
        } else if let Some(list) = node.child_by_field_name("parameters") {
            for p in named(list) {
                match p.kind() {
                    "rest_pattern" => rest = first_named(p).map(|r| self.pattern(r)),
                    "required_parameter" | "optional_parameter" => {
                        let Some(target) = p.child_by_field_name("pattern") else {
                            continue;
                        };
                        if target.kind() == "rest_pattern" {
                            rest = first_named(target).map(|r| self.pattern(r));
                            continue;
                        }
                        let mut pat = self.pattern(target);
                        if let Some(default) = p.child_by_field_name("value") {
                            pat = Pattern::Default {
                                target: Box::new(pat),
                                value: Box::new(self.expr(default)),
                            };
                        }
                        params.push(pat);
                    }
                    _ => params.push(self.pattern(p)),
                }
            }
        }

        let body = match node.child_by_field_name("body") {
            Some(b) if b.kind() == "statement_block" => FuncBody::Block(self.statements(&named(b))),
            Some(b) => FuncBody::Expr(Box::new(self.expr(b))),
            None => FuncBody::Block(Vec::new()),
        };

        FuncDef {
            name,
            params,
            rest,
            body,
            arrow,
        }
    }

    pub(crate) fn pattern(&mut self, node: Node<'_>) -> Pattern {
        if !self.descend(node) {
            return Pattern::Opaque("pattern".into());
        }
        let pattern = self.lower_pattern(node);
        self.depth -= 1;
        pattern
    }

    fn lower_pattern(&mut self, node: Node<'_>) -> Pattern {
        match node.kind() {
            "identifier" | "shorthand_property_identifier_pattern" => {
                Pattern::Ident(self.text(node).to_string())
            }
            "member_expression" | "subscript_expression" => {
                Pattern::Member(Box::new(self.expr(node)))
            }
            "parenthesized_expression" => first_named(node)
                .map_or(Pattern::Opaque("pattern".into()), |n| self.pattern(n)),
            "assignment_pattern" | "object_assignment_pattern" => {
                let target = node
                    .child_by_field_name("left")
                    .map_or(Pattern::Opaque("pattern".into()), |n| self.pattern(n));
                Pattern::Default {
                    target: Box::new(target),
                    value: Box::new(self.field_expr(node, "right")),
                }
            }
            "object_pattern" | "object" => self.object_pattern(node),
            "array_pattern" | "array" => self.array_pattern(node),
            "non_null_expression" | "as_expression" | "satisfies_expression" => first_named(node)
                .map_or(Pattern::Opaque("pattern".into()), |n| self.pattern(n)),
            _ => Pattern::Opaque(self.warn(node)),
        }
    }

    fn object_pattern(&mut self, node: Node<'_>) -> Pattern {
        let mut props = Vec::new();
        let mut rest = None;
        for child in named(node) {
            match child.kind() {
                "shorthand_property_identifier_pattern" | "shorthand_property_identifier" => {
                    let name = self.text(child).to_string();
                    props.push((PropKey::Static(name.clone()), Pattern::Ident(name)));
                }
                "pair_pattern" | "pair" => {
                    let key = child
                        .child_by_field_name("key")
                        .map_or(PropKey::Static(String::new()), |k| self.prop_key(k));
                    let value = child
                        .child_by_field_name("value")
                        .map_or(Pattern::Opaque("pattern".into()), |v| self.pattern(v));
                    props.push((key, value));
                }
                "object_assignment_pattern" => {
                    let left = child.child_by_field_name("left");
                    let key = left.map_or(String::new(), |l| self.text(l).to_string());
                    let target = left.map_or(Pattern::Opaque("pattern".into()), |l| self.pattern(l));
                    props.push((
                        PropKey::Static(key),
                        Pattern::Default {
                            target: Box::new(target),
                            value: Box::new(self.field_expr(child, "right")),
                        },
                    ));
                }
                "rest_pattern" | "spread_element" => {
                    rest = first_named(child).map(|r| Box::new(self.pattern(r)));
                }
                _ => {
                    self.warn(child);
                }
            }
        }
        Pattern::Object { props, rest }
    }

    fn array_pattern(&mut self, node: Node<'_>) -> Pattern {
        let mut items = Vec::new();
        let mut rest = None;
        let mut slot_filled = false;
        for child in all_children(node) {
            if !child.is_named() {
                if self.text(child) == "," {
                    if !slot_filled {
                        items.push(None);
                    }
                    slot_filled = false;
                }
                continue;
            }
            match child.kind() {
                "comment" => {}
                "rest_pattern" | "spread_element" => {
                    rest = first_named(child).map(|r| Box::new(self.pattern(r)));
                    slot_filled = true;
                }
                _ => {
                    items.push(Some(self.pattern(child)));
                    slot_filled = true;
                }
            }
        }
        Pattern::Array { items, rest }
    }

    fn prop_key(&mut self, node: Node<'_>) -> PropKey {
        match node.kind() {
            "string" => PropKey::Static(unescape(strip_quotes(self.text(node)))),
            "number" => PropKey::Static(crate::value::number_to_string(parse_number(
                self.text(node),
            ))),
            "computed_property_name" => PropKey::Computed(Box::new(
                first_named(node).map_or(Expr::Undefined, |e| self.expr(e)),
            )),
            _ => PropKey::Static(self.text(node).to_string()),
        }
    }

    // Expressions

    pub(crate) fn expr(&mut self, node: Node<'_>) -> Expr {
        if !self.descend(node) {
            return Expr::Undefined;
        }
        let expr = self.lower_expr(node);
        self.depth -= 1;
        expr
    }

    fn lower_expr(&mut self, node: Node<'_>) -> Expr {
        match node.kind() {
            "identifier" => match self.text(node) {
                "undefined" => Expr::Undefined,
                name => Expr::Ident(name.to_string()),
            },
            "undefined" => Expr::Undefined,
            "null" => Expr::Null,
            "true" => Expr::Bool(true),
            "false" => Expr::Bool(false),
            "this" => Expr::Undefined,
            "number" => Expr::Num(parse_number(self.text(node))),
            "string" => Expr::Str(unescape(strip_quotes(self.text(node)))),
            "template_string" => self.template(node),
            "parenthesized_expression" => match named(node).as_slice() {
                [single] => self.expr(*single),
                many => Expr::Seq(many.iter().map(|n| self.expr(*n)).collect()),
            },
            "as_expression" | "satisfies_expression" | "non_null_expression"
            | "instantiation_expression" | "type_assertion" => {
                // the operand is the only non-type child
                match named(node).into_iter().find(|n| !n.kind().contains("type")) {
                    Some(inner) => self.expr(inner),
                    None => Expr::Undefined,
                }
            }
            "array" => Expr::Array(self.items(node)),
            "object" => self.object(node),
            "arrow_function" => Expr::Function(Arc::new(self.function(node, true))),
            "function_expression" | "function" => {
                Expr::Function(Arc::new(self.function(node, false)))
            }
            "call_expression" => self.call(node),
            "new_expression" => Expr::New {
                callee: Box::new(self.field_expr(node, "constructor")),
                args: node
                    .child_by_field_name("arguments")
                    .map_or_else(Vec::new, |a| self.items(a)),
            },
            "member_expression" => {
                let object = Box::new(self.field_expr(node, "object"));
                let prop = node.child_by_field_name("property").map_or_else(
                    || MemberProp::Static(String::new()),
                    |p| MemberProp::Static(self.text(p).to_string()),
                );
                Expr::Member {
                    object,
                    prop,
                    optional: has_optional_chain(node),
                }
            }
            "subscript_expression" => Expr::Member {
                object: Box::new(self.field_expr(node, "object")),
                prop: MemberProp::Computed(Box::new(self.field_expr(node, "index"))),
                optional: has_optional_chain(node),
            },
            "assignment_expression" => self.assignment(node, AssignOp::Assign),
            "augmented_assignment_expression" => {
                let token = node
                    .child_by_field_name("operator")
                    .map_or("", |o| self.text(o));
                match AssignOp::from_token(token) {
                    Some(op) => self.assignment(node, op),
                    None => self.opaque_expr(node),
                }
            }
            "binary_expression" => self.binary(node),
            "unary_expression" => {
                let token = node
                    .child_by_field_name("operator")
                    .map_or("", |o| self.text(o));
                let op = match token {
                    "!" => UnaryOp::Not,
                    "-" => UnaryOp::Neg,
                    "+" => UnaryOp::Plus,
                    "~" => UnaryOp::BitNot,
                    "typeof" => UnaryOp::TypeOf,
                    "void" => UnaryOp::Void,
                    "delete" => UnaryOp::Delete,
                    _ => return self.opaque_expr(node),
                };
                Expr::Unary {
                    op,
                    arg: Box::new(self.field_expr(node, "argument")),
                }
            }
            "update_expression" => {
                let op = node.child_by_field_name("operator");
                let arg = node.child_by_field_name("argument");
                match (op, arg) {
                    (Some(op), Some(arg)) => Expr::Update {
                        increment: self.text(op) == "++",
                        prefix: op.start_byte() < arg.start_byte(),
                        target: Box::new(self.pattern(arg)),
                    },
                    _ => self.opaque_expr(node),
                }
            }
            "ternary_expression" => Expr::Cond {
                test: Box::new(self.field_expr(node, "condition")),
                then: Box::new(self.field_expr(node, "consequence")),
                otherwise: Box::new(self.field_expr(node, "alternative")),
            },
            "sequence_expression" => {
                let mut exprs = Vec::new();
                self.flatten_sequence(node, &mut exprs);
                Expr::Seq(exprs)
            }
            "jsx_element" | "jsx_self_closing_element" | "jsx_fragment" => {
                Expr::Jsx(Box::new(self.jsx(node)))
            }
            _ => self.opaque_expr(node),
        }
    }

    fn flatten_sequence(&mut self, node: Node<'_>, out: &mut Vec<Expr>) {
        let mut pending = named(node);
        pending.reverse();
        while let Some(child) = pending.pop() {
            if child.kind() == "sequence_expression" {
                pending.extend(named(child).into_iter().rev());
            } else {
                out.push(self.expr(child));
            }
        }
    }

    fn template(&mut self, node: Node<'_>) -> Expr {
        let start = node.start_byte() + 1;
        let end = node.end_byte().saturating_sub(1).max(start);
        let mut quasis = Vec::new();
        let mut exprs = Vec::new();
        let mut cursor = start;
        for sub in named(node)
            .into_iter()
            .filter(|c| c.kind() == "template_substitution")
        {
            quasis.push(unescape(self.src.get(cursor..sub.start_byte()).unwrap_or("")));
            exprs.push(first_named(sub).map_or(Expr::Undefined, |e| self.expr(e)));
            cursor = sub.end_byte();
        }
        quasis.push(unescape(self.src.get(cursor..end).unwrap_or("")));
        Expr::Template { quasis, exprs }
    }

    fn items(&mut self, node: Node<'_>) -> Vec<ArrayItem> {
        named(node)
            .into_iter()
            .map(|child| {
                if child.kind() == "spread_element" {
                    ArrayItem::Spread(first_named(child).map_or(Expr::Undefined, |e| self.expr(e)))
                } else {
                    ArrayItem::Item(self.expr(child))
                }
            })
            .collect()
    }

    fn object(&mut self, node: Node<'_>) -> Expr {
        let mut props = Vec::new();
        for child in named(node) {
            match child.kind() {
                "pair" => {
                    let key = child
                        .child_by_field_name("key")
                        .map_or(PropKey::Static(String::new()), |k| self.prop_key(k));
                    props.push(ObjectProp::KeyValue(key, self.field_expr(child, "value")));
                }
                "shorthand_property_identifier" => {
                    let name = self.text(child).to_string();
                    props.push(ObjectProp::KeyValue(
                        PropKey::Static(name.clone()),
                        Expr::Ident(name),
                    ));
                }
                "spread_element" => props.push(ObjectProp::Spread(
                    first_named(child).map_or(Expr::Undefined, |e| self.expr(e)),
                )),
                "method_definition" => {
                    let key = child
                        .child_by_field_name("name")
                        .map_or(PropKey::Static(String::new()), |k| self.prop_key(k));
                    let mut def = self.function(child, false);
                    if let PropKey::Static(name) = &key {
                        def.name = Some(name.clone());
                    }
                    props.push(ObjectProp::KeyValue(key, Expr::Function(Arc::new(def))));
                }
                _ => {
                    self.warn(child);
                }
            }
        }
        Expr::Object(props)
    }

    fn call(&mut self, node: Node<'_>) -> Expr {
        let Some(args) = node.child_by_field_name("arguments") else {
            return self.opaque_expr(node);
        };
        if args.kind() != "arguments" {
            // tagged template
            return self.opaque_expr(node);
        }
        let callee = node.child_by_field_name("function");
        if callee.is_some_and(|c| c.kind() == "import") {
            return self.opaque_expr(node);
        }
        Expr::Call {
            callee: Box::new(callee.map_or(Expr::Undefined, |c| self.expr(c))),
            args: self.items(args),
            optional: has_optional_chain(node),
        }
    }

    fn assignment(&mut self, node: Node<'_>, op: AssignOp) -> Expr {
        let target = node
            .child_by_field_name("left")
            .map_or(Pattern::Opaque("assignment".into()), |l| self.pattern(l));
        Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(self.field_expr(node, "right")),
        }
    }

    fn binary(&mut self, node: Node<'_>) -> Expr {
        let token = node
            .child_by_field_name("operator")
            .map_or("", |o| self.text(o));
        let left = Box::new(self.field_expr(node, "left"));
        let right = Box::new(self.field_expr(node, "right"));
        if let Some(op) = LogicalOp::from_token(token) {
            return Expr::Logical { op, left, right };
        }
        match BinaryOp::from_token(token) {
            Some(op) => Expr::Binary { op, left, right },
            None => self.opaque_expr(node),
        }
    }

    // JSX

    fn jsx(&mut self, node: Node<'_>) -> JsxElement {
        match node.kind() {
            "jsx_self_closing_element" => {
                let (name, attrs) = self.jsx_head(node);
                JsxElement {
                    name,
                    attrs,
                    children: Vec::new(),
                }
            }
            "jsx_fragment" => JsxElement {
                name: JsxName::Fragment,
                attrs: Vec::new(),
                children: self.jsx_children(&named(node)),
            },
            _ => {
                let parts = named(node);
                let open = node
                    .child_by_field_name("open_tag")
                    .or_else(|| parts.iter().copied().find(|c| c.kind() == "jsx_opening_element"));
                let (name, attrs) = match open {
                    Some(open) => self.jsx_head(open),
                    None => (JsxName::Fragment, Vec::new()),
                };
                let children: Vec<_> = parts
                    .into_iter()
                    .filter(|c| !matches!(c.kind(), "jsx_opening_element" | "jsx_closing_element"))
                    .collect();
                JsxElement {
                    name,
                    attrs,
                    children: self.jsx_children(&children),
                }
            }
        }
    }

    fn jsx_head(&mut self, node: Node<'_>) -> (JsxName, Vec<JsxAttr>) {
        let name_node = node.child_by_field_name("name");
        let name = match name_node {
            None => JsxName::Fragment,
            Some(n) => jsx_name(self.text(n)),
        };

        let mut attrs = Vec::new();
        for child in named(node) {
            if name_node.is_some_and(|n| n.id() == child.id()) {
                continue;
            }
            match child.kind() {
                "jsx_attribute" => {
                    let parts = named(child);
                    let Some(key) = parts.first() else { continue };
                    let value = parts.get(1).map(|v| self.jsx_attr_value(*v));
                    attrs.push(JsxAttr::Named {
                        name: self.text(*key).to_string(),
                        value,
                    });
                }
                "jsx_expression" => {
                    let inner = first_named(child);
                    let expr = match inner {
                        Some(s) if s.kind() == "spread_element" => {
                            first_named(s).map_or(Expr::Undefined, |e| self.expr(e))
                        }
                        Some(e) => self.expr(e),
                        None => continue,
                    };
                    attrs.push(JsxAttr::Spread(expr));
                }
                _ => {}
            }
        }
        (name, attrs)
    }

    fn jsx_attr_value(&mut self, node: Node<'_>) -> Expr {
        match node.kind() {
            "string" => Expr::Str(decode_entities(strip_quotes(self.text(node)))),
            "jsx_expression" => first_named(node).map_or(Expr::Undefined, |e| self.expr(e)),
            _ => self.expr(node),
        }
    }

    fn jsx_children(&mut self, nodes: &[Node<'_>]) -> Vec<JsxChild> {
        let mut children = Vec::new();
        for child in nodes {
            match child.kind() {
                "jsx_text" => {
                    if let Some(text) = jsx_text(self.text(*child)) {
                        children.push(JsxChild::Text(text));
                    }
                }
                "html_character_reference" => {
                    children.push(JsxChild::Text(decode_entities(self.text(*child))));
                }
                "jsx_expression" => match first_named(*child) {
                    Some(s) if s.kind() == "spread_element" => children.push(JsxChild::Expr(
                        first_named(s).map_or(Expr::Undefined, |e| self.expr(e)),
                    )),
                    Some(e) => children.push(JsxChild::Expr(self.expr(e))),
                    None => {}
                },
                _ => children.push(JsxChild::Expr(self.expr(*child))),
            }
        }
        children
    }
}

fn has_optional_chain(node: Node<'_>) -> bool {
    all_children(node)
        .iter()
        .any(|c| c.kind() == "optional_chain" || c.kind() == "?.")
}

fn jsx_name(text: &str) -> JsxName {
    let starts_lower = text.chars().next().is_some_and(|c| c.is_ascii_lowercase());
    if text.contains('.') {
        let mut parts = text.split('.');
        let head = Expr::Ident(parts.next().unwrap_or_default().to_string());
        let expr = parts.fold(head, |object, part| Expr::Member {
            object: Box::new(object),
            prop: MemberProp::Static(part.to_string()),
            optional: false,
        });
        JsxName::Component(expr)
    } else if starts_lower || text.contains('-') || text.contains(':') {
        JsxName::Host(text.to_string())
    } else {
        JsxName::Component(Expr::Ident(text.to_string()))
    }
}

fn strip_quotes(raw: &str) -> &str {
    if raw.len() >= 2 {
        &raw[1..raw.len() - 1]
    } else {
        ""
    }
}

pub(crate) fn parse_number(raw: &str) -> f64 {
    let cleaned: String = raw.chars().filter(|c| *c != '_').collect();
    let lower = cleaned.to_ascii_lowercase();
    let lower = lower.strip_suffix('n').unwrap_or(&lower);
    let radix = |digits: &str, radix: u32| {
        u64::from_str_radix(digits, radix).map_or(f64::NAN, |v| v as f64)
    };
    if let Some(hex) = lower.strip_prefix("0x") {
        return radix(hex, 16);
    }
    if let Some(oct) = lower.strip_prefix("0o") {
        return radix(oct, 8);
    }
    if let Some(bin) = lower.strip_prefix("0b") {
        return radix(bin, 2);
    }
    lower.parse::<f64>().unwrap_or(f64::NAN)
}

/// Decode JS string escapes
pub(crate) fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('v') => out.push('\u{b}'),
            Some('0') => out.push('\0'),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                out.extend(u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32));
            }
            Some('u') => {
                let hex: String = if chars.peek() == Some(&'{') {
                    chars.next();
                    chars.by_ref().take_while(|c| *c != '}').collect()
                } else {
                    chars.by_ref().take(4).collect()
                };
                out.push(
                    u32::from_str_radix(&hex, 16)
                        .ok()
                        .and_then(char::from_u32)
                        .unwrap_or('\u{FFFD}'),
                );
            }
            Some('\n') => {}
            Some('\r') => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// JSX text whitespace rules: lines are trimmed where they meet a line
/// break, blank lines vanish, the rest join with single spaces
fn jsx_text(raw: &str) -> Option<String> {
    let lines: Vec<&str> = raw.split('\n').collect();
    let last_non_empty = lines.iter().rposition(|l| !l.trim().is_empty())?;
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        let line = line.replace('\t', " ");
        let mut part = line.as_str();
        if i != 0 {
            part = part.trim_start();
        }
        if i != lines.len() - 1 {
            part = part.trim_end();
        }
        if !part.is_empty() {
            out.push_str(part);
            if i != last_non_empty {
                out.push(' ');
            }
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(decode_entities(&out))
    }
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').filter(|end| *end <= 10).and_then(|end| {
            let entity = &tail[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                "copy" => Some('\u{a9}'),
                "rarr" => Some('\u{2192}'),
                "larr" => Some('\u{2190}'),
                "hellip" => Some('\u{2026}'),
                "middot" => Some('\u{b7}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|h| u32::from_str_radix(h, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
