//! Lowered program representation
//!
//! The compiler lowers the tree-sitter CST into these owned, immutable
//! nodes. Function bodies sit behind `Arc` so closures created at runtime
//! can share them without borrowing the unit. Nothing here is `!Send`.

use std::sync::Arc;

/// A lowered source unit
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
    pub entry: Entry,
}

/// How the factory produces its component
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// `return Name;` appended after the body
    Named(String),
    /// The trailing top-level expression, wrapped as `return (...)`
    Expression(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Const,
    Let,
    Var,
}

impl DeclKind {
    #[inline]
    #[must_use]
    pub fn is_mutable(self) -> bool {
        !matches!(self, DeclKind::Const)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Decl {
        kind: DeclKind,
        decls: Vec<(Pattern, Option<Expr>)>,
    },
    /// Hoisted to the top of its block
    Function(Arc<FuncDef>),
    Return(Option<Expr>),
    If {
        test: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    Block(Vec<Stmt>),
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForEach {
        kind: Option<DeclKind>,
        over: IterKind,
        target: Pattern,
        iterable: Expr,
        body: Box<Stmt>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        test: Expr,
    },
    Break,
    Continue,
    Throw(Expr),
    Try {
        block: Vec<Stmt>,
        param: Option<Pattern>,
        handler: Option<Vec<Stmt>>,
        finalizer: Option<Vec<Stmt>>,
    },
    Switch {
        discriminant: Expr,
        cases: Vec<SwitchCase>,
    },
    Empty,
    /// Unsupported construct; executing it is a no-op
    Opaque(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterKind {
    Of,
    In,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    /// `None` for `default:`
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDef {
    pub name: Option<String>,
    pub params: Vec<Pattern>,
    pub rest: Option<Pattern>,
    pub body: FuncBody,
    pub arrow: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FuncBody {
    Expr(Box<Expr>),
    Block(Vec<Stmt>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Ident(String),
    /// Assignment target such as `a.b` or `a[0]`
    Member(Box<Expr>),
    Object {
        props: Vec<(PropKey, Pattern)>,
        rest: Option<Box<Pattern>>,
    },
    Array {
        items: Vec<Option<Pattern>>,
        rest: Option<Box<Pattern>>,
    },
    Default {
        target: Box<Pattern>,
        value: Box<Expr>,
    },
    Opaque(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropKey {
    Static(String),
    Computed(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayItem {
    Item(Expr),
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectProp {
    KeyValue(PropKey, Expr),
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberProp {
    Static(String),
    Computed(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    BitNot,
    TypeOf,
    Void,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Exp,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    In,
    InstanceOf,
}

impl BinaryOp {
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            "%" => Self::Rem,
            "**" => Self::Exp,
            "==" => Self::Eq,
            "!=" => Self::NotEq,
            "===" => Self::StrictEq,
            "!==" => Self::StrictNotEq,
            "<" => Self::Lt,
            "<=" => Self::LtEq,
            ">" => Self::Gt,
            ">=" => Self::GtEq,
            "&" => Self::BitAnd,
            "|" => Self::BitOr,
            "^" => Self::BitXor,
            "<<" => Self::Shl,
            ">>" => Self::Shr,
            ">>>" => Self::UShr,
            "in" => Self::In,
            "instanceof" => Self::InstanceOf,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

impl LogicalOp {
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "&&" => Some(Self::And),
            "||" => Some(Self::Or),
            "??" => Some(Self::Nullish),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Compound(BinaryOp),
    Logical(LogicalOp),
}

impl AssignOp {
    /// Parse `=`, `+=`, `&&=` and friends
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        if token == "=" {
            return Some(Self::Assign);
        }
        let op = token.strip_suffix('=')?;
        LogicalOp::from_token(op)
            .map(Self::Logical)
            .or_else(|| BinaryOp::from_token(op).map(Self::Compound))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Template {
        quasis: Vec<String>,
        exprs: Vec<Expr>,
    },
    Ident(String),
    Array(Vec<ArrayItem>),
    Object(Vec<ObjectProp>),
    Function(Arc<FuncDef>),
    Unary {
        op: UnaryOp,
        arg: Box<Expr>,
    },
    Update {
        increment: bool,
        prefix: bool,
        target: Box<Pattern>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Pattern>,
        value: Box<Expr>,
    },
    Cond {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<ArrayItem>,
        optional: bool,
    },
    New {
        callee: Box<Expr>,
        args: Vec<ArrayItem>,
    },
    Member {
        object: Box<Expr>,
        prop: MemberProp,
        optional: bool,
    },
    Seq(Vec<Expr>),
    Jsx(Box<JsxElement>),
    Opaque(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsxElement {
    pub name: JsxName,
    pub attrs: Vec<JsxAttr>,
    pub children: Vec<JsxChild>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JsxName {
    Fragment,
    /// Lowercase or hyphenated tag
    Host(String),
    /// Anything else resolves as an expression
    Component(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum JsxAttr {
    /// `None` is a bare attribute (`disabled`), i.e. `true`
    Named { name: String, value: Option<Expr> },
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum JsxChild {
    Text(String),
    Expr(Expr),
}
