//! Compiler/loader
//!
//! Parses sanitized source with the TSX grammar, lowers it into a
//! [`Program`] and resolves the entry unit once, as a [`UnitShape`].

use crate::error::{CompileWarning, SynthesisError};
use crate::ir::{ArrayItem, Entry, Expr, Pattern, Program, Stmt};
use crate::lower::{named, Lowerer, DEFAULT_MAX_NESTING};
use livegen_source::{ContentHash, SanitizedSource};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Shortest bare-expression source accepted, in bytes
    pub min_expression_len: usize,
    /// Deepest statement/expression nesting lowered
    pub max_nesting: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            min_expression_len: 16,
            max_nesting: DEFAULT_MAX_NESTING,
        }
    }
}

impl CompilerConfig {
    #[must_use]
    pub fn with_min_expression_len(mut self, len: usize) -> Self {
        self.min_expression_len = len;
        self
    }

    #[must_use]
    pub fn with_max_nesting(mut self, max: usize) -> Self {
        self.max_nesting = max;
        self
    }
}

/// How the unit produces its component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum UnitShape {
    /// A top-level function, returned by name
    Named { ident: String },
    /// A single top-level expression
    Expression,
}

impl UnitShape {
    #[inline]
    #[must_use]
    pub fn ident(&self) -> Option<&str> {
        match self {
            Self::Named { ident } => Some(ident),
            Self::Expression => None,
        }
    }
}

/// An immutable, compiled screen unit
#[derive(Debug)]
pub struct CompiledUnit {
    id: ContentHash,
    shape: UnitShape,
    warnings: Vec<CompileWarning>,
    program: Program,
}

impl CompiledUnit {
    /// Content hash of the sanitized text
    #[inline]
    #[must_use]
    pub fn id(&self) -> ContentHash {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn shape(&self) -> &UnitShape {
        &self.shape
    }

    #[inline]
    #[must_use]
    pub fn warnings(&self) -> &[CompileWarning] {
        &self.warnings
    }

    #[inline]
    #[must_use]
    pub fn program(&self) -> &Program {
        &self.program
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Compiler {
    config: CompilerConfig,
}

impl Compiler {
    #[must_use]
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile one sanitized source into a fresh unit
    ///
    /// # Errors
    /// `Syntax` for any parse error, `TooDeep` past the nesting bound,
    /// `TooShort` for a bare expression under the configured length,
    /// `NoEntry` when nothing can be rendered
    pub fn compile(&self, source: &SanitizedSource) -> Result<Arc<CompiledUnit>, SynthesisError> {
        let text = source.text();
        let tree = livegen_source::parse_tsx(text)?;
        let top = named(tree.root_node());

        let mut lowerer = Lowerer::new(text).with_max_nesting(self.config.max_nesting);
        let mut body = lowerer.statements(&top);
        if let Some(line) = lowerer.too_deep() {
            return Err(SynthesisError::TooDeep {
                limit: lowerer.max_nesting(),
                line,
            });
        }

        let functions = component_candidates(&body);
        let bound = |name: &str| body.iter().any(|stmt| binds(stmt, name));

        let ident = source
            .default_export()
            .filter(|hint| bound(hint))
            .map(str::to_string)
            .or_else(|| functions.iter().rev().find(|n| is_capitalized(n)).cloned())
            .or_else(|| functions.last().cloned());

        let (shape, entry) = match ident {
            Some(ident) => (
                UnitShape::Named {
                    ident: ident.clone(),
                },
                Entry::Named(ident),
            ),
            None => {
                while matches!(body.last(), Some(Stmt::Empty)) {
                    body.pop();
                }
                let Some(Stmt::Expr(expr)) = body.last() else {
                    return Err(SynthesisError::NoEntry);
                };
                let expr = expr.clone();
                let index = body.len() - 1;
                let len = top
                    .get(index)
                    .map_or(0, |node| expression_len(lowerer.text(*node)));
                if len < self.config.min_expression_len {
                    return Err(SynthesisError::TooShort {
                        len,
                        min: self.config.min_expression_len,
                    });
                }
                body.pop();
                (UnitShape::Expression, Entry::Expression(expr))
            }
        };

        let mut warnings = lowerer.into_warnings();
        if let UnitShape::Named { ident } = &shape {
            warnings.extend(
                functions
                    .iter()
                    .filter(|name| is_capitalized(name) && *name != ident)
                    .map(|name| CompileWarning::HelperOutsideEntry { name: name.clone() }),
            );
        }

        let unit = CompiledUnit {
            id: source.hash(),
            shape,
            warnings,
            program: Program { body, entry },
        };
        debug!(
            unit = %unit.id.short(),
            shape = ?unit.shape,
            warnings = unit.warnings.len(),
            "compiled unit"
        );
        Ok(Arc::new(unit))
    }
}

fn is_capitalized(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

fn expression_len(text: &str) -> usize {
    text.trim().trim_end_matches(';').trim().len()
}

/// Top-level function declarations and function-valued bindings, in order
fn component_candidates(body: &[Stmt]) -> Vec<String> {
    let mut names = Vec::new();
    for stmt in body {
        match stmt {
            Stmt::Function(def) => names.extend(def.name.clone()),
            Stmt::Decl { decls, .. } => {
                for (pattern, init) in decls {
                    if let (Pattern::Ident(name), Some(init)) = (pattern, init) {
                        if is_function_like(init) {
                            names.push(name.clone());
                        }
                    }
                }
            }
            _ => {}
        }
    }
    names
}

/// `() => ...`, `function () {}` or a wrapper call such as `memo(() => ...)`
fn is_function_like(expr: &Expr) -> bool {
    match expr {
        Expr::Function(_) => true,
        Expr::Call { args, .. } => args
            .iter()
            .any(|arg| matches!(arg, ArrayItem::Item(Expr::Function(_)))),
        _ => false,
    }
}

fn binds(stmt: &Stmt, name: &str) -> bool {
    match stmt {
        Stmt::Function(def) => def.name.as_deref() == Some(name),
        Stmt::Decl { decls, .. } => decls
            .iter()
            .any(|(pattern, _)| matches!(pattern, Pattern::Ident(n) if n == name)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livegen_source::Sanitizer;

    fn compile(raw: &str) -> Result<Arc<CompiledUnit>, SynthesisError> {
        let clean = Sanitizer::default().sanitize(raw).unwrap();
        Compiler::default().compile(&clean)
    }

    #[test]
    fn named_entry_prefers_default_export() {
        let unit = compile(
            "function Card() { return <div/>; }\nexport default function Screen() { return <Card/>; }\nfunction Footer() { return null; }",
        )
        .unwrap();
        assert_eq!(unit.shape().ident(), Some("Screen"));
        assert!(unit
            .warnings()
            .contains(&CompileWarning::HelperOutsideEntry { name: "Card".into() }));
    }

    #[test]
    fn named_entry_falls_back_to_last_capitalized() {
        let unit = compile("const helper = () => 1;\nconst Main = () => <p>{helper()}</p>;\nfunction util() {}").unwrap();
        assert_eq!(unit.shape(), &UnitShape::Named { ident: "Main".into() });
    }

    #[test]
    fn expression_entry() {
        let unit = compile("(() => <section>hello world</section>)").unwrap();
        assert_eq!(unit.shape(), &UnitShape::Expression);
        assert!(matches!(unit.program().entry, Entry::Expression(_)));
    }

    #[test]
    fn short_expression_is_rejected() {
        let clean = Sanitizer::default().sanitize("(() => <b/>)").unwrap();
        let err = Compiler::default().compile(&clean).unwrap_err();
        assert!(matches!(err, SynthesisError::TooShort { min: 16, .. }), "{err:?}");

        let relaxed = Compiler::new(CompilerConfig::default().with_min_expression_len(4));
        assert!(relaxed.compile(&clean).is_ok());
    }

    #[test]
    fn syntax_errors_are_located() {
        let clean = Sanitizer::default()
            .sanitize("function App() {\n  return <div>;\n}")
            .unwrap();
        let err = Compiler::default().compile(&clean).unwrap_err();
        assert!(matches!(err, SynthesisError::Syntax { .. }), "{err:?}");
    }

    fn nested(depth: usize) -> String {
        format!(
            "function App() {{ return <p>{{{}1{}}}</p> }}",
            "(".repeat(depth),
            ")".repeat(depth)
        )
    }

    #[test]
    fn deep_nesting_is_a_synthesis_error() {
        let clean = Sanitizer::default().sanitize(&nested(20_000)).unwrap();
        let err = Compiler::default().compile(&clean).unwrap_err();
        assert!(
            matches!(err, SynthesisError::TooDeep { limit: 128, line: 1 }),
            "{err:?}"
        );

        assert!(compile(&nested(50)).is_ok());
        let strict = Compiler::new(CompilerConfig::default().with_max_nesting(8));
        let clean = Sanitizer::default().sanitize(&nested(50)).unwrap();
        assert!(matches!(
            strict.compile(&clean),
            Err(SynthesisError::TooDeep { limit: 8, .. })
        ));
    }

    #[test]
    fn same_text_same_id() {
        let a = compile("function App() { return null }").unwrap();
        let b = compile("function App() { return null }").unwrap();
        assert_eq!(a.id(), b.id());
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn units_are_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CompiledUnit>();
    }
}
