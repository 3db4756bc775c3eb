//! Tree-sitter parsing for generated component source
//!
//! All dialects are parsed with the TSX grammar: it accepts plain JSX and
//! tolerates any type syntax the sanitizer leaves behind.

use crate::error::ParseError;
use std::ops::Range;

fn tsx_parser() -> Result<tree_sitter::Parser, ParseError> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&tree_sitter_typescript::LANGUAGE_TSX.into())
        .map_err(|e| ParseError::ParserInit(e.to_string()))?;
    Ok(parser)
}

/// Parse `source` with the TSX grammar, failing on any ERROR or MISSING node
///
/// # Errors
/// Returns `ParseError::SyntaxError` locating the first broken node
pub fn parse_tsx(source: &str) -> Result<tree_sitter::Tree, ParseError> {
    let tree = tsx_parser()?
        .parse(source, None)
        .ok_or(ParseError::ParseFailed)?;

    let root = tree.root_node();
    if root.has_error() {
        let broken = first_broken(root).unwrap_or(root);
        let pos = broken.start_position();
        return Err(ParseError::SyntaxError {
            line: pos.row + 1,
            column: pos.column + 1,
            snippet: snippet_at(source, broken.start_byte()),
        });
    }

    Ok(tree)
}

/// Syntax check only
///
/// # Errors
/// See [`parse_tsx`]
pub fn check_syntax(source: &str) -> Result<(), ParseError> {
    parse_tsx(source).map(|_| ())
}

/// Byte ranges of JSX child text holding more than whitespace
///
/// The parse is tolerant: text in the recovered parts of a broken tree is
/// reported too.
pub(crate) fn jsx_text_ranges(source: &str) -> Vec<Range<usize>> {
    let Some(tree) = tsx_parser().ok().and_then(|mut p| p.parse(source, None)) else {
        return Vec::new();
    };
    let mut ranges = Vec::new();
    let mut cursor = tree.walk();
    loop {
        let node = cursor.node();
        if node.kind() == "jsx_text" {
            if source
                .get(node.byte_range())
                .is_some_and(|text| !text.trim().is_empty())
            {
                ranges.push(node.byte_range());
            }
        } else if cursor.goto_first_child() {
            continue;
        }
        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                return ranges;
            }
        }
    }
}

/// First ERROR or MISSING node in document order
fn first_broken(root: tree_sitter::Node<'_>) -> Option<tree_sitter::Node<'_>> {
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if node.has_error() && cursor.goto_first_child() {
            continue;
        }
        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                return None;
            }
        }
    }
}

fn snippet_at(source: &str, start: usize) -> String {
    let line = source[start.min(source.len())..]
        .lines()
        .next()
        .unwrap_or("");
    line.chars().take(40).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_jsx_component() {
        assert!(check_syntax("function App(){ return <div className=\"a\">{1}</div> }").is_ok());
    }

    #[test]
    fn accepts_leftover_types() {
        assert!(check_syntax("const App = (p: { n: number }): JSX.Element => <b>{p.n}</b>;").is_ok());
    }

    #[test]
    fn locates_error() {
        let err = check_syntax("function App(){\n  return <div>\n}").unwrap_err();
        match err {
            ParseError::SyntaxError { line, .. } => assert!(line >= 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn deep_nesting_is_located_without_recursion() {
        let depth = 20_000;
        let source = format!(
            "function App(){{ return <p>{{{}1{}}}</p> }}",
            "(".repeat(depth),
            ")".repeat(depth - 1)
        );
        assert!(matches!(
            check_syntax(&source),
            Err(ParseError::SyntaxError { .. })
        ));
    }

    #[test]
    fn finds_jsx_text_only() {
        let source = "function App(){ const s = 'as Foo'; return <p>\n  Signed in as Admin <b>{s}</b></p> }";
        let texts: Vec<&str> = jsx_text_ranges(source)
            .into_iter()
            .map(|r| &source[r])
            .collect();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("Signed in as Admin"));
    }

    #[test]
    fn rejects_truncated_source() {
        assert!(check_syntax("function App(){ return (<div><p>hi</p>").is_err());
    }
}
