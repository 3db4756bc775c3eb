//! Source sanitizer
//!
//! Normalizes raw model output into text that can be evaluated standalone:
//! fences and echo lines go, external declarations go, export wrappers
//! become bare declarations, and simple type-only syntax is stripped.
//!
//! Every rewrite runs on a literal-masked copy of the text (see
//! [`crate::literal`]), so string, template, comment and JSX text content
//! is never touched. The type-stripping passes are heuristics; they are bracketed by
//! a declaration count that reports suspected collateral loss.

use crate::checkpoint::Markers;
use crate::error::SanitizeError;
use crate::hash::ContentHash;
use crate::literal::{self, CLOSE, OPEN, PLACEHOLDER};
use crate::syntax::jsx_text_ranges;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source dialect named by a fence tag or echo line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    Jsx,
    Tsx,
    JavaScript,
    TypeScript,
}

impl Dialect {
    /// Recognize a fence tag (`jsx`, `tsx`, `javascript`, ...)
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "jsx" => Some(Dialect::Jsx),
            "tsx" => Some(Dialect::Tsx),
            "js" | "javascript" | "react" => Some(Dialect::JavaScript),
            "ts" | "typescript" => Some(Dialect::TypeScript),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Dialect::Jsx => "jsx",
            Dialect::Tsx => "tsx",
            Dialect::JavaScript => "javascript",
            Dialect::TypeScript => "typescript",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Non-fatal sanitizer findings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SanitizationWarning {
    /// Fewer top-level declarations after type stripping than before
    DeclarationsLost { before: usize, after: usize },
    /// Reserved private-use characters were removed from the input
    ReservedCharactersRemoved { count: usize },
}

impl fmt::Display for SanitizationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeclarationsLost { before, after } => write!(
                f,
                "declaration count dropped from {before} to {after} while stripping types"
            ),
            Self::ReservedCharactersRemoved { count } => {
                write!(f, "removed {count} reserved characters")
            }
        }
    }
}

/// Sanitizer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizerConfig {
    /// Run the type-stripping passes
    pub strip_types: bool,
    /// Inputs larger than this are refused
    pub max_source_bytes: usize,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            strip_types: true,
            max_source_bytes: 512 * 1024,
        }
    }
}

impl SanitizerConfig {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_strip_types(mut self, strip: bool) -> Self {
        self.strip_types = strip;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_max_source_bytes(mut self, max: usize) -> Self {
        self.max_source_bytes = max;
        self
    }
}

/// Sanitized, self-contained component source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedSource {
    text: String,
    default_export: Option<String>,
    dialect: Option<Dialect>,
    warnings: Vec<SanitizationWarning>,
    hash: ContentHash,
}

impl SanitizedSource {
    #[inline]
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Identifier named by a stripped `export default` wrapper
    #[inline]
    #[must_use]
    pub fn default_export(&self) -> Option<&str> {
        self.default_export.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn dialect(&self) -> Option<Dialect> {
        self.dialect
    }

    #[inline]
    #[must_use]
    pub fn warnings(&self) -> &[SanitizationWarning] {
        &self.warnings
    }

    /// Hash of the sanitized text
    #[inline]
    #[must_use]
    pub fn hash(&self) -> ContentHash {
        self.hash
    }
}

static FENCE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:`{3,}|~{3,})\s*([A-Za-z0-9_+-]*)\s*$").expect("fence regex"));

static IMPORT_NAMESPACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?m)^[ \t]*import\s+(?:type\s+)?(?:[A-Za-z_$][\w$]*\s*,\s*)?\*\s*as\s+[A-Za-z_$][\w$]*\s+from\s*{PLACEHOLDER}[ \t]*;?[ \t]*\n?"
    ))
    .expect("namespace import regex")
});

static IMPORT_QUALIFIED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?m)^[ \t]*import\s+(?:type\s+)?(?:[A-Za-z_$][\w$]*\s*,?\s*)?(?:\{{[^}}]*\}})?\s*from\s*{PLACEHOLDER}[ \t]*;?[ \t]*\n?"
    ))
    .expect("qualified import regex")
});

static IMPORT_BARE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?m)^[ \t]*import\s*{PLACEHOLDER}[ \t]*;?[ \t]*\n?"))
        .expect("bare import regex")
});

static EXPORT_DEFAULT_FN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*export\s+default\s+(?:async\s+)?(?:function\s*\*?|class)\s*([A-Za-z_$][\w$]*)")
        .expect("default function regex")
});

static EXPORT_DEFAULT_IDENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*export\s+default\s+([A-Za-z_$][\w$]*)[ \t]*;?[ \t]*(?:\n|$)")
        .expect("default identifier regex")
});

static EXPORT_DEFAULT_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^([ \t]*)export\s+default\s+").expect("default prefix regex"));

static EXPORT_NAMED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([ \t]*)export\s+((?:async\s+)?function|const|let|var|class|type|interface|enum|abstract|declare)\b")
        .expect("named export regex")
});

static EXPORT_LIST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?m)^[ \t]*export\s*(?:type\s*)?(?:\{{[^}}]*\}}|\*\s*(?:as\s+[A-Za-z_$][\w$]*\s+)?)(?:\s*from\s*{PLACEHOLDER})?[ \t]*;?[ \t]*\n?"
    ))
    .expect("export list regex")
});

static REQUIRE_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?m)^[ \t]*(?:const|let|var)\s+(?:[A-Za-z_$][\w$]*|\{{[^}}]*\}})\s*=\s*require\s*\(\s*{PLACEHOLDER}\s*\)(?:\.[A-Za-z_$][\w$]*)*[ \t]*;?[ \t]*\n?"
    ))
    .expect("require regex")
});

static DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:async\s+)?(?:const|let|var|function)\b").expect("declaration regex")
});

static PARAM_ANNOTATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<pre>[\w$\]}])\s*\??\s*:\s*[A-Z][\w$.]*(?:<[^<>()]*>)?(?:\[\])*(?P<post>\s*(?:[,=]|$))")
        .expect("parameter annotation regex")
});

static DECL_ANNOTATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?P<kw>const|let|var)(?P<ws>\s+)(?P<name>[A-Za-z_$][\w$]*)\s*:\s*[A-Z][\w$.]*(?:<[^<>=;\n]*>)?(?:\[\])*\s*=")
        .expect("declaration annotation regex")
});

static FN_HEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bfunction\s*\*?\s*(?:[A-Za-z_$][\w$]*)?\s*$").expect("function head regex")
});

static RETURN_TYPE_ARROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^:\s*[^=;{}()\n]+=>").expect("return type regex"));

static TYPE_DECL_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:declare\s+)?(?:(?P<alias>type)\s+[A-Z][\w$]*\s*(?:<[^>\n]*>)?\s*=|(?P<iface>interface)\s+[A-Z][\w$]*[^{\n]*\{)")
        .expect("type declaration regex")
});

static AS_ASSERTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<pre>[\w$)\]}\x{E001}])\s+as\s+(?:const\b|[A-Z][\w$.]*(?:<[^<>/\n]*>)?(?:\[\])*)(?P<post>[ \t]*(?:[;,)\]}]|\n|$))")
        .expect("assertion regex")
});

static NON_NULL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?P<pre>[\w$)\]])!\.").expect("non-null regex"));

static BLANK_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("blank line regex"));

static RENDERABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bfunction\b|=>|\bcreateElement\s*\(|\bh\s*\(").expect("shape regex")
});

/// Source sanitizer
#[derive(Debug, Clone, Default)]
pub struct Sanitizer {
    config: SanitizerConfig,
}

impl Sanitizer {
    #[inline]
    #[must_use]
    pub fn new(config: SanitizerConfig) -> Self {
        Self { config }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &SanitizerConfig {
        &self.config
    }

    /// Sanitize raw model output
    ///
    /// # Errors
    /// - `SanitizeError::TooLarge` if the input exceeds the configured limit
    /// - `SanitizeError::Empty` if nothing remains
    /// - `SanitizeError::NoRenderableShape` if no function/arrow/invocation remains
    pub fn sanitize(&self, raw: &str) -> Result<SanitizedSource, SanitizeError> {
        if raw.len() > self.config.max_source_bytes {
            return Err(SanitizeError::TooLarge {
                len: raw.len(),
                limit: self.config.max_source_bytes,
            });
        }

        let mut warnings = Vec::new();

        let normalized = raw.replace("\r\n", "\n");
        let reserved = normalized.chars().filter(|c| *c == OPEN || *c == CLOSE).count();
        let normalized = if reserved > 0 {
            warnings.push(SanitizationWarning::ReservedCharactersRemoved { count: reserved });
            normalized.replace(|c| c == OPEN || c == CLOSE, "")
        } else {
            normalized
        };

        // 1. fences
        let (body, dialect) = strip_fences(&normalized);

        let masked = literal::mask_with(&body, &jsx_text_ranges(&body));
        let mut code = masked.code.clone();

        // 2. imports
        for re in [&*IMPORT_NAMESPACE, &*IMPORT_QUALIFIED, &*IMPORT_BARE] {
            code = re.replace_all(&code, "").into_owned();
        }

        // 3. export wrappers
        let default_export = EXPORT_DEFAULT_FN
            .captures(&code)
            .or_else(|| EXPORT_DEFAULT_IDENT.captures(&code))
            .map(|caps| caps[1].to_string());
        code = EXPORT_DEFAULT_IDENT.replace_all(&code, "").into_owned();
        code = EXPORT_DEFAULT_PREFIX.replace_all(&code, "$1").into_owned();
        code = EXPORT_NAMED.replace_all(&code, "$1$2").into_owned();
        code = EXPORT_LIST.replace_all(&code, "").into_owned();

        // 4. require-style declarations
        code = REQUIRE_DECL.replace_all(&code, "").into_owned();

        // 5-7. type-only syntax
        let before = DECLARATION.find_iter(&code).count();
        if self.config.strip_types {
            code = strip_parameter_annotations(&code);
            code = DECL_ANNOTATION
                .replace_all(&code, "${kw}${ws}${name} =")
                .into_owned();
            code = remove_type_declarations(&code);
            code = AS_ASSERTION.replace_all(&code, "${pre}${post}").into_owned();
            code = NON_NULL.replace_all(&code, "${pre}.").into_owned();
        }
        let after = DECLARATION.find_iter(&code).count();
        if after < before {
            tracing::warn!(before, after, "declarations lost while stripping types");
            warnings.push(SanitizationWarning::DeclarationsLost { before, after });
        }

        let code = BLANK_RUNS.replace_all(&code, "\n\n").into_owned();
        let has_shape = RENDERABLE.is_match(&code);

        let text = strip_leading_echo_lines(&masked.unmask(&code))
            .trim()
            .to_string();

        if text.is_empty() {
            return Err(SanitizeError::Empty);
        }
        if !has_shape {
            return Err(SanitizeError::NoRenderableShape);
        }

        let hash = ContentHash::compute(text.as_bytes());
        tracing::debug!(
            hash = %hash.short(),
            len = text.len(),
            warnings = warnings.len(),
            "sanitized source"
        );

        Ok(SanitizedSource {
            text,
            default_export,
            dialect,
            warnings,
            hash,
        })
    }
}

/// Count top-level declaration keywords outside literals
#[must_use]
pub fn count_declarations(text: &str) -> usize {
    let masked = literal::mask(text);
    DECLARATION.find_iter(&masked.code).count()
}

/// Remove every checkpoint marker pair (and its suffix) from `text`
///
/// An open marker with no close marker drops everything after it; a stray
/// close marker is dropped on its own.
#[must_use]
pub fn strip_markers(text: &str, markers: &Markers) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find(markers.open()) {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + markers.open().len()..];
        match after_open.find(markers.close()) {
            Some(close) => rest = &after_open[close + markers.close().len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out.replace(markers.close(), "")
}

/// Extract the first fenced block, dropping any other fence lines
fn strip_fences(text: &str) -> (String, Option<Dialect>) {
    let lines: Vec<&str> = text.lines().collect();
    let Some(open) = lines.iter().position(|l| FENCE_LINE.is_match(l)) else {
        return (text.to_string(), None);
    };

    let dialect = FENCE_LINE
        .captures(lines[open])
        .and_then(|caps| Dialect::from_tag(&caps[1]));

    let close = lines[open + 1..]
        .iter()
        .position(|l| {
            FENCE_LINE
                .captures(l)
                .is_some_and(|caps| caps[1].is_empty())
        })
        .map_or(lines.len(), |p| open + 1 + p);

    let body = lines[open + 1..close]
        .iter()
        .filter(|l| !FENCE_LINE.is_match(l))
        .copied()
        .collect::<Vec<_>>()
        .join("\n");

    (body, dialect)
}

fn strip_leading_echo_lines(text: &str) -> String {
    let mut rest = text.trim_start();
    loop {
        let (first, tail) = rest.split_once('\n').unwrap_or((rest, ""));
        if Dialect::from_tag(first).is_some() {
            rest = tail.trim_start();
        } else {
            return rest.to_string();
        }
    }
}

/// Strip uppercase annotations inside parameter lists
///
/// A parenthesized list counts as parameters when it follows `function`
/// (optionally named) or is followed by `=>` (optionally after a return type).
fn strip_parameter_annotations(code: &str) -> String {
    let pairs = paren_pairs(code.as_bytes());

    let mut lists: Vec<(usize, usize)> = Vec::new();
    for (open, close) in pairs {
        if lists.last().is_some_and(|(_, c)| open < *c) {
            continue; // nested in an accepted list
        }
        if is_parameter_list(code, open, close) {
            lists.push((open, close));
        }
    }

    if lists.is_empty() {
        return code.to_string();
    }

    let mut out = String::with_capacity(code.len());
    let mut last = 0;
    for (open, close) in lists {
        out.push_str(&code[last..=open]);
        out.push_str(&PARAM_ANNOTATION.replace_all(&code[open + 1..close], "${pre}${post}"));
        last = close;
    }
    out.push_str(&code[last..]);
    out
}

/// Matching `(`/`)` byte offsets, ordered by opening offset
fn paren_pairs(bytes: &[u8]) -> Vec<(usize, usize)> {
    let mut stack = Vec::new();
    let mut pairs = Vec::new();
    for (i, b) in bytes.iter().enumerate() {
        match b {
            b'(' => stack.push(i),
            b')' => {
                if let Some(open) = stack.pop() {
                    pairs.push((open, i));
                }
            }
            _ => {}
        }
    }
    pairs.sort_unstable();
    pairs
}

fn is_parameter_list(code: &str, open: usize, close: usize) -> bool {
    let before = code[..open].trim_end();
    let mut window = before.len().saturating_sub(128);
    while !before.is_char_boundary(window) {
        window += 1;
    }
    if FN_HEAD.is_match(&before[window..]) {
        return true;
    }
    let after = code[close + 1..].trim_start();
    after.starts_with("=>") || RETURN_TYPE_ARROW.is_match(after)
}

/// Remove `type X = ...` and `interface X { ... }` declarations
fn remove_type_declarations(code: &str) -> String {
    let mut out = code.to_string();
    let mut search_from = 0;

    while let Some(caps) = TYPE_DECL_START.captures_at(&out, search_from) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        let end = if caps.name("iface").is_some() {
            interface_end(out.as_bytes(), whole.end - 1)
        } else {
            alias_end(out.as_bytes(), whole.end)
        };
        let end = consume_line_rest(out.as_bytes(), end);
        out.replace_range(whole.start..end, "");
        search_from = whole.start;
    }
    out
}

/// End (exclusive) of the brace group opening at `brace`
fn interface_end(bytes: &[u8], brace: usize) -> usize {
    let mut depth = 0usize;
    for (i, b) in bytes.iter().enumerate().skip(brace) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
    }
    bytes.len()
}

/// End (exclusive) of a type alias body starting at `start`
fn alias_end(bytes: &[u8], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    let mut seen_content = false;
    while i < bytes.len() {
        match bytes[i] {
            b'=' if bytes.get(i + 1) == Some(&b'>') => i += 1,
            b'{' | b'(' | b'[' | b'<' => depth += 1,
            b'}' | b')' | b']' | b'>' => depth = depth.saturating_sub(1),
            b';' if depth == 0 => return i + 1,
            b'\n' if depth == 0 && seen_content => {
                let next = bytes[i + 1..]
                    .iter()
                    .find(|b| !b.is_ascii_whitespace())
                    .copied();
                if !matches!(next, Some(b'|' | b'&')) {
                    return i;
                }
            }
            _ => {}
        }
        if !bytes[i].is_ascii_whitespace() {
            seen_content = true;
        }
        i += 1;
    }
    bytes.len()
}

/// Extend `end` over trailing blanks, a `;` and the newline
fn consume_line_rest(bytes: &[u8], mut end: usize) -> usize {
    while end < bytes.len() && matches!(bytes[end], b' ' | b'\t' | b';') {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'\n' {
        end += 1;
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn clean(raw: &str) -> SanitizedSource {
        Sanitizer::default().sanitize(raw).unwrap()
    }

    #[test]
    fn strips_fence_and_tag() {
        let out = clean("```jsx\nexport default function App(){ return null }\n```");
        assert_eq!(out.text(), "function App(){ return null }");
        assert_eq!(out.dialect(), Some(Dialect::Jsx));
        assert_eq!(out.default_export(), Some("App"));
    }

    #[test]
    fn drops_prose_around_fence() {
        let out = clean("Here you go:\n```tsx\nconst App = () => <div/>;\n```\nEnjoy!");
        assert_eq!(out.text(), "const App = () => <div/>;");
    }

    #[test]
    fn strips_echo_line() {
        let out = clean("jsx\nfunction App(){ return <p/> }");
        assert_eq!(out.text(), "function App(){ return <p/> }");
    }

    #[test]
    fn removes_three_import_families() {
        let raw = "import React, { useState } from 'react';\nimport './styles.css';\nimport * as Icons from \"icons\";\nimport {\n  a,\n  b,\n} from 'multi';\nfunction App(){ return <div/> }";
        assert_eq!(clean(raw).text(), "function App(){ return <div/> }");
    }

    #[test]
    fn import_text_inside_literal_is_preserved() {
        let raw = "function App(){\n  const s = `\nimport {x} from 'y'\n`;\n  return <p>{s}</p>\n}";
        let out = clean(raw);
        assert!(out.text().contains("\nimport {x} from 'y'\n"));
    }

    #[test]
    fn rewrites_named_exports() {
        let raw = "export const title = 'x';\nexport function App(){ return title }\nexport { App as Main };";
        assert_eq!(
            clean(raw).text(),
            "const title = 'x';\nfunction App(){ return title }"
        );
    }

    #[test]
    fn default_identifier_export_is_recorded() {
        let raw = "const App = () => <div/>;\nexport default App;";
        let out = clean(raw);
        assert_eq!(out.text(), "const App = () => <div/>;");
        assert_eq!(out.default_export(), Some("App"));
    }

    #[test]
    fn removes_require() {
        let raw = "const React = require('react');\nconst { x } = require(\"y\").z;\nfunction App(){ return null }";
        assert_eq!(clean(raw).text(), "function App(){ return null }");
    }

    #[test]
    fn strips_parameter_and_declaration_annotations() {
        let raw = "function Card({ title }: CardProps, extra: Extra) { const n: Count = 1; return <b>{title}</b> }\nconst App = (props: Props): JSX.Element => <Card {...props} />;";
        let out = clean(raw);
        assert_eq!(
            out.text(),
            "function Card({ title }, extra) { const n = 1; return <b>{title}</b> }\nconst App = (props): JSX.Element => <Card {...props} />;"
        );
    }

    #[test]
    fn leaves_object_literal_colons_alone() {
        let raw = "function App(){ const style = { color: Colors.red, size: 2 }; return <p style={style}/> }";
        assert_eq!(clean(raw).text(), raw);
    }

    #[test]
    fn removes_type_and_interface_declarations() {
        let raw = "type Props = {\n  title: string;\n};\ninterface State {\n  n: number;\n}\ntype Mode = 'a'\n  | 'b';\nfunction App(){ return null }";
        let out = clean(raw);
        assert_eq!(out.text(), "function App(){ return null }");
        assert!(out.warnings().is_empty());
    }

    #[test]
    fn removes_assertions() {
        let raw = "function App(){ const el = ref.current!.value as Target; return f(x as Foo, y) }";
        assert_eq!(
            clean(raw).text(),
            "function App(){ const el = ref.current.value; return f(x, y) }"
        );
    }

    #[test]
    fn as_in_jsx_text_is_kept() {
        let raw = "function App(){ return <p>Use it as Template</p> }";
        assert_eq!(clean(raw).text(), raw);
    }

    #[test]
    fn type_words_in_jsx_text_survive() {
        for raw in [
            "function App(){ return <p>Signed in as Admin</p> }",
            "function App(){ return <p>Role as Owner, name: Value, ok!.</p> }",
            "function App(){ const n = 1;\n  return (\n    <div>\n      Log in as User\n      <b>{n}</b>\n    </div>\n  );\n}",
        ] {
            let out = clean(raw);
            assert_eq!(out.text(), raw);
            assert!(crate::check_syntax(out.text()).is_ok());
        }
    }

    #[test]
    fn assertion_generic_never_spans_a_closing_tag() {
        let raw = "function App(){ const v = x as Foo</b> }";
        assert_eq!(clean(raw).text(), raw);
    }

    #[test]
    fn unterminated_interface_warns() {
        let raw = "function App(){ return null }\ninterface Broken {\nconst lost = 1;";
        let out = clean(raw);
        assert!(out
            .warnings()
            .iter()
            .any(|w| matches!(w, SanitizationWarning::DeclarationsLost { before: 2, after: 1 })));
    }

    #[test]
    fn rejects_empty_and_shapeless() {
        let s = Sanitizer::default();
        assert_eq!(s.sanitize("```jsx\n```"), Err(SanitizeError::Empty));
        assert_eq!(
            s.sanitize("const x = 1;"),
            Err(SanitizeError::NoRenderableShape)
        );
        assert_eq!(
            s.sanitize("const s = 'function () => ';"),
            Err(SanitizeError::NoRenderableShape)
        );
    }

    #[test]
    fn rejects_oversized_input() {
        let s = Sanitizer::new(SanitizerConfig::new().with_max_source_bytes(8));
        assert!(matches!(
            s.sanitize("function App(){}"),
            Err(SanitizeError::TooLarge { limit: 8, .. })
        ));
    }

    #[test]
    fn reserved_characters_are_removed() {
        let out = clean("function App(){ return '\u{E000}0\u{E001}' }");
        assert_eq!(out.text(), "function App(){ return '0' }");
        assert_eq!(
            out.warnings(),
            &[SanitizationWarning::ReservedCharactersRemoved { count: 2 }]
        );
    }

    #[test]
    fn strip_markers_removes_pairs() {
        let m = Markers::default();
        let text = "a/*@@checkpoint*/</div>/*@@end*/b/*@@checkpoint*/tail";
        assert_eq!(strip_markers(text, &m), "ab");
    }

    #[test]
    fn counts_declarations_outside_literals() {
        assert_eq!(count_declarations("const a = 1;\nlet b = `\nconst c`;\nfunction d(){}"), 3);
    }
}
