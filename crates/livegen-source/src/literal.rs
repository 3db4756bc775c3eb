//! Literal masking
//!
//! String literals, template literals and comments are swapped for opaque
//! placeholders before any textual rewrite runs, and swapped back after.
//! A rewrite therefore cannot alter literal content, whatever it matches.
//! Callers may protect further byte ranges, such as JSX text, the same way.

use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

pub(crate) const OPEN: char = '\u{E000}';
pub(crate) const CLOSE: char = '\u{E001}';

/// Regex fragment matching one placeholder
pub(crate) const PLACEHOLDER: &str = r"\x{E000}\d+\x{E001}";

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x{E000}(\d+)\x{E001}").expect("placeholder regex"));

/// Source text with every literal replaced by a placeholder
#[derive(Debug, Clone)]
pub(crate) struct Masked {
    pub(crate) code: String,
    pub(crate) literals: Vec<String>,
}

impl Masked {
    /// Restore literals into a (possibly rewritten) masked string
    pub(crate) fn unmask(&self, code: &str) -> String {
        PLACEHOLDER_RE
            .replace_all(code, |caps: &regex::Captures<'_>| {
                caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|idx| self.literals.get(idx))
                    .cloned()
                    .unwrap_or_default()
            })
            .into_owned()
    }
}

/// Mask all literals and comments in `src`
///
/// `src` must not contain the reserved placeholder characters; the sanitizer
/// removes them beforehand.
pub(crate) fn mask(src: &str) -> Masked {
    mask_with(src, &[])
}

/// Mask literals, comments and the given `protected` ranges
///
/// `protected` must be ordered and disjoint; a range that starts inside a
/// literal is ignored.
pub(crate) fn mask_with(src: &str, protected: &[Range<usize>]) -> Masked {
    let bytes = src.as_bytes();
    let mut code = String::with_capacity(src.len());
    let mut literals = Vec::new();
    let mut protected = protected.iter().peekable();
    let mut code_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        while protected.next_if(|r| r.start < i).is_some() {}
        let end = match protected.next_if(|r| r.start == i && r.end > i) {
            Some(range) => Some(range.end.min(bytes.len())),
            None => literal_end(bytes, i),
        };
        match end {
            Some(end) => {
                code.push_str(&src[code_start..i]);
                code.push(OPEN);
                code.push_str(&literals.len().to_string());
                code.push(CLOSE);
                literals.push(src[i..end].to_string());
                i = end;
                code_start = end;
            }
            None => i += 1,
        }
    }
    code.push_str(&src[code_start..]);

    Masked { code, literals }
}

/// If a literal or comment starts at `i`, return its exclusive end
fn literal_end(bytes: &[u8], i: usize) -> Option<usize> {
    let len = bytes.len();
    match bytes[i] {
        b'/' if bytes.get(i + 1) == Some(&b'/') => Some(
            bytes[i..]
                .iter()
                .position(|b| *b == b'\n')
                .map_or(len, |p| i + p),
        ),
        b'/' if bytes.get(i + 1) == Some(&b'*') => Some(
            bytes[i + 2..]
                .windows(2)
                .position(|w| w == b"*/")
                .map_or(len, |p| i + 2 + p + 2),
        ),
        q @ (b'\'' | b'"') => Some(scan_quoted(bytes, i, q)),
        b'`' => Some(scan_template(bytes, i)),
        _ => None,
    }
}

/// Quoted strings end at the matching quote or, unterminated, at the newline
fn scan_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let len = bytes.len();
    let mut j = start + 1;
    while j < len {
        match bytes[j] {
            b'\\' => j = (j + 2).min(len),
            b'\n' => return j,
            c if c == quote => return j + 1,
            _ => j += 1,
        }
    }
    len
}

fn scan_template(bytes: &[u8], start: usize) -> usize {
    let len = bytes.len();
    let mut j = start + 1;
    while j < len {
        match bytes[j] {
            b'\\' => j = (j + 2).min(len),
            b'`' => return j + 1,
            b'$' if bytes.get(j + 1) == Some(&b'{') => j = scan_substitution(bytes, j + 2),
            _ => j += 1,
        }
    }
    len
}

fn scan_substitution(bytes: &[u8], mut j: usize) -> usize {
    let len = bytes.len();
    let mut depth = 1usize;
    while j < len {
        match bytes[j] {
            b'{' => {
                depth += 1;
                j += 1;
            }
            b'}' => {
                depth -= 1;
                j += 1;
                if depth == 0 {
                    return j;
                }
            }
            q @ (b'\'' | b'"') => j = scan_quoted(bytes, j, q),
            b'`' => j = scan_template(bytes, j),
            _ => j += 1,
        }
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_strings_and_comments() {
        let src = r#"const a = "import x from 'y'"; // note"#;
        let masked = mask(src);
        assert!(!masked.code.contains("import"));
        assert_eq!(masked.literals.len(), 2);
        assert_eq!(masked.unmask(&masked.code), src);
    }

    #[test]
    fn template_with_nested_substitution() {
        let src = "const t = `a ${ {x: `b`}.x } c`; const z = 1;";
        let masked = mask(src);
        assert_eq!(masked.literals.len(), 1);
        assert!(masked.code.contains("const z = 1;"));
        assert_eq!(masked.unmask(&masked.code), src);
    }

    #[test]
    fn unterminated_quote_stops_at_newline() {
        let src = "<p>Don't panic</p>\nconst b = 2;";
        let masked = mask(src);
        assert!(masked.code.contains("const b = 2;"));
        assert_eq!(masked.unmask(&masked.code), src);
    }

    #[test]
    fn protected_ranges_are_masked() {
        let src = "<p>Don't stop as Admin</p>\nconst b = 'x';";
        let masked = mask_with(src, &[3..22]);
        assert_eq!(masked.literals[0], "Don't stop as Admin");
        assert_eq!(masked.literals.len(), 2);
        assert!(!masked.code.contains("Admin"));
        assert_eq!(masked.unmask(&masked.code), src);
    }

    #[test]
    fn multibyte_text_survives() {
        let src = "const s = 'héllo \\' wörld'; // ünïcode";
        let masked = mask(src);
        assert_eq!(masked.unmask(&masked.code), src);
    }
}
