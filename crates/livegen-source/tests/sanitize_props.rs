use livegen_source::{check_syntax, SanitizationWarning, SanitizeError, Sanitizer};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn wrap(literal: &str, fenced: bool, with_import: bool, exported: bool) -> String {
    let mut src = String::new();
    if fenced {
        src.push_str("```jsx\n");
    }
    if with_import {
        src.push_str("import React, { useState } from 'react';\nimport './styles.css';\n");
    }
    if exported {
        src.push_str("export default ");
    }
    src.push_str(&format!(
        "function Card(props) {{\n  const label = \"{literal}\";\n  return <div title={{label}}>{{props.name}}</div>;\n}}\n"
    ));
    if fenced {
        src.push_str("```\n");
    }
    src
}

fn tricky_literal() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("import x from 'y'".to_string()),
        Just("export default App;".to_string()),
        Just("const a: Props = 1".to_string()),
        Just("type T = { a: string };".to_string()),
        Just("value as Foo".to_string()),
        Just("require('fs')".to_string()),
        "[a-zA-Z0-9 :;{}()=*'/-]{0,24}",
    ]
}

#[test]
fn test_fenced_typed_component() {
    let raw = "```tsx\nimport { useState } from 'react';\n\ninterface Props {\n  title: string;\n}\n\ntype Mode = 'a' | 'b';\n\nexport default function Panel({ title }: Props) {\n  const [n, setN] = useState<number>(0);\n  const el = document.body as HTMLElement;\n  return <section><h2>{title}</h2><button onClick={() => setN(n + 1)}>{n}</button></section>;\n}\n```";
    let clean = Sanitizer::default().sanitize(raw).unwrap();
    let text = clean.text();
    assert!(!text.contains("import"));
    assert!(!text.contains("interface"));
    assert!(!text.contains("type Mode"));
    assert!(!text.contains("export"));
    assert!(!text.contains(": Props"));
    assert!(!text.contains("as HTMLElement"));
    assert!(text.starts_with("function Panel"));
    assert_eq!(clean.default_export(), Some("Panel"));
    assert!(check_syntax(text).is_ok());
}

#[test]
fn test_jsx_text_keeps_its_closing_tag() {
    let raw = "function App() {\n  return <p>Signed in as Admin</p>;\n}";
    let clean = Sanitizer::default().sanitize(raw).unwrap();
    assert_eq!(clean.text(), raw);
    assert!(check_syntax(clean.text()).is_ok());
}

#[test]
fn test_expression_only_source() {
    let clean = Sanitizer::default()
        .sanitize("React.createElement('div', null, 'hello world')")
        .unwrap();
    assert_eq!(clean.text(), "React.createElement('div', null, 'hello world')");
    assert!(clean.default_export().is_none());
}

#[test]
fn test_fatal_outcomes() {
    let s = Sanitizer::default();
    assert_eq!(s.sanitize("```jsx\n```").unwrap_err(), SanitizeError::Empty);
    assert_eq!(
        s.sanitize("const x = 1;").unwrap_err(),
        SanitizeError::NoRenderableShape
    );
    assert_eq!(
        s.sanitize("import a from 'b';\n").unwrap_err(),
        SanitizeError::Empty
    );
}

#[test]
fn test_warnings_are_non_fatal() {
    let clean = Sanitizer::default()
        .sanitize("function App(){ return <p>\u{E000}x</p> }")
        .unwrap();
    assert!(clean
        .warnings()
        .contains(&SanitizationWarning::ReservedCharactersRemoved { count: 1 }));
}

proptest! {
    #[test]
    fn prop_sanitize_is_idempotent(
        literal in tricky_literal(),
        fenced in any::<bool>(),
        with_import in any::<bool>(),
        exported in any::<bool>(),
    ) {
        let s = Sanitizer::default();
        let once = s.sanitize(&wrap(&literal, fenced, with_import, exported)).unwrap();
        let twice = s.sanitize(once.text()).unwrap();
        prop_assert_eq!(once.text(), twice.text());
        prop_assert_eq!(once.hash(), twice.hash());
    }

    #[test]
    fn prop_string_literals_survive(
        literal in tricky_literal(),
        fenced in any::<bool>(),
        with_import in any::<bool>(),
    ) {
        let clean = Sanitizer::default()
            .sanitize(&wrap(&literal, fenced, with_import, true))
            .unwrap();
        let quoted = format!("\"{}\"", literal);
        prop_assert!(clean.text().contains(&quoted));
    }

    #[test]
    fn prop_jsx_text_survives_type_stripping(text in "[A-Za-z :,!.]{1,40}") {
        let raw = format!(
            "function App(props) {{\n  const title = props.title;\n  return <p title={{title}}>{text}</p>;\n}}"
        );
        let clean = Sanitizer::default().sanitize(&raw).unwrap();
        prop_assert!(check_syntax(clean.text()).is_ok(), "{}", clean.text());
        prop_assert_eq!(clean.text(), raw.as_str());
    }

    #[test]
    fn prop_template_literals_survive(body in "[a-z ]{0,12}") {
        let raw = format!(
            "import a from 'b';\nconst App = () => <p>{{`import ${{1}} {body} from 'x'`}}</p>;\n"
        );
        let clean = Sanitizer::default().sanitize(&raw).unwrap();
        let template = format!("`import ${{1}} {body} from 'x'`");
        prop_assert!(clean.text().contains(&template));
    }
}
