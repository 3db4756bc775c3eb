use livegen_source::{
    check_syntax, strip_markers, CheckpointOutcome, CheckpointParser, Markers, ParserState,
};
use proptest::prelude::*;

const CLOSE_TAIL: &str = "/*@@checkpoint*/\n    </ul>\n  );\n}/*@@end*/";

/// A list component that gains one item per checkpoint
fn stream(items: usize) -> String {
    let mut src = String::from("function Feed() {\n  return (\n    <ul>\n");
    for i in 0..items {
        src.push_str(&format!("      <li key=\"{i}\">item {i}</li>{CLOSE_TAIL}\n"));
    }
    src.push_str("    </ul>\n  );\n}\n");
    src
}

fn chunks(text: &str, size: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let mut cut = size.min(rest.len());
        while !rest.is_char_boundary(cut) {
            cut += 1;
        }
        let (head, tail) = rest.split_at(cut);
        out.push(head);
        rest = tail;
    }
    out
}

fn run(text: &str, size: usize) -> (Vec<CheckpointOutcome>, String) {
    let mut parser = CheckpointParser::new(Markers::default());
    let mut outcomes = Vec::new();
    for piece in chunks(text, size) {
        outcomes.extend(parser.push(piece));
    }
    assert_eq!(parser.state(), ParserState::Accumulating);
    let artifact = parser.finish();
    (outcomes, artifact.into_text())
}

#[test]
fn test_five_checkpoints_in_one_stream() {
    let src = stream(5);
    let (outcomes, final_text) = run(&src, 17);

    assert_eq!(outcomes.len(), 5);
    let mut last_prefix = String::new();
    for (i, outcome) in outcomes.iter().enumerate() {
        let CheckpointOutcome::Ready(cp) = outcome else {
            panic!("checkpoint {i} rejected: {outcome:?}");
        };
        assert_eq!(cp.seq(), i as u64 + 1);
        assert!(cp.prefix().starts_with(&last_prefix));
        assert!(cp.prefix().len() > last_prefix.len());
        assert!(check_syntax(&cp.candidate()).is_ok());
        assert!(cp.snapshot().text().contains(&format!("item {i}")));
        last_prefix = cp.prefix().to_string();
    }

    assert_eq!(final_text, strip_markers(&src, &Markers::default()));
    assert!(check_syntax(&final_text).is_ok());
}

#[test]
fn test_stream_without_markers_never_fires() {
    let src = "function Feed() {\n  return <ul><li>only</li></ul>;\n}\n";
    let (outcomes, final_text) = run(src, 3);
    assert!(outcomes.is_empty());
    assert_eq!(final_text, src);
}

#[test]
fn test_custom_markers() {
    let markers = Markers::new("<!--cp-->", "<!--/cp-->");
    let mut parser = CheckpointParser::new(markers);
    let out = parser.push("const App = () => (<div>a<!--cp--></div>);<!--/cp-->");
    assert_eq!(out.len(), 1);
    assert!(matches!(out[0], CheckpointOutcome::Ready(_)));
}

proptest! {
    #[test]
    fn prop_checkpoints_independent_of_chunking(size in 1usize..64, items in 1usize..8) {
        let src = stream(items);
        let (outcomes, final_text) = run(&src, size);

        prop_assert_eq!(outcomes.len(), items);
        let mut prev: Option<(u64, String)> = None;
        for outcome in &outcomes {
            let CheckpointOutcome::Ready(cp) = outcome else {
                return Err(TestCaseError::fail(format!("rejected: {outcome:?}")));
            };
            if let Some((seq, prefix)) = &prev {
                prop_assert!(cp.seq() > *seq);
                prop_assert!(cp.prefix().starts_with(prefix.as_str()));
            }
            prev = Some((cp.seq(), cp.prefix().to_string()));
        }
        prop_assert_eq!(final_text, strip_markers(&src, &Markers::default()));
    }
}
