use livegen_runtime::{
    fallback_view, find_in, is_structural_superset_of, text_of, CompiledUnit, Compiler, ExecutionFault,
    ExternalProps, HandlerId, RenderSession, SandboxConfig, SandboxExecutor, SynthesisError,
    UnitShape, VNode,
};
use livegen_source::{CheckpointOutcome, CheckpointParser, Markers, Sanitizer};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;

fn compile(raw: &str) -> Result<Arc<CompiledUnit>, SynthesisError> {
    let clean = Sanitizer::default()
        .sanitize(raw)
        .map_err(|e| SynthesisError::Parser(e.to_string()))?;
    Compiler::default().compile(&clean)
}

fn unit(raw: &str) -> Arc<CompiledUnit> {
    match compile(raw) {
        Ok(unit) => unit,
        Err(err) => panic!("compile failed: {err}\n{raw}"),
    }
}

fn mount(raw: &str) -> RenderSession {
    SandboxExecutor::default().mount("screen", unit(raw), ExternalProps::new())
}

fn click(session: &RenderSession, tag: &str) -> HandlerId {
    find_in(session.view(), tag)
        .and_then(|el| el.handler("onClick"))
        .expect("clickable element")
}

#[test]
fn test_fenced_default_export_mounts() {
    let raw = "```jsx\nexport default function App(){ return null }\n```";
    let unit = unit(raw);
    assert_eq!(unit.shape(), &UnitShape::Named { ident: "App".into() });

    let session = SandboxExecutor::default().mount("home", unit, ExternalProps::new());
    assert!(!session.is_fallback());
    assert!(session.is_mounted());
    assert!(session.view().is_empty());
}

#[test]
fn test_import_line_removed() {
    let raw = "import {x} from 'y'\nfunction Greeting() {\n  return <p>hi there</p>;\n}\n";
    let session = mount(raw);
    assert!(!session.is_fallback(), "{:?}", session.fault_summary());
    assert_eq!(text_of(session.view()), "hi there");
}

#[test]
fn test_broken_source_falls_back() {
    let executor = SandboxExecutor::default();
    let mut session = RenderSession::new("broken", ExternalProps::new());
    let raw = "function App() {\n  return <div>{items.map(</div>;\n}";
    match compile(raw) {
        Ok(unit) => {
            let _ = executor.update(&mut session, unit);
        }
        Err(err) => executor.fail(&mut session, err),
    }
    assert!(session.is_fallback());
    let summary = session.fault_summary().unwrap_or_default();
    assert!(!summary.is_empty());
    assert!(text_of(session.view()).contains(summary));
}

#[test]
fn test_unknown_identifier_is_reference_fault() {
    let session = mount("function App() { const data = fetch('/api'); return <p>{data}</p>; }");
    assert!(session.is_fallback());
    assert_eq!(
        session.fault(),
        Some(&ExecutionFault::Thrown {
            message: "ReferenceError: fetch is not defined".to_string()
        })
    );
}

#[test]
fn test_construction_fault_has_no_partial_mount() {
    let session = mount(
        "function App() {\n  const [n] = useState(0);\n  useEffect(() => { throw new Error('late'); }, []);\n  return <p>{n}</p>;\n}",
    );
    assert!(session.is_fallback());
    assert!(!session.is_mounted());
    assert_eq!(session.view().len(), 1);
    assert_eq!(session.fault_summary(), Some("uncaught Error: late"));
}

#[test]
fn test_state_update_through_dispatch() {
    let executor = SandboxExecutor::default();
    let mut session = executor.mount(
        "counter",
        unit(
            "function Counter() {\n  const [count, setCount] = useState(0);\n  return (\n    <div>\n      <span>{count}</span>\n      <button onClick={() => setCount(c => c + 1)}>+</button>\n    </div>\n  );\n}",
        ),
        ExternalProps::new(),
    );
    assert_eq!(find_in(session.view(), "span").map(|s| s.children.clone()), Some(vec![VNode::text("0")]));

    for _ in 0..3 {
        let id = click(&session, "button");
        executor.dispatch(&mut session, id, vec![]).unwrap();
    }
    let span = find_in(session.view(), "span").unwrap();
    assert_eq!(span.children, vec![VNode::text("3")]);
    assert!(!session.is_fallback());
}

#[test]
fn test_dispatch_errors_do_not_flip_session() {
    let executor = SandboxExecutor::default();
    let mut session = executor.mount("s", unit("function App() { return <p>static text</p>; }"), ExternalProps::new());
    let err = executor
        .dispatch(&mut session, HandlerId::new(9), vec![])
        .unwrap_err();
    assert_eq!(err, ExecutionFault::UnknownHandler { id: 9 });
    assert!(!session.is_fallback());

    let mut unbound = RenderSession::new("u", ExternalProps::new());
    assert_eq!(
        executor.dispatch(&mut unbound, HandlerId::new(0), vec![]),
        Err(ExecutionFault::NotMounted)
    );
}

#[test]
fn test_handler_throw_flips_only_that_session() {
    let executor = SandboxExecutor::default();
    let src = "function App() { return <button onClick={() => { throw new Error('click failed'); }}>go</button>; }";
    let mut first = executor.mount("a", unit(src), ExternalProps::new());
    let second = executor.mount("b", unit(src), ExternalProps::new());

    let id = click(&first, "button");
    assert!(executor.dispatch(&mut first, id, vec![]).is_err());
    assert!(first.is_fallback());
    assert!(!second.is_fallback());
    assert_eq!(first.boundary().faults(), 1);
}

#[test]
fn test_host_props_win_over_default_props() {
    let src = "function Banner({ title, tone }) {\n  return <h2 data-tone={tone}>{title}</h2>;\n}\nBanner.defaultProps = { title: 'Untitled', tone: 'calm' };";
    let props = ExternalProps::new().with("title", "Quarterly report");
    let session = SandboxExecutor::default().mount("s", unit(src), props);
    let h2 = find_in(session.view(), "h2").unwrap();
    assert_eq!(text_of(session.view()), "Quarterly report");
    assert_eq!(h2.attr("data-tone").and_then(|a| a.as_str()), Some("calm"));
}

#[test]
fn test_navigate_is_recorded() {
    let executor = SandboxExecutor::default();
    let mut session = executor.mount(
        "s",
        unit("function App({ onNavigate }) {\n  return <a onClick={() => onNavigate('details')}>open</a>;\n}"),
        ExternalProps::new(),
    );
    let id = click(&session, "a");
    executor.dispatch(&mut session, id, vec![]).unwrap();
    assert_eq!(session.take_navigations(), vec!["details".to_string()]);
    assert!(session.take_navigations().is_empty());
}

#[test]
fn test_hot_swap_resets_state() {
    let executor = SandboxExecutor::default();
    let mut session = executor.mount(
        "s",
        unit("function App() {\n  const [n, setN] = useState(5);\n  return <button onClick={() => setN(n * 2)}>{n}</button>;\n}"),
        ExternalProps::new(),
    );
    let id = click(&session, "button");
    executor.dispatch(&mut session, id, vec![]).unwrap();
    assert_eq!(text_of(session.view()), "10");

    let next = unit("function App() {\n  const [n] = useState(1);\n  return <button>v2 {n}</button>;\n}");
    executor.update(&mut session, Arc::clone(&next)).unwrap();
    assert_eq!(text_of(session.view()), "v2 1");
    assert!(Arc::ptr_eq(session.unit().unwrap(), &next));
}

#[test]
fn test_failed_update_leaves_fallback() {
    let executor = SandboxExecutor::default();
    let mut session = mount("function App() { return <p>good version</p>; }");
    let bad = unit("function App() { return <p>{missing.value}</p>; }");
    assert!(executor.update(&mut session, bad).is_err());
    assert!(session.is_fallback());

    executor
        .update(&mut session, unit("function App() { return <p>recovered</p>; }"))
        .unwrap();
    assert!(!session.is_fallback());
    assert_eq!(text_of(session.view()), "recovered");
}

#[test]
fn test_effects_run_after_commit_with_cleanup() {
    let executor = SandboxExecutor::default();
    let src = "function App() {\n  const [ticks, setTicks] = useState(0);\n  const log = useRef([]);\n  useEffect(() => {\n    log.current.push('on:' + ticks);\n    return () => log.current.push('off:' + ticks);\n  }, [ticks]);\n  return <button onClick={() => setTicks(ticks + 1)}>{log.current.join(',')}</button>;\n}";
    let mut session = executor.mount("s", unit(src), ExternalProps::new());
    // the effect runs after the first commit, so it is not in the first render
    assert_eq!(text_of(session.view()), "");

    let id = click(&session, "button");
    executor.dispatch(&mut session, id, vec![]).unwrap();
    assert_eq!(text_of(session.view()), "on:0");
    let id = click(&session, "button");
    executor.dispatch(&mut session, id, vec![]).unwrap();
    assert_eq!(text_of(session.view()), "on:0,off:0,on:1");
}

#[test]
fn test_set_state_during_render_is_bounded() {
    let executor = SandboxExecutor::new(SandboxConfig::default().with_max_render_passes(5));
    let session = executor.mount(
        "s",
        unit("function App() {\n  const [n, setN] = useState(0);\n  setN(n + 1);\n  return <p>{n}</p>;\n}"),
        ExternalProps::new(),
    );
    assert_eq!(session.fault(), Some(&ExecutionFault::RenderLoop { limit: 5 }));
}

#[test]
fn test_runaway_loop_exhausts_fuel() {
    let executor = SandboxExecutor::new(SandboxConfig::default().with_fuel(20_000));
    let session = executor.mount(
        "s",
        unit("function App() {\n  let i = 0;\n  while (true) { i++; }\n  return <p>{i}</p>;\n}"),
        ExternalProps::new(),
    );
    assert_eq!(session.fault(), Some(&ExecutionFault::Budget { fuel: 20_000 }));
}

#[test]
fn test_components_lists_and_fragments() {
    let src = "const Row = ({ label, done }) => <li className={done ? 'done' : 'todo'}>{label}</li>;\n\nfunction Todos() {\n  const items = [{ id: 1, label: 'write', done: true }, { id: 2, label: 'test', done: false }];\n  return (\n    <>\n      <h3>{items.filter(i => i.done).length} of {items.length}</h3>\n      <ul>{items.map(item => <Row key={item.id} {...item} />)}</ul>\n    </>\n  );\n}";
    let unit = unit(src);
    assert_eq!(unit.shape().ident(), Some("Todos"));
    let session = SandboxExecutor::default().mount("s", unit, ExternalProps::new());
    assert!(!session.is_fallback(), "{:?}", session.fault_summary());

    let view = session.view();
    assert_eq!(view.len(), 2);
    assert_eq!(view[0].text_content(), "1 of 2");
    let lis = view[1].find_all("li");
    assert_eq!(lis.len(), 2);
    assert_eq!(lis[1].attr("className").and_then(|a| a.as_str()), Some("todo"));
}

#[test]
fn test_expression_unit_renders() {
    let session = mount(
        "React.createElement('section', null, React.createElement('h1', null, 'Dashboard'), 'welcome back')",
    );
    assert!(!session.is_fallback(), "{:?}", session.fault_summary());
    assert_eq!(text_of(session.view()), "Dashboardwelcome back");
}

fn feed(items: usize) -> String {
    let mut src = String::from("function Feed() {\n  return (\n    <ul>\n");
    for i in 0..items {
        src.push_str(&format!(
            "      <li>entry {i}</li>/*@@checkpoint*/\n    </ul>\n  );\n}}/*@@end*/\n"
        ));
    }
    src.push_str("    </ul>\n  );\n}\n");
    src
}

#[test]
fn test_checkpoint_renders_grow_monotonically() {
    let executor = SandboxExecutor::default();
    let compiler = Compiler::default();
    let mut session = RenderSession::new("feed", ExternalProps::new());
    let mut parser = CheckpointParser::new(Markers::default());
    let mut renders: Vec<Vec<VNode>> = Vec::new();

    for piece in feed(6).as_bytes().chunks(23) {
        let piece = std::str::from_utf8(piece).unwrap();
        for outcome in parser.push(piece) {
            let CheckpointOutcome::Ready(cp) = outcome else {
                panic!("rejected checkpoint: {outcome:?}");
            };
            let unit = compiler.compile(cp.snapshot()).unwrap();
            executor.update_checkpoint(&mut session, unit).unwrap();
            renders.push(session.view().to_vec());
        }
    }
    assert_eq!(renders.len(), 6);
    for pair in renders.windows(2) {
        assert!(is_structural_superset_of(&pair[1], &pair[0]));
    }
    assert_eq!(renders[5][0].find_all("li").len(), 6);
}

#[test]
fn test_regressing_checkpoint_is_refused() {
    let executor = SandboxExecutor::default();
    let mut session = RenderSession::new("s", ExternalProps::new());
    executor
        .update_checkpoint(&mut session, unit("function A() { return <ul><li>one</li><li>two</li></ul>; }"))
        .unwrap();
    let before = session.view().to_vec();

    let err = executor
        .update_checkpoint(&mut session, unit("function A() { return <ul><li>one</li></ul>; }"))
        .unwrap_err();
    assert_eq!(err, ExecutionFault::Regressed);
    assert_eq!(session.view(), before.as_slice());

    // a throwing snapshot is swallowed too
    assert!(executor
        .update_checkpoint(&mut session, unit("function A() { throw new Error('half written'); }"))
        .is_err());
    assert!(!session.is_fallback());
    assert_eq!(session.view(), before.as_slice());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// A component that throws while constructing never mounts, and its
    /// sibling keeps rendering
    #[test]
    fn test_construction_fault_is_fallback_only(message in "[a-z]{1,12}( [a-z]{1,12})?") {
        let sibling = mount("function Ok() { return <p>fine</p>; }");
        let session = mount(&format!("function App() {{ throw new Error('{message}'); }}"));

        let expected = format!("uncaught Error: {message}");
        prop_assert!(session.is_fallback());
        prop_assert!(!session.is_mounted());
        prop_assert_eq!(session.fault_summary(), Some(expected.as_str()));
        let fallback = fallback_view(&expected);
        prop_assert_eq!(session.view(), fallback.as_slice());

        prop_assert!(!sibling.is_fallback());
        prop_assert_eq!(text_of(sibling.view()), "fine");
    }
}
