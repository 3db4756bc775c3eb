//! End-to-end jobs: scripted server, transport session, flow renderer

use livegen_core::prelude::*;
use livegen_core::LivegenConfig;
use livegen_runtime::{is_structural_superset_of, text_of};
use livegen_test_utils::{checkpointed_feed, complete, streamed_screen, ScriptedServer, COUNTER_APP};
use livegen_transport::{TransportConfig, TransportError};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::time::Duration;

async fn open(server: ScriptedServer) -> (
    TransportSession<tokio::io::DuplexStream>,
    tokio::task::JoinHandle<livegen_test_utils::ServerLog>,
) {
    let (client, log) = server.spawn();
    let session = TransportSession::open(client, "token", TransportConfig::default())
        .await
        .unwrap();
    (session, log)
}

fn fallback_flags(flow: &FlowRenderer) -> Vec<(String, bool)> {
    flow.sessions()
        .map(|s| (s.screen_id().to_string(), s.is_fallback()))
        .collect()
}

#[tokio::test]
async fn test_streamed_screen_renders_each_checkpoint_then_final() {
    let source = checkpointed_feed(5);
    let mut events = streamed_screen("feed", &source, 17);
    events.push(complete());
    let (mut session, log) = open(ScriptedServer::new(events).expecting_token("token")).await;

    let mut flow = FlowRenderer::default();
    let _handle = session
        .submit(&JobRequest::for_screen("generate", "feed"))
        .await
        .unwrap();

    let mut renders: Vec<Vec<VNode>> = Vec::new();
    let mut seqs = Vec::new();
    while let Some(event) = session.next_event().await.unwrap() {
        for update in flow.apply(&event) {
            if let FlowUpdate::CheckpointRendered { seq, .. } = update {
                seqs.push(seq);
                renders.push(flow.view("feed").to_vec());
            }
        }
    }

    assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    for pair in renders.windows(2) {
        assert!(is_structural_superset_of(&pair[1], &pair[0]));
    }
    assert_eq!(text_of(&renders[0]), "entry 0");

    let feed = flow.session("feed").unwrap();
    assert!(!feed.is_fallback());
    assert_eq!(text_of(feed.view()), "entry 0entry 1entry 2entry 3entry 4");

    let log = log.await.unwrap();
    assert_eq!(log.request.unwrap().data.screen_id.as_deref(), Some("feed"));
}

#[tokio::test]
async fn test_run_job_reports_updates() {
    let events = vec![
        ServerEvent::Progress {
            stage: "plan".into(),
            message: "two screens".into(),
        },
        ServerEvent::UnitReady {
            screen_id: "counter".into(),
            text: COUNTER_APP.into(),
            extra: serde_json::Value::Null,
        },
        ServerEvent::UnitReady {
            screen_id: "broken".into(),
            text: livegen_test_utils::BROKEN_APP.into(),
            extra: serde_json::Value::Null,
        },
        complete(),
    ];
    let (mut session, _log) = open(ScriptedServer::new(events)).await;
    let mut flow = FlowRenderer::default();

    let report = run_job(
        &mut session,
        &JobRequest::for_project("generate", "p1"),
        &mut flow,
        std::future::pending(),
    )
    .await
    .unwrap();

    assert_eq!(report.job_id, session.job_id());
    assert_eq!(report.outcome.result, serde_json::json!({"ok": true}));
    assert_eq!(report.updates.len(), 4);
    assert!(matches!(report.updates[1], FlowUpdate::UnitMounted { .. }));
    assert!(matches!(report.updates[2], FlowUpdate::UnitFailed { .. }));
    assert_eq!(
        fallback_flags(&flow),
        vec![("counter".to_string(), false), ("broken".to_string(), true)]
    );
}

#[tokio::test]
async fn test_cancel_leaves_fallback_flags_unchanged() {
    let events = vec![
        ServerEvent::UnitReady {
            screen_id: "a".into(),
            text: COUNTER_APP.into(),
            extra: serde_json::Value::Null,
        },
        ServerEvent::UnitError {
            screen_id: "b".into(),
            error: "generation failed".into(),
        },
    ];
    let (mut session, log) = open(ScriptedServer::new(events).hold_open()).await;
    let mut flow = FlowRenderer::default();

    let err = run_job(
        &mut session,
        &JobRequest::for_project("generate", "p1"),
        &mut flow,
        tokio::time::sleep(Duration::from_millis(150)),
    )
    .await
    .unwrap_err();
    assert!(err.is_cancelled(), "{err}");
    assert!(session.is_closed());
    assert_eq!(
        fallback_flags(&flow),
        vec![("a".to_string(), false), ("b".to_string(), true)]
    );

    // A second close changes nothing either
    session.close().await;
    assert_eq!(session.next_event().await, Ok(None));
    assert_eq!(log.await.unwrap().sent, 2);
}

#[tokio::test]
async fn test_job_error_keeps_screens() {
    let events = vec![
        ServerEvent::UnitReady {
            screen_id: "a".into(),
            text: COUNTER_APP.into(),
            extra: serde_json::Value::Null,
        },
        ServerEvent::Error {
            reason: "quota".into(),
        },
    ];
    let (mut session, _log) = open(ScriptedServer::new(events)).await;
    let mut flow = FlowRenderer::default();

    let err = run_job(
        &mut session,
        &JobRequest::for_screen("generate", "a"),
        &mut flow,
        std::future::pending(),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        LivegenError::Transport(TransportError::Server { ref reason }) if reason == "quota"
    ));
    assert!(!flow.session("a").unwrap().is_fallback());
    assert_eq!(text_of(flow.view("a")), "0");
}

#[tokio::test]
async fn test_rejected_credential() {
    let (client, log) = ScriptedServer::new(vec![complete()])
        .expecting_token("right")
        .spawn();
    let err = TransportSession::open(client, "wrong", TransportConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Rejected { .. }));
    assert!(log.await.unwrap().rejected);
}

#[tokio::test]
async fn test_connect_over_tcp() {
    let mut events = streamed_screen("home", &checkpointed_feed(2), 32);
    events.push(complete());
    let (addr, _log) = ScriptedServer::new(events).listen().await;

    let config = LivegenConfig::default();
    let mut session = TransportSession::connect(addr, "token", config.transport)
        .await
        .unwrap();
    let mut flow = FlowRenderer::new(&config);
    let report = run_job(
        &mut session,
        &JobRequest::for_screen("generate", "home"),
        &mut flow,
        std::future::pending(),
    )
    .await
    .unwrap();
    let rendered = report
        .updates
        .iter()
        .filter(|u| matches!(u, FlowUpdate::CheckpointRendered { .. }))
        .count();
    assert_eq!(rendered, 2);
    assert_eq!(text_of(flow.view("home")), "entry 0entry 1");
}

#[tokio::test]
async fn test_handler_dispatch_after_job() {
    let events = vec![
        ServerEvent::UnitReady {
            screen_id: "c".into(),
            text: COUNTER_APP.into(),
            extra: serde_json::Value::Null,
        },
        complete(),
    ];
    let (mut session, _log) = open(ScriptedServer::new(events)).await;
    let mut flow = FlowRenderer::default();
    run_job(
        &mut session,
        &JobRequest::for_screen("generate", "c"),
        &mut flow,
        std::future::pending(),
    )
    .await
    .unwrap();

    let handler = livegen_runtime::find_in(flow.view("c"), "button")
        .and_then(|b| b.handler("onClick"))
        .unwrap();
    flow.dispatch("c", handler, vec![]).unwrap();
    assert_eq!(text_of(flow.view("c")), "1");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Cancelling after any number of delivered events leaves every
    /// session's fallback flag as it was
    #[test]
    fn test_cancel_at_any_point(delivered in 0usize..8) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let mut events = vec![ServerEvent::UnitError {
                screen_id: "bad".into(),
                error: "nope".into(),
            }];
            events.extend(streamed_screen("feed", &checkpointed_feed(3), 40));
            let total = events.len();
            let (mut session, _log) = open(ScriptedServer::new(events).hold_open()).await;
            let mut flow = FlowRenderer::default();
            let handle = session
                .submit(&JobRequest::for_project("generate", "p"))
                .await
                .unwrap();

            for _ in 0..delivered.min(total) {
                let event = session.next_event().await.unwrap().unwrap();
                flow.apply(&event);
            }
            let before = fallback_flags(&flow);
            let views: Vec<Vec<VNode>> = flow.sessions().map(|s| s.view().to_vec()).collect();

            session.close().await;
            session.close().await;

            assert_eq!(fallback_flags(&flow), before);
            let after: Vec<Vec<VNode>> = flow.sessions().map(|s| s.view().to_vec()).collect();
            assert_eq!(after, views);
            assert_eq!(handle.wait().await, Err(TransportError::Cancelled));
        });
    }
}
