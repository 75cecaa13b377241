//! Integration tests for the session manager.
//!
//! These run against the scripted transport with tokio's clock paused, so
//! settle delays elapse instantly but stay observable through
//! `tokio::time::Instant`. They verify:
//!  - A finished stream commits exactly what was displayed, with the
//!    parameter snapshot taken at start.
//!  - At most one session is ever connected.
//!  - The pause gate blocks auto-restart without touching the live session.
//!  - A malformed or duplicated token never costs or doubles text; the text
//!    channel stays authoritative.
//!  - Failed sessions are discarded and retried once, after the settle delay.
//!  - `stop` releases the connection once and halts continuous mode.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use murmur_core::{
    ControllerEvent, GenerationContent, LiveParams, MalformedEventError, MirostatMode,
    NarrationPort, NoopNarration, ParamsPatch, SamplingConfig, SessionId, SessionState,
    TransportError,
};
use murmur_stream::testing::{ScriptStep, ScriptedTransport};
use murmur_stream::{
    ContextPolicy, ManagerConfig, ManagerError, SessionManager, SessionManagerHandle,
    StartOutcome,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;

// ── Helpers ───────────────────────────────────────────────────────────────────

const SETTLE: Duration = Duration::from_millis(500);

fn config(continuous: bool) -> ManagerConfig {
    ManagerConfig {
        settle_delay: SETTLE,
        continuous,
        history_capacity: 12,
        initial_context: "ctx".to_string(),
        context_policy: ContextPolicy::Fixed,
    }
}

/// Narration sink that records every call.
#[derive(Default)]
struct RecordingNarration {
    calls: Mutex<Vec<String>>,
}

impl RecordingNarration {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl NarrationPort for RecordingNarration {
    fn begin_generation(&self, session_id: SessionId) {
        self.record(format!("begin {session_id}"));
    }

    fn submit(&self, session_id: SessionId, text: &str) {
        self.record(format!("submit {session_id} {text}"));
    }

    fn finish_generation(&self, session_id: SessionId) {
        self.record(format!("finish {session_id}"));
    }

    fn cancel_all(&self) {
        self.record("cancel".to_string());
    }
}

fn spawn(
    config: ManagerConfig,
    transport: &Arc<ScriptedTransport>,
    params: LiveParams,
) -> (SessionManagerHandle, UnboundedReceiver<ControllerEvent>) {
    SessionManager::spawn(config, transport.clone(), params, Arc::new(NoopNarration))
}

/// Receive events up to and including the first one matching `pred`.
async fn until(
    events: &mut UnboundedReceiver<ControllerEvent>,
    pred: impl Fn(&ControllerEvent) -> bool,
) -> Vec<ControllerEvent> {
    let mut seen = Vec::new();
    let wait = async {
        while let Some(event) = events.recv().await {
            let matched = pred(&event);
            seen.push(event);
            if matched {
                return;
            }
        }
        panic!("event channel closed; saw {seen:?}");
    };
    tokio::time::timeout(Duration::from_secs(60), wait)
        .await
        .expect("timed out waiting for event");
    seen
}

/// Everything already queued, without waiting.
fn drain(events: &mut UnboundedReceiver<ControllerEvent>) -> Vec<ControllerEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

fn is_committed(event: &ControllerEvent) -> bool {
    matches!(event, ControllerEvent::Committed { .. })
}

fn is_discarded(event: &ControllerEvent) -> bool {
    matches!(event, ControllerEvent::Discarded { .. })
}

fn is_state(session: SessionId, state: SessionState) -> impl Fn(&ControllerEvent) -> bool {
    move |event| {
        matches!(
            event,
            ControllerEvent::StateChanged { session_id, state: s } if *session_id == session && *s == state
        )
    }
}

fn responses(events: &[ControllerEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ControllerEvent::ResponseUpdated { response, .. } => Some(response.clone()),
            _ => None,
        })
        .collect()
}

// ── Commit path ───────────────────────────────────────────────────────────────

/// The end-to-end example: two deltas then `done` commit "Hello".
#[tokio::test(start_paused = true)]
async fn done_commits_displayed_text_with_start_snapshot() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_script(vec![
        ScriptStep::text("He"),
        ScriptStep::text("llo"),
        ScriptStep::done(),
    ]);
    let params = LiveParams::new(SamplingConfig::default());
    params
        .apply(&ParamsPatch {
            temperature: Some(0.7),
            top_p: Some(0.9),
            top_k: Some(40),
            num_predict: Some(4),
            ..ParamsPatch::default()
        })
        .unwrap();

    let (handle, mut events) = spawn(config(false), &transport, params);
    let outcome = handle.start_with_context("hi").await.unwrap();
    assert_eq!(outcome, StartOutcome::Started(1));

    let seen = until(&mut events, is_committed).await;
    assert_eq!(responses(&seen), ["He", "Hello"]);

    let states: Vec<SessionState> = until(&mut events, is_state(1, SessionState::Idle))
        .await
        .into_iter()
        .chain(seen)
        .filter_map(|e| match e {
            ControllerEvent::StateChanged { state, .. } => Some(state),
            _ => None,
        })
        .collect();
    assert!(states.contains(&SessionState::Connecting));
    assert!(states.contains(&SessionState::Streaming));
    assert!(states.contains(&SessionState::Completed));

    let history = handle.history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].text(), "Hello");
    assert_eq!(history[0].context(), "hi");
    assert!((history[0].params().temperature - 0.7).abs() < 1e-6);
    assert!((history[0].params().top_p - 0.9).abs() < 1e-6);
    assert_eq!(history[0].params().top_k, 40);
    assert_eq!(history[0].params().num_predict, 4);

    let request = &transport.requests()[0];
    assert_eq!(request.query_pairs()[0], ("context", "hi".to_string()));
    assert_eq!(request.config, *history[0].params());

    let status = handle.status().await.unwrap();
    assert_eq!(status.state, SessionState::Idle);
    assert!(!status.restart_pending);
    assert_eq!(transport.close_count(), 1);
}

/// Edits during a session reach the next one, never the current one.
#[tokio::test(start_paused = true)]
async fn restart_reads_params_and_continues_from_output() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_script(vec![
        ScriptStep::text("Hello"),
        ScriptStep::Delay(Duration::from_millis(50)),
        ScriptStep::text(" world"),
        ScriptStep::done(),
    ]);
    transport.push_script(vec![ScriptStep::Hang]);

    let params = LiveParams::new(SamplingConfig {
        mirostat_mode: MirostatMode::V2,
        ..SamplingConfig::default()
    });
    let mut cfg = config(true);
    cfg.context_policy = ContextPolicy::ContinueFromOutput { tail_chars: 5 };
    let (handle, mut events) = spawn(cfg, &transport, params.clone());

    handle.start().await.unwrap();
    until(&mut events, |e| {
        matches!(e, ControllerEvent::ResponseUpdated { .. })
    })
    .await;

    let before = params.snapshot();
    params
        .apply(&ParamsPatch {
            temperature: Some(1.2),
            mirostat_mode: Some(MirostatMode::Disabled),
            ..ParamsPatch::default()
        })
        .unwrap();

    until(&mut events, is_committed).await;
    until(&mut events, is_state(2, SessionState::Connecting)).await;
    tokio::time::sleep(Duration::from_millis(1)).await;

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].context, "ctx");
    assert_eq!(requests[0].config, before);
    assert_eq!(requests[1].context, "world");
    assert!((requests[1].config.temperature - 1.2).abs() < 1e-6);
    assert_eq!(requests[1].config.mirostat_mode, MirostatMode::Disabled);
    assert_eq!(requests[1].config.top_p, before.top_p);
    assert_eq!(requests[1].config.top_k, before.top_k);

    let history = handle.history().await.unwrap();
    assert!((history[0].params().temperature - before.temperature).abs() < 1e-6);
}

#[tokio::test(start_paused = true)]
async fn single_malformed_event_is_dropped() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_script(vec![
        ScriptStep::text("a"),
        ScriptStep::Malformed(MalformedEventError::UnknownEvent("weird".into())),
        ScriptStep::text("b"),
        ScriptStep::done(),
    ]);
    let (handle, mut events) = spawn(config(false), &transport, LiveParams::default());

    handle.start().await.unwrap();
    let seen = until(&mut events, is_committed).await;
    assert!(
        seen.iter()
            .any(|e| matches!(e, ControllerEvent::EventDropped { .. }))
    );
    assert_eq!(handle.history().await.unwrap()[0].text(), "ab");
}

#[tokio::test(start_paused = true)]
async fn malformed_token_falls_back_to_text_channel() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_script(vec![
        ScriptStep::token("He", 1, 0.9),
        ScriptStep::text("He"),
        ScriptStep::Malformed(MalformedEventError::InvalidToken("expected value".into())),
        ScriptStep::text("llo"),
        ScriptStep::done(),
    ]);
    let (handle, mut events) = spawn(config(false), &transport, LiveParams::default());

    handle.start().await.unwrap();
    let seen = until(&mut events, is_committed).await;
    let dropped = seen
        .iter()
        .filter(|e| matches!(e, ControllerEvent::EventDropped { .. }))
        .count();
    assert_eq!(dropped, 1);
    assert_eq!(responses(&seen), ["He", "Hello"]);
    assert_eq!(handle.history().await.unwrap()[0].text(), "Hello");
}

#[tokio::test(start_paused = true)]
async fn dual_channel_output_is_not_doubled() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_script(vec![
        ScriptStep::token("Once", 1, 0.8),
        ScriptStep::text("Once"),
        ScriptStep::token(" upon", 2, 0.6),
        ScriptStep::text(" upon"),
        ScriptStep::done(),
    ]);
    let narration = Arc::new(RecordingNarration::default());
    let (handle, mut events) = SessionManager::spawn(
        config(false),
        transport.clone(),
        LiveParams::default(),
        narration.clone(),
    );

    handle.start().await.unwrap();
    let seen = until(&mut events, is_committed).await;
    assert!(
        !seen
            .iter()
            .any(|e| matches!(e, ControllerEvent::EventDropped { .. }))
    );
    let tokens = seen
        .iter()
        .filter(|e| matches!(e, ControllerEvent::TokenReceived { .. }))
        .count();
    assert_eq!(tokens, 2);
    assert_eq!(responses(&seen), ["Once", "Once upon"]);
    assert_eq!(
        narration.calls(),
        ["begin 1", "submit 1 Once", "submit 1  upon", "finish 1"]
    );

    let committed = &handle.history().await.unwrap()[0];
    assert_eq!(committed.text(), "Once upon");
    assert!(matches!(committed.content(), GenerationContent::Tokens(t) if t.len() == 2));
}

#[tokio::test(start_paused = true)]
async fn token_stream_reports_each_token() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_script(vec![
        ScriptStep::token("Hel", 1, 0.9),
        ScriptStep::token("lo", 2, 0.4),
        ScriptStep::done(),
    ]);
    let (handle, mut events) = spawn(config(false), &transport, LiveParams::default());

    handle.start().await.unwrap();
    let seen = until(&mut events, is_committed).await;
    let ids: Vec<i64> = seen
        .iter()
        .filter_map(|e| match e {
            ControllerEvent::TokenReceived { token, .. } => Some(token.id),
            _ => None,
        })
        .collect();
    assert_eq!(ids, [1, 2]);
    assert_eq!(responses(&seen), ["Hel", "Hello"]);
    assert_eq!(handle.history().await.unwrap()[0].text(), "Hello");
}

// ── Concurrency ───────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn concurrent_starts_open_one_session() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_script(vec![ScriptStep::text("a"), ScriptStep::Hang]);
    let (handle, mut events) = spawn(config(false), &transport, LiveParams::default());

    let (first, second) = tokio::join!(handle.start(), handle.start());
    let mut outcomes = [first.unwrap(), second.unwrap()];
    outcomes.sort_by_key(|o| matches!(o, StartOutcome::AlreadyActive(_)));
    assert_eq!(
        outcomes,
        [StartOutcome::Started(1), StartOutcome::AlreadyActive(1)]
    );

    until(&mut events, is_state(1, SessionState::Streaming)).await;
    assert_eq!(
        handle.start().await.unwrap(),
        StartOutcome::AlreadyActive(1)
    );
    assert_eq!(transport.open_count(), 1);
}

// ── Pause gate ────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn pause_lets_session_finish_and_blocks_restart() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_script(vec![
        ScriptStep::text("Hel"),
        ScriptStep::Delay(Duration::from_millis(100)),
        ScriptStep::text("lo"),
        ScriptStep::done(),
    ]);
    transport.push_script(vec![ScriptStep::Hang]);
    let (handle, mut events) = spawn(config(true), &transport, LiveParams::default());

    handle.start().await.unwrap();
    until(&mut events, |e| {
        matches!(e, ControllerEvent::ResponseUpdated { .. })
    })
    .await;
    handle.set_paused(true).await.unwrap();

    let seen = until(&mut events, is_committed).await;
    assert!(seen.contains(&ControllerEvent::PauseChanged { paused: true }));
    assert_eq!(handle.history().await.unwrap()[0].text(), "Hello");

    tokio::time::sleep(Duration::from_secs(5)).await;
    let idle = drain(&mut events);
    assert!(
        !idle
            .iter()
            .any(|e| matches!(e, ControllerEvent::RestartScheduled { .. })),
        "restart scheduled while paused: {idle:?}"
    );
    let status = handle.status().await.unwrap();
    assert!(status.paused);
    assert!(!status.restart_pending);
    assert_eq!(status.state, SessionState::Idle);
    assert_eq!(transport.open_count(), 1);

    let resumed_at = Instant::now();
    handle.set_paused(false).await.unwrap();
    let seen = until(&mut events, is_state(2, SessionState::Connecting)).await;
    assert!(seen.contains(&ControllerEvent::PauseChanged { paused: false }));
    assert!(seen.contains(&ControllerEvent::RestartScheduled { delay_ms: 500 }));
    assert!(resumed_at.elapsed() >= SETTLE);
}

#[tokio::test(start_paused = true)]
async fn disabling_continuous_cancels_pending_restart() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_script(vec![ScriptStep::text("x"), ScriptStep::done()]);
    let (handle, mut events) = spawn(config(true), &transport, LiveParams::default());

    handle.start().await.unwrap();
    until(&mut events, |e| {
        matches!(e, ControllerEvent::RestartScheduled { .. })
    })
    .await;
    handle.set_continuous(false).await.unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    let status = handle.status().await.unwrap();
    assert!(!status.continuous);
    assert!(!status.restart_pending);
    assert_eq!(transport.open_count(), 1);
}

// ── Failure path ──────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn transport_error_discards_and_retries_after_settle() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_script(vec![
        ScriptStep::text("par"),
        ScriptStep::Fail(TransportError::Interrupted("reset".into())),
    ]);
    transport.push_script(vec![ScriptStep::text("ok"), ScriptStep::done()]);
    transport.push_script(vec![ScriptStep::Hang]);
    let narration = Arc::new(RecordingNarration::default());
    let (handle, mut events) = SessionManager::spawn(
        config(true),
        transport.clone(),
        LiveParams::default(),
        narration.clone(),
    );

    handle.start().await.unwrap();
    let seen = until(&mut events, is_discarded).await;
    let discarded_at = Instant::now();
    let Some(ControllerEvent::Discarded {
        session_id,
        reason,
        partial_chars,
    }) = seen.last()
    else {
        panic!("expected discard, saw {seen:?}");
    };
    assert_eq!(*session_id, 1);
    assert_eq!(*partial_chars, 3);
    assert!(reason.contains("reset"), "reason: {reason}");
    assert!(seen.iter().any(is_state(1, SessionState::Errored)));

    let retry = until(&mut events, is_state(2, SessionState::Connecting)).await;
    assert!(discarded_at.elapsed() >= SETTLE);
    let restarts = retry
        .iter()
        .filter(|e| matches!(e, ControllerEvent::RestartScheduled { .. }))
        .count();
    assert_eq!(restarts, 1, "retry events: {retry:?}");

    let seen = until(&mut events, is_committed).await;
    assert!(!seen.iter().any(is_discarded));

    let history = handle.history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].text(), "ok");

    let requests = transport.requests();
    assert_eq!(requests[0].context, "ctx");
    assert_eq!(requests[1].context, "ctx");

    let calls = narration.calls();
    assert_eq!(
        &calls[..6],
        [
            "begin 1",
            "submit 1 par",
            "cancel",
            "begin 2",
            "submit 2 ok",
            "finish 2"
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn stream_ending_without_done_is_discarded() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_script(vec![ScriptStep::text("x")]);
    let (handle, mut events) = spawn(config(false), &transport, LiveParams::default());

    handle.start().await.unwrap();
    let seen = until(&mut events, is_discarded).await;
    assert!(!seen.iter().any(is_committed));
    assert!(handle.history().await.unwrap().is_empty());
    assert_eq!(handle.status().await.unwrap().state, SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn refused_connection_is_retried() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_refusal(TransportError::Connect("connection refused".into()));
    transport.push_script(vec![ScriptStep::text("ok"), ScriptStep::done()]);
    transport.push_script(vec![ScriptStep::Hang]);
    let (handle, mut events) = spawn(config(true), &transport, LiveParams::default());

    handle.start().await.unwrap();
    let seen = until(&mut events, is_committed).await;
    assert!(seen.iter().any(|e| matches!(
        e,
        ControllerEvent::Discarded {
            session_id: 1,
            partial_chars: 0,
            ..
        }
    )));
    assert_eq!(handle.history().await.unwrap()[0].text(), "ok");
}

// ── Stop and shutdown ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn stop_closes_once_and_halts_continuous_mode() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_script(vec![ScriptStep::text("abc"), ScriptStep::Hang]);
    let narration = Arc::new(RecordingNarration::default());
    let (handle, mut events) = SessionManager::spawn(
        config(true),
        transport.clone(),
        LiveParams::default(),
        narration.clone(),
    );

    handle.start().await.unwrap();
    until(&mut events, |e| {
        matches!(e, ControllerEvent::ResponseUpdated { .. })
    })
    .await;
    handle.stop().await.unwrap();
    handle.stop().await.unwrap();

    let seen = until(&mut events, is_state(1, SessionState::Idle)).await;
    assert!(seen.contains(&ControllerEvent::Discarded {
        session_id: 1,
        reason: "stopped".into(),
        partial_chars: 3,
    }));

    tokio::time::sleep(Duration::from_secs(2)).await;
    let status = handle.status().await.unwrap();
    assert!(status.halted);
    assert!(!status.restart_pending);
    assert!(handle.history().await.unwrap().is_empty());
    assert_eq!(transport.open_count(), 1);
    assert_eq!(transport.close_count(), 1);
    assert!(narration.calls().contains(&"cancel".to_string()));
}

#[tokio::test(start_paused = true)]
async fn set_context_applies_to_next_session() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_script(vec![ScriptStep::Hang]);
    let (handle, mut events) = spawn(config(false), &transport, LiveParams::default());

    handle.set_context("Once upon a time").await.unwrap();
    until(&mut events, |e| {
        matches!(e, ControllerEvent::ContextChanged { .. })
    })
    .await;
    handle.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert_eq!(transport.requests()[0].context, "Once upon a time");
    assert_eq!(
        handle.status().await.unwrap().next_context,
        "Once upon a time"
    );
}

#[tokio::test(start_paused = true)]
async fn shutdown_and_dropped_handles_end_the_manager() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_script(vec![ScriptStep::Hang]);
    let (handle, mut events) = spawn(config(true), &transport, LiveParams::default());

    handle.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(transport.open_count(), 1);
    handle.shutdown().await.unwrap();
    assert_eq!(handle.status().await, Err(ManagerError::Closed));
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(transport.close_count(), 1);

    let (handle, mut events_b) = spawn(config(false), &transport, LiveParams::default());
    drop(handle);
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        while events_b.recv().await.is_some() {}
    })
    .await;
    assert!(closed.is_ok());
    drain(&mut events);
}
