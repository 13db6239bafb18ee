//! Call-level scenarios driven through the orchestrator with mock endpoints.

mod mock_adapters;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use callbridge_gateway::core::bridge::{
    BridgeConfig, BridgeError, BridgeOrchestrator, CallSession, CallSetup, CallSummary,
    CloseReason, ControlKind, InterruptionTrigger, Outbound, SessionState, Side,
};
use mock_adapters::{
    MockConnector, MockEndpoint, ai_chunk, caller_frame, endpoint, frame_at_level, wait_until,
};

type Connected = mpsc::UnboundedReceiver<(String, MockEndpoint)>;

async fn wait_for_state(session: &CallSession, state: SessionState) {
    let mut rx = session.subscribe_state();
    timeout(Duration::from_secs(2), rx.wait_for(|s| *s == state))
        .await
        .unwrap_or_else(|_| panic!("session never reached {state}"))
        .unwrap();
}

async fn wait_closed(session: &CallSession) {
    timeout(Duration::from_secs(5), session.closed())
        .await
        .expect("session did not close");
}

/// Admit `call_id` and wait until its AI side is connected.
async fn admit(
    orchestrator: &BridgeOrchestrator,
    connected: &mut Connected,
    call_id: &str,
) -> (Arc<CallSession>, MockEndpoint, MockEndpoint) {
    let (pair, telephony) = endpoint(Side::Telephony);
    let session = orchestrator.accept(call_id, pair).unwrap();
    let (connected_id, ai) = timeout(Duration::from_secs(2), connected.recv())
        .await
        .expect("AI never connected")
        .unwrap();
    assert_eq!(connected_id, call_id);
    wait_for_state(&session, SessionState::Active).await;
    (session, telephony, ai)
}

async fn next_summary(
    rx: &mut tokio::sync::broadcast::Receiver<CallSummary>,
) -> CallSummary {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no call summary")
        .unwrap()
}

fn states(session: &CallSession) -> Vec<SessionState> {
    session.history().iter().map(|change| change.state).collect()
}

#[tokio::test]
async fn test_caller_audio_reaches_ai_in_order() {
    let (connector, mut connected) = MockConnector::new();
    let orchestrator = BridgeOrchestrator::new(BridgeConfig::default(), connector);
    let mut closed = orchestrator.subscribe_closed();

    let (session, telephony, ai) = admit(&orchestrator, &mut connected, "CA-basic").await;
    for fill in 0..10u8 {
        telephony.push(caller_frame(fill));
    }
    telephony.control(ControlKind::CallEnded, Side::Telephony, None);
    wait_closed(&session).await;

    let fills: Vec<u8> = ai.recorder.audio().iter().map(|f| f.payload[0]).collect();
    assert_eq!(fills, (0..10).collect::<Vec<_>>());
    assert!(telephony.recorder.audio().is_empty());

    let summary = next_summary(&mut closed).await;
    assert_eq!(summary.call_id, "CA-basic");
    assert_eq!(summary.reason, CloseReason::CallEnded(Side::Telephony));
    assert_eq!(summary.upstream.frames, 10);
    assert_eq!(summary.upstream.bytes, 1600);
    assert_eq!(summary.downstream.frames, 0);

    assert_eq!(telephony.recorder.closes(), 1);
    assert_eq!(ai.recorder.closes(), 1);
    assert_eq!(orchestrator.active_calls(), 0);
    assert_eq!(
        states(&session),
        vec![
            SessionState::Connecting,
            SessionState::Active,
            SessionState::Closing,
            SessionState::Closed
        ]
    );
}

#[tokio::test]
async fn test_audio_buffered_while_connecting_keeps_order() {
    let (connector, mut connected) = MockConnector::with_delay(Duration::from_millis(100));
    let orchestrator = BridgeOrchestrator::new(BridgeConfig::default(), connector);

    let (pair, telephony) = endpoint(Side::Telephony);
    let session = orchestrator.accept("CA-slow", pair).unwrap();
    for fill in 0..20u8 {
        telephony.push(caller_frame(fill));
    }
    assert_eq!(session.state(), SessionState::Connecting);

    let (_, ai) = timeout(Duration::from_secs(2), connected.recv())
        .await
        .unwrap()
        .unwrap();
    wait_until("buffered audio", || ai.recorder.audio().len() == 20).await;

    let fills: Vec<u8> = ai.recorder.audio().iter().map(|f| f.payload[0]).collect();
    assert_eq!(fills, (0..20).collect::<Vec<_>>());
    assert_eq!(session.upstream_cursor().frames, 20);

    orchestrator.shutdown("CA-slow").await.unwrap();
    assert_eq!(session.close_reason(), Some(CloseReason::Shutdown));
}

#[tokio::test]
async fn test_close_during_flush_drops_queued_audio() {
    let (connector, mut connected) =
        MockConnector::with_slow_sink(Duration::from_millis(50), Duration::from_millis(10));
    let orchestrator = BridgeOrchestrator::new(BridgeConfig::default(), connector);

    let (pair, telephony) = endpoint(Side::Telephony);
    let session = orchestrator.accept("CA-flush", pair).unwrap();
    for fill in 0..20u8 {
        telephony.push(caller_frame(fill));
    }
    wait_until("audio queued", || session.upstream_cursor().frames == 20).await;

    let (_, ai) = timeout(Duration::from_secs(2), connected.recv())
        .await
        .unwrap()
        .unwrap();
    wait_until("flush under way", || ai.recorder.audio().len() >= 2).await;
    session.begin_close(CloseReason::Shutdown);
    let sent_before_close = ai.recorder.audio().len();
    wait_closed(&session).await;

    // at most the send already in flight completes after `Closing`
    let fills: Vec<u8> = ai.recorder.audio().iter().map(|f| f.payload[0]).collect();
    assert!(fills.len() <= sent_before_close + 1);
    assert!(fills.len() < 20);
    assert_eq!(fills, (0..fills.len() as u8).collect::<Vec<_>>());

    assert_eq!(ai.recorder.closes(), 1);
    assert_eq!(telephony.recorder.closes(), 1);
    assert_eq!(session.close_reason(), Some(CloseReason::Shutdown));
    assert_eq!(
        states(&session),
        vec![
            SessionState::Connecting,
            SessionState::Closing,
            SessionState::Closed
        ]
    );
}

#[tokio::test]
async fn test_slow_caller_playback_does_not_delay_caller_audio() {
    let (connector, mut connected) = MockConnector::new();
    let orchestrator = BridgeOrchestrator::new(BridgeConfig::default(), connector);
    let (_session, telephony, ai) = admit(&orchestrator, &mut connected, "CA-slow-tel").await;

    telephony.recorder.set_delay(Duration::from_millis(30));
    ai.control(ControlKind::SpeechStarted, Side::Ai, Some("item_1"));
    for fill in 0..6u8 {
        ai.push(ai_chunk("item_1", fill));
    }
    for fill in 100..110u8 {
        telephony.push(caller_frame(fill));
    }

    wait_until("caller audio", || ai.recorder.audio().len() == 10).await;
    // the AI audio is still trickling out to the caller
    assert!(telephony.recorder.audio().len() < 6);
    let fills: Vec<u8> = ai.recorder.audio().iter().map(|f| f.payload[0]).collect();
    assert_eq!(fills, (100..110).collect::<Vec<_>>());

    wait_until("AI audio", || telephony.recorder.audio().len() == 6).await;
    let fills: Vec<u8> = telephony.recorder.audio().iter().map(|f| f.payload[0]).collect();
    assert_eq!(fills, (0..6).collect::<Vec<_>>());
    orchestrator.shutdown_all().await;
}

#[tokio::test]
async fn test_slow_ai_does_not_delay_ai_audio() {
    let (connector, mut connected) = MockConnector::new();
    let orchestrator = BridgeOrchestrator::new(BridgeConfig::default(), connector);
    let (_session, telephony, ai) = admit(&orchestrator, &mut connected, "CA-slow-ai").await;

    ai.recorder.set_delay(Duration::from_millis(50));
    for fill in 100..110u8 {
        telephony.push(caller_frame(fill));
    }
    ai.control(ControlKind::SpeechStarted, Side::Ai, Some("item_1"));
    for fill in 0..5u8 {
        ai.push(ai_chunk("item_1", fill));
    }

    wait_until("AI audio", || telephony.recorder.audio().len() == 5).await;
    assert!(ai.recorder.audio().len() < 10);
    let fills: Vec<u8> = telephony.recorder.audio().iter().map(|f| f.payload[0]).collect();
    assert_eq!(fills, (0..5).collect::<Vec<_>>());

    wait_until("caller audio", || ai.recorder.audio().len() == 10).await;
    let fills: Vec<u8> = ai.recorder.audio().iter().map(|f| f.payload[0]).collect();
    assert_eq!(fills, (100..110).collect::<Vec<_>>());
    orchestrator.shutdown_all().await;
}

#[tokio::test]
async fn test_barge_in_cancels_once_and_drops_ghost_audio() {
    let config = BridgeConfig {
        interruption_grace_ms: 10_000,
        ..Default::default()
    };
    let (connector, mut connected) = MockConnector::new();
    let orchestrator = BridgeOrchestrator::new(config, connector);
    let (session, telephony, ai) = admit(&orchestrator, &mut connected, "CA-barge").await;

    ai.control(ControlKind::SpeechStarted, Side::Ai, Some("item_1"));
    for fill in 0..5u8 {
        ai.push(ai_chunk("item_1", fill));
    }
    wait_until("AI audio at the caller", || {
        telephony.recorder.audio().len() == 5
    })
    .await;
    assert_eq!(session.state(), SessionState::AIResponding);

    // provider VAD reports the caller talking over the AI
    ai.control(ControlKind::SpeechStarted, Side::Telephony, None);
    wait_for_state(&session, SessionState::Interrupting).await;

    // late chunks of the cancelled item, and a second speech report
    for fill in 5..8u8 {
        ai.push(ai_chunk("item_1", fill));
    }
    ai.control(ControlKind::SpeechStarted, Side::Telephony, None);

    ai.control(ControlKind::SpeechStarted, Side::Ai, Some("item_2"));
    ai.push(ai_chunk("item_2", 42));
    wait_until("next response", || telephony.recorder.audio().len() == 6).await;

    let cancels = ai.recorder.cancels();
    assert_eq!(cancels.len(), 1);
    assert_eq!(cancels[0].0.as_deref(), Some("item_1"));
    assert!(cancels[0].1 <= 100);
    assert_eq!(telephony.recorder.count("clear"), 1);

    let audio = telephony.recorder.audio();
    assert!(
        audio[..5]
            .iter()
            .all(|frame| frame.item_id.as_deref() == Some("item_1"))
    );
    assert_eq!(audio[5].item_id.as_deref(), Some("item_2"));
    assert_eq!(audio[5].payload[0], 42);

    // the clear goes out after the interrupted audio and before the next response
    let sent = telephony.recorder.sent();
    let clear_at = sent.iter().position(|e| *e == Outbound::Clear).unwrap();
    let audio_positions: Vec<usize> = sent
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, Outbound::Audio(_)))
        .map(|(i, _)| i)
        .collect();
    assert!(audio_positions[4] < clear_at);
    assert!(clear_at < audio_positions[5]);

    let history = states(&session);
    assert!(history.contains(&SessionState::Interrupting));
    assert_eq!(session.state(), SessionState::AIResponding);

    drop(telephony);
    wait_closed(&session).await;
    assert_eq!(
        session.close_reason(),
        Some(CloseReason::ConnectionClosed(Side::Telephony))
    );
    assert_eq!(ai.recorder.closes(), 1);
}

/// Admit a call and interrupt a three-chunk AI response to it.
async fn interrupted_call(
    config: BridgeConfig,
    call_id: &str,
) -> (BridgeOrchestrator, Arc<CallSession>, MockEndpoint, MockEndpoint) {
    let (connector, mut connected) = MockConnector::new();
    let orchestrator = BridgeOrchestrator::new(config, connector);
    let (session, telephony, ai) = admit(&orchestrator, &mut connected, call_id).await;

    ai.control(ControlKind::SpeechStarted, Side::Ai, Some("item_1"));
    for fill in 0..3u8 {
        ai.push(ai_chunk("item_1", fill));
    }
    wait_until("AI audio", || telephony.recorder.audio().len() == 3).await;
    ai.control(ControlKind::SpeechStarted, Side::Telephony, None);
    wait_for_state(&session, SessionState::Interrupting).await;
    (orchestrator, session, telephony, ai)
}

#[tokio::test]
async fn test_interruption_ends_after_grace() {
    let config = BridgeConfig {
        interruption_grace_ms: 50,
        ..Default::default()
    };
    let (orchestrator, session, telephony, ai) = interrupted_call(config, "CA-grace").await;

    wait_for_state(&session, SessionState::Active).await;
    let history = states(&session);
    assert_eq!(
        history[history.len() - 3..],
        [
            SessionState::AIResponding,
            SessionState::Interrupting,
            SessionState::Active
        ]
    );
    assert_eq!(ai.recorder.cancels().len(), 1);
    assert_eq!(telephony.recorder.count("clear"), 1);

    // the cancelled item stays muted after the interruption ends
    ai.push(ai_chunk("item_1", 9));
    ai.control(ControlKind::SpeechStarted, Side::Ai, Some("item_2"));
    ai.push(ai_chunk("item_2", 42));
    wait_until("next response", || telephony.recorder.audio().len() == 4).await;
    assert_eq!(telephony.recorder.audio()[3].payload[0], 42);
    assert_eq!(session.state(), SessionState::AIResponding);

    orchestrator.shutdown_all().await;
}

#[tokio::test]
async fn test_interruption_ends_when_ai_audio_stops() {
    let config = BridgeConfig {
        interruption_grace_ms: 10_000,
        ..Default::default()
    };
    let (orchestrator, session, _telephony, ai) = interrupted_call(config, "CA-stopped").await;

    // the provider confirms the truncation long before the grace period ends
    ai.control(ControlKind::SpeechStopped, Side::Ai, Some("item_1"));
    wait_for_state(&session, SessionState::Active).await;
    assert!(session.elapsed() < Duration::from_secs(5));
    assert_eq!(ai.recorder.cancels().len(), 1);

    orchestrator.shutdown_all().await;
}

#[tokio::test]
async fn test_playback_marks_return_to_active() {
    let (connector, mut connected) = MockConnector::new();
    let orchestrator = BridgeOrchestrator::new(BridgeConfig::default(), connector);
    let (session, telephony, ai) = admit(&orchestrator, &mut connected, "CA-marks").await;

    ai.control(ControlKind::SpeechStarted, Side::Ai, Some("item_1"));
    ai.push(ai_chunk("item_1", 1));
    ai.push(ai_chunk("item_1", 2));
    ai.control(ControlKind::SpeechStopped, Side::Ai, Some("item_1"));
    wait_until("marks", || telephony.recorder.count("mark") == 2).await;

    let marks: Vec<String> = telephony
        .recorder
        .sent()
        .into_iter()
        .filter_map(|event| match event {
            Outbound::Mark { name } => Some(name),
            _ => None,
        })
        .collect();
    assert_eq!(marks, vec!["0".to_string(), "1".to_string()]);

    // generation finished but playback has not
    wait_until("generation done", || session.playout_len() == 2).await;
    assert_eq!(session.state(), SessionState::AIResponding);

    telephony.control(ControlKind::PlaybackMark("0".into()), Side::Telephony, None);
    telephony.control(ControlKind::PlaybackMark("1".into()), Side::Telephony, None);
    wait_for_state(&session, SessionState::Active).await;
    assert_eq!(session.playout_len(), 0);

    // caller speech after playback finished interrupts nothing
    ai.control(ControlKind::SpeechStarted, Side::Telephony, None);
    telephony.push(caller_frame(0xFF));
    wait_until("caller audio", || ai.recorder.audio().len() == 1).await;
    assert!(ai.recorder.cancels().is_empty());
    assert_eq!(telephony.recorder.count("clear"), 0);

    orchestrator.shutdown("CA-marks").await.unwrap();
}

#[tokio::test]
async fn test_ai_disconnect_closes_telephony_once() {
    let (connector, mut connected) = MockConnector::new();
    let orchestrator = BridgeOrchestrator::new(BridgeConfig::default(), connector);
    let mut closed = orchestrator.subscribe_closed();
    let (session, telephony, ai) = admit(&orchestrator, &mut connected, "CA-drop").await;

    telephony.push(caller_frame(1));
    wait_until("caller audio", || ai.recorder.audio().len() == 1).await;

    let ai_recorder = ai.recorder.clone();
    drop(ai);
    wait_closed(&session).await;

    let summary = next_summary(&mut closed).await;
    assert_eq!(summary.reason, CloseReason::ConnectionClosed(Side::Ai));
    assert_eq!(telephony.recorder.closes(), 1);
    assert_eq!(ai_recorder.closes(), 1);

    // further close requests are no-ops
    assert!(!session.begin_close(CloseReason::Shutdown));
    assert!(matches!(
        orchestrator.shutdown("CA-drop").await,
        Err(BridgeError::UnknownCall(_))
    ));
    assert_eq!(telephony.recorder.closes(), 1);
}

#[tokio::test]
async fn test_duplicate_call_is_rejected() {
    let (connector, mut connected) = MockConnector::new();
    let orchestrator = BridgeOrchestrator::new(BridgeConfig::default(), connector);
    let (session, telephony, _ai) = admit(&orchestrator, &mut connected, "CA-dup").await;

    let (pair, second) = endpoint(Side::Telephony);
    let result = orchestrator.accept("CA-dup", pair);
    assert!(matches!(result, Err(BridgeError::DuplicateCall(id)) if id == "CA-dup"));

    assert_eq!(orchestrator.active_calls(), 1);
    assert!(Arc::ptr_eq(&orchestrator.lookup("CA-dup").unwrap(), &session));
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(second.recorder.closes(), 0);
    assert_eq!(telephony.recorder.closes(), 0);

    orchestrator.shutdown("CA-dup").await.unwrap();
}

#[tokio::test]
async fn test_capacity_limit() {
    let config = BridgeConfig {
        max_concurrent_calls: Some(1),
        ..Default::default()
    };
    let (connector, mut connected) = MockConnector::new();
    let orchestrator = BridgeOrchestrator::new(config, connector);
    let _first = admit(&orchestrator, &mut connected, "CA-one").await;

    let (pair, _second) = endpoint(Side::Telephony);
    assert!(matches!(
        orchestrator.accept("CA-two", pair),
        Err(BridgeError::CapacityExceeded(1))
    ));

    orchestrator.shutdown("CA-one").await.unwrap();
    let (pair, _third) = endpoint(Side::Telephony);
    assert!(orchestrator.accept("CA-two", pair).is_ok());
    orchestrator.shutdown_all().await;
}

#[tokio::test]
async fn test_duplicate_reported_at_capacity() {
    let config = BridgeConfig {
        max_concurrent_calls: Some(1),
        ..Default::default()
    };
    let (connector, mut connected) = MockConnector::new();
    let orchestrator = BridgeOrchestrator::new(config, connector);
    let (session, _telephony, _ai) = admit(&orchestrator, &mut connected, "CA-dup").await;
    assert!(orchestrator.at_capacity());

    let (pair, _second) = endpoint(Side::Telephony);
    assert!(matches!(
        orchestrator.accept("CA-dup", pair),
        Err(BridgeError::DuplicateCall(id)) if id == "CA-dup"
    ));
    assert!(Arc::ptr_eq(&orchestrator.lookup("CA-dup").unwrap(), &session));
    orchestrator.shutdown_all().await;
    assert!(!orchestrator.at_capacity());
}

#[tokio::test]
async fn test_prepared_setup_reaches_connector() {
    let (connector, mut connected) = MockConnector::new();
    let orchestrator = BridgeOrchestrator::new(BridgeConfig::default(), connector.clone());
    let setup = CallSetup::with_objectives(["Confirm Friday's appointment"]);

    orchestrator.prepare_call("CA-out", setup.clone());
    assert_eq!(orchestrator.prepared_setup("CA-out"), Some(setup.clone()));
    let _outbound = admit(&orchestrator, &mut connected, "CA-out").await;
    let _inbound = admit(&orchestrator, &mut connected, "CA-in").await;

    let explicit = CallSetup::with_objectives(["Collect the invoice number"]);
    let (pair, _telephony) = endpoint(Side::Telephony);
    orchestrator
        .accept_with("CA-direct", pair, explicit.clone())
        .unwrap();
    let _direct = timeout(Duration::from_secs(2), connected.recv())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        connector.setups(),
        vec![
            ("CA-out".to_string(), setup),
            ("CA-in".to_string(), CallSetup::default()),
            ("CA-direct".to_string(), explicit),
        ]
    );
    // a setup is consumed by the call that used it
    assert_eq!(orchestrator.prepared_setup("CA-out"), None);
    orchestrator.shutdown_all().await;
}

#[tokio::test(start_paused = true)]
async fn test_max_call_duration() {
    let config = BridgeConfig {
        max_call_duration_secs: 2,
        ..Default::default()
    };
    let (connector, mut connected) = MockConnector::new();
    let orchestrator = BridgeOrchestrator::new(config, connector);
    let (pair, telephony) = endpoint(Side::Telephony);
    let session = orchestrator.accept("CA-long", pair).unwrap();
    let (_, ai) = connected.recv().await.unwrap();

    session.closed().await;
    assert_eq!(session.close_reason(), Some(CloseReason::MaxDuration));
    assert!(session.elapsed() >= Duration::from_secs(2));
    assert_eq!(telephony.recorder.closes(), 1);
    assert_eq!(ai.recorder.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout() {
    let config = BridgeConfig {
        connect_timeout_ms: 50,
        ..Default::default()
    };
    let (connector, _connected) = MockConnector::with_delay(Duration::from_secs(30));
    let orchestrator = BridgeOrchestrator::new(config, connector.clone());
    let (pair, telephony) = endpoint(Side::Telephony);
    let session = orchestrator.accept("CA-timeout", pair).unwrap();
    telephony.push(caller_frame(7));

    session.closed().await;
    match session.close_reason() {
        Some(CloseReason::UpstreamUnavailable(detail)) => assert!(detail.contains("timed out")),
        other => panic!("unexpected close reason: {other:?}"),
    }
    assert_eq!(connector.attempts(), 1);
    assert_eq!(telephony.recorder.closes(), 1);
    assert!(!states(&session).contains(&SessionState::Active));
}

#[tokio::test]
async fn test_connect_failure() {
    let (connector, _connected) = MockConnector::failing("401 Unauthorized");
    let orchestrator = BridgeOrchestrator::new(BridgeConfig::default(), connector);
    let mut closed = orchestrator.subscribe_closed();
    let (pair, telephony) = endpoint(Side::Telephony);
    let session = orchestrator.accept("CA-refused", pair).unwrap();

    wait_closed(&session).await;
    let summary = next_summary(&mut closed).await;
    assert_eq!(
        summary.reason,
        CloseReason::UpstreamUnavailable("401 Unauthorized".to_string())
    );
    assert_eq!(telephony.recorder.closes(), 1);
    assert!(orchestrator.lookup("CA-refused").is_none());
}

#[tokio::test]
async fn test_shutdown_all_closes_every_call() {
    let (connector, mut connected) = MockConnector::new();
    let orchestrator = BridgeOrchestrator::new(BridgeConfig::default(), connector);
    let mut closed = orchestrator.subscribe_closed();

    let mut calls = Vec::new();
    for call_id in ["CA-a", "CA-b", "CA-c"] {
        calls.push(admit(&orchestrator, &mut connected, call_id).await);
    }
    let mut ids = orchestrator.call_ids();
    ids.sort();
    assert_eq!(ids, vec!["CA-a", "CA-b", "CA-c"]);

    assert_eq!(orchestrator.shutdown_all().await, 3);
    assert_eq!(orchestrator.active_calls(), 0);

    for (session, telephony, ai) in &calls {
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(telephony.recorder.closes(), 1);
        assert_eq!(ai.recorder.closes(), 1);
    }
    for _ in 0..3 {
        assert_eq!(next_summary(&mut closed).await.reason, CloseReason::Shutdown);
    }
    assert_eq!(orchestrator.shutdown_all().await, 0);
}

#[tokio::test]
async fn test_caller_energy_interrupts() {
    let config = BridgeConfig {
        interruption_trigger: InterruptionTrigger::CallerEnergy,
        energy_min_frames: 2,
        interruption_grace_ms: 10_000,
        ..Default::default()
    };
    let (connector, mut connected) = MockConnector::new();
    let orchestrator = BridgeOrchestrator::new(config, connector);
    let (session, telephony, ai) = admit(&orchestrator, &mut connected, "CA-energy").await;

    ai.control(ControlKind::SpeechStarted, Side::Ai, Some("item_a"));
    for fill in 0..3u8 {
        ai.push(ai_chunk("item_a", fill));
    }
    // provider VAD is not a trigger in this mode
    ai.control(ControlKind::SpeechStarted, Side::Telephony, None);
    ai.push(ai_chunk("item_a", 3));
    wait_until("AI audio", || telephony.recorder.audio().len() == 4).await;
    assert!(ai.recorder.cancels().is_empty());

    telephony.push(frame_at_level(200));
    telephony.push(frame_at_level(12_000));
    telephony.push(frame_at_level(12_000));
    wait_for_state(&session, SessionState::Interrupting).await;

    wait_until("cancel", || ai.recorder.cancels().len() == 1).await;
    assert_eq!(ai.recorder.cancels()[0].0.as_deref(), Some("item_a"));
    assert_eq!(telephony.recorder.count("clear"), 1);

    // caller audio keeps flowing to the AI during the interruption
    wait_until("caller audio", || ai.recorder.audio().len() == 3).await;
    orchestrator.shutdown("CA-energy").await.unwrap();
}

#[tokio::test]
async fn test_protocol_errors_close_after_threshold() {
    let config = BridgeConfig {
        max_consecutive_frame_errors: 3,
        ..Default::default()
    };
    let (connector, mut connected) = MockConnector::new();
    let orchestrator = BridgeOrchestrator::new(config, connector);
    let (session, telephony, ai) = admit(&orchestrator, &mut connected, "CA-garbage").await;

    telephony.push_error(BridgeError::protocol(Side::Telephony, "bad json"));
    telephony.push_error(BridgeError::protocol(Side::Telephony, "bad json"));
    telephony.push(caller_frame(1));
    wait_until("good frame", || ai.recorder.audio().len() == 1).await;
    assert_eq!(session.state(), SessionState::Active);

    for _ in 0..3 {
        telephony.push_error(BridgeError::protocol(Side::Telephony, "bad json"));
    }
    wait_closed(&session).await;
    assert_eq!(
        session.close_reason(),
        Some(CloseReason::ProtocolError(Side::Telephony))
    );
}

#[tokio::test]
async fn test_telephony_send_failure_is_fatal() {
    let (connector, mut connected) = MockConnector::new();
    let orchestrator = BridgeOrchestrator::new(BridgeConfig::default(), connector);
    let (session, telephony, ai) = admit(&orchestrator, &mut connected, "CA-broken").await;

    telephony.recorder.fail_sends();
    ai.control(ControlKind::SpeechStarted, Side::Ai, Some("item_1"));
    ai.push(ai_chunk("item_1", 1));

    wait_closed(&session).await;
    assert_eq!(
        session.close_reason(),
        Some(CloseReason::SendFailed(Side::Telephony))
    );
    assert_eq!(telephony.recorder.closes(), 1);
}

#[tokio::test]
async fn test_instruction_injection() {
    let (connector, mut connected) = MockConnector::new();
    let orchestrator = BridgeOrchestrator::new(BridgeConfig::default(), connector);
    let (_session, _telephony, ai) = admit(&orchestrator, &mut connected, "CA-admin").await;

    orchestrator
        .inject_instruction("CA-admin", "Offer a callback")
        .await
        .unwrap();
    assert_eq!(
        ai.recorder.sent(),
        vec![Outbound::Instruction("Offer a callback".to_string())]
    );

    assert!(matches!(
        orchestrator.inject_instruction("CA-missing", "hello").await,
        Err(BridgeError::UnknownCall(_))
    ));
    orchestrator.shutdown_all().await;
}
