//! Connection lifecycle, handshake and reconnect behavior against a scripted transport.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{harness, sent_frames, settle, BindReply};
use furioso_client::shared::{EventKind, RealtimeError, SurveyPayload};
use furioso_client::ws::{CloseInfo, ConnectionState};
use serde_json::json;
use tokio::time::sleep;

// --- Connect / send / disconnect ---

#[tokio::test(start_paused = true)]
async fn connect_opens_one_socket() {
    let h = harness(BindReply::Accept);
    assert_eq!(h.client.state(), ConnectionState::Disconnected);

    h.client.connect().await.unwrap();
    assert_eq!(h.connector.opens(), 1);
    assert!(h.client.is_connected());
    assert!(!h.client.is_authenticated());
    assert_eq!(h.client.state(), ConnectionState::Connected);
    assert!(h.client.client_id().is_some());
}

#[tokio::test(start_paused = true)]
async fn send_requires_an_open_socket() {
    let h = harness(BindReply::Accept);
    assert!(!h.client.send("survey_answer", json!({"surveyId": 1})));

    h.client.connect().await.unwrap();
    let mut peer = h.connector.take_peer();
    assert!(h.client.send("survey_answer", json!({"surveyId": 1})));

    let frames = sent_frames(&mut peer);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].kind, "survey_answer");
    assert_eq!(frames[0].payload, json!({"surveyId": 1}));
    assert!(frames[0].timestamp.is_some());

    h.client.disconnect();
    assert!(!h.client.send("survey_answer", json!({})));
}

#[tokio::test(start_paused = true)]
async fn each_connect_uses_a_fresh_client_id() {
    let h = harness(BindReply::Accept);
    h.client.connect().await.unwrap();
    let first = h.client.client_id();
    h.client.connect().await.unwrap();
    let second = h.client.client_id();

    assert_eq!(h.connector.opens(), 2);
    assert_ne!(first, second);
}

#[tokio::test(start_paused = true)]
async fn failed_connect_reports_the_error() {
    let h = harness(BindReply::Accept);
    h.connector.refuse(true);

    let err = h.client.connect().await.unwrap_err();
    assert!(matches!(err, RealtimeError::Transport(_)));
    assert_eq!(h.client.state(), ConnectionState::Disconnected);
    assert!(h.client.last_error().is_some());
    assert!(!h.client.has_pending_reconnect());
}

// --- Inbound frames ---

#[tokio::test(start_paused = true)]
async fn ping_is_answered_with_one_pong_and_never_dispatched() {
    let h = harness(BindReply::Accept);
    let hits = Arc::new(AtomicUsize::new(0));
    let subscriptions: Vec<_> = EventKind::ALL
        .iter()
        .map(|kind| {
            let hits = hits.clone();
            h.client.listen(*kind, move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
        .collect();

    h.client.connect().await.unwrap();
    let mut peer = h.connector.take_peer();
    peer.push_text(r#"{"type":"ping"}"#);
    settle().await;

    let frames = sent_frames(&mut peer);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].kind, "pong");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    drop(subscriptions);
}

#[tokio::test(start_paused = true)]
async fn events_reach_subscribers_past_a_failing_one() {
    let h = harness(BindReply::Accept);
    let titles = Arc::new(std::sync::Mutex::new(Vec::new()));

    let _failing = h.client.listen(EventKind::SurveyPublished, |_| {
        anyhow::bail!("render failed")
    });
    let seen = titles.clone();
    let _typed = h
        .client
        .subscribe(EventKind::SurveyPublished, move |survey: &SurveyPayload| {
            seen.lock().unwrap().push(survey.title.clone());
            Ok(())
        });

    h.client.connect().await.unwrap();
    let peer = h.connector.take_peer();
    peer.push_text("not json");
    peer.push_text(r#"{"type":"brand_new_kind","payload":{}}"#);
    peer.push_text(r#"{"type":"survey_published","payload":{"title":"X"},"timestamp":1}"#);
    settle().await;

    assert_eq!(*titles.lock().unwrap(), vec![Some("X".to_string())]);
    assert!(h.client.is_connected());
}

// --- Keepalive ---

#[tokio::test(start_paused = true)]
async fn keepalive_pings_while_connected_only() {
    let h = harness(BindReply::Accept);
    h.client.connect().await.unwrap();
    let mut peer = h.connector.take_peer();

    sleep(Duration::from_millis(30_001)).await;
    let frames = sent_frames(&mut peer);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].kind, "ping");

    h.client.disconnect();
    sleep(Duration::from_secs(120)).await;
    assert!(sent_frames(&mut peer).is_empty());
}

// --- Handshake ---

#[tokio::test(start_paused = true)]
async fn authenticate_without_socket_fails_without_http_call() {
    let h = harness(BindReply::Accept);
    let err = h.client.authenticate().await.unwrap_err();
    assert!(matches!(err, RealtimeError::NotConnected));
    assert_eq!(h.binder.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn authenticate_binds_the_current_client_id() {
    let h = harness(BindReply::Accept);
    h.client.connect().await.unwrap();
    h.client.authenticate().await.unwrap();

    assert!(h.client.is_authenticated());
    assert_eq!(h.binder.client_ids(), vec![h.client.client_id().unwrap()]);
}

#[tokio::test(start_paused = true)]
async fn disconnect_resets_authentication() {
    let h = harness(BindReply::Accept);
    h.client.connect().await.unwrap();
    h.client.authenticate().await.unwrap();

    h.client.disconnect();
    assert!(!h.client.is_authenticated());
    assert!(!h.client.is_connected());
    assert_eq!(h.client.state(), ConnectionState::Disconnected);

    // A new manual connection starts unauthenticated
    h.client.connect().await.unwrap();
    assert!(!h.client.is_authenticated());
    assert_eq!(h.binder.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn rejected_handshake_surfaces_the_problem_detail() {
    let h = harness(BindReply::Reject(401));
    h.client.connect().await.unwrap();

    let err = h.client.authenticate().await.unwrap_err();
    assert_eq!(err, RealtimeError::Auth("session expired".to_string()));
    assert!(!h.client.is_authenticated());
    assert!(h.client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn unanswered_handshake_times_out() {
    let h = harness(BindReply::Hang);
    h.client.connect().await.unwrap();

    let err = h.client.authenticate().await.unwrap_err();
    assert_eq!(err, RealtimeError::AuthTimeout(Duration::from_millis(5000)));
    assert!(!h.client.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn auth_frames_resolve_a_pending_handshake() {
    let h = harness(BindReply::Hang);
    h.client.connect().await.unwrap();
    let peer = h.connector.take_peer();

    let client = h.client.clone();
    let handshake = tokio::spawn(async move { client.authenticate().await });
    settle().await;
    peer.push_text(r#"{"type":"auth_success"}"#);

    handshake.await.unwrap().unwrap();
    assert!(h.client.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn auth_error_frame_fails_the_handshake() {
    let h = harness(BindReply::Hang);
    h.client.connect().await.unwrap();
    let peer = h.connector.take_peer();

    let client = h.client.clone();
    let handshake = tokio::spawn(async move { client.authenticate().await });
    settle().await;
    peer.push_text(r#"{"type":"auth_error","payload":{"message":"expired"}}"#);

    let err = handshake.await.unwrap().unwrap_err();
    assert_eq!(err, RealtimeError::Auth("expired".to_string()));
    assert!(!h.client.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn socket_loss_during_handshake_fails_it() {
    let h = harness(BindReply::Hang);
    h.client.connect().await.unwrap();
    let peer = h.connector.take_peer();

    let client = h.client.clone();
    let handshake = tokio::spawn(async move { client.authenticate().await });
    settle().await;
    peer.close(CloseInfo::clean(1000, "server shutdown"));

    let err = handshake.await.unwrap().unwrap_err();
    assert!(matches!(err, RealtimeError::Transport(_)));
}

// --- Reconnect ---

#[tokio::test(start_paused = true)]
async fn unclean_close_schedules_first_attempt_at_base_delay() {
    let h = harness(BindReply::Accept);
    h.client.connect().await.unwrap();
    let peer = h.connector.take_peer();

    peer.close(CloseInfo::abnormal("network reset"));
    settle().await;
    assert_eq!(h.client.state(), ConnectionState::Reconnecting { attempt: 1 });
    assert_eq!(h.client.reconnect_attempts(), 1);
    assert!(h.client.has_pending_reconnect());
    assert!(!h.client.is_connected());

    sleep(Duration::from_millis(997)).await;
    assert_eq!(h.connector.opens(), 1);

    sleep(Duration::from_millis(5)).await;
    assert_eq!(h.connector.opens(), 2);
    assert_eq!(h.client.state(), ConnectionState::Connected);
    assert_eq!(h.client.reconnect_attempts(), 0);
    assert!(!h.client.has_pending_reconnect());
}

#[tokio::test(start_paused = true)]
async fn clean_close_does_not_reconnect() {
    let h = harness(BindReply::Accept);
    h.client.connect().await.unwrap();
    let peer = h.connector.take_peer();

    peer.close(CloseInfo::clean(1000, "bye"));
    settle().await;
    assert_eq!(h.client.state(), ConnectionState::Disconnected);
    assert!(!h.client.has_pending_reconnect());

    sleep(Duration::from_secs(60)).await;
    assert_eq!(h.connector.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn only_one_reconnect_is_ever_pending() {
    let h = harness(BindReply::Accept);
    h.client.connect().await.unwrap();
    let stale = h.connector.take_peer();
    h.client.connect().await.unwrap();
    let current = h.connector.take_peer();

    // Closing a superseded socket changes nothing
    stale.close(CloseInfo::abnormal("late close"));
    settle().await;
    assert!(!h.client.has_pending_reconnect());
    assert_eq!(h.client.state(), ConnectionState::Connected);

    current.close(CloseInfo::abnormal("network reset"));
    settle().await;
    assert!(h.client.has_pending_reconnect());

    // A manual connect replaces the pending attempt
    h.client.connect().await.unwrap();
    assert!(!h.client.has_pending_reconnect());
    let opens = h.connector.opens();
    sleep(Duration::from_secs(10)).await;
    assert_eq!(h.connector.opens(), opens);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_a_pending_reconnect() {
    let h = harness(BindReply::Accept);
    h.client.connect().await.unwrap();
    h.connector.take_peer().close(CloseInfo::abnormal("reset"));
    settle().await;
    assert!(h.client.has_pending_reconnect());

    h.client.disconnect();
    assert!(!h.client.has_pending_reconnect());
    sleep(Duration::from_secs(60)).await;
    assert_eq!(h.connector.opens(), 1);
    assert_eq!(h.client.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_attempts() {
    let h = harness(BindReply::Accept);
    h.client.connect().await.unwrap();
    h.connector.refuse(true);
    h.connector.take_peer().close(CloseInfo::abnormal("reset"));

    // 1s + 2s + 4s + 8s + 16s of backoff
    sleep(Duration::from_secs(120)).await;
    assert_eq!(h.connector.opens(), 1 + 5);
    assert!(matches!(h.client.state(), ConnectionState::Failed { .. }));
    assert!(!h.client.has_pending_reconnect());
    assert!(h
        .client
        .last_error()
        .unwrap()
        .contains("Max reconnect attempts"));

    // A manual connect starts over
    h.connector.refuse(false);
    h.client.connect().await.unwrap();
    assert_eq!(h.client.state(), ConnectionState::Connected);
    assert_eq!(h.client.reconnect_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn reconnect_restores_a_previous_authentication() {
    let h = harness(BindReply::Accept);
    h.client.connect().await.unwrap();
    h.client.authenticate().await.unwrap();
    let first_id = h.client.client_id();

    h.connector.take_peer().close(CloseInfo::abnormal("reset"));
    settle().await;
    assert!(!h.client.is_authenticated());

    sleep(Duration::from_millis(1100)).await;
    assert_eq!(h.client.state(), ConnectionState::Connected);
    assert!(h.client.is_authenticated());
    assert_eq!(h.binder.calls(), 2);
    assert_ne!(h.client.client_id(), first_id);
}

#[tokio::test(start_paused = true)]
async fn rejected_session_is_not_retried_after_reconnect() {
    let h = harness(BindReply::Accept);
    h.client.connect().await.unwrap();
    h.client.authenticate().await.unwrap();

    h.binder.set_reply(BindReply::Reject(401));
    let err = h.client.authenticate().await.unwrap_err();
    assert!(matches!(err, RealtimeError::Auth(_)));

    h.connector.take_peer().close(CloseInfo::abnormal("reset"));
    settle().await;
    sleep(Duration::from_millis(1100)).await;

    assert_eq!(h.client.state(), ConnectionState::Connected);
    assert!(!h.client.is_authenticated());
    assert_eq!(h.binder.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn auth_error_frame_stops_reauth_after_reconnect() {
    let h = harness(BindReply::Accept);
    h.client.connect().await.unwrap();
    h.client.authenticate().await.unwrap();
    let peer = h.connector.take_peer();

    peer.push_text(r#"{"type":"auth_error","payload":{"message":"revoked"}}"#);
    settle().await;
    assert!(!h.client.is_authenticated());

    peer.close(CloseInfo::abnormal("reset"));
    settle().await;
    sleep(Duration::from_millis(1100)).await;

    assert_eq!(h.client.state(), ConnectionState::Connected);
    assert!(!h.client.is_authenticated());
    assert_eq!(h.binder.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn manual_connect_forgets_the_previous_session() {
    let h = harness(BindReply::Accept);
    h.client.connect().await.unwrap();
    h.client.authenticate().await.unwrap();

    h.client.connect().await.unwrap();
    assert!(!h.client.is_authenticated());

    h.connector.take_peer().close(CloseInfo::abnormal("reset"));
    settle().await;
    sleep(Duration::from_millis(1100)).await;

    assert_eq!(h.client.state(), ConnectionState::Connected);
    assert!(!h.client.is_authenticated());
    assert_eq!(h.binder.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn mismatched_payload_shapes_still_reach_subscribers() {
    let h = harness(BindReply::Accept);
    h.client.connect().await.unwrap();
    let peer = h.connector.take_peer();

    let seen = Arc::new(AtomicUsize::new(0));
    let mut subscriptions = Vec::new();
    for kind in [EventKind::ShopItemAdded, EventKind::RewardEarned, EventKind::MatchUpdated] {
        let seen = seen.clone();
        subscriptions.push(h.client.listen(kind, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
    }

    peer.push_text(r#"{"type":"shop_item_added","payload":{"name":"Jersey","price":19.9}}"#);
    peer.push_text(r#"{"type":"reward_earned","payload":{"amount":"10","reason":"watch"}}"#);
    peer.push_text(r#"{"type":"match_updated","payload":{"score":{"furia":1}}}"#);
    settle().await;

    assert_eq!(seen.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn dropped_event_stream_counts_as_unclean() {
    let h = harness(BindReply::Accept);
    h.client.connect().await.unwrap();

    // Dropping the driver end closes the event stream without a close frame
    drop(h.connector.take_peer());
    settle().await;
    assert_eq!(h.client.state(), ConnectionState::Reconnecting { attempt: 1 });
}
