//! Session lifecycle scenario tests

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use yodel::engine::ListenArgs;
use yodel::session::{NoCallbacks, SendArgs, Session, SessionArgs, SessionStatus};
use yodel::stanza::error::{JingleCondition, XmppCondition};
use yodel::stanza::jingle::{Action, JinglePayload, Media, Reason, SessionInfoType};
use yodel::stanza::{IqType, Jid, Stanza};

use common::{
    audio_content, candidate, engine_with, initiate_request, jingle_iq, transport_pair,
    FakeBackend, RecordingTransport, SpawnSessionHandler,
};

fn quiet_listen() -> ListenArgs {
    ListenArgs {
        extdisco: false,
        relaynodes: false,
        ..Default::default()
    }
}

async fn wait_status(session: &Arc<Session>, status: SessionStatus) -> bool {
    for _ in 0..400 {
        if session.status().await == status {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

fn sent_actions(stanzas: &[Stanza]) -> Vec<Action> {
    stanzas
        .iter()
        .filter_map(|s| s.jingle().map(|p| p.action))
        .collect()
}

#[tokio::test]
async fn test_full_handshake_between_two_engines() {
    let (transport_a, transport_b) =
        transport_pair("alice@example.org/home", "bob@example.org/road");
    let backend_a = FakeBackend::new("a");
    let backend_b = FakeBackend::new("b");

    let engine_a = engine_with(transport_a.clone(), Some(backend_a.clone()));
    let engine_b = engine_with(transport_b.clone(), Some(backend_b.clone()));

    engine_a.listen(quiet_listen()).await;
    let hook = SpawnSessionHandler::new();
    engine_b
        .listen(ListenArgs {
            initiate: Some(hook.clone()),
            ..quiet_listen()
        })
        .await;

    let session_a = engine_a.session(SessionArgs {
        to: Some(Jid::new("bob@example.org/road")),
        media: Media::Audio,
        callbacks: Arc::new(NoCallbacks),
    });
    session_a.initiate().await;

    assert!(wait_status(&session_a, SessionStatus::Initiated).await);

    let session_b = {
        let mut found = None;
        for _ in 0..400 {
            if let Some(session) = hook.first() {
                found = Some(session);
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        found.expect("responder session never created")
    };

    assert!(wait_status(&session_b, SessionStatus::Initiated).await);
    assert_eq!(session_a.sid().await, session_b.sid().await);
    assert!(session_a.is_initiator().await);
    assert!(session_b.is_responder().await);

    session_b.accept().await;

    assert!(wait_status(&session_b, SessionStatus::Accepted).await);
    assert!(wait_status(&session_a, SessionStatus::Accepted).await);

    // The responder's candidates were applied on the initiator side and the
    // queue was emptied
    let peer_a = backend_a.last_peer().expect("initiator peer missing");
    assert!(peer_a.added_candidate_count() >= 1);
    assert_eq!(session_a.queued_remote_candidate_count().await, 0);

    // Clean teardown initiated by the responder
    session_b.terminate(Reason::Success).await;

    assert!(wait_status(&session_a, SessionStatus::Terminated).await);
    assert!(wait_status(&session_b, SessionStatus::Terminated).await);
    assert_eq!(session_a.reason().await, Reason::Success);
    assert_eq!(engine_a.registry().single_count().await, 0);
    assert_eq!(engine_b.registry().single_count().await, 0);
    assert_eq!(peer_a.close_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_operations_refuse_wrong_status() {
    let transport = RecordingTransport::new("alice@example.org/home");
    let engine = engine_with(transport.clone(), Some(FakeBackend::new("a")));

    let session = engine.session(SessionArgs {
        to: Some(Jid::new("bob@example.org/road")),
        media: Media::Audio,
        callbacks: Arc::new(NoCallbacks),
    });

    // accept() before anything was initiated is a no-op
    session.accept().await;
    assert_eq!(session.status().await, SessionStatus::Inactive);

    // info() outside an active call is a no-op
    session.info(Some(SessionInfoType::Ringing), None).await;

    common::settle().await;
    assert_eq!(transport.sent_count(), 0);
}

#[tokio::test]
async fn test_send_refuses_missing_or_stubbed_actions() {
    let transport = RecordingTransport::new("alice@example.org/home");
    let engine = engine_with(transport.clone(), Some(FakeBackend::new("a")));

    let session = engine.session(SessionArgs {
        to: Some(Jid::new("bob@example.org/road")),
        media: Media::Audio,
        callbacks: Arc::new(NoCallbacks),
    });

    // Missing action on a set stanza
    assert!(!session.send(IqType::Set, SendArgs::default()).await);

    // Stubbed content sub-action: local error, nothing transmitted
    assert!(
        !session
            .send(
                IqType::Set,
                SendArgs {
                    action: Some(Action::ContentAccept),
                    ..Default::default()
                },
            )
            .await
    );

    // Only set and result are valid envelope types
    assert!(!session.send(IqType::Get, SendArgs::default()).await);

    assert_eq!(transport.sent_count(), 0);
}

#[tokio::test]
async fn test_abort_is_idempotent() {
    let transport = RecordingTransport::new("alice@example.org/home");
    let backend = FakeBackend::new("a");
    let engine = engine_with(transport.clone(), Some(backend.clone()));

    let session = engine.session(SessionArgs {
        to: Some(Jid::new("bob@example.org/road")),
        media: Media::Audio,
        callbacks: Arc::new(NoCallbacks),
    });
    session.initiate().await;
    assert_eq!(engine.registry().single_count().await, 1);

    session.abort(false).await;
    session.abort(false).await;

    assert_eq!(session.status().await, SessionStatus::Terminated);
    assert_eq!(engine.registry().single_count().await, 0);

    let peer = backend.last_peer().expect("peer missing");
    assert_eq!(peer.close_count.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_accept_reply_timeout_terminates_with_timeout() {
    let transport = RecordingTransport::new("alice@example.org/home");
    let backend = FakeBackend::new("a");
    let engine = engine_with(transport.clone(), Some(backend.clone()));

    let session = engine.session(SessionArgs::default());

    // Become the responder of an inbound call, then accept it
    session
        .handle(initiate_request("bob@example.org/road", "sid-1", "iq-1"))
        .await;
    assert_eq!(session.status().await, SessionStatus::Initiated);

    session.accept().await;
    assert!(wait_status(&session, SessionStatus::Accepting).await);

    let mut sent_accept = false;
    for _ in 0..400 {
        if sent_actions(&transport.sent_stanzas()).contains(&Action::SessionAccept) {
            sent_accept = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(sent_accept);

    // No reply ever arrives: the accept timeout fires the error path, which
    // terminates with reason timeout; the terminate reply times out too and
    // forces a local teardown
    tokio::time::sleep(Duration::from_secs(11)).await;
    tokio::time::sleep(Duration::from_secs(11)).await;

    assert_eq!(session.status().await, SessionStatus::Terminated);
    assert_eq!(session.reason().await, Reason::Timeout);
    assert!(session.is_locked().await);

    let actions = sent_actions(&transport.sent_stanzas());
    assert!(actions.contains(&Action::SessionTerminate));
    let terminate_reason = transport
        .sent_stanzas()
        .iter()
        .filter_map(|s| s.jingle().cloned())
        .find(|p| p.action == Action::SessionTerminate)
        .and_then(|p| p.reason);
    assert_eq!(terminate_reason, Some(Reason::Timeout));
}

#[tokio::test]
async fn test_mute_and_unmute_are_idempotent() {
    let transport = RecordingTransport::new("alice@example.org/home");
    let backend = FakeBackend::new("a");
    let engine = engine_with(transport.clone(), Some(backend.clone()));

    let session = engine.session(SessionArgs {
        to: Some(Jid::new("bob@example.org/road")),
        media: Media::Audio,
        callbacks: Arc::new(NoCallbacks),
    });
    session.initiate().await;

    session.mute("audio").await;
    session.mute("audio").await;

    let mutes = transport
        .sent_stanzas()
        .iter()
        .filter_map(|s| s.jingle().cloned())
        .filter(|p| p.info == Some(SessionInfoType::Mute))
        .count();
    assert_eq!(mutes, 1);
    assert_eq!(session.mute_state("audio").await, Some(true));

    let media = backend.media.lock().unwrap().last().cloned().unwrap();
    assert!(!media.audio_enabled.load(Ordering::SeqCst));

    session.unmute("audio").await;
    session.unmute("audio").await;

    let unmutes = transport
        .sent_stanzas()
        .iter()
        .filter_map(|s| s.jingle().cloned())
        .filter(|p| p.info == Some(SessionInfoType::Unmute))
        .count();
    assert_eq!(unmutes, 1);
    assert_eq!(session.mute_state("audio").await, Some(false));
    assert!(media.audio_enabled.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_inbound_transport_info_flushes_queue_and_acks() {
    let transport = RecordingTransport::new("alice@example.org/home");
    let engine = engine_with(transport.clone(), Some(FakeBackend::new("a")));

    let session = engine.session(SessionArgs::default());
    session
        .handle(initiate_request("bob@example.org/road", "sid-1", "iq-1"))
        .await;
    assert_eq!(session.status().await, SessionStatus::Initiated);

    session
        .handle(jingle_iq(
            "bob@example.org/road",
            IqType::Set,
            "iq-2",
            JinglePayload::new(Action::TransportInfo, "sid-1")
                .with_contents(vec![audio_content(vec![candidate("c9")])]),
        ))
        .await;

    // The queue was emptied and the request acknowledged
    assert_eq!(session.queued_remote_candidate_count().await, 0);
    assert!(transport
        .sent_stanzas()
        .iter()
        .any(|s| s.iq_type == Some(IqType::Result) && s.id.as_deref() == Some("iq-2")));

    // Malformed payload: no contents
    session
        .handle(jingle_iq(
            "bob@example.org/road",
            IqType::Set,
            "iq-3",
            JinglePayload::new(Action::TransportInfo, "sid-1"),
        ))
        .await;
    let last = transport.sent_stanzas();
    let error = last.last().and_then(|s| s.error);
    assert_eq!(error.map(|e| e.xmpp), Some(Some(XmppCondition::BadRequest)));
}

#[tokio::test]
async fn test_unsafe_stanzas_are_dropped_with_unknown_session() {
    let transport = RecordingTransport::new("alice@example.org/home");
    let engine = engine_with(transport.clone(), Some(FakeBackend::new("a")));

    let session = engine.session(SessionArgs::default());
    session
        .handle(initiate_request("bob@example.org/road", "sid-1", "iq-1"))
        .await;

    // Same sid, different sender
    session
        .handle(jingle_iq(
            "carol@example.org/cafe",
            IqType::Set,
            "iq-2",
            JinglePayload::new(Action::SessionTerminate, "sid-1"),
        ))
        .await;
    assert_eq!(session.status().await, SessionStatus::Initiated);

    // Right sender, wrong sid
    session
        .handle(jingle_iq(
            "bob@example.org/road",
            IqType::Set,
            "iq-3",
            JinglePayload::new(Action::SessionTerminate, "sid-2"),
        ))
        .await;
    assert_eq!(session.status().await, SessionStatus::Initiated);

    let errors: Vec<_> = transport
        .sent_stanzas()
        .iter()
        .filter_map(|s| s.error)
        .collect();
    assert_eq!(errors.len(), 2);
    assert!(errors
        .iter()
        .all(|e| e.jingle == Some(JingleCondition::UnknownSession)));
}

#[tokio::test]
async fn test_media_error_on_initiate_rolls_back_and_locks() {
    let transport = RecordingTransport::new("alice@example.org/home");
    let backend = FakeBackend::new("a");
    backend.fail_media.store(true, Ordering::SeqCst);
    let engine = engine_with(transport.clone(), Some(backend));

    let session = engine.session(SessionArgs {
        to: Some(Jid::new("bob@example.org/road")),
        media: Media::Audio,
        callbacks: Arc::new(NoCallbacks),
    });
    session.initiate().await;

    assert_eq!(session.status().await, SessionStatus::Inactive);
    assert!(session.is_locked().await);
    assert_eq!(engine.registry().single_count().await, 0);

    // The exhausted object refuses further use
    session.initiate().await;
    assert_eq!(session.status().await, SessionStatus::Inactive);
}

#[tokio::test]
async fn test_incompatible_answer_terminates_both_sides() {
    let (transport_a, transport_b) =
        transport_pair("alice@example.org/home", "bob@example.org/road");
    let backend_a = FakeBackend::new("a");
    let backend_b = FakeBackend::new("b");

    let engine_a = engine_with(transport_a.clone(), Some(backend_a.clone()));
    let engine_b = engine_with(transport_b.clone(), Some(backend_b.clone()));

    engine_a.listen(quiet_listen()).await;
    let hook = SpawnSessionHandler::new();
    engine_b
        .listen(ListenArgs {
            initiate: Some(hook.clone()),
            ..quiet_listen()
        })
        .await;

    let session_a = engine_a.session(SessionArgs {
        to: Some(Jid::new("bob@example.org/road")),
        media: Media::Audio,
        callbacks: Arc::new(NoCallbacks),
    });
    session_a.initiate().await;
    assert!(wait_status(&session_a, SessionStatus::Initiated).await);

    // The initiator's peer will reject the responder's answer
    backend_a
        .last_peer()
        .expect("initiator peer missing")
        .fail_remote_description
        .store(true, Ordering::SeqCst);

    let session_b = hook.first().expect("responder session never created");
    session_b.accept().await;

    assert!(wait_status(&session_a, SessionStatus::Terminated).await);
    assert_eq!(session_a.reason().await, Reason::IncompatibleParameters);
    assert!(wait_status(&session_b, SessionStatus::Terminated).await);
}

#[tokio::test]
async fn test_session_ops_defer_until_gate_opens() {
    let transport = RecordingTransport::new("alice@example.org/home");
    let engine = engine_with(transport.clone(), Some(FakeBackend::new("a")));

    engine.gate().acquire().await;

    let session = engine.session(SessionArgs {
        to: Some(Jid::new("bob@example.org/road")),
        media: Media::Audio,
        callbacks: Arc::new(NoCallbacks),
    });
    session.initiate().await;

    // Gated: nothing happened yet
    assert_eq!(session.status().await, SessionStatus::Inactive);
    assert_eq!(transport.sent_count(), 0);

    engine.gate().release().await;

    // The replayed initiate runs to the wire
    let mut sent_initiate = false;
    for _ in 0..400 {
        if sent_actions(&transport.sent_stanzas()).contains(&Action::SessionInitiate) {
            sent_initiate = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(sent_initiate);
    assert_ne!(session.status().await, SessionStatus::Inactive);
}
