//! One-to-one Jingle session
//!
//! The per-call protocol engine: status transitions, the outbound action
//! dispatch table, the inbound action dispatch table with per-action
//! result/error/request sub-handlers, request/response correlation with
//! timeouts, and the ICE watchdog timers.

pub mod content;
pub mod pending;
pub mod state;

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::engine::Engine;
use crate::peer::{
    IceCandidateEvent, IceConnectionState, LocalMedia, PeerConnection, PeerEvent, RemoteStream,
};
use crate::sdp::SdpType;
use crate::stanza::error::StanzaError;
use crate::stanza::jingle::{
    Action, Candidate, Content, Creator, Description, JinglePayload, Media, Reason, Senders,
    SessionInfoType,
};
use crate::stanza::{self, IqType, Jid, Stanza, StanzaBody, StanzaKind};

use self::content::{media_names, CandidateMap, MediaRoster};
use self::pending::{PendingKey, PendingKind, PendingReplies};
pub use self::state::SessionStatus;

/// Application-supplied lifecycle callbacks, all optional
#[allow(unused_variables)]
pub trait SessionCallbacks: Send + Sync {
    fn on_initiate_pending(&self, session: &Arc<Session>) {}
    fn on_initiate_success(&self, session: &Arc<Session>, stanza: &Stanza) {}
    fn on_initiate_error(&self, session: &Arc<Session>, stanza: Option<&Stanza>) {}
    fn on_initiate_request(&self, session: &Arc<Session>, stanza: &Stanza) {}

    fn on_accept_pending(&self, session: &Arc<Session>) {}
    fn on_accept_success(&self, session: &Arc<Session>, stanza: &Stanza) {}
    fn on_accept_error(&self, session: &Arc<Session>, stanza: Option<&Stanza>) {}
    fn on_accept_request(&self, session: &Arc<Session>, stanza: &Stanza) {}

    fn on_info_pending(&self, session: &Arc<Session>) {}
    fn on_info_success(&self, session: &Arc<Session>, stanza: &Stanza) {}
    fn on_info_error(&self, session: &Arc<Session>, stanza: Option<&Stanza>) {}
    fn on_info_request(&self, session: &Arc<Session>, stanza: &Stanza) {}

    fn on_terminate_pending(&self, session: &Arc<Session>) {}
    fn on_terminate_success(&self, session: &Arc<Session>, stanza: &Stanza) {}
    fn on_terminate_error(&self, session: &Arc<Session>, stanza: Option<&Stanza>) {}
    fn on_terminate_request(&self, session: &Arc<Session>, stanza: &Stanza) {}

    fn on_stream_add(&self, session: &Arc<Session>, stream: &RemoteStream) {}
    fn on_stream_remove(&self, session: &Arc<Session>) {}
    fn on_stream_connected(&self, session: &Arc<Session>) {}
    fn on_stream_disconnected(&self, session: &Arc<Session>) {}
}

/// Callback set that ignores every event
pub struct NoCallbacks;

impl SessionCallbacks for NoCallbacks {}

/// Arguments for creating a session
#[derive(Clone)]
pub struct SessionArgs {
    /// Signaling peer address
    pub to: Option<Jid>,
    /// Requested media for an outbound call
    pub media: Media,
    pub callbacks: Arc<dyn SessionCallbacks>,
}

impl Default for SessionArgs {
    fn default() -> Self {
        Self {
            to: None,
            media: Media::Audio,
            callbacks: Arc::new(NoCallbacks),
        }
    }
}

/// Arguments for [`Session::send`], every recognized field enumerated
#[derive(Debug, Clone, Default)]
pub struct SendArgs {
    /// Required for `set` stanzas
    pub action: Option<Action>,
    /// Stanza id override; acknowledgements echo the request id here
    pub id: Option<String>,
    pub reason: Option<Reason>,
    pub info: Option<SessionInfoType>,
    /// Content name attached to mute/unmute info payloads
    pub name: Option<String>,
}

/// Which candidate list a generated payload draws from
#[derive(Clone, Copy, PartialEq, Eq)]
enum CandidateSource {
    Negotiated,
    QueuedOnly,
}

struct SessionCore {
    sid: String,
    status: SessionStatus,
    to: Option<Jid>,
    initiator: Option<Jid>,
    responder: Option<Jid>,
    media: Media,
    reason: Reason,
    locked: bool,
    local_roster: MediaRoster,
    remote_roster: MediaRoster,
    local_view: std::collections::HashMap<String, Content>,
    remote_view: std::collections::HashMap<String, Content>,
    candidates_local: CandidateMap,
    candidates_queue_local: CandidateMap,
    candidates_remote: CandidateMap,
    candidates_queue_remote: CandidateMap,
    /// Raw last-seen ICE state, checked by the watchdogs
    ice_state: Option<IceConnectionState>,
    /// De-duplication bucket for connected/disconnected notifications
    last_ice_state: Option<IceConnectionState>,
    peer: Option<Arc<dyn PeerConnection>>,
    local_media: Option<Arc<dyn LocalMedia>>,
    remote_stream: Option<RemoteStream>,
    pump: Option<JoinHandle<()>>,
}

impl SessionCore {
    fn new(to: Option<Jid>, media: Media) -> Self {
        Self {
            sid: String::new(),
            status: SessionStatus::Inactive,
            to,
            initiator: None,
            responder: None,
            media,
            reason: Reason::Cancel,
            locked: false,
            local_roster: MediaRoster::default(),
            remote_roster: MediaRoster::default(),
            local_view: Default::default(),
            remote_view: Default::default(),
            candidates_local: CandidateMap::default(),
            candidates_queue_local: CandidateMap::default(),
            candidates_remote: CandidateMap::default(),
            candidates_queue_remote: CandidateMap::default(),
            ice_state: None,
            last_ice_state: None,
            peer: None,
            local_media: None,
            remote_stream: None,
            pump: None,
        }
    }

    fn set_status(&mut self, to: SessionStatus) {
        let from = self.status;
        if self.status.transition(to) {
            if from != to {
                debug!("status: {} -> {}", from.name(), to.name());
            }
        } else {
            warn!("invalid status transition: {} -> {}", from.name(), to.name());
        }
    }

    fn is_initiator(&self, local: &Jid) -> bool {
        self.initiator
            .as_ref()
            .map(|jid| jid.as_str() == local.as_str())
            .unwrap_or(false)
    }

    fn is_responder(&self, local: &Jid) -> bool {
        self.responder
            .as_ref()
            .map(|jid| jid.as_str() == local.as_str())
            .unwrap_or(false)
    }
}

/// A one-to-one Jingle session
pub struct Session {
    engine: Arc<Engine>,
    callbacks: Arc<dyn SessionCallbacks>,
    core: RwLock<SessionCore>,
    pending: PendingReplies,
    id_counter: AtomicU64,
    created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(engine: Arc<Engine>, args: SessionArgs) -> Arc<Self> {
        Arc::new(Self {
            engine,
            callbacks: args.callbacks,
            core: RwLock::new(SessionCore::new(args.to, args.media)),
            pending: PendingReplies::new(),
            id_counter: AtomicU64::new(0),
            created_at: Utc::now(),
        })
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub async fn sid(&self) -> String {
        self.core.read().await.sid.clone()
    }

    pub async fn status(&self) -> SessionStatus {
        self.core.read().await.status
    }

    pub async fn reason(&self) -> Reason {
        self.core.read().await.reason
    }

    pub async fn media(&self) -> Media {
        self.core.read().await.media
    }

    pub async fn to(&self) -> Option<Jid> {
        self.core.read().await.to.clone()
    }

    pub async fn initiator(&self) -> Option<Jid> {
        self.core.read().await.initiator.clone()
    }

    pub async fn responder(&self) -> Option<Jid> {
        self.core.read().await.responder.clone()
    }

    pub async fn is_locked(&self) -> bool {
        self.core.read().await.locked
    }

    pub async fn remote_stream(&self) -> Option<RemoteStream> {
        self.core.read().await.remote_stream.clone()
    }

    pub async fn is_initiator(&self) -> bool {
        let local = self.engine.transport().jid();
        self.core.read().await.is_initiator(&local)
    }

    pub async fn is_responder(&self) -> bool {
        let local = self.engine.transport().jid();
        self.core.read().await.is_responder(&local)
    }

    pub async fn mute_state(&self, name: &str) -> Option<bool> {
        self.core.read().await.local_roster.is_muted(name)
    }

    pub async fn queued_remote_candidate_count(&self) -> usize {
        self.core.read().await.candidates_queue_remote.total()
    }

    pub async fn pending_reply_count(&self) -> usize {
        self.pending.len().await
    }

    /// Initiates the session towards the configured peer
    pub async fn initiate(self: &Arc<Self>) {
        if self.refuse_locked("initiate").await {
            return;
        }

        let this = Arc::clone(self);
        if self
            .engine
            .gate()
            .defer(Box::pin(async move { this.initiate().await }))
            .await
        {
            debug!("initiate > deferred (waiting for the engine to be ready)");
            return;
        }

        {
            let core = self.core.read().await;
            if core.status != SessionStatus::Inactive {
                warn!(
                    "cannot initiate, session not inactive (status: {})",
                    core.status.name()
                );
                return;
            }
            if core.to.is_none() {
                warn!("cannot initiate, no peer address");
                return;
            }
        }

        self.callbacks.on_initiate_pending(self);

        let sid = stanza::generate_sid();
        {
            let mut core = self.core.write().await;
            core.set_status(SessionStatus::Initiating);
            core.sid = sid.clone();
            core.initiator = Some(self.engine.transport().jid());
            core.responder = core.to.clone();

            let media = core.media;
            for &name in media_names(media) {
                core.local_roster
                    .insert(name, Creator::Initiator, Senders::Both);
            }
        }

        debug!("initiating new session (sid: {})", sid);
        self.engine
            .registry()
            .register_single(sid, Arc::clone(self))
            .await;

        self.setup_peer(true).await;
    }

    /// Accepts a session previously initiated by the peer
    pub async fn accept(self: &Arc<Self>) {
        if self.refuse_locked("accept").await {
            return;
        }

        let this = Arc::clone(self);
        if self
            .engine
            .gate()
            .defer(Box::pin(async move { this.accept().await }))
            .await
        {
            debug!("accept > deferred (waiting for the engine to be ready)");
            return;
        }

        {
            let core = self.core.read().await;
            if core.status != SessionStatus::Initiated {
                warn!(
                    "cannot accept, session not initiated (status: {})",
                    core.status.name()
                );
                return;
            }
        }

        self.callbacks.on_accept_pending(self);

        {
            let mut core = self.core.write().await;
            core.set_status(SessionStatus::Accepting);

            let media = core.media;
            for &name in media_names(media) {
                if core.local_roster.get(name).is_none() {
                    core.local_roster
                        .insert(name, Creator::Initiator, Senders::Both);
                }
            }
        }

        self.setup_peer(false).await;
    }

    /// Sends a session info with an optional named payload
    pub async fn info(self: &Arc<Self>, info: Option<SessionInfoType>, name: Option<String>) {
        if self.refuse_locked("send info").await {
            return;
        }

        let this = Arc::clone(self);
        let replay_name = name.clone();
        if self
            .engine
            .gate()
            .defer(Box::pin(
                async move { this.info(info, replay_name).await },
            ))
            .await
        {
            debug!("info > deferred (waiting for the engine to be ready)");
            return;
        }

        {
            let core = self.core.read().await;
            if !matches!(
                core.status,
                SessionStatus::Initiated | SessionStatus::Accepting | SessionStatus::Accepted
            ) {
                warn!(
                    "cannot send info, session not active (status: {})",
                    core.status.name()
                );
                return;
            }
        }

        self.callbacks.on_info_pending(self);

        self.send(
            IqType::Set,
            SendArgs {
                action: Some(Action::SessionInfo),
                info,
                name,
                ..Default::default()
            },
        )
        .await;
    }

    /// Terminates the session with a reason
    pub async fn terminate(self: &Arc<Self>, reason: Reason) {
        if self.refuse_locked("terminate").await {
            return;
        }

        let this = Arc::clone(self);
        if self
            .engine
            .gate()
            .defer(Box::pin(async move { this.terminate(reason).await }))
            .await
        {
            debug!("terminate > deferred (waiting for the engine to be ready)");
            return;
        }

        {
            let mut core = self.core.write().await;
            if core.status == SessionStatus::Terminated {
                warn!("cannot terminate, session already terminated");
                return;
            }
            core.set_status(SessionStatus::Terminating);
        }

        self.callbacks.on_terminate_pending(self);

        self.send(
            IqType::Set,
            SendArgs {
                action: Some(Action::SessionTerminate),
                reason: Some(reason),
                ..Default::default()
            },
        )
        .await;
    }

    /// Unconditional teardown: stops peer resources and unregisters from the
    /// router. Idempotent. With `set_lock`, the exhausted object refuses any
    /// further use.
    pub async fn abort(self: &Arc<Self>, set_lock: bool) {
        debug!("abort");

        {
            let mut core = self.core.write().await;
            core.set_status(SessionStatus::Terminated);
        }

        self.peer_stop().await;

        if set_lock {
            self.core.write().await.locked = true;
        }
    }

    /// Mutes a local content
    pub async fn mute(self: &Arc<Self>, name: &str) {
        if self.refuse_locked("mute").await {
            return;
        }

        let this = Arc::clone(self);
        let replay_name = name.to_string();
        if self
            .engine
            .gate()
            .defer(Box::pin(async move { this.mute(&replay_name).await }))
            .await
        {
            debug!("mute > deferred (waiting for the engine to be ready)");
            return;
        }

        {
            let mut core = self.core.write().await;
            if core.local_roster.is_muted(name) == Some(true) {
                debug!("content already muted (name: {})", name);
                return;
            }
            if let Some(media) = &core.local_media {
                media.set_audio_enabled(false);
            }
            core.local_roster.set_muted(name, true);
        }

        self.send(
            IqType::Set,
            SendArgs {
                action: Some(Action::SessionInfo),
                info: Some(SessionInfoType::Mute),
                name: Some(name.to_string()),
                ..Default::default()
            },
        )
        .await;
    }

    /// Unmutes a local content
    pub async fn unmute(self: &Arc<Self>, name: &str) {
        if self.refuse_locked("unmute").await {
            return;
        }

        let this = Arc::clone(self);
        let replay_name = name.to_string();
        if self
            .engine
            .gate()
            .defer(Box::pin(async move { this.unmute(&replay_name).await }))
            .await
        {
            debug!("unmute > deferred (waiting for the engine to be ready)");
            return;
        }

        {
            let mut core = self.core.write().await;
            if core.local_roster.is_muted(name) == Some(false) {
                debug!("content already unmuted (name: {})", name);
                return;
            }
            if let Some(media) = &core.local_media {
                media.set_audio_enabled(true);
            }
            core.local_roster.set_muted(name, false);
        }

        self.send(
            IqType::Set,
            SendArgs {
                action: Some(Action::SessionInfo),
                info: Some(SessionInfoType::Unmute),
                name: Some(name.to_string()),
                ..Default::default()
            },
        )
        .await;
    }

    /// Builds and transmits an outbound stanza. `set` stanzas dispatch by
    /// action to a per-action sender; an unknown or missing action is a local
    /// error, nothing reaches the wire.
    pub async fn send(self: &Arc<Self>, iq_type: IqType, args: SendArgs) -> bool {
        if self.refuse_locked("send").await {
            return false;
        }

        let this = Arc::clone(self);
        let replay_args = args.clone();
        if self
            .engine
            .gate()
            .defer(Box::pin(async move {
                this.send(iq_type, replay_args).await;
            }))
            .await
        {
            debug!("send > deferred (waiting for the engine to be ready)");
            return false;
        }

        let (to, id) = {
            let core = self.core.read().await;
            let Some(to) = core.to.clone() else {
                warn!("cannot send, no peer address");
                return false;
            };
            let id = args.id.clone().unwrap_or_else(|| {
                stanza::scoped_id(
                    &self.engine.config().stanza.id_prefix,
                    &core.sid,
                    self.id_counter.fetch_add(1, Ordering::Relaxed),
                )
            });
            (to, id)
        };

        let mut outgoing = Stanza::iq(iq_type, to, id.clone());

        match iq_type {
            IqType::Set => {
                let Some(action) = args.action else {
                    warn!("stanza action unknown or missing");
                    return false;
                };

                let payload = match action {
                    Action::SessionAccept => self.send_session_accept(&id).await,
                    Action::SessionInfo => self.send_session_info(&args, &id).await,
                    Action::SessionInitiate => self.send_session_initiate(&id).await,
                    Action::SessionTerminate => self.send_session_terminate(&args, &id).await,
                    Action::TransportInfo => self.send_transport_info(&id).await,
                    // Content and transport sub-actions are not implemented
                    Action::ContentAccept
                    | Action::ContentAdd
                    | Action::ContentModify
                    | Action::ContentReject
                    | Action::ContentRemove
                    | Action::DescriptionInfo
                    | Action::SecurityInfo
                    | Action::TransportAccept
                    | Action::TransportReject
                    | Action::TransportReplace => {
                        warn!("{} > feature not implemented", action.as_str());
                        None
                    }
                };

                match payload {
                    Some(payload) => outgoing.body = StanzaBody::Jingle(payload),
                    None => return false,
                }
            }
            IqType::Result => {
                // Bare acknowledgement
            }
            _ => {
                warn!("stanza type must either be set or result");
                return false;
            }
        }

        match self.engine.transport().send(outgoing).await {
            Ok(()) => {
                debug!("outgoing stanza sent (id: {})", id);
                true
            }
            Err(e) => {
                warn!("failed to send stanza: {}", e);
                false
            }
        }
    }

    /// Handles an inbound stanza delivered by the router
    pub async fn handle(self: &Arc<Self>, incoming: Stanza) {
        if self.refuse_locked("handle").await {
            return;
        }

        let this = Arc::clone(self);
        let replay = incoming.clone();
        if self
            .engine
            .gate()
            .defer(Box::pin(async move { this.handle(replay).await }))
            .await
        {
            debug!("handle > deferred (waiting for the engine to be ready)");
            return;
        }

        // Ad hoc one-shot reply handlers come first
        if let (Some(id), Some(iq_type)) = (incoming.id.as_deref(), incoming.iq_type) {
            let key: PendingKey = (incoming.kind, IqType::Result, id.to_string());

            if iq_type == IqType::Result {
                if let Some(kind) = self.pending.take(&key).await {
                    debug!("submitted to registered reply handler (id: {})", id);
                    self.dispatch_reply_success(kind, &incoming).await;
                    return;
                }
            } else if iq_type == IqType::Error {
                // The error arm runs through protocol dispatch; only the
                // paired timeout must not fire as well.
                let _ = self.pending.take(&key).await;
            }
        }

        // Don't handle non-Jingle stanzas here
        let Some(payload) = incoming.jingle().cloned() else {
            return;
        };

        match payload.action {
            Action::SessionAccept => self.handle_session_accept(&incoming, &payload).await,
            Action::SessionInfo => self.handle_session_info(&incoming, &payload).await,
            Action::SessionInitiate => self.handle_session_initiate(&incoming, &payload).await,
            Action::SessionTerminate => self.handle_session_terminate(&incoming, &payload).await,
            Action::TransportInfo => self.handle_transport_info(&incoming, &payload).await,
            // Content and transport sub-actions are not implemented
            Action::ContentAccept
            | Action::ContentAdd
            | Action::ContentModify
            | Action::ContentReject
            | Action::ContentRemove
            | Action::DescriptionInfo
            | Action::SecurityInfo
            | Action::TransportAccept
            | Action::TransportReject
            | Action::TransportReplace => {
                self.send_error(&incoming, StanzaError::FEATURE_NOT_IMPLEMENTED)
                    .await;
            }
        }
    }

    // ------------------------------------------------------------------
    // Per-action senders
    // ------------------------------------------------------------------

    async fn send_session_initiate(self: &Arc<Self>, id: &str) -> Option<JinglePayload> {
        let payload = {
            let core = self.core.read().await;
            if core.status != SessionStatus::Initiating {
                warn!(
                    "cannot send initiate stanza, session not initiating (status: {})",
                    core.status.name()
                );
                return None;
            }

            let initiator = core.initiator.clone()?;
            JinglePayload::new(Action::SessionInitiate, core.sid.clone())
                .with_initiator(initiator)
                .with_contents(local_contents(&core, CandidateSource::Negotiated))
        };

        self.register_reply(id, PendingKind::Initiate).await;
        Some(payload)
    }

    async fn send_session_accept(self: &Arc<Self>, id: &str) -> Option<JinglePayload> {
        let payload = {
            let core = self.core.read().await;
            if core.status != SessionStatus::Accepting {
                warn!(
                    "cannot send accept stanza, session not accepting (status: {})",
                    core.status.name()
                );
                drop(core);
                self.send_error_to_peer(Some(id.to_string()), StanzaError::OUT_OF_ORDER)
                    .await;
                return None;
            }

            let responder = core.responder.clone()?;
            JinglePayload::new(Action::SessionAccept, core.sid.clone())
                .with_responder(responder)
                .with_contents(local_contents(&core, CandidateSource::Negotiated))
        };

        self.register_reply(id, PendingKind::Accept).await;
        Some(payload)
    }

    async fn send_session_info(self: &Arc<Self>, args: &SendArgs, id: &str) -> Option<JinglePayload> {
        let payload = {
            let core = self.core.read().await;
            let initiator = core.initiator.clone().unwrap_or_else(|| self.engine.transport().jid());
            JinglePayload::new(Action::SessionInfo, core.sid.clone())
                .with_initiator(initiator)
                .with_info(
                    args.info.unwrap_or(SessionInfoType::Active),
                    args.name.clone(),
                )
        };

        self.register_reply(id, PendingKind::Info).await;
        debug!("session info sent (name: {})", payload.info.map(|i| i.as_str()).unwrap_or("active"));
        Some(payload)
    }

    async fn send_session_terminate(
        self: &Arc<Self>,
        args: &SendArgs,
        id: &str,
    ) -> Option<JinglePayload> {
        let reason = args.reason.unwrap_or(Reason::Success);

        let payload = {
            let mut core = self.core.write().await;
            if core.status != SessionStatus::Terminating {
                warn!(
                    "cannot send terminate stanza, session not terminating (status: {})",
                    core.status.name()
                );
                return None;
            }
            core.reason = reason;
            JinglePayload::new(Action::SessionTerminate, core.sid.clone()).with_reason(reason)
        };

        self.register_reply(id, PendingKind::Terminate).await;
        debug!("session terminate sent (reason: {})", reason.as_str());
        Some(payload)
    }

    async fn send_transport_info(self: &Arc<Self>, id: &str) -> Option<JinglePayload> {
        let payload = {
            let core = self.core.read().await;
            if !matches!(
                core.status,
                SessionStatus::Initiated | SessionStatus::Accepting | SessionStatus::Accepted
            ) {
                warn!(
                    "cannot send transport info, session not initiated, accepting nor accepted (status: {})",
                    core.status.name()
                );
                return None;
            }
            if core.candidates_queue_local.is_empty() {
                warn!("no local candidate in queue");
                return None;
            }

            let initiator = core.initiator.clone()?;
            JinglePayload::new(Action::TransportInfo, core.sid.clone())
                .with_initiator(initiator)
                .with_contents(local_contents(&core, CandidateSource::QueuedOnly))
        };

        self.register_reply(id, PendingKind::TransportInfo).await;
        Some(payload)
    }

    // ------------------------------------------------------------------
    // Reply correlation
    // ------------------------------------------------------------------

    /// Register the one-shot reply handler for an outbound request and arm
    /// its timeout; whichever fires first deregisters the other
    async fn register_reply(self: &Arc<Self>, id: &str, kind: PendingKind) {
        let key: PendingKey = (StanzaKind::Iq, IqType::Result, id.to_string());
        let timeout = self.engine.config().timeouts.reply();

        let this = Arc::clone(self);
        let timeout_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(kind) = this.pending.take_expired(&timeout_key).await {
                warn!(
                    "reply timeout fired ({}, id: {})",
                    kind.name(),
                    timeout_key.2
                );
                this.dispatch_reply_error(kind).await;
            }
        });

        self.pending.register(key, kind, handle).await;
    }

    async fn dispatch_reply_success(self: &Arc<Self>, kind: PendingKind, incoming: &Stanza) {
        match kind {
            PendingKind::Initiate => {
                self.callbacks.on_initiate_success(self, incoming);
                self.handle_session_initiate_success_internal().await;
            }
            PendingKind::Accept => {
                self.callbacks.on_accept_success(self, incoming);
                self.handle_session_accept_success_internal().await;
            }
            PendingKind::Info => {
                self.callbacks.on_info_success(self, incoming);
                debug!("session info acknowledged");
            }
            PendingKind::Terminate => {
                self.callbacks.on_terminate_success(self, incoming);
                self.handle_session_terminate_success_internal().await;
            }
            PendingKind::TransportInfo => {
                debug!("transport info acknowledged");
            }
        }
    }

    /// Timeout-driven error path for a request that never got its reply
    async fn dispatch_reply_error(self: &Arc<Self>, kind: PendingKind) {
        match kind {
            PendingKind::Initiate => {
                self.callbacks.on_initiate_error(self, None);
                self.handle_session_initiate_error_internal().await;
            }
            PendingKind::Accept => {
                self.callbacks.on_accept_error(self, None);
                self.handle_session_accept_error_internal().await;
            }
            PendingKind::Info => {
                self.callbacks.on_info_error(self, None);
                debug!("session info reply never arrived");
            }
            PendingKind::Terminate => {
                self.callbacks.on_terminate_error(self, None);
                self.handle_session_terminate_error_internal().await;
            }
            PendingKind::TransportInfo => {
                debug!("transport info reply never arrived");
            }
        }
    }

    // ------------------------------------------------------------------
    // Per-action inbound handlers
    // ------------------------------------------------------------------

    async fn handle_session_accept(self: &Arc<Self>, incoming: &Stanza, payload: &JinglePayload) {
        // Security preconditions
        if !self.stanza_safe(incoming, payload).await {
            warn!("dropped unsafe stanza");
            self.send_error(incoming, StanzaError::UNKNOWN_SESSION).await;
            return;
        }

        match incoming.iq_type {
            Some(IqType::Result) => {
                self.callbacks.on_accept_success(self, incoming);
                self.handle_session_accept_success_internal().await;
            }
            Some(IqType::Error) => {
                self.callbacks.on_accept_error(self, Some(incoming));
                self.handle_session_accept_error_internal().await;
            }
            Some(IqType::Set) => {
                self.callbacks.on_accept_request(self, incoming);
                self.handle_session_accept_request(incoming, payload).await;
            }
            _ => {
                self.send_error(incoming, StanzaError::FEATURE_NOT_IMPLEMENTED)
                    .await;
            }
        }
    }

    async fn handle_session_accept_success_internal(self: &Arc<Self>) {
        let mut core = self.core.write().await;
        core.set_status(SessionStatus::Accepted);
    }

    async fn handle_session_accept_error_internal(self: &Arc<Self>) {
        self.terminate(Reason::Timeout).await;
    }

    async fn handle_session_accept_request(
        self: &Arc<Self>,
        incoming: &Stanza,
        payload: &JinglePayload,
    ) {
        {
            let core = self.core.read().await;
            if core.status != SessionStatus::Initiated {
                warn!(
                    "cannot handle accept, session already accepted (status: {})",
                    core.status.name()
                );
                drop(core);
                self.send_error(incoming, StanzaError::OUT_OF_ORDER).await;
                return;
            }
        }

        {
            let mut core = self.core.write().await;
            core.set_status(SessionStatus::Accepting);
        }

        let valid =
            !payload.sid.is_empty() && self.is_initiator().await && !payload.contents.is_empty();

        if !valid {
            self.callbacks.on_accept_error(self, Some(incoming));
            self.handle_session_accept_error_internal().await;
            self.send_error(incoming, StanzaError::BAD_REQUEST).await;
            return;
        }

        self.store_remote_contents(payload).await;

        self.callbacks.on_accept_success(self, incoming);
        self.handle_session_accept_success_internal().await;

        // Apply the answer to the peer connection
        let contents: Vec<Content> = {
            let core = self.core.read().await;
            core.remote_view.values().cloned().collect()
        };

        match self.engine.sdp().remote_description(SdpType::Answer, &contents) {
            Ok((description, _)) => {
                let peer = self.core.read().await.peer.clone();
                if let Some(peer) = peer {
                    if let Err(e) = peer.set_remote_description(description).await {
                        warn!("remote description rejected: {}", e);
                        self.terminate(Reason::IncompatibleParameters).await;
                        return;
                    }
                    self.flush_remote_candidate_queue(&peer).await;
                } else {
                    self.core.write().await.candidates_queue_remote.clear();
                }

                self.send(
                    IqType::Result,
                    SendArgs {
                        id: incoming.id.clone(),
                        ..Default::default()
                    },
                )
                .await;
            }
            Err(e) => {
                warn!("could not build remote description: {}", e);
                self.terminate(Reason::IncompatibleParameters).await;
            }
        }
    }

    async fn handle_session_info(self: &Arc<Self>, incoming: &Stanza, payload: &JinglePayload) {
        if !self.stanza_safe(incoming, payload).await {
            warn!("dropped unsafe stanza");
            self.send_error(incoming, StanzaError::UNKNOWN_SESSION).await;
            return;
        }

        match incoming.iq_type {
            Some(IqType::Result) => {
                self.callbacks.on_info_success(self, incoming);
            }
            Some(IqType::Error) => {
                self.callbacks.on_info_error(self, Some(incoming));
            }
            Some(IqType::Set) => {
                self.callbacks.on_info_request(self, incoming);
                self.handle_session_info_request(incoming, payload).await;
            }
            _ => {
                self.send_error(incoming, StanzaError::FEATURE_NOT_IMPLEMENTED)
                    .await;
            }
        }
    }

    async fn handle_session_info_request(
        self: &Arc<Self>,
        incoming: &Stanza,
        payload: &JinglePayload,
    ) {
        match payload.info {
            Some(
                SessionInfoType::Active
                | SessionInfoType::Ringing
                | SessionInfoType::Mute
                | SessionInfoType::Unmute,
            ) => {
                debug!(
                    "session info request ok (name: {})",
                    payload.info.map(|i| i.as_str()).unwrap_or("undefined")
                );

                self.send(
                    IqType::Result,
                    SendArgs {
                        id: incoming.id.clone(),
                        ..Default::default()
                    },
                )
                .await;

                self.callbacks.on_info_success(self, incoming);
            }
            _ => {
                warn!(
                    "session info request error (name: {})",
                    payload.info.map(|i| i.as_str()).unwrap_or("undefined")
                );

                self.send_error(incoming, StanzaError::FEATURE_NOT_IMPLEMENTED)
                    .await;

                self.callbacks.on_info_error(self, Some(incoming));
            }
        }
    }

    async fn handle_session_initiate(self: &Arc<Self>, incoming: &Stanza, payload: &JinglePayload) {
        match incoming.iq_type {
            Some(IqType::Result) => {
                self.callbacks.on_initiate_success(self, incoming);
                self.handle_session_initiate_success_internal().await;
            }
            Some(IqType::Error) => {
                self.callbacks.on_initiate_error(self, Some(incoming));
                self.handle_session_initiate_error_internal().await;
            }
            Some(IqType::Set) => {
                self.callbacks.on_initiate_request(self, incoming);
                self.handle_session_initiate_request(incoming, payload).await;
            }
            _ => {
                self.send_error(incoming, StanzaError::FEATURE_NOT_IMPLEMENTED)
                    .await;
            }
        }
    }

    async fn handle_session_initiate_success_internal(self: &Arc<Self>) {
        let mut core = self.core.write().await;
        core.set_status(SessionStatus::Initiated);
    }

    async fn handle_session_initiate_error_internal(self: &Arc<Self>) {
        {
            let mut core = self.core.write().await;
            core.set_status(SessionStatus::Inactive);
        }

        self.peer_stop().await;

        // The exhausted object cannot be reused
        self.core.write().await.locked = true;
    }

    async fn handle_session_initiate_request(
        self: &Arc<Self>,
        incoming: &Stanza,
        payload: &JinglePayload,
    ) {
        {
            let core = self.core.read().await;
            if core.status != SessionStatus::Inactive {
                warn!(
                    "cannot handle initiate, session already initiated (status: {})",
                    core.status.name()
                );
                drop(core);
                self.send_error(incoming, StanzaError::OUT_OF_ORDER).await;
                return;
            }
        }

        {
            let mut core = self.core.write().await;
            core.set_status(SessionStatus::Initiating);
        }

        let from = incoming.from.clone();
        let valid = from.is_some() && !payload.sid.is_empty() && !payload.contents.is_empty();

        if !valid {
            self.callbacks.on_initiate_error(self, Some(incoming));
            self.handle_session_initiate_error_internal().await;
            self.send_error(incoming, StanzaError::BAD_REQUEST).await;
            return;
        }

        {
            let mut core = self.core.write().await;
            core.sid = payload.sid.clone();
            core.to = from.clone();
            core.initiator = from;
            core.responder = Some(self.engine.transport().jid());
        }

        self.engine
            .registry()
            .register_single(payload.sid.clone(), Arc::clone(self))
            .await;

        self.store_remote_contents(payload).await;

        // Video or audio-only session? Neither offered media is supported
        // ends the call before it starts.
        let negotiated = {
            let core = self.core.read().await;
            if core
                .remote_view
                .values()
                .any(|content| content.description.media == Media::Video)
            {
                Some(Media::Video)
            } else if core
                .remote_view
                .values()
                .any(|content| content.description.media == Media::Audio)
            {
                Some(Media::Audio)
            } else {
                None
            }
        };

        match negotiated {
            Some(media) => {
                self.core.write().await.media = media;
            }
            None => {
                warn!("unsupported media in session initiate");
                self.callbacks.on_initiate_error(self, Some(incoming));
                self.terminate(Reason::UnsupportedApplications).await;
                return;
            }
        }

        self.callbacks.on_initiate_success(self, incoming);
        self.handle_session_initiate_success_internal().await;

        self.send(
            IqType::Result,
            SendArgs {
                id: incoming.id.clone(),
                ..Default::default()
            },
        )
        .await;
    }

    async fn handle_session_terminate(
        self: &Arc<Self>,
        incoming: &Stanza,
        payload: &JinglePayload,
    ) {
        if !self.stanza_safe(incoming, payload).await {
            warn!("dropped unsafe stanza");
            self.send_error(incoming, StanzaError::UNKNOWN_SESSION).await;
            return;
        }

        match incoming.iq_type {
            Some(IqType::Result) => {
                self.callbacks.on_terminate_success(self, incoming);
                self.handle_session_terminate_success_internal().await;
            }
            Some(IqType::Error) => {
                self.callbacks.on_terminate_error(self, Some(incoming));
                self.handle_session_terminate_error_internal().await;
            }
            Some(IqType::Set) => {
                self.callbacks.on_terminate_request(self, incoming);
                self.handle_session_terminate_request(incoming, payload).await;
            }
            _ => {
                self.send_error(incoming, StanzaError::FEATURE_NOT_IMPLEMENTED)
                    .await;
            }
        }
    }

    async fn handle_session_terminate_success_internal(self: &Arc<Self>) {
        self.abort(false).await;
    }

    async fn handle_session_terminate_error_internal(self: &Arc<Self>) {
        self.abort(true).await;
        warn!("forced session termination locally");
    }

    async fn handle_session_terminate_request(
        self: &Arc<Self>,
        incoming: &Stanza,
        payload: &JinglePayload,
    ) {
        {
            let core = self.core.read().await;
            if matches!(
                core.status,
                SessionStatus::Inactive | SessionStatus::Terminated
            ) {
                warn!(
                    "cannot handle terminate, session not active (status: {})",
                    core.status.name()
                );
                drop(core);
                self.send_error(incoming, StanzaError::OUT_OF_ORDER).await;
                return;
            }
        }

        let reason = payload.reason.unwrap_or(Reason::Cancel);
        {
            let mut core = self.core.write().await;
            core.set_status(SessionStatus::Terminating);
            core.reason = reason;
        }

        self.callbacks.on_terminate_success(self, incoming);
        self.handle_session_terminate_success_internal().await;

        self.send(
            IqType::Result,
            SendArgs {
                id: incoming.id.clone(),
                ..Default::default()
            },
        )
        .await;

        debug!("session terminated by peer (reason: {})", reason.as_str());
    }

    async fn handle_transport_info(self: &Arc<Self>, incoming: &Stanza, payload: &JinglePayload) {
        {
            let core = self.core.read().await;
            if !matches!(
                core.status,
                SessionStatus::Initiated | SessionStatus::Accepting | SessionStatus::Accepted
            ) {
                warn!(
                    "cannot handle transport info, session not initiated, accepting nor accepted (status: {})",
                    core.status.name()
                );
                drop(core);
                self.send_error(incoming, StanzaError::OUT_OF_ORDER).await;
                return;
            }
        }

        let valid = !payload.sid.is_empty() && !payload.contents.is_empty();

        if !valid {
            self.send_error(incoming, StanzaError::BAD_REQUEST).await;
            return;
        }

        self.store_remote_contents(payload).await;

        let peer = self.core.read().await.peer.clone();
        match peer {
            Some(peer) => self.flush_remote_candidate_queue(&peer).await,
            None => self.core.write().await.candidates_queue_remote.clear(),
        }

        self.send(
            IqType::Result,
            SendArgs {
                id: incoming.id.clone(),
                ..Default::default()
            },
        )
        .await;
    }

    // ------------------------------------------------------------------
    // Peer connection glue
    // ------------------------------------------------------------------

    /// Acquire local media, create the peer connection and start its event
    /// pump. `offer` selects the initiator (offer) or responder (answer)
    /// description flow.
    async fn setup_peer(self: &Arc<Self>, offer: bool) {
        let Some(backend) = self.engine.peer_backend().cloned() else {
            warn!("cannot start media, WebRTC backend unavailable");
            return;
        };

        let media = self.core.read().await.media;

        let local_media = match backend.get_user_media(media).await {
            Ok(local_media) => local_media,
            Err(e) => {
                warn!("media acquisition failed: {}", e);
                self.handle_media_error().await;
                return;
            }
        };

        {
            self.core.write().await.local_media = Some(Arc::clone(&local_media));
        }

        let ice = self.engine.ice_config().await;
        if ice.servers.is_empty() {
            warn!("no ICE server configured, network may not work properly");
        }

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let peer = match backend.create_peer_connection(ice, events_tx).await {
            Ok(peer) => peer,
            Err(e) => {
                warn!("peer connection creation failed: {}", e);
                self.handle_media_error().await;
                return;
            }
        };

        if let Err(e) = peer.attach_local_media(local_media).await {
            warn!("could not attach local media: {}", e);
            self.handle_media_error().await;
            return;
        }

        {
            self.core.write().await.peer = Some(Arc::clone(&peer));
        }

        let this = Arc::clone(self);
        let pump = tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                this.on_peer_event(event).await;
            }
        });
        {
            self.core.write().await.pump = Some(pump);
        }

        if offer {
            self.create_local_offer(&peer).await;
        } else {
            self.create_local_answer(&peer).await;
        }
    }

    async fn create_local_offer(self: &Arc<Self>, peer: &Arc<dyn PeerConnection>) {
        debug!("getting local description");

        let description = match peer.create_offer().await {
            Ok(description) => description,
            Err(e) => {
                warn!("offer creation failed: {}", e);
                self.terminate(Reason::FailedApplication).await;
                return;
            }
        };

        if let Err(e) = peer.set_local_description(description.clone()).await {
            warn!("local description rejected: {}", e);
            self.terminate(Reason::FailedApplication).await;
            return;
        }

        self.store_local_contents(&description).await;
        // Wait for the responder to send back its description
    }

    async fn create_local_answer(self: &Arc<Self>, peer: &Arc<dyn PeerConnection>) {
        debug!("getting local description");

        let contents: Vec<Content> = {
            let core = self.core.read().await;
            core.remote_view.values().cloned().collect()
        };

        let (remote, candidates) = match self
            .engine
            .sdp()
            .remote_description(SdpType::Offer, &contents)
        {
            Ok(result) => result,
            Err(e) => {
                warn!("could not build remote description: {}", e);
                self.terminate(Reason::IncompatibleParameters).await;
                return;
            }
        };

        if let Err(e) = peer.set_remote_description(remote).await {
            warn!("remote description rejected: {}", e);
            self.terminate(Reason::IncompatibleParameters).await;
            return;
        }

        let answer = match peer.create_answer().await {
            Ok(description) => description,
            Err(e) => {
                warn!("answer creation failed: {}", e);
                self.terminate(Reason::FailedApplication).await;
                return;
            }
        };

        if let Err(e) = peer.set_local_description(answer.clone()).await {
            warn!("local description rejected: {}", e);
            self.terminate(Reason::FailedApplication).await;
            return;
        }

        self.store_local_contents(&answer).await;

        for candidate in candidates {
            if let Err(e) = peer.add_ice_candidate(candidate).await {
                warn!("failed to add remote candidate: {}", e);
            }
        }

        self.core.write().await.candidates_queue_remote.clear();
    }

    /// Media or peer setup failure: initiators roll the slot back, responders
    /// tell the peer the call cannot happen
    async fn handle_media_error(self: &Arc<Self>) {
        self.callbacks.on_initiate_error(self, None);

        if self.is_initiator().await {
            self.handle_session_initiate_error_internal().await;
        }
        if self.is_responder().await {
            self.terminate(Reason::MediaError).await;
        }
    }

    async fn on_peer_event(self: &Arc<Self>, event: PeerEvent) {
        match event {
            PeerEvent::IceCandidate(candidate) => self.on_local_candidate(candidate).await,
            PeerEvent::EndOfCandidates => self.on_candidates_gathered().await,
            PeerEvent::ConnectionStateChange(state) => self.on_connection_state(state).await,
            PeerEvent::StreamAdded(stream) => {
                {
                    self.core.write().await.remote_stream = Some(stream.clone());
                }
                self.callbacks.on_stream_add(self, &stream);
            }
            PeerEvent::StreamRemoved => {
                {
                    self.core.write().await.remote_stream = None;
                }
                self.callbacks.on_stream_remove(self);
            }
        }
    }

    async fn on_local_candidate(self: &Arc<Self>, event: IceCandidateEvent) {
        match self.engine.sdp().candidate_from_event(&event) {
            Ok((name, candidate)) => {
                let mut core = self.core.write().await;
                core.candidates_local.push(&name, candidate.clone());
                core.candidates_queue_local.push(&name, candidate);
            }
            Err(e) => warn!("dropped unparsable local candidate: {}", e),
        }
    }

    /// Gathering finished: the initial batch triggers the pending
    /// initiate/accept send, later batches flush as transport-info
    async fn on_candidates_gathered(self: &Arc<Self>) {
        let local = self.engine.transport().jid();
        let (initial_phase, is_initiator, queue_empty) = {
            let core = self.core.read().await;
            let is_initiator = core.is_initiator(&local);
            let is_responder = core.is_responder(&local);
            let initial_phase = (is_initiator && core.status == SessionStatus::Initiating)
                || (is_responder && core.status == SessionStatus::Accepting);
            (
                initial_phase,
                is_initiator,
                core.candidates_queue_local.is_empty(),
            )
        };

        if initial_phase {
            debug!("got initial candidates");
            let action = if is_initiator {
                Action::SessionInitiate
            } else {
                Action::SessionAccept
            };
            self.send(
                IqType::Set,
                SendArgs {
                    action: Some(action),
                    ..Default::default()
                },
            )
            .await;
        } else if !queue_empty {
            debug!("got more candidates on the go");
            self.send(
                IqType::Set,
                SendArgs {
                    action: Some(Action::TransportInfo),
                    ..Default::default()
                },
            )
            .await;
        }

        self.core.write().await.candidates_queue_local.clear();
    }

    async fn on_connection_state(self: &Arc<Self>, state: IceConnectionState) {
        enum Notify {
            Connected,
            Disconnected,
        }

        let notify = {
            let mut core = self.core.write().await;
            core.ice_state = Some(state);

            match state {
                IceConnectionState::Connected | IceConnectionState::Completed => {
                    if core.last_ice_state != Some(IceConnectionState::Connected) {
                        core.last_ice_state = Some(IceConnectionState::Connected);
                        Some(Notify::Connected)
                    } else {
                        None
                    }
                }
                IceConnectionState::Disconnected | IceConnectionState::Closed => {
                    if core.last_ice_state != Some(IceConnectionState::Disconnected) {
                        core.last_ice_state = Some(IceConnectionState::Disconnected);
                        Some(Notify::Disconnected)
                    } else {
                        None
                    }
                }
                _ => None,
            }
        };

        match notify {
            Some(Notify::Connected) => self.callbacks.on_stream_connected(self),
            Some(Notify::Disconnected) => self.callbacks.on_stream_disconnected(self),
            None => {}
        }

        let timeouts = &self.engine.config().timeouts;
        match state {
            IceConnectionState::Disconnected => {
                self.arm_ice_watchdog(
                    state,
                    timeouts.ice_disconnect(),
                    Some(Reason::ConnectivityError),
                )
                .await;
            }
            IceConnectionState::Checking => {
                self.arm_ice_watchdog(state, timeouts.ice_checking(), None)
                    .await;
            }
            _ => {}
        }

        debug!("connectivity state changed (state: {})", state.name());
    }

    /// Arm a connectivity watchdog. At expiry the session terminates only if
    /// the sid is unchanged (a stale timer must not fire on a reused object)
    /// and the connectivity state never moved.
    async fn arm_ice_watchdog(
        self: &Arc<Self>,
        state: IceConnectionState,
        timeout: std::time::Duration,
        reason: Option<Reason>,
    ) {
        let armed_sid = self.core.read().await.sid.clone();
        let this = Arc::clone(self);

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;

            let expired = {
                let core = this.core.read().await;
                core.sid == armed_sid && core.ice_state == Some(state)
            };

            if expired {
                debug!("peer timeout (state: {})", state.name());
                this.terminate(reason.unwrap_or(Reason::FailedTransport)).await;
            }
        });
    }

    /// Single teardown path: detach streams, close the peer connection,
    /// cancel correlation state and unregister from the router
    async fn peer_stop(self: &Arc<Self>) {
        let (peer, pump, sid) = {
            let mut core = self.core.write().await;
            core.local_media = None;
            core.remote_stream = None;
            (core.peer.take(), core.pump.take(), core.sid.clone())
        };

        if let Some(pump) = pump {
            pump.abort();
        }
        if let Some(peer) = peer {
            peer.close().await;
        }

        self.pending.clear().await;

        if !sid.is_empty() {
            self.engine.registry().unregister_single(&sid).await;
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn refuse_locked(&self, operation: &str) -> bool {
        if self.core.read().await.locked {
            warn!("cannot {}, session locked", operation);
            return true;
        }
        false
    }

    /// Reply provenance check: the payload sid and the sender must both be
    /// consistent with the session's recorded peer
    async fn stanza_safe(&self, incoming: &Stanza, payload: &JinglePayload) -> bool {
        let core = self.core.read().await;
        let sid_ok = payload.sid == core.sid;
        let from_ok = match (&incoming.from, &core.to) {
            (Some(from), Some(to)) => from.as_str() == to.as_str(),
            _ => false,
        };
        sid_ok && from_ok
    }

    async fn send_error(&self, incoming: &Stanza, error: StanzaError) {
        self.engine.send_error_reply(incoming, error).await;
    }

    /// Error stanza addressed to the session peer, outside a reply context
    async fn send_error_to_peer(&self, id: Option<String>, error: StanzaError) {
        let Some(to) = self.core.read().await.to.clone() else {
            return;
        };
        let stanza = Stanza {
            kind: StanzaKind::Iq,
            id,
            iq_type: Some(IqType::Error),
            from: None,
            to: Some(to),
            body: StanzaBody::Empty,
            error: Some(error),
        };
        if let Err(e) = self.engine.transport().send(stanza).await {
            warn!("failed to send error stanza: {}", e);
        }
    }

    /// Merge a parsed local description into the roster-backed local view
    async fn store_local_contents(&self, description: &crate::sdp::SessionDescription) {
        let contents = match self.engine.sdp().local_contents(description) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("could not parse local description: {}", e);
                return;
            }
        };

        let mut core = self.core.write().await;
        for mut content in contents {
            if let Some(slot) = core.local_roster.get(&content.name) {
                content.creator = slot.creator;
                content.senders = slot.senders;
            } else {
                core.local_roster
                    .insert(content.name.clone(), content.creator, content.senders);
            }
            core.local_view.insert(content.name.clone(), content);
        }
    }

    /// Store the remote side of a payload: roster, content view and the
    /// candidate queues (id-deduplicated per content name)
    async fn store_remote_contents(&self, payload: &JinglePayload) {
        let mut core = self.core.write().await;
        for content in &payload.contents {
            core.remote_roster
                .insert(content.name.clone(), content.creator, content.senders);

            for candidate in &content.candidates {
                core.candidates_remote.push(&content.name, candidate.clone());
                core.candidates_queue_remote
                    .push(&content.name, candidate.clone());
            }

            core.remote_view
                .insert(content.name.clone(), content.clone());
        }
    }

    /// Flush every queued remote candidate into the peer connection and
    /// empty the queue
    async fn flush_remote_candidate_queue(&self, peer: &Arc<dyn PeerConnection>) {
        let queued: Vec<(String, Candidate)> = {
            let mut core = self.core.write().await;
            core.candidates_queue_remote.take()
        };

        for (name, candidate) in queued {
            let line = self.engine.sdp().candidate_line(&name, &candidate);
            if let Err(e) = peer.add_ice_candidate(line).await {
                warn!("failed to add remote candidate: {}", e);
            }
        }
    }
}

/// Build the outgoing content list from the local view, falling back to bare
/// roster entries when no local description has been parsed yet
fn local_contents(core: &SessionCore, source: CandidateSource) -> Vec<Content> {
    let mut contents = Vec::new();

    for name in core.local_roster.names() {
        let mut content = match core.local_view.get(name) {
            Some(content) => content.clone(),
            None => Content {
                creator: Creator::Initiator,
                name: name.clone(),
                senders: Senders::Both,
                description: Description {
                    media: if name == "video" {
                        Media::Video
                    } else {
                        Media::Audio
                    },
                    payloads: Vec::new(),
                },
                candidates: Vec::new(),
            },
        };

        if let Some(slot) = core.local_roster.get(name) {
            content.creator = slot.creator;
            content.senders = slot.senders;
        }

        content.candidates = match source {
            CandidateSource::Negotiated => core.candidates_local.get(name).to_vec(),
            CandidateSource::QueuedOnly => core.candidates_queue_local.get(name).to_vec(),
        };

        contents.push(content);
    }

    contents
}
