//! Shared test doubles for the engine scenario tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use yodel::config::EngineConfig;
use yodel::engine::{Engine, InitiateHandler};
use yodel::peer::{
    IceCandidateEvent, IceConfig, LocalMedia, PeerBackend, PeerConnection, PeerEvent,
};
use yodel::sdp::{SdpBridge, SdpCandidate, SdpType, SessionDescription};
use yodel::session::{NoCallbacks, Session, SessionArgs};
use yodel::shared::error::Error;
use yodel::shared::result::Result;
use yodel::stanza::jingle::{
    Action, Candidate, Content, Creator, Description, JinglePayload, Media, PayloadType, Senders,
};
use yodel::stanza::{IqType, Jid, Stanza, StanzaBody, StanzaKind};
use yodel::transport::StanzaTransport;

// ----------------------------------------------------------------------
// Transports
// ----------------------------------------------------------------------

/// Transport that records outgoing stanzas and never delivers them
pub struct RecordingTransport {
    jid: Jid,
    pub sent: Mutex<Vec<Stanza>>,
    pub handlers: Mutex<HashMap<StanzaKind, mpsc::UnboundedSender<Stanza>>>,
    /// Canned reply for the next `request` round trip
    pub canned_response: Mutex<Option<Stanza>>,
}

impl RecordingTransport {
    pub fn new(jid: &str) -> Arc<Self> {
        Arc::new(Self {
            jid: Jid::new(jid),
            sent: Mutex::new(Vec::new()),
            handlers: Mutex::new(HashMap::new()),
            canned_response: Mutex::new(None),
        })
    }

    pub fn sent_stanzas(&self) -> Vec<Stanza> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl StanzaTransport for RecordingTransport {
    fn jid(&self) -> Jid {
        self.jid.clone()
    }

    async fn send(&self, stanza: Stanza) -> Result<()> {
        self.sent.lock().unwrap().push(stanza);
        Ok(())
    }

    async fn request(&self, _stanza: Stanza) -> Result<Stanza> {
        match self.canned_response.lock().unwrap().take() {
            Some(response) => Ok(response),
            None => Err(Error::Transport("no responder".to_string())),
        }
    }

    fn register_handler(&self, kind: StanzaKind, sender: mpsc::UnboundedSender<Stanza>) {
        self.handlers.lock().unwrap().insert(kind, sender);
    }
}

type HandlerMap = Arc<Mutex<HashMap<StanzaKind, mpsc::UnboundedSender<Stanza>>>>;

/// One end of an in-memory transport pair; sends land on the other end's
/// registered handler with `from` stamped
pub struct PairEnd {
    jid: Jid,
    local_handlers: HandlerMap,
    peer_handlers: HandlerMap,
    pub sent: Mutex<Vec<Stanza>>,
}

pub fn transport_pair(a: &str, b: &str) -> (Arc<PairEnd>, Arc<PairEnd>) {
    let handlers_a: HandlerMap = Arc::new(Mutex::new(HashMap::new()));
    let handlers_b: HandlerMap = Arc::new(Mutex::new(HashMap::new()));

    let end_a = Arc::new(PairEnd {
        jid: Jid::new(a),
        local_handlers: Arc::clone(&handlers_a),
        peer_handlers: Arc::clone(&handlers_b),
        sent: Mutex::new(Vec::new()),
    });
    let end_b = Arc::new(PairEnd {
        jid: Jid::new(b),
        local_handlers: handlers_b,
        peer_handlers: handlers_a,
        sent: Mutex::new(Vec::new()),
    });
    (end_a, end_b)
}

#[async_trait]
impl StanzaTransport for PairEnd {
    fn jid(&self) -> Jid {
        self.jid.clone()
    }

    async fn send(&self, mut stanza: Stanza) -> Result<()> {
        stanza.from = Some(self.jid.clone());
        self.sent.lock().unwrap().push(stanza.clone());

        let sender = self.peer_handlers.lock().unwrap().get(&stanza.kind).cloned();
        if let Some(sender) = sender {
            let _ = sender.send(stanza);
        }
        Ok(())
    }

    async fn request(&self, _stanza: Stanza) -> Result<Stanza> {
        Err(Error::Transport("no request support".to_string()))
    }

    fn register_handler(&self, kind: StanzaKind, sender: mpsc::UnboundedSender<Stanza>) {
        self.local_handlers.lock().unwrap().insert(kind, sender);
    }
}

// ----------------------------------------------------------------------
// SDP bridge stub
// ----------------------------------------------------------------------

/// Line-oriented toy SDP: `m=<media>` per content, candidates rendered as
/// `candidate:<id> <component> <proto> <priority> <ip> <port> typ <kind>`
pub struct StubSdp;

impl SdpBridge for StubSdp {
    fn remote_description(
        &self,
        kind: SdpType,
        contents: &[Content],
    ) -> Result<(SessionDescription, Vec<SdpCandidate>)> {
        let mut lines = vec!["v=0".to_string()];
        let mut candidates = Vec::new();

        for content in contents {
            lines.push(format!("m={}", content.description.media.name()));
            for candidate in &content.candidates {
                candidates.push(self.candidate_line(&content.name, candidate));
            }
        }

        Ok((
            SessionDescription {
                kind,
                sdp: lines.join("\n"),
            },
            candidates,
        ))
    }

    fn local_contents(&self, description: &SessionDescription) -> Result<Vec<Content>> {
        let mut contents = Vec::new();

        for line in description.sdp.lines() {
            if let Some(media) = line.strip_prefix("m=") {
                let media_kind = match media {
                    "audio" => Media::Audio,
                    "video" => Media::Video,
                    _ => continue,
                };
                contents.push(Content {
                    creator: Creator::Initiator,
                    name: media.to_string(),
                    senders: Senders::Both,
                    description: Description {
                        media: media_kind,
                        payloads: vec![PayloadType {
                            id: 111,
                            name: Some("opus".to_string()),
                            clockrate: Some(48000),
                            channels: Some(2),
                        }],
                    },
                    candidates: Vec::new(),
                });
            }
        }

        Ok(contents)
    }

    fn candidate_from_event(&self, event: &IceCandidateEvent) -> Result<(String, Candidate)> {
        let name = event
            .sdp_mid
            .clone()
            .ok_or_else(|| Error::MalformedPayload("candidate without mid".to_string()))?;

        let parts: Vec<&str> = event.candidate.split_whitespace().collect();
        if parts.len() < 8 {
            return Err(Error::MalformedPayload("short candidate line".to_string()));
        }
        let id = parts[0]
            .strip_prefix("candidate:")
            .ok_or_else(|| Error::MalformedPayload("missing candidate prefix".to_string()))?
            .to_string();

        Ok((
            name,
            Candidate {
                id: id.clone(),
                component: parts[1].parse().unwrap_or(1),
                foundation: id,
                generation: 0,
                ip: parts[4].to_string(),
                port: parts[5].parse().unwrap_or(0),
                priority: parts[3].parse().unwrap_or(0),
                protocol: parts[2].to_string(),
                kind: parts[7].to_string(),
            },
        ))
    }

    fn candidate_line(&self, content: &str, candidate: &Candidate) -> SdpCandidate {
        SdpCandidate {
            content: content.to_string(),
            line: format!(
                "candidate:{} {} {} {} {} {} typ {}",
                candidate.id,
                candidate.component,
                candidate.protocol,
                candidate.priority,
                candidate.ip,
                candidate.port,
                candidate.kind
            ),
        }
    }
}

// ----------------------------------------------------------------------
// WebRTC backend fakes
// ----------------------------------------------------------------------

pub struct FakeMedia {
    pub audio_enabled: AtomicBool,
}

impl LocalMedia for FakeMedia {
    fn id(&self) -> &str {
        "fake-media"
    }

    fn set_audio_enabled(&self, enabled: bool) {
        self.audio_enabled.store(enabled, Ordering::SeqCst);
    }
}

pub struct FakePeer {
    label: String,
    events: mpsc::UnboundedSender<PeerEvent>,
    candidate_counter: AtomicUsize,
    /// Emit one candidate and end-of-candidates on every local description
    pub emit_candidates: bool,
    pub fail_remote_description: AtomicBool,
    pub added_candidates: Mutex<Vec<SdpCandidate>>,
    pub remote_descriptions: Mutex<Vec<SessionDescription>>,
    pub close_count: AtomicUsize,
}

impl FakePeer {
    pub fn emit(&self, event: PeerEvent) {
        let _ = self.events.send(event);
    }

    pub fn added_candidate_count(&self) -> usize {
        self.added_candidates.lock().unwrap().len()
    }
}

#[async_trait]
impl PeerConnection for FakePeer {
    async fn create_offer(&self) -> Result<SessionDescription> {
        Ok(SessionDescription {
            kind: SdpType::Offer,
            sdp: "v=0\nm=audio".to_string(),
        })
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        Ok(SessionDescription {
            kind: SdpType::Answer,
            sdp: "v=0\nm=audio".to_string(),
        })
    }

    async fn set_local_description(&self, _description: SessionDescription) -> Result<()> {
        if self.emit_candidates {
            let n = self.candidate_counter.fetch_add(1, Ordering::SeqCst);
            self.emit(PeerEvent::IceCandidate(IceCandidateEvent {
                sdp_mid: Some("audio".to_string()),
                sdp_m_line_index: Some(0),
                candidate: format!(
                    "candidate:{}-{} 1 udp 2130706431 198.51.100.1 {} typ host",
                    self.label,
                    n,
                    10000 + n
                ),
            }));
            self.emit(PeerEvent::EndOfCandidates);
        }
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        if self.fail_remote_description.load(Ordering::SeqCst) {
            return Err(Error::Negotiation("incompatible description".to_string()));
        }
        self.remote_descriptions.lock().unwrap().push(description);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: SdpCandidate) -> Result<()> {
        self.added_candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    async fn attach_local_media(&self, _media: Arc<dyn LocalMedia>) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {
        self.close_count.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeBackend {
    label: String,
    pub emit_candidates: bool,
    pub fail_media: AtomicBool,
    pub peers: Mutex<Vec<Arc<FakePeer>>>,
    pub media: Mutex<Vec<Arc<FakeMedia>>>,
}

impl FakeBackend {
    pub fn new(label: &str) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            emit_candidates: true,
            fail_media: AtomicBool::new(false),
            peers: Mutex::new(Vec::new()),
            media: Mutex::new(Vec::new()),
        })
    }

    pub fn silent(label: &str) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            emit_candidates: false,
            fail_media: AtomicBool::new(false),
            peers: Mutex::new(Vec::new()),
            media: Mutex::new(Vec::new()),
        })
    }

    pub fn last_peer(&self) -> Option<Arc<FakePeer>> {
        self.peers.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl PeerBackend for FakeBackend {
    async fn get_user_media(&self, _media: Media) -> Result<Arc<dyn LocalMedia>> {
        if self.fail_media.load(Ordering::SeqCst) {
            return Err(Error::Media("permission denied".to_string()));
        }
        let media = Arc::new(FakeMedia {
            audio_enabled: AtomicBool::new(true),
        });
        self.media.lock().unwrap().push(Arc::clone(&media));
        Ok(media)
    }

    async fn create_peer_connection(
        &self,
        _config: IceConfig,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerConnection>> {
        let index = self.peers.lock().unwrap().len();
        let peer = Arc::new(FakePeer {
            label: format!("{}{}", self.label, index),
            events,
            candidate_counter: AtomicUsize::new(0),
            emit_candidates: self.emit_candidates,
            fail_remote_description: AtomicBool::new(false),
            added_candidates: Mutex::new(Vec::new()),
            remote_descriptions: Mutex::new(Vec::new()),
            close_count: AtomicUsize::new(0),
        });
        self.peers.lock().unwrap().push(Arc::clone(&peer));
        Ok(peer)
    }
}

// ----------------------------------------------------------------------
// Engine plumbing
// ----------------------------------------------------------------------

pub fn engine_with(
    transport: Arc<dyn StanzaTransport>,
    backend: Option<Arc<FakeBackend>>,
) -> Arc<Engine> {
    let mut engine = Engine::new(EngineConfig::default(), transport, Arc::new(StubSdp));
    if let Some(backend) = backend {
        engine = engine.with_peer_backend(backend);
    }
    Arc::new(engine)
}

/// Initiate hook that spawns a session and feeds it the stanza, the way an
/// application answers inbound calls
pub struct SpawnSessionHandler {
    pub sessions: Mutex<Vec<Arc<Session>>>,
}

impl SpawnSessionHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(Vec::new()),
        })
    }

    pub fn first(&self) -> Option<Arc<Session>> {
        self.sessions.lock().unwrap().first().cloned()
    }
}

#[async_trait]
impl InitiateHandler for SpawnSessionHandler {
    async fn on_session_initiate(&self, engine: Arc<Engine>, stanza: Stanza) {
        let session = engine.session(SessionArgs {
            to: stanza.from.clone(),
            media: Media::Audio,
            callbacks: Arc::new(NoCallbacks),
        });
        self.sessions.lock().unwrap().push(Arc::clone(&session));
        session.handle(stanza).await;
    }
}

// ----------------------------------------------------------------------
// Stanza builders
// ----------------------------------------------------------------------

pub fn candidate(id: &str) -> Candidate {
    Candidate {
        id: id.to_string(),
        component: 1,
        foundation: id.to_string(),
        generation: 0,
        ip: "203.0.113.7".to_string(),
        port: 20000,
        priority: 2130706431,
        protocol: "udp".to_string(),
        kind: "host".to_string(),
    }
}

pub fn audio_content(candidates: Vec<Candidate>) -> Content {
    Content {
        creator: Creator::Initiator,
        name: "audio".to_string(),
        senders: Senders::Both,
        description: Description {
            media: Media::Audio,
            payloads: vec![PayloadType {
                id: 111,
                name: Some("opus".to_string()),
                clockrate: Some(48000),
                channels: Some(2),
            }],
        },
        candidates,
    }
}

pub fn jingle_iq(from: &str, iq_type: IqType, id: &str, payload: JinglePayload) -> Stanza {
    Stanza {
        kind: StanzaKind::Iq,
        id: Some(id.to_string()),
        iq_type: Some(iq_type),
        from: Some(Jid::new(from)),
        to: None,
        body: StanzaBody::Jingle(payload),
        error: None,
    }
}

pub fn initiate_request(from: &str, sid: &str, id: &str) -> Stanza {
    jingle_iq(
        from,
        IqType::Set,
        id,
        JinglePayload::new(Action::SessionInitiate, sid)
            .with_initiator(Jid::new(from))
            .with_contents(vec![audio_content(vec![candidate("c-init")])]),
    )
}

// ----------------------------------------------------------------------
// Scheduling helpers
// ----------------------------------------------------------------------

/// Give spawned routing and pump tasks a chance to drain
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
