//! Engine context
//!
//! One `Engine` per connected application: it owns the session registry, the
//! deferred gate, the discovery store and the transport handle, and wires
//! inbound stanza routing. Sessions are created through it and carry an `Arc`
//! back to it.

pub mod gate;
pub mod registry;
pub mod router;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::discovery::{self, HttpFetch, ServiceStore};
use crate::peer::{IceConfig, PeerBackend};
use crate::sdp::SdpBridge;
use crate::session::{Session, SessionArgs};
use crate::stanza::error::StanzaError;
use crate::stanza::{Stanza, StanzaKind, NS_JINGLE, NS_JINGLE_APPS_RTP, NS_JINGLE_APPS_RTP_AUDIO,
    NS_JINGLE_APPS_RTP_VIDEO, NS_JINGLE_TRANSPORTS_ICE_UDP, NS_MUJI};
use crate::transport::StanzaTransport;

use self::gate::DeferGate;
use self::registry::SessionRegistry;

/// Application hook invoked for an inbound `session-initiate` with a fresh
/// sid. The sole path that creates a one-to-one session from the wire.
#[async_trait]
pub trait InitiateHandler: Send + Sync {
    async fn on_session_initiate(&self, engine: Arc<Engine>, stanza: Stanza);
}

/// Application hook invoked for a room invite message
#[async_trait]
pub trait RoomInviteHandler: Send + Sync {
    async fn on_room_invite(&self, engine: Arc<Engine>, stanza: Stanza);
}

#[derive(Default)]
struct Hooks {
    initiate: Option<Arc<dyn InitiateHandler>>,
    invite: Option<Arc<dyn RoomInviteHandler>>,
}

/// Arguments to [`Engine::listen`]
#[derive(Clone)]
pub struct ListenArgs {
    /// Inbound session-initiate handler
    pub initiate: Option<Arc<dyn InitiateHandler>>,
    /// Room invite handler
    pub invite: Option<Arc<dyn RoomInviteHandler>>,
    /// Discover external services as per XEP-0215
    pub extdisco: bool,
    /// Discover relay nodes as per XEP-0278
    pub relaynodes: bool,
    /// Request STUN/TURN from a fallback URL
    pub fallback: Option<String>,
    /// HTTP client for the fallback URL
    pub http: Option<Arc<dyn HttpFetch>>,
}

impl Default for ListenArgs {
    fn default() -> Self {
        Self {
            initiate: None,
            invite: None,
            extdisco: true,
            relaynodes: true,
            fallback: None,
            http: None,
        }
    }
}

/// The signaling engine
pub struct Engine {
    config: EngineConfig,
    transport: Arc<dyn StanzaTransport>,
    sdp: Arc<dyn SdpBridge>,
    peer_backend: Option<Arc<dyn PeerBackend>>,
    registry: SessionRegistry,
    services: ServiceStore,
    gate: DeferGate,
    hooks: RwLock<Hooks>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn StanzaTransport>,
        sdp: Arc<dyn SdpBridge>,
    ) -> Self {
        Self {
            config,
            transport,
            sdp,
            peer_backend: None,
            registry: SessionRegistry::new(),
            services: ServiceStore::new(),
            gate: DeferGate::new(),
            hooks: RwLock::new(Hooks::default()),
        }
    }

    /// Attach the WebRTC backend. Without one the engine rejects protocol
    /// stanzas with `service-unavailable`.
    pub fn with_peer_backend(mut self, backend: Arc<dyn PeerBackend>) -> Self {
        self.peer_backend = Some(backend);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn StanzaTransport> {
        &self.transport
    }

    pub fn sdp(&self) -> &Arc<dyn SdpBridge> {
        &self.sdp
    }

    pub fn peer_backend(&self) -> Option<&Arc<dyn PeerBackend>> {
        self.peer_backend.as_ref()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn services(&self) -> &ServiceStore {
        &self.services
    }

    pub fn gate(&self) -> &DeferGate {
        &self.gate
    }

    /// ICE configuration assembled from the discovery buckets
    pub async fn ice_config(&self) -> IceConfig {
        IceConfig::from_store(&self.services).await
    }

    /// Start a new one-to-one session
    pub fn session(self: &Arc<Self>, args: SessionArgs) -> Arc<Session> {
        Session::new(Arc::clone(self), args)
    }

    /// Register the stanza routes with the transport and kick off service
    /// discovery per the given flags
    pub async fn listen(self: &Arc<Self>, args: ListenArgs) {
        {
            let mut hooks = self.hooks.write().await;
            if args.initiate.is_some() {
                hooks.initiate = args.initiate.clone();
            }
            if args.invite.is_some() {
                hooks.invite = args.invite.clone();
            }
        }

        for kind in [StanzaKind::Iq, StanzaKind::Message, StanzaKind::Presence] {
            let (tx, mut rx) = mpsc::unbounded_channel();
            self.transport.register_handler(kind, tx);

            let engine = Arc::clone(self);
            tokio::spawn(async move {
                while let Some(stanza) = rx.recv().await {
                    match kind {
                        StanzaKind::Iq => engine.route_iq(stanza).await,
                        StanzaKind::Message => engine.route_message(stanza).await,
                        StanzaKind::Presence => engine.route_presence(stanza).await,
                    }
                }
            });
        }

        info!("listening");

        // The gate is closed here, before any discovery round trip is in
        // flight, so operations issued right after listen() cannot slip past.
        if args.extdisco {
            self.gate.acquire().await;
            let engine = Arc::clone(self);
            tokio::spawn(async move {
                discovery::discover_external_services(
                    &engine.gate,
                    &engine.transport,
                    &engine.services,
                )
                .await;
                engine.gate.release().await;
            });
        }

        if args.relaynodes {
            self.gate.acquire().await;
            let engine = Arc::clone(self);
            tokio::spawn(async move {
                discovery::discover_relay_nodes(&engine.gate, &engine.transport, &engine.services)
                    .await;
                engine.gate.release().await;
            });
        }

        if let (Some(url), Some(http)) = (args.fallback, args.http) {
            self.gate.acquire().await;
            let engine = Arc::clone(self);
            tokio::spawn(async move {
                let jid = engine.transport.jid();
                discovery::discover_fallback_services(
                    &engine.gate,
                    &http,
                    &engine.services,
                    &url,
                    &jid,
                )
                .await;
                engine.gate.release().await;
            });
        }
    }

    /// Protocol feature namespaces to advertise in service discovery.
    /// Empty unless the engine can actually take calls.
    pub async fn disco_features(&self) -> Vec<&'static str> {
        let hooks = self.hooks.read().await;
        let has_room = hooks.invite.is_some();
        let has_jingle = has_room || hooks.initiate.is_some();

        if self.peer_backend.is_none() || !has_jingle {
            return Vec::new();
        }

        let mut features = vec![
            NS_JINGLE,
            NS_JINGLE_APPS_RTP,
            NS_JINGLE_APPS_RTP_AUDIO,
            NS_JINGLE_APPS_RTP_VIDEO,
            NS_JINGLE_TRANSPORTS_ICE_UDP,
        ];
        if has_room {
            features.push(NS_MUJI);
        }
        features
    }

    /// Send a structured error reply for an inbound stanza
    pub(crate) async fn send_error_reply(&self, stanza: &Stanza, error: StanzaError) {
        let Some(reply) = stanza.error_reply(error) else {
            warn!("cannot reply with error, stanza has no sender");
            return;
        };

        match self.transport.send(reply).await {
            Ok(()) => info!("sent error reply: {}", error.condition_name()),
            Err(e) => warn!("failed to send error reply: {}", e),
        }
    }
}
