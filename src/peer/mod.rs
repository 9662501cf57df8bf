//! WebRTC collaborator boundary
//!
//! Peer-connection creation, media acquisition and the event stream a live
//! connection feeds back into the session. The engine never touches media
//! itself; it drives these traits and reacts to [`PeerEvent`]s.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::discovery::ServiceStore;
use crate::sdp::{SdpCandidate, SessionDescription};
use crate::shared::result::Result;
use crate::stanza::jingle::Media;

/// ICE connection states surfaced by the peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl IceConnectionState {
    pub fn name(&self) -> &'static str {
        match self {
            IceConnectionState::New => "new",
            IceConnectionState::Checking => "checking",
            IceConnectionState::Connected => "connected",
            IceConnectionState::Completed => "completed",
            IceConnectionState::Disconnected => "disconnected",
            IceConnectionState::Failed => "failed",
            IceConnectionState::Closed => "closed",
        }
    }
}

/// A discovered ICE candidate, raw from the peer connection
#[derive(Debug, Clone)]
pub struct IceCandidateEvent {
    pub sdp_mid: Option<String>,
    pub sdp_m_line_index: Option<u16>,
    pub candidate: String,
}

/// Handle to a remote media stream attached by the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStream {
    pub id: String,
}

/// Events a live peer connection delivers to its session
#[derive(Debug, Clone)]
pub enum PeerEvent {
    IceCandidate(IceCandidateEvent),
    /// Candidate gathering finished for the current phase
    EndOfCandidates,
    ConnectionStateChange(IceConnectionState),
    StreamAdded(RemoteStream),
    StreamRemoved,
}

/// An ICE server entry handed to the peer connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceServer {
    pub url: String,
    pub username: Option<String>,
    pub credential: Option<String>,
}

/// ICE configuration assembled from the discovery buckets
#[derive(Debug, Clone, Default)]
pub struct IceConfig {
    pub servers: Vec<IceServer>,
}

impl IceConfig {
    /// Merge every discovery bucket into one server list
    pub async fn from_store(store: &ServiceStore) -> Self {
        Self {
            servers: store.ice_servers().await,
        }
    }
}

/// Captured local media, kept alive for the duration of the call
pub trait LocalMedia: Send + Sync {
    fn id(&self) -> &str;

    /// Toggle local audio tracks (mute/unmute)
    fn set_audio_enabled(&self, enabled: bool);
}

/// A live peer connection
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: SdpCandidate) -> Result<()>;

    async fn attach_local_media(&self, media: Arc<dyn LocalMedia>) -> Result<()>;

    async fn close(&self);
}

/// Factory for media capture and peer connections
///
/// Absence of a backend on the engine means WebRTC support is unavailable at
/// the process level; the router then rejects protocol stanzas outright.
#[async_trait]
pub trait PeerBackend: Send + Sync {
    async fn get_user_media(&self, media: Media) -> Result<Arc<dyn LocalMedia>>;

    async fn create_peer_connection(
        &self,
        config: IceConfig,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerConnection>>;
}
