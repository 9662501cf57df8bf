//! SDP bridge
//!
//! Converts between the Jingle content/candidate model and the session
//! descriptions consumed by the WebRTC backend. The actual SDP text grammar
//! lives behind the [`SdpBridge`] trait; the engine only moves the parsed
//! pieces around.

use crate::peer::IceCandidateEvent;
use crate::shared::result::Result;
use crate::stanza::jingle::{Candidate, Content};

/// Session description type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpType {
    Offer,
    Answer,
}

impl SdpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpType::Offer => "offer",
            SdpType::Answer => "answer",
        }
    }
}

/// A session description handed to/received from the peer connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpType,
    pub sdp: String,
}

/// A single candidate line addressed to a content/m-line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdpCandidate {
    pub content: String,
    pub line: String,
}

/// Content model ⇄ SDP translation, implemented by the host
pub trait SdpBridge: Send + Sync {
    /// Render a remote content view into a description plus its candidate
    /// lines
    fn remote_description(
        &self,
        kind: SdpType,
        contents: &[Content],
    ) -> Result<(SessionDescription, Vec<SdpCandidate>)>;

    /// Parse a local description back into the content model
    fn local_contents(&self, description: &SessionDescription) -> Result<Vec<Content>>;

    /// Parse a live ICE candidate event into (content name, candidate)
    fn candidate_from_event(&self, event: &IceCandidateEvent) -> Result<(String, Candidate)>;

    /// Render a stored candidate back into a line for the peer connection
    fn candidate_line(&self, content: &str, candidate: &Candidate) -> SdpCandidate;
}
