//! Jingle payload model (XEP-0166)
//!
//! Actions, termination reasons, session-info names and the content/candidate
//! tree exchanged during call negotiation.

use serde::{Deserialize, Serialize};

use super::Jid;

/// The fixed action vocabulary exchanged during call setup/teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    ContentAccept,
    ContentAdd,
    ContentModify,
    ContentReject,
    ContentRemove,
    DescriptionInfo,
    SecurityInfo,
    SessionAccept,
    SessionInfo,
    SessionInitiate,
    SessionTerminate,
    TransportAccept,
    TransportInfo,
    TransportReject,
    TransportReplace,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ContentAccept => "content-accept",
            Action::ContentAdd => "content-add",
            Action::ContentModify => "content-modify",
            Action::ContentReject => "content-reject",
            Action::ContentRemove => "content-remove",
            Action::DescriptionInfo => "description-info",
            Action::SecurityInfo => "security-info",
            Action::SessionAccept => "session-accept",
            Action::SessionInfo => "session-info",
            Action::SessionInitiate => "session-initiate",
            Action::SessionTerminate => "session-terminate",
            Action::TransportAccept => "transport-accept",
            Action::TransportInfo => "transport-info",
            Action::TransportReject => "transport-reject",
            Action::TransportReplace => "transport-replace",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "content-accept" => Some(Action::ContentAccept),
            "content-add" => Some(Action::ContentAdd),
            "content-modify" => Some(Action::ContentModify),
            "content-reject" => Some(Action::ContentReject),
            "content-remove" => Some(Action::ContentRemove),
            "description-info" => Some(Action::DescriptionInfo),
            "security-info" => Some(Action::SecurityInfo),
            "session-accept" => Some(Action::SessionAccept),
            "session-info" => Some(Action::SessionInfo),
            "session-initiate" => Some(Action::SessionInitiate),
            "session-terminate" => Some(Action::SessionTerminate),
            "transport-accept" => Some(Action::TransportAccept),
            "transport-info" => Some(Action::TransportInfo),
            "transport-reject" => Some(Action::TransportReject),
            "transport-replace" => Some(Action::TransportReplace),
            _ => None,
        }
    }
}

/// Session termination reason (XEP-0166 §7.4)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    AlternativeSession,
    Busy,
    Cancel,
    ConnectivityError,
    Decline,
    Expired,
    FailedApplication,
    FailedTransport,
    GeneralError,
    Gone,
    IncompatibleParameters,
    MediaError,
    SecurityError,
    Success,
    Timeout,
    UnsupportedApplications,
    UnsupportedTransports,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::AlternativeSession => "alternative-session",
            Reason::Busy => "busy",
            Reason::Cancel => "cancel",
            Reason::ConnectivityError => "connectivity-error",
            Reason::Decline => "decline",
            Reason::Expired => "expired",
            Reason::FailedApplication => "failed-application",
            Reason::FailedTransport => "failed-transport",
            Reason::GeneralError => "general-error",
            Reason::Gone => "gone",
            Reason::IncompatibleParameters => "incompatible-parameters",
            Reason::MediaError => "media-error",
            Reason::SecurityError => "security-error",
            Reason::Success => "success",
            Reason::Timeout => "timeout",
            Reason::UnsupportedApplications => "unsupported-applications",
            Reason::UnsupportedTransports => "unsupported-transports",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "alternative-session" => Some(Reason::AlternativeSession),
            "busy" => Some(Reason::Busy),
            "cancel" => Some(Reason::Cancel),
            "connectivity-error" => Some(Reason::ConnectivityError),
            "decline" => Some(Reason::Decline),
            "expired" => Some(Reason::Expired),
            "failed-application" => Some(Reason::FailedApplication),
            "failed-transport" => Some(Reason::FailedTransport),
            "general-error" => Some(Reason::GeneralError),
            "gone" => Some(Reason::Gone),
            "incompatible-parameters" => Some(Reason::IncompatibleParameters),
            "media-error" => Some(Reason::MediaError),
            "security-error" => Some(Reason::SecurityError),
            "success" => Some(Reason::Success),
            "timeout" => Some(Reason::Timeout),
            "unsupported-applications" => Some(Reason::UnsupportedApplications),
            "unsupported-transports" => Some(Reason::UnsupportedTransports),
            _ => None,
        }
    }
}

/// Session-info payload name (XEP-0167 §8)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionInfoType {
    Active,
    Checksum,
    Mute,
    Ringing,
    Unmute,
}

impl SessionInfoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionInfoType::Active => "active",
            SessionInfoType::Checksum => "checksum",
            SessionInfoType::Mute => "mute",
            SessionInfoType::Ringing => "ringing",
            SessionInfoType::Unmute => "unmute",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "active" => Some(SessionInfoType::Active),
            "checksum" => Some(SessionInfoType::Checksum),
            "mute" => Some(SessionInfoType::Mute),
            "ringing" => Some(SessionInfoType::Ringing),
            "unmute" => Some(SessionInfoType::Unmute),
            _ => None,
        }
    }
}

/// Which party created a content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Creator {
    Initiator,
    Responder,
}

impl Creator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Creator::Initiator => "initiator",
            Creator::Responder => "responder",
        }
    }
}

/// Stream direction for a content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Senders {
    Both,
    Initiator,
    None,
    Responder,
}

impl Senders {
    pub fn as_str(&self) -> &'static str {
        match self {
            Senders::Both => "both",
            Senders::Initiator => "initiator",
            Senders::None => "none",
            Senders::Responder => "responder",
        }
    }
}

/// Logical media type of a content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Media {
    Audio,
    Video,
}

impl Media {
    pub fn name(&self) -> &'static str {
        match self {
            Media::Audio => "audio",
            Media::Video => "video",
        }
    }
}

/// A codec descriptor inside a content description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadType {
    pub id: u8,
    pub name: Option<String>,
    pub clockrate: Option<u32>,
    pub channels: Option<u8>,
}

/// Media description of a content (payload/codec list)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Description {
    pub media: Media,
    pub payloads: Vec<PayloadType>,
}

/// An ICE transport candidate associated with a content name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: String,
    pub component: u8,
    pub foundation: String,
    pub generation: u32,
    pub ip: String,
    pub port: u16,
    pub priority: u32,
    pub protocol: String,
    pub kind: String,
}

/// A named logical media stream inside a Jingle payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub creator: Creator,
    pub name: String,
    pub senders: Senders,
    pub description: Description,
    pub candidates: Vec<Candidate>,
}

/// The `<jingle/>` element carried inside an IQ stanza
#[derive(Debug, Clone)]
pub struct JinglePayload {
    pub action: Action,
    pub sid: String,
    pub initiator: Option<Jid>,
    pub responder: Option<Jid>,
    pub contents: Vec<Content>,
    pub reason: Option<Reason>,
    pub info: Option<SessionInfoType>,
    /// Content name attached to mute/unmute info payloads
    pub info_name: Option<String>,
}

impl JinglePayload {
    pub fn new(action: Action, sid: impl Into<String>) -> Self {
        Self {
            action,
            sid: sid.into(),
            initiator: None,
            responder: None,
            contents: Vec::new(),
            reason: None,
            info: None,
            info_name: None,
        }
    }

    pub fn with_initiator(mut self, initiator: Jid) -> Self {
        self.initiator = Some(initiator);
        self
    }

    pub fn with_responder(mut self, responder: Jid) -> Self {
        self.responder = Some(responder);
        self
    }

    pub fn with_contents(mut self, contents: Vec<Content>) -> Self {
        self.contents = contents;
        self
    }

    pub fn with_reason(mut self, reason: Reason) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn with_info(mut self, info: SessionInfoType, name: Option<String>) -> Self {
        self.info = Some(info);
        self.info_name = name;
        self
    }
}
