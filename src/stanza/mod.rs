//! Stanza data model
//!
//! The engine routes on parsed stanzas; XML encode/decode belongs to the
//! transport implementation. Payloads the engine understands are carried as
//! structured bodies.

pub mod error;
pub mod jingle;

use serde::{Deserialize, Serialize};

use self::error::StanzaError;
use self::jingle::JinglePayload;
use crate::discovery::RawService;

/// Protocol namespaces
pub const NS_JINGLE: &str = "urn:xmpp:jingle:1";
pub const NS_JINGLE_ERRORS: &str = "urn:xmpp:jingle:errors:1";
pub const NS_JINGLE_APPS_RTP: &str = "urn:xmpp:jingle:apps:rtp:1";
pub const NS_JINGLE_APPS_RTP_AUDIO: &str = "urn:xmpp:jingle:apps:rtp:audio";
pub const NS_JINGLE_APPS_RTP_VIDEO: &str = "urn:xmpp:jingle:apps:rtp:video";
pub const NS_JINGLE_TRANSPORTS_ICE_UDP: &str = "urn:xmpp:jingle:transports:ice-udp:1";
pub const NS_MUJI: &str = "http://jabber.org/protocol/muji";

/// Bare-or-full XMPP address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Jid(String);

impl Jid {
    pub fn new(jid: impl Into<String>) -> Self {
        Self(jid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Address without the resource part
    pub fn bare(&self) -> &str {
        self.0.split('/').next().unwrap_or(&self.0)
    }

    /// Resource part, if any
    pub fn resource(&self) -> Option<&str> {
        self.0.split_once('/').map(|(_, r)| r)
    }

    /// Node part (before the `@`), if any
    pub fn node(&self) -> Option<&str> {
        self.bare().split_once('@').map(|(n, _)| n)
    }

    /// Domain part
    pub fn domain(&self) -> &str {
        let bare = self.bare();
        bare.split_once('@').map(|(_, d)| d).unwrap_or(bare)
    }
}

impl std::fmt::Display for Jid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stanza kind, one transport handler is registered per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StanzaKind {
    Iq,
    Message,
    Presence,
}

impl StanzaKind {
    pub fn name(&self) -> &'static str {
        match self {
            StanzaKind::Iq => "iq",
            StanzaKind::Message => "message",
            StanzaKind::Presence => "presence",
        }
    }
}

/// IQ stanza type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IqType {
    Get,
    Set,
    Result,
    Error,
}

impl IqType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IqType::Get => "get",
            IqType::Set => "set",
            IqType::Result => "result",
            IqType::Error => "error",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "get" => Some(IqType::Get),
            "set" => Some(IqType::Set),
            "result" => Some(IqType::Result),
            "error" => Some(IqType::Error),
            _ => None,
        }
    }
}

/// Discovery payload namespaces understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceNamespace {
    /// XEP-0215 external service discovery
    ExtDisco,
    /// XEP-0278 Jingle relay nodes
    RelayNodes,
}

impl ServiceNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceNamespace::ExtDisco => "urn:xmpp:extdisco:2",
            ServiceNamespace::RelayNodes => "http://jabber.org/protocol/jinglenodes",
        }
    }
}

/// Room invite payload carried on message stanzas (x-conference)
#[derive(Debug, Clone)]
pub struct RoomInvite {
    pub jid: Option<Jid>,
    pub password: Option<String>,
    pub reason: Option<String>,
    pub media: Option<String>,
}

/// Structured stanza body
#[derive(Debug, Clone)]
pub enum StanzaBody {
    Empty,
    Jingle(JinglePayload),
    /// Outbound discovery request
    ServiceQuery(ServiceNamespace),
    /// Inbound discovery result
    Services(ServiceNamespace, Vec<RawService>),
    Invite(RoomInvite),
}

/// A parsed stanza as seen by the router and sessions
#[derive(Debug, Clone)]
pub struct Stanza {
    pub kind: StanzaKind,
    pub id: Option<String>,
    pub iq_type: Option<IqType>,
    pub from: Option<Jid>,
    pub to: Option<Jid>,
    pub body: StanzaBody,
    pub error: Option<StanzaError>,
}

impl Stanza {
    pub fn iq(iq_type: IqType, to: Jid, id: impl Into<String>) -> Self {
        Self {
            kind: StanzaKind::Iq,
            id: Some(id.into()),
            iq_type: Some(iq_type),
            from: None,
            to: Some(to),
            body: StanzaBody::Empty,
            error: None,
        }
    }

    pub fn with_body(mut self, body: StanzaBody) -> Self {
        self.body = body;
        self
    }

    /// The Jingle payload, if this stanza carries one
    pub fn jingle(&self) -> Option<&JinglePayload> {
        match &self.body {
            StanzaBody::Jingle(payload) => Some(payload),
            _ => None,
        }
    }

    /// Session id, from the payload or from the scoped stanza-id convention
    pub fn sid(&self, id_prefix: &str) -> Option<String> {
        if let Some(payload) = self.jingle() {
            return Some(payload.sid.clone());
        }
        self.id
            .as_deref()
            .and_then(|id| sid_from_scoped_id(id_prefix, id))
            .map(|s| s.to_string())
    }

    /// Build the error reply for this stanza
    pub fn error_reply(&self, error: StanzaError) -> Option<Stanza> {
        let to = self.from.clone()?;
        Some(Stanza {
            kind: self.kind,
            id: self.id.clone(),
            iq_type: Some(IqType::Error),
            from: None,
            to: Some(to),
            body: self.body.clone(),
            error: Some(error),
        })
    }
}

/// Generate a new opaque session id
pub fn generate_sid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Build a scoped stanza id: `<prefix>_<sid>_<n>`
///
/// Bare acknowledgements carry no payload, so the id is the only way to
/// route them back to a session.
pub fn scoped_id(prefix: &str, sid: &str, counter: u64) -> String {
    let suffix: u16 = rand::random();
    format!("{}_{}_{}{:x}", prefix, sid, counter, suffix)
}

/// Extract the session id from a scoped stanza id, if it follows the scheme
pub fn sid_from_scoped_id<'a>(prefix: &str, id: &'a str) -> Option<&'a str> {
    let mut parts = id.split('_');
    if parts.next() != Some(prefix) {
        return None;
    }
    parts.next().filter(|sid| !sid.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jid_parts() {
        let jid = Jid::new("alice@example.org/balcony");
        assert_eq!(jid.bare(), "alice@example.org");
        assert_eq!(jid.node(), Some("alice"));
        assert_eq!(jid.domain(), "example.org");
        assert_eq!(jid.resource(), Some("balcony"));

        let bare = Jid::new("example.org");
        assert_eq!(bare.bare(), "example.org");
        assert_eq!(bare.node(), None);
        assert_eq!(bare.domain(), "example.org");
    }

    #[test]
    fn test_scoped_id_round_trip() {
        let id = scoped_id("jingle", "abc123", 7);
        assert!(id.starts_with("jingle_abc123_"));
        assert_eq!(sid_from_scoped_id("jingle", &id), Some("abc123"));
    }

    #[test]
    fn test_scoped_id_rejects_foreign_ids() {
        assert_eq!(sid_from_scoped_id("jingle", "purple_abc_1"), None);
        assert_eq!(sid_from_scoped_id("jingle", "no-underscores"), None);
        assert_eq!(sid_from_scoped_id("jingle", "jingle_"), None);
    }

    #[test]
    fn test_generated_sids_are_unique() {
        assert_ne!(generate_sid(), generate_sid());
    }
}
