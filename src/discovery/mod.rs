//! Network service discovery
//!
//! Populates the STUN/TURN buckets the peer connection is configured from.
//! Three sources: XEP-0215 external services, XEP-0278 Jingle relay nodes and
//! a JSON document fetched from a fallback URL. Each discovery task holds the
//! deferred gate open for exactly the duration of its round trip so that no
//! protocol action runs against an unconfigured engine.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::engine::gate::DeferGate;
use crate::shared::result::Result;
use crate::stanza::{IqType, Jid, ServiceNamespace, Stanza, StanzaBody};
use crate::transport::StanzaTransport;

/// Service types the engine keeps buckets for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceType {
    Stun,
    Turn,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Stun => "stun",
            ServiceType::Turn => "turn",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "stun" => Some(ServiceType::Stun),
            "turn" => Some(ServiceType::Turn),
            _ => None,
        }
    }
}

/// A service element as it arrives off the wire, nothing validated yet
#[derive(Debug, Clone, Default)]
pub struct RawService {
    pub host: Option<String>,
    pub port: Option<String>,
    pub transport: Option<String>,
    pub service_type: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Relay-node specific attributes
    pub address: Option<String>,
    pub protocol: Option<String>,
    pub policy: Option<String>,
}

/// A validated STUN/TURN service descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    pub service_type: ServiceType,
    pub host: String,
    pub port: Option<u16>,
    pub transport: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ServiceEntry {
    /// Render as an ICE server URL (`stun:host:port?transport=udp`)
    pub fn url(&self) -> String {
        let mut url = format!("{}:{}", self.service_type.as_str(), self.host);
        if let Some(port) = self.port {
            url.push_str(&format!(":{}", port));
        }
        if let Some(transport) = &self.transport {
            url.push_str(&format!("?transport={}", transport));
        }
        url
    }
}

#[derive(Debug, Default)]
struct Buckets {
    extdisco_stun: Vec<ServiceEntry>,
    extdisco_turn: Vec<ServiceEntry>,
    relay_stun: Vec<ServiceEntry>,
    fallback_stun: Vec<ServiceEntry>,
    fallback_turn: Vec<ServiceEntry>,
}

/// Discovery result buckets, one store per engine
#[derive(Debug, Default)]
pub struct ServiceStore {
    buckets: RwLock<Buckets>,
}

impl ServiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_extdisco(&self, entry: ServiceEntry) {
        let mut buckets = self.buckets.write().await;
        match entry.service_type {
            ServiceType::Stun => buckets.extdisco_stun.push(entry),
            ServiceType::Turn => buckets.extdisco_turn.push(entry),
        }
    }

    pub async fn push_relay(&self, entry: ServiceEntry) {
        let mut buckets = self.buckets.write().await;
        buckets.relay_stun.push(entry);
    }

    pub async fn push_fallback(&self, entry: ServiceEntry) {
        let mut buckets = self.buckets.write().await;
        match entry.service_type {
            ServiceType::Stun => buckets.fallback_stun.push(entry),
            ServiceType::Turn => buckets.fallback_turn.push(entry),
        }
    }

    /// All entries of one service type across the buckets
    pub async fn entries(&self, service_type: ServiceType) -> Vec<ServiceEntry> {
        let buckets = self.buckets.read().await;
        let mut entries = Vec::new();
        match service_type {
            ServiceType::Stun => {
                entries.extend(buckets.extdisco_stun.iter().cloned());
                entries.extend(buckets.relay_stun.iter().cloned());
                entries.extend(buckets.fallback_stun.iter().cloned());
            }
            ServiceType::Turn => {
                entries.extend(buckets.extdisco_turn.iter().cloned());
                entries.extend(buckets.fallback_turn.iter().cloned());
            }
        }
        entries
    }

    /// Merge every bucket into the ICE server list the peer is created with
    pub async fn ice_servers(&self) -> Vec<crate::peer::IceServer> {
        let mut servers = Vec::new();
        for service_type in [ServiceType::Stun, ServiceType::Turn] {
            for entry in self.entries(service_type).await {
                servers.push(crate::peer::IceServer {
                    url: entry.url(),
                    username: entry.username.clone(),
                    credential: entry.password.clone(),
                });
            }
        }
        servers
    }
}

/// Fallback document fetcher, the HTTP client itself is host-provided
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// JSON document served by the fallback URL
#[derive(Debug, Deserialize)]
struct FallbackDoc {
    #[serde(default)]
    uris: Vec<String>,
    username: Option<String>,
    password: Option<String>,
}

/// Validate an extdisco service element (XEP-0215)
fn parse_extdisco_entry(raw: &RawService) -> Option<ServiceEntry> {
    let host = raw.host.clone()?;
    let service_type = ServiceType::from_str(raw.service_type.as_deref()?)?;

    let (username, password) = match service_type {
        ServiceType::Turn => (raw.username.clone(), raw.password.clone()),
        ServiceType::Stun => (None, None),
    };

    Some(ServiceEntry {
        service_type,
        host,
        port: raw.port.as_deref().and_then(|p| p.parse().ok()),
        transport: raw.transport.clone(),
        username,
        password,
    })
}

/// Validate a relay-node STUN element (XEP-0278); only public entries qualify
fn parse_relay_entry(raw: &RawService) -> Option<ServiceEntry> {
    let host = raw.address.clone()?;
    let protocol = raw.protocol.clone()?;
    if raw.policy.as_deref() != Some("public") {
        return None;
    }

    Some(ServiceEntry {
        service_type: ServiceType::Stun,
        host,
        port: raw.port.as_deref().and_then(|p| p.parse().ok()),
        transport: Some(protocol),
        username: None,
        password: None,
    })
}

/// Parse a fallback service URI (`turn:host:port?transport=tcp`)
fn parse_fallback_uri(uri: &str) -> Option<(ServiceType, String, Option<u16>, Option<String>)> {
    let (scheme, rest) = uri.split_once(':')?;
    let service_type = ServiceType::from_str(scheme)?;

    let (authority, transport) = match rest.split_once('?') {
        Some((authority, query)) => {
            let transport = query
                .split('&')
                .find_map(|kv| kv.strip_prefix("transport="))
                .map(|t| t.to_string());
            (authority, transport)
        }
        None => (rest, None),
    };

    if authority.is_empty() {
        return None;
    }

    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => (host.to_string(), port.parse().ok()),
        None => (authority.to_string(), None),
    };

    if host.is_empty() {
        return None;
    }

    Some((service_type, host, port, transport))
}

fn discovery_request(domain: String, ns: ServiceNamespace) -> Stanza {
    let id = format!("disco_{:x}", rand::random::<u64>());
    Stanza::iq(IqType::Get, Jid::new(domain), id).with_body(StanzaBody::ServiceQuery(ns))
}

/// Query the server for external services (XEP-0215)
pub async fn discover_external_services(
    gate: &DeferGate,
    transport: &Arc<dyn StanzaTransport>,
    store: &ServiceStore,
) {
    debug!("discovering external services");

    gate.acquire().await;

    let request = discovery_request(transport.domain(), ServiceNamespace::ExtDisco);

    match transport.request(request).await {
        Ok(response) if response.iq_type == Some(IqType::Result) => {
            if let StanzaBody::Services(ServiceNamespace::ExtDisco, services) = &response.body {
                for raw in services {
                    match parse_extdisco_entry(raw) {
                        Some(entry) => {
                            debug!(
                                "external service stored (type: {}, host: {})",
                                entry.service_type.as_str(),
                                entry.host
                            );
                            store.push_extdisco(entry).await;
                        }
                        None => debug!("external service skipped (incomplete entry)"),
                    }
                }
            }
            debug!("discovered external services");
        }
        Ok(_) => {
            warn!("could not discover external services (server might not support XEP-0215)");
        }
        Err(e) => {
            warn!("external service discovery failed: {}", e);
        }
    }

    gate.release().await;
}

/// Query the server for Jingle relay nodes (XEP-0278)
pub async fn discover_relay_nodes(
    gate: &DeferGate,
    transport: &Arc<dyn StanzaTransport>,
    store: &ServiceStore,
) {
    debug!("discovering relay node services");

    gate.acquire().await;

    let request = discovery_request(transport.domain(), ServiceNamespace::RelayNodes);

    match transport.request(request).await {
        Ok(response) if response.iq_type == Some(IqType::Result) => {
            if let StanzaBody::Services(ServiceNamespace::RelayNodes, services) = &response.body {
                for raw in services {
                    match parse_relay_entry(raw) {
                        Some(entry) => {
                            debug!("relay STUN service stored (host: {})", entry.host);
                            store.push_relay(entry).await;
                        }
                        None => debug!("relay service skipped (non-public or incomplete)"),
                    }
                }
            }
            debug!("discovered relay node services");
        }
        Ok(_) => {
            warn!("could not discover relay nodes (server might not support XEP-0278)");
        }
        Err(e) => {
            warn!("relay node discovery failed: {}", e);
        }
    }

    gate.release().await;
}

/// Fetch fallback STUN/TURN services from a configured URL
pub async fn discover_fallback_services(
    gate: &DeferGate,
    http: &Arc<dyn HttpFetch>,
    store: &ServiceStore,
    fallback_url: &str,
    local_jid: &Jid,
) {
    debug!("discovering fallback services");

    gate.acquire().await;

    let url = format!("{}?username={}", fallback_url, local_jid.bare());

    match http.fetch(&url).await {
        Ok(body) => match serde_json::from_str::<FallbackDoc>(&body) {
            Ok(doc) => {
                for uri in &doc.uris {
                    match parse_fallback_uri(uri) {
                        Some((service_type, host, port, transport)) => {
                            let (username, password) = match service_type {
                                ServiceType::Turn => {
                                    (doc.username.clone(), doc.password.clone())
                                }
                                ServiceType::Stun => (None, None),
                            };
                            store
                                .push_fallback(ServiceEntry {
                                    service_type,
                                    host,
                                    port,
                                    transport,
                                    username,
                                    password,
                                })
                                .await;
                        }
                        None => warn!("fallback service not stored, weird URI ({})", uri),
                    }
                }
                debug!("discovered fallback services");
            }
            Err(e) => warn!("could not parse fallback document: {}", e),
        },
        Err(e) => warn!("could not discover fallback services: {}", e),
    }

    gate.release().await;
}
