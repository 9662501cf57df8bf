//! Yodel - an XMPP Jingle signaling engine built with Rust
//!
//! Yodel maps the Jingle call-setup protocol (XEP-0166) onto a WebRTC peer
//! connection: session lifecycle, content negotiation and transport candidate
//! exchange travel as stanzas over an existing XMPP connection, while media
//! itself is delegated to a pluggable WebRTC backend.

pub mod config;
pub mod discovery;
pub mod engine;
pub mod peer;
pub mod sdp;
pub mod session;
pub mod shared;
pub mod stanza;
pub mod transport;

// Re-export commonly used types
pub use engine::Engine;
pub use session::Session;
pub use shared::error::Error;
pub use shared::result::Result;
