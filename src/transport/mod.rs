//! XMPP transport boundary
//!
//! The engine sits on an existing XMPP connection. The connection object
//! itself is out of scope; this trait is the seam it plugs into.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::shared::result::Result;
use crate::stanza::{Jid, Stanza, StanzaKind};

/// The XMPP connection the engine signals over
#[async_trait]
pub trait StanzaTransport: Send + Sync {
    /// Full JID of the local party
    fn jid(&self) -> Jid;

    /// Domain of the connected server
    fn domain(&self) -> String {
        self.jid().domain().to_string()
    }

    /// Fire-and-forget stanza send
    async fn send(&self, stanza: Stanza) -> Result<()>;

    /// IQ round trip: send a request, resolve with its reply
    async fn request(&self, stanza: Stanza) -> Result<Stanza>;

    /// Register the engine as receiver for one stanza kind.
    /// Called once per kind at listen-time.
    fn register_handler(&self, kind: StanzaKind, sender: mpsc::UnboundedSender<Stanza>);
}
