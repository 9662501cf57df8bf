//! Stanza router
//!
//! Delivers every inbound stanza to exactly one destination: a registered
//! session, a newly created one (via the application initiate hook), or a
//! structured protocol error reply.

use metrics::counter;
use std::sync::Arc;
use tracing::{debug, warn};

use super::Engine;
use crate::stanza::error::StanzaError;
use crate::stanza::jingle::Action;
use crate::stanza::{IqType, Stanza, StanzaBody};

impl Engine {
    /// Route an inbound IQ stanza
    pub async fn route_iq(self: &Arc<Self>, stanza: Stanza) {
        counter!("yodel_stanzas_routed_total", "kind" => "iq").increment(1);

        let Some(from) = stanza.from.clone() else {
            return;
        };
        let bare = from.bare().to_string();

        let room_route = self.registry.lookup_room(&bare).await;
        let sid = stanza.sid(&self.config.stanza.id_prefix);
        let action = stanza.jingle().map(|payload| payload.action);

        // WebRTC not available at the process level?
        if stanza.jingle().is_some() && self.peer_backend.is_none() {
            warn!("dropped jingle stanza (WebRTC not available)");
            self.send_error_reply(&stanza, StanzaError::SERVICE_UNAVAILABLE)
                .await;
            return;
        }

        if let Some(room) = room_route {
            let username = from.resource().unwrap_or_default().to_string();

            if let Some(participant_sid) = room.participant_sid(&username).await {
                // Registered participant sub-session
                if let Some(session) = self.registry.lookup_single(&participant_sid).await {
                    debug!(
                        "routed to room participant session (sid: {})",
                        participant_sid
                    );
                    session.handle(stanza).await;
                } else if stanza.iq_type == Some(IqType::Set) {
                    warn!(
                        "unknown room participant session route (sid: {})",
                        participant_sid
                    );
                    self.send_error_reply(&stanza, StanzaError::UNKNOWN_SESSION)
                        .await;
                }
            } else if let Some(sid) = sid {
                if action == Some(Action::SessionInitiate) {
                    debug!("new room participant session (sid: {})", sid);
                    room.create_participant(&username, stanza).await;
                } else if stanza.iq_type == Some(IqType::Set) {
                    warn!("unknown room participant session (sid: {})", sid);
                    self.send_error_reply(&stanza, StanzaError::UNKNOWN_SESSION)
                        .await;
                }
            }
            return;
        }

        // One-to-one flavor
        let route = match &sid {
            Some(sid) => self.registry.lookup_single(sid).await,
            None => None,
        };

        if action == Some(Action::SessionInitiate) && route.is_none() {
            debug!("new jingle session (sid: {:?})", sid);

            let hook = self.hooks.read().await.initiate.clone();
            match hook {
                Some(hook) => hook.on_session_initiate(Arc::clone(self), stanza).await,
                None => warn!("no initiate handler installed, dropped session-initiate"),
            }
            return;
        }

        match (sid, route) {
            (Some(sid), Some(session)) => {
                debug!("routed to jingle session (sid: {})", sid);
                session.handle(stanza).await;
            }
            (Some(sid), None) => {
                if stanza.iq_type == Some(IqType::Set) {
                    warn!("unknown jingle session (sid: {})", sid);
                    self.send_error_reply(&stanza, StanzaError::UNKNOWN_SESSION)
                        .await;
                }
            }
            (None, _) => {
                debug!("no route to session, not a jingle stanza");
            }
        }
    }

    /// Route an inbound message stanza (room flavor only)
    pub async fn route_message(self: &Arc<Self>, stanza: Stanza) {
        counter!("yodel_stanzas_routed_total", "kind" => "message").increment(1);

        let Some(from) = stanza.from.clone() else {
            return;
        };
        let room = from.bare().to_string();

        let route = self.registry.lookup_room(&room).await;

        if let StanzaBody::Invite(invite) = &stanza.body {
            if route.is_some() {
                warn!("dropped invite because room already joined (room: {})", room);
                return;
            }
            if invite.jid.is_none() || invite.media.is_none() {
                warn!("dropped invite because incomplete (room: {})", room);
                return;
            }

            debug!("room invite received (room: {})", room);
            let hook = self.hooks.read().await.invite.clone();
            match hook {
                Some(hook) => hook.on_room_invite(Arc::clone(self), stanza).await,
                None => warn!("no invite handler installed, dropped room invite"),
            }
            return;
        }

        if let Some(route) = route {
            debug!("routed message to room session (room: {})", room);
            route.handle_message(stanza).await;
        }
    }

    /// Route an inbound presence stanza (room flavor only)
    pub async fn route_presence(self: &Arc<Self>, stanza: Stanza) {
        counter!("yodel_stanzas_routed_total", "kind" => "presence").increment(1);

        let Some(from) = stanza.from.clone() else {
            return;
        };
        let room = from.bare().to_string();

        if let Some(route) = self.registry.lookup_room(&room).await {
            debug!("routed presence to room session (room: {})", room);
            route.handle_presence(stanza).await;
        }
    }
}
