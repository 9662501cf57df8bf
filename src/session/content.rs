//! Media roster and candidate bookkeeping
//!
//! Per-content negotiation state (sender direction, creator role, mute flag)
//! and the candidate lists, split into "already negotiated" and "queued, not
//! yet flushed". Candidates arrive in bursts before a stanza boundary is
//! reached, hence the queues.

use std::collections::HashMap;

use crate::stanza::jingle::{Candidate, Creator, Media, Senders};

/// Negotiation state of one named content
#[derive(Debug, Clone)]
pub struct ContentSlot {
    pub creator: Creator,
    pub senders: Senders,
    pub muted: bool,
}

/// Content roster for one side of the call
#[derive(Debug, Default)]
pub struct MediaRoster {
    slots: HashMap<String, ContentSlot>,
}

impl MediaRoster {
    pub fn insert(&mut self, name: impl Into<String>, creator: Creator, senders: Senders) {
        self.slots.insert(
            name.into(),
            ContentSlot {
                creator,
                senders,
                muted: false,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&ContentSlot> {
        self.slots.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.slots.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_muted(&self, name: &str) -> Option<bool> {
        self.slots.get(name).map(|slot| slot.muted)
    }

    pub fn set_muted(&mut self, name: &str, muted: bool) -> bool {
        match self.slots.get_mut(name) {
            Some(slot) => {
                slot.muted = muted;
                true
            }
            None => false,
        }
    }
}

/// Per-content candidate lists
///
/// A candidate whose id already exists for a content name is never added
/// again.
#[derive(Debug, Default)]
pub struct CandidateMap {
    inner: HashMap<String, Vec<Candidate>>,
}

impl CandidateMap {
    /// Add a candidate under a content name. Returns false on a duplicate id.
    pub fn push(&mut self, name: &str, candidate: Candidate) -> bool {
        let list = self.inner.entry(name.to_string()).or_default();
        if list.iter().any(|existing| existing.id == candidate.id) {
            return false;
        }
        list.push(candidate);
        true
    }

    pub fn get(&self, name: &str) -> &[Candidate] {
        self.inner.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.inner.values().all(Vec::is_empty)
    }

    pub fn total(&self) -> usize {
        self.inner.values().map(Vec::len).sum()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Drain every queued candidate, in per-content insertion order
    pub fn take(&mut self) -> Vec<(String, Candidate)> {
        let drained = std::mem::take(&mut self.inner);
        drained
            .into_iter()
            .flat_map(|(name, candidates)| {
                candidates
                    .into_iter()
                    .map(move |candidate| (name.clone(), candidate))
            })
            .collect()
    }
}

/// Content names implied by a requested media type; video calls always carry
/// an audio content as well
pub fn media_names(media: Media) -> &'static [&'static str] {
    match media {
        Media::Audio => &["audio"],
        Media::Video => &["audio", "video"],
    }
}
