use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anubis_types::models::{Message, MessageId};

/// Deduplicates a raw snapshot by id (the last copy wins) and orders it
/// oldest first. Ties on `created_at` fall back to id order so the result
/// is stable across deliveries.
pub fn normalize(snapshot: Vec<Message>) -> Vec<Message> {
    let mut latest: HashMap<MessageId, Message> = HashMap::with_capacity(snapshot.len());
    for message in snapshot {
        latest.insert(message.id.clone(), message);
    }

    let mut ordered: Vec<Message> = latest.into_values().collect();
    ordered.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    ordered
}

/// The displayed message list of one channel session: authoritative records
/// plus optimistic entries the backend has not echoed back yet.
#[derive(Debug, Default)]
pub struct Timeline {
    confirmed: Vec<Message>,
    pending: Vec<Message>,
    page_limit: Option<usize>,
}

impl Timeline {
    pub fn from_snapshot(snapshot: Vec<Message>) -> Self {
        Self {
            confirmed: normalize(snapshot),
            pending: Vec::new(),
            page_limit: None,
        }
    }

    /// Snapshots are pages of at most `limit` newest records.
    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = Some(limit);
        self
    }

    /// Number of authoritative records.
    pub fn confirmed_len(&self) -> usize {
        self.confirmed.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Replaces the authoritative list wholesale.
    ///
    /// Optimistic entries whose id now appears are dropped, and so are those
    /// older than the oldest record of a full page: they were pushed out of
    /// the page before ever being seen. Returns the records that were not
    /// part of the previous authoritative list.
    pub fn replace(&mut self, snapshot: Vec<Message>) -> Vec<Message> {
        let next = normalize(snapshot);

        let known: HashSet<&MessageId> = self.confirmed.iter().map(|m| &m.id).collect();
        let arrived: Vec<Message> = next
            .iter()
            .filter(|m| !known.contains(&m.id))
            .cloned()
            .collect();

        let present: HashSet<&MessageId> = next.iter().map(|m| &m.id).collect();
        self.pending.retain(|m| !present.contains(&m.id));

        let full = self.page_limit.is_some_and(|limit| next.len() >= limit);
        if let Some(oldest) = next.first().filter(|_| full) {
            self.pending.retain(|m| m.created_at >= oldest.created_at);
        }

        self.confirmed = next;
        arrived
    }

    /// Adds a locally built record shown until the authoritative one lands.
    pub fn push_optimistic(&mut self, message: Message) {
        if self.confirmed.iter().any(|m| m.id == message.id)
            || self.pending.iter().any(|m| m.id == message.id)
        {
            return;
        }
        self.pending.push(message);
    }

    /// Poll change detection: a different count, or a different newest
    /// record when the page is full and the count cannot move.
    pub fn differs_from(&self, fetched: &[Message]) -> bool {
        if fetched.len() != self.confirmed.len() {
            return true;
        }
        let newest = fetched.iter().max_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        newest.map(|m| &m.id) != self.confirmed.last().map(|m| &m.id)
    }

    /// Applies a local edit to whichever copy is displayed.
    pub fn mark_edited(&mut self, id: &MessageId, content: &str) -> bool {
        match self
            .confirmed
            .iter_mut()
            .chain(self.pending.iter_mut())
            .find(|m| &m.id == id)
        {
            Some(message) => {
                message.content = content.to_string();
                message.edited = true;
                true
            }
            None => false,
        }
    }

    /// Read-only snapshot for the rendering boundary, oldest first.
    pub fn snapshot(&self) -> Arc<[Message]> {
        let mut merged: Vec<Message> = self
            .confirmed
            .iter()
            .chain(self.pending.iter())
            .cloned()
            .collect();
        merged.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        merged.into()
    }
}
