//! Buffered per-subscriber publication of [`Event`]s.
//!
//! Every human controller holds one subscription. Posting appends to a
//! shared log; each subscription remembers how far it has read. Events
//! are never dropped for a live subscription: the log is compacted only
//! up to the slowest reader.

use std::collections::BTreeMap;

use tracing::warn;
use tracon_types::Event;

/// Handle to one reader's position in an [`EventStream`].
///
/// Deliberately not `Clone`: a subscription has exactly one owner, and
/// moving it between positions carries its unread events along.
#[derive(Debug, PartialEq, Eq)]
pub struct EventsSubscription {
    id: u64,
}

impl EventsSubscription {
    /// Opaque identifier, for logging.
    pub const fn id(&self) -> u64 {
        self.id
    }
}

/// Shared append-only log with per-subscriber read offsets.
#[derive(Debug)]
pub struct EventStream {
    /// Buffered events; `events[0]` has absolute index `base`.
    events: Vec<Event>,
    /// Absolute index of the first buffered event.
    base: u64,
    /// Subscription id -> absolute index of the next unread event.
    offsets: BTreeMap<u64, u64>,
    next_id: u64,
    /// Buffered-event count that triggers a backlog warning.
    backlog_warning: usize,
    warned: bool,
}

impl Default for EventStream {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl EventStream {
    /// An empty stream that warns once more than `backlog_warning`
    /// events are waiting on a slow reader.
    pub const fn new(backlog_warning: usize) -> Self {
        Self {
            events: Vec::new(),
            base: 0,
            offsets: BTreeMap::new(),
            next_id: 0,
            backlog_warning,
            warned: false,
        }
    }

    fn end(&self) -> u64 {
        self.base
            .saturating_add(u64::try_from(self.events.len()).unwrap_or(u64::MAX))
    }

    /// Start reading from the current end of the log.
    pub fn subscribe(&mut self) -> EventsSubscription {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        self.offsets.insert(id, self.end());
        EventsSubscription { id }
    }

    /// Stop reading; unread events become eligible for compaction.
    pub fn unsubscribe(&mut self, sub: EventsSubscription) {
        self.offsets.remove(&sub.id);
        self.compact();
    }

    /// Append an event for every current subscriber.
    pub fn post(&mut self, event: Event) {
        if self.offsets.is_empty() {
            // Nobody will ever read it.
            return;
        }
        self.events.push(event);

        if self.events.len() > self.backlog_warning && !self.warned {
            self.warned = true;
            warn!(
                buffered = self.events.len(),
                subscribers = self.offsets.len(),
                "Event stream backlog growing; a subscriber is not reading"
            );
        }
    }

    /// Everything posted since this subscription last read.
    pub fn get(&mut self, sub: &EventsSubscription) -> Vec<Event> {
        let end = self.end();
        let Some(offset) = self.offsets.get_mut(&sub.id) else {
            return Vec::new();
        };
        let start = usize::try_from(offset.saturating_sub(self.base)).unwrap_or(usize::MAX);
        let out = self.events.get(start..).map(<[Event]>::to_vec).unwrap_or_default();
        *offset = end;
        self.compact();
        out
    }

    /// Number of unread events for a subscription.
    pub fn pending(&self, sub: &EventsSubscription) -> usize {
        self.offsets
            .get(&sub.id)
            .map_or(0, |&o| usize::try_from(self.end().saturating_sub(o)).unwrap_or(usize::MAX))
    }

    /// Number of events held in the buffer.
    pub fn buffered(&self) -> usize {
        self.events.len()
    }

    /// Drop events every subscriber has already read.
    fn compact(&mut self) {
        let min = self.offsets.values().copied().min().unwrap_or_else(|| self.end());
        let consumed = usize::try_from(min.saturating_sub(self.base)).unwrap_or(usize::MAX);
        if consumed == 0 {
            return;
        }
        let consumed = consumed.min(self.events.len());
        self.events.drain(..consumed);
        self.base = self
            .base
            .saturating_add(u64::try_from(consumed).unwrap_or(u64::MAX));
        if self.events.len() <= self.backlog_warning {
            self.warned = false;
        }
    }
}
