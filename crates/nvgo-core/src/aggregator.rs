//! Merges named diagnostic sets into the editor's error list.

use crate::diagnostic::Diagnostic;
use nvgo_editor::{EditorResult, ErrlistItem, ErrorList, ListAction};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tracing::debug;

/// Proof of an invocation start, used to drop results that arrive after
/// a newer invocation of the same producer has already stored its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    producer: String,
    seq: u64,
}

impl Ticket {
    pub fn producer(&self) -> &str {
        &self.producer
    }
}

#[derive(Default)]
struct State {
    sets: BTreeMap<String, Vec<Diagnostic>>,
    /// Highest ticket stored or removed per producer.
    applied: HashMap<String, u64>,
    next_seq: u64,
}

impl State {
    fn ticket(&mut self, producer: &str) -> Ticket {
        self.next_seq += 1;
        Ticket {
            producer: producer.to_string(),
            seq: self.next_seq,
        }
    }

    fn accept(&mut self, ticket: &Ticket) -> bool {
        let applied = self.applied.entry(ticket.producer.clone()).or_default();
        if ticket.seq < *applied {
            return false;
        }
        *applied = ticket.seq;
        true
    }
}

/// Producer-indexed diagnostics for one session.
pub struct Aggregator {
    state: Mutex<State>,
    publish_lock: tokio::sync::Mutex<()>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            publish_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start an invocation of `producer`.
    pub fn begin(&self, producer: &str) -> Ticket {
        self.state().ticket(producer)
    }

    /// Replace the set of `producer`.
    pub fn store(&self, producer: &str, diagnostics: Vec<Diagnostic>) {
        let ticket = self.begin(producer);
        self.store_ticketed(&ticket, diagnostics);
    }

    /// Replace the set of the ticket's producer unless a newer invocation
    /// already stored. Returns whether the set was applied.
    pub fn store_ticketed(&self, ticket: &Ticket, diagnostics: Vec<Diagnostic>) -> bool {
        let mut state = self.state();
        if !state.accept(ticket) {
            debug!(producer = %ticket.producer, "Dropping stale diagnostics");
            return false;
        }
        if diagnostics.is_empty() {
            state.sets.remove(&ticket.producer);
        } else {
            state.sets.insert(ticket.producer.clone(), diagnostics);
        }
        true
    }

    /// Drop the set of `producer`.
    pub fn remove(&self, producer: &str) {
        let ticket = self.begin(producer);
        self.remove_ticketed(&ticket);
    }

    pub fn remove_ticketed(&self, ticket: &Ticket) -> bool {
        self.store_ticketed(ticket, Vec::new())
    }

    /// The set currently stored for `producer`.
    pub fn get(&self, producer: &str) -> Option<Vec<Diagnostic>> {
        self.state().sets.get(producer).cloned()
    }

    /// Producers with a non-empty set, ascending.
    pub fn producers(&self) -> Vec<String> {
        self.state().sets.keys().cloned().collect()
    }

    /// All diagnostics, ordered by producer name then original order.
    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.state().sets.values().flatten().cloned().collect()
    }

    /// Replace the editor's list with the current snapshot. An empty
    /// snapshot clears and closes the list.
    pub async fn publish(&self, list: &ErrorList, keep_cursor: bool) -> EditorResult<usize> {
        let _guard = self.publish_lock.lock().await;
        let snapshot = self.snapshot();

        if snapshot.is_empty() {
            debug!("Clearing error list");
            list.clear().await?;
            list.close().await?;
            return Ok(0);
        }

        let items: Vec<ErrlistItem> = snapshot.iter().map(Diagnostic::to_errlist_item).collect();
        debug!(count = items.len(), "Publishing error list");
        list.set(&items, ListAction::Replace).await?;
        list.open(keep_cursor).await?;
        Ok(items.len())
    }
}
