use std::collections::HashMap;
use std::time::{Duration, Instant};

use shared::domain::{OperationId, OperationStatus, OperationStatusSnapshot};

/// Detected change of an operation's `status` field. `previous` is `None`
/// for the first snapshot ever stored for that operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTransition {
    pub operation_id: OperationId,
    pub previous: Option<OperationStatus>,
    pub new: OperationStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Snapshot was stored; carries the transition when the status changed.
    Applied(Option<StatusTransition>),
    /// Sequence was not strictly greater than the stored one; dropped.
    Stale { stored_sequence: u64 },
}

struct Entry {
    snapshot: OperationStatusSnapshot,
    terminal_since: Option<Instant>,
}

/// Authoritative, monotonic map from operation id to its latest snapshot.
/// Updates whose sequence does not strictly increase are discarded, so any
/// interleaving of deliveries converges on the highest-sequence snapshot.
#[derive(Default)]
pub struct StatusStore {
    entries: HashMap<OperationId, Entry>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_update(&mut self, snapshot: OperationStatusSnapshot) -> UpdateOutcome {
        match self.entries.get_mut(&snapshot.operation_id) {
            Some(entry) if snapshot.sequence <= entry.snapshot.sequence => UpdateOutcome::Stale {
                stored_sequence: entry.snapshot.sequence,
            },
            Some(entry) => {
                let previous = entry.snapshot.status;
                let transition = (previous != snapshot.status).then(|| StatusTransition {
                    operation_id: snapshot.operation_id.clone(),
                    previous: Some(previous),
                    new: snapshot.status,
                });
                entry.terminal_since = if snapshot.status.is_terminal() {
                    entry.terminal_since.or_else(|| Some(Instant::now()))
                } else {
                    None
                };
                entry.snapshot = snapshot;
                UpdateOutcome::Applied(transition)
            }
            None => {
                let transition = StatusTransition {
                    operation_id: snapshot.operation_id.clone(),
                    previous: None,
                    new: snapshot.status,
                };
                let terminal_since = snapshot.status.is_terminal().then(Instant::now);
                self.entries.insert(
                    snapshot.operation_id.clone(),
                    Entry {
                        snapshot,
                        terminal_since,
                    },
                );
                UpdateOutcome::Applied(Some(transition))
            }
        }
    }

    pub fn get(&self, operation_id: &OperationId) -> Option<&OperationStatusSnapshot> {
        self.entries.get(operation_id).map(|entry| &entry.snapshot)
    }

    /// Removes the entry outright; no tombstone is kept, so a later update
    /// for the same id would be treated as brand new.
    pub fn remove(&mut self, operation_id: &OperationId) -> Option<OperationStatusSnapshot> {
        self.entries.remove(operation_id).map(|entry| entry.snapshot)
    }

    pub fn operations(&self) -> HashMap<OperationId, OperationStatusSnapshot> {
        self.entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.snapshot.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops operations that have been terminal for longer than `retention`.
    /// Returns how many entries were pruned.
    pub fn prune_terminal(&mut self, retention: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            entry
                .terminal_since
                .map_or(true, |since| since.elapsed() < retention)
        });
        before - self.entries.len()
    }
}
