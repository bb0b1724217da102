use std::collections::BTreeSet;

use shared::{domain::OperationId, protocol::ClientMessage};

/// The desired set of operation subscriptions. Mutations always land here
/// immediately; the connection owner resends the entire set on every open,
/// so the server's view is replaced rather than patched and nothing is
/// assumed to have survived a disconnect.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    desired: BTreeSet<OperationId>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the id was not already present.
    pub fn add(&mut self, operation_id: OperationId) -> bool {
        self.desired.insert(operation_id)
    }

    /// Returns true when the id was present.
    pub fn remove(&mut self, operation_id: &OperationId) -> bool {
        self.desired.remove(operation_id)
    }

    pub fn contains(&self, operation_id: &OperationId) -> bool {
        self.desired.contains(operation_id)
    }

    pub fn current_set(&self) -> Vec<OperationId> {
        self.desired.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.desired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.desired.is_empty()
    }

    /// Full-set subscribe frame for the next flush.
    pub fn subscribe_message(&self) -> ClientMessage {
        ClientMessage::Subscribe {
            operation_ids: self.current_set(),
        }
    }
}
