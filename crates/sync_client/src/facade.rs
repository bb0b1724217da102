use std::collections::HashMap;

use shared::domain::{NotificationEvent, OperationId, OperationStatusSnapshot};

use crate::connection::{ConnectionPhase, ConnectionStatus};

/// Immutable read model handed to presentation code. Owned data throughout,
/// so UI consumers can read it from any context without synchronization.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSnapshot {
    pub is_connected: bool,
    pub connection_error: Option<String>,
    pub operations: HashMap<OperationId, OperationStatusSnapshot>,
    /// Newest-first.
    pub notifications: Vec<NotificationEvent>,
}

/// Pure projection of the three stores. Precedence for the connection
/// fields: a recorded error wins over "connecting"; while `Open`, the
/// session is connected and no error is surfaced.
pub fn project(
    status: &ConnectionStatus,
    operations: HashMap<OperationId, OperationStatusSnapshot>,
    notifications: Vec<NotificationEvent>,
) -> DashboardSnapshot {
    let is_connected = status.phase == ConnectionPhase::Open;
    let connection_error = if is_connected {
        None
    } else {
        status.last_error.clone()
    };
    DashboardSnapshot {
        is_connected,
        connection_error,
        operations,
        notifications,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(phase: ConnectionPhase, last_error: Option<&str>) -> ConnectionStatus {
        ConnectionStatus {
            phase,
            retry_count: 0,
            last_error: last_error.map(str::to_string),
        }
    }

    #[test]
    fn open_session_surfaces_no_error() {
        let snapshot = project(
            &status(ConnectionPhase::Open, Some("stale error")),
            HashMap::new(),
            Vec::new(),
        );
        assert!(snapshot.is_connected);
        assert!(snapshot.connection_error.is_none());
    }

    #[test]
    fn error_wins_while_reconnecting() {
        let snapshot = project(
            &status(ConnectionPhase::Reconnecting, Some("connection refused")),
            HashMap::new(),
            Vec::new(),
        );
        assert!(!snapshot.is_connected);
        assert_eq!(
            snapshot.connection_error.as_deref(),
            Some("connection refused")
        );
    }

    #[test]
    fn never_connected_has_no_error_yet() {
        let snapshot = project(
            &status(ConnectionPhase::Connecting, None),
            HashMap::new(),
            Vec::new(),
        );
        assert!(!snapshot.is_connected);
        assert!(snapshot.connection_error.is_none());
    }
}
