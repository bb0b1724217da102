use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    NotificationEvent, OperationId, OperationStatus, OperationStatusSnapshot, Severity,
};

/// Frames sent by the client over the event-source connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Replaces any prior subscription state for this connection; the server
    /// must treat the carried set as authoritative, not as a delta.
    #[serde(rename_all = "camelCase")]
    Subscribe { operation_ids: Vec<OperationId> },
}

/// Frames pushed by the server over the event-source connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    StatusUpdate {
        operation_id: OperationId,
        status: OperationStatus,
        processed_records: u64,
        total_records: u64,
        successful_records: u64,
        failed_records: u64,
        sequence: u64,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Notification {
        event_id: String,
        severity: Severity,
        description: String,
        timestamp: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        operation_id: Option<OperationId>,
    },
    #[serde(rename_all = "camelCase")]
    SubscriptionRejected {
        operation_id: OperationId,
        reason: String,
    },
}

impl ServerMessage {
    /// Domain snapshot carried by a `status_update` frame.
    pub fn into_snapshot(self) -> Option<OperationStatusSnapshot> {
        match self {
            Self::StatusUpdate {
                operation_id,
                status,
                processed_records,
                total_records,
                successful_records,
                failed_records,
                sequence,
                timestamp,
            } => Some(OperationStatusSnapshot {
                operation_id,
                status,
                processed_records,
                total_records,
                successful_records,
                failed_records,
                sequence,
                updated_at: timestamp,
            }),
            _ => None,
        }
    }

    /// Notification carried by a server-pushed `notification` frame.
    pub fn into_notification(self) -> Option<NotificationEvent> {
        match self {
            Self::Notification {
                event_id,
                severity,
                description,
                timestamp,
                operation_id,
            } => Some(NotificationEvent {
                id: event_id,
                timestamp,
                severity,
                description,
                source_operation_id: operation_id,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap()
    }

    #[test]
    fn subscribe_serializes_with_camel_case_field() {
        let message = ClientMessage::Subscribe {
            operation_ids: vec![OperationId::from("sync-17"), OperationId::from("sync-42")],
        };
        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(
            json,
            r#"{"type":"subscribe","operationIds":["sync-17","sync-42"]}"#
        );
    }

    #[test]
    fn status_update_deserializes_from_wire_contract() {
        let json = r#"{
            "type": "status_update",
            "operationId": "sync-17",
            "status": "running",
            "processedRecords": 10,
            "totalRecords": 100,
            "successfulRecords": 9,
            "failedRecords": 1,
            "sequence": 4,
            "timestamp": "2026-03-14T09:30:00Z"
        }"#;
        let message: ServerMessage = serde_json::from_str(json).unwrap();
        let snapshot = message.into_snapshot().unwrap();
        assert_eq!(snapshot.operation_id, OperationId::from("sync-17"));
        assert_eq!(snapshot.status, OperationStatus::Running);
        assert_eq!(snapshot.processed_records, 10);
        assert_eq!(snapshot.total_records, 100);
        assert_eq!(snapshot.sequence, 4);
        assert_eq!(snapshot.updated_at, ts());
    }

    #[test]
    fn notification_operation_id_defaults_to_none() {
        let json = r#"{
            "type": "notification",
            "eventId": "evt-1",
            "severity": "warning",
            "description": "GIS export queue is backed up",
            "timestamp": "2026-03-14T09:30:00Z"
        }"#;
        let message: ServerMessage = serde_json::from_str(json).unwrap();
        let event = message.into_notification().unwrap();
        assert_eq!(event.id, "evt-1");
        assert_eq!(event.severity, Severity::Warning);
        assert!(event.source_operation_id.is_none());
    }

    #[test]
    fn subscription_rejected_roundtrips() {
        let message = ServerMessage::SubscriptionRejected {
            operation_id: OperationId::from("sync-9"),
            reason: "operation belongs to another county".to_string(),
        };
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains(r#""type":"subscription_rejected""#));
        assert!(json.contains(r#""operationId":"sync-9""#));
        let back: ServerMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn into_snapshot_is_none_for_other_frames() {
        let message = ServerMessage::SubscriptionRejected {
            operation_id: OperationId::from("sync-9"),
            reason: "nope".to_string(),
        };
        assert!(message.into_snapshot().is_none());
    }
}
