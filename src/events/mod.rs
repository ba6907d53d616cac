use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::models::{
    DiscrepancyReport, DocumentId, DocumentStatus, DocumentType, LineId, LineStatus,
};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends without waiting. A full or closed channel drops the event with a warning.
    pub fn send_or_log(&self, event: Event) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(document_id = %event.document_id(), "event channel full, event dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("event channel closed, event dropped");
            }
        }
    }
}

/// Creates a bounded channel and the matching sender.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender::new(tx), rx)
}

// Events raised by the engine after each committed change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    DocumentHydrated {
        doc_type: DocumentType,
        document_id: DocumentId,
        source: String,
        lines: usize,
    },
    DocumentCreated {
        doc_type: DocumentType,
        document_id: DocumentId,
    },
    DocumentStarted {
        doc_type: DocumentType,
        document_id: DocumentId,
    },
    LineReconciled {
        doc_type: DocumentType,
        document_id: DocumentId,
        line_id: LineId,
        quantity_fact: u32,
        status: LineStatus,
    },
    PlaceholderLineCreated {
        doc_type: DocumentType,
        document_id: DocumentId,
        line_id: LineId,
        barcode: String,
        cell_id: Option<String>,
    },
    RouteStepAdvanced {
        document_id: DocumentId,
        step_index: usize,
        skipped: bool,
    },
    RouteCompleted {
        document_id: DocumentId,
    },
    DocumentCompleted {
        doc_type: DocumentType,
        document_id: DocumentId,
        status: DocumentStatus,
        report: DiscrepancyReport,
        completed_at: DateTime<Utc>,
    },
    FollowOnRequested {
        source_type: DocumentType,
        source_id: DocumentId,
        target_type: DocumentType,
        target_id: DocumentId,
    },
}

impl Event {
    pub fn document_id(&self) -> &DocumentId {
        match self {
            Event::DocumentHydrated { document_id, .. }
            | Event::DocumentCreated { document_id, .. }
            | Event::DocumentStarted { document_id, .. }
            | Event::LineReconciled { document_id, .. }
            | Event::PlaceholderLineCreated { document_id, .. }
            | Event::RouteStepAdvanced { document_id, .. }
            | Event::RouteCompleted { document_id }
            | Event::DocumentCompleted { document_id, .. } => document_id,
            Event::FollowOnRequested { source_id, .. } => source_id,
        }
    }
}

// Drains the channel and logs every event until all senders are dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::DocumentCompleted {
                doc_type,
                document_id,
                report,
                ..
            } => {
                info!(
                    %doc_type,
                    %document_id,
                    discrepancies = report.records.len(),
                    "document completed"
                );
            }
            Event::FollowOnRequested {
                source_id,
                target_type,
                target_id,
                ..
            } => {
                info!(%source_id, %target_type, %target_id, "follow-on document requested");
            }
            other => {
                info!(document_id = %other.document_id(), event = ?other, "engine event");
            }
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_survives_closed_receiver() {
        let (sender, rx) = channel(4);
        drop(rx);
        sender.send_or_log(Event::RouteCompleted {
            document_id: DocumentId::new("p-1"),
        });
        assert!(sender
            .send(Event::RouteCompleted {
                document_id: DocumentId::new("p-1"),
            })
            .await
            .is_err());
    }

    #[tokio::test]
    async fn send_or_log_does_not_wait_on_a_full_channel() {
        let (sender, mut rx) = channel(1);
        for id in ["p-1", "p-2", "p-3"] {
            sender.send_or_log(Event::RouteCompleted {
                document_id: DocumentId::new(id),
            });
        }
        assert_eq!(
            rx.recv().await,
            Some(Event::RouteCompleted {
                document_id: DocumentId::new("p-1"),
            })
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn events_serialize_with_tag() {
        let event = Event::DocumentCreated {
            doc_type: DocumentType::Inventory,
            document_id: DocumentId::new("inv-1"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "document_created");
        assert_eq!(json["doc_type"], "inventory");
    }
}
