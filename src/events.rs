use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// Domain events emitted by the workflow services after commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    RequisitionCreated(Uuid),
    RequisitionSubmitted(Uuid),
    RequisitionStatusChanged {
        requisition_id: Uuid,
        old_status: String,
        new_status: String,
    },
    RequisitionRejected {
        requisition_id: Uuid,
        stage: String,
    },
    RequisitionDelivered(Uuid),

    ItemsClassified {
        requisition_id: Uuid,
        count: usize,
    },
    PurchasesValidated {
        requisition_id: Uuid,
        approved: usize,
        rejected: usize,
    },
    PurchaseReceived {
        requisition_id: Uuid,
        item_id: Uuid,
    },

    LotCreated {
        requisition_id: Uuid,
        lot_id: Uuid,
        numero_lote: i32,
    },
    LotDispatched {
        requisition_id: Uuid,
        lot_id: Uuid,
    },
    LotDelivered {
        requisition_id: Uuid,
        lot_id: Uuid,
    },
    LotVoided {
        requisition_id: Uuid,
        lot_id: Uuid,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Creates an event channel together with its sender wrapper.
pub fn channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}

/// Minimal event loop that logs every event. Deployments that forward
/// events elsewhere run their own consumer instead.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        info!(?event, "domain event");
    }
}
