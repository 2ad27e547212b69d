//! Notification collaborator seam.
//!
//! The core decides *who* to notify (by role lookup through
//! [`crate::auth::UserDirectory`]) but never how delivery happens. Calls
//! are fire-and-forget: services log and swallow notification failures
//! rather than failing the business operation.

use async_trait::async_trait;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn notify(
        &self,
        target_user_ids: &[Uuid],
        title: &str,
        message: &str,
        requisition_id: Uuid,
    ) -> Result<(), NotificationError>;
}

/// Default implementation: structured log only. Real transports (mail,
/// push, queue) live outside the core behind the same trait.
#[derive(Debug, Default, Clone)]
pub struct TracingNotificationService;

#[async_trait]
impl NotificationService for TracingNotificationService {
    #[instrument(skip(self, target_user_ids, message))]
    async fn notify(
        &self,
        target_user_ids: &[Uuid],
        title: &str,
        message: &str,
        requisition_id: Uuid,
    ) -> Result<(), NotificationError> {
        info!(
            recipients = target_user_ids.len(),
            %requisition_id,
            title,
            message,
            "notification dispatched"
        );
        Ok(())
    }
}

/// A delivered notification captured by [`RecordingNotificationService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedNotification {
    pub target_user_ids: Vec<Uuid>,
    pub title: String,
    pub message: String,
    pub requisition_id: Uuid,
}

/// Test double that records every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingNotificationService {
    sent: Mutex<Vec<RecordedNotification>>,
}

impl RecordingNotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<RecordedNotification> {
        self.sent.lock().expect("notification lock poisoned").clone()
    }
}

#[async_trait]
impl NotificationService for RecordingNotificationService {
    async fn notify(
        &self,
        target_user_ids: &[Uuid],
        title: &str,
        message: &str,
        requisition_id: Uuid,
    ) -> Result<(), NotificationError> {
        self.sent
            .lock()
            .expect("notification lock poisoned")
            .push(RecordedNotification {
                target_user_ids: target_user_ids.to_vec(),
                title: title.to_string(),
                message: message.to_string(),
                requisition_id,
            });
        Ok(())
    }
}
