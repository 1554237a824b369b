use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::client::{DeliveryReceipt, NotificationSender, OutgoingNotification};
use crate::domain::Notification;
use crate::storage::NotificationRepository;

use super::{AppError, parse_id};

/// Delivers notifications and keeps an audit log of what was sent.
///
/// Delivery is authoritative. The audit row is written afterwards on a
/// separate task and its failure is only logged.
pub struct NotificationService {
    sender: Option<Arc<dyn NotificationSender>>,
    repo: Arc<dyn NotificationRepository>,
}

/// Outcome of a delivered notification.
#[derive(Debug)]
pub struct SentNotification {
    pub receipt: DeliveryReceipt,
    pub audit: AuditHandle,
}

/// The pending audit write. Dropping it detaches the task.
#[derive(Debug)]
pub struct AuditHandle(JoinHandle<bool>);

impl AuditHandle {
    /// Wait for the audit write; `true` when the row was stored.
    pub async fn wait(self) -> bool {
        self.0.await.unwrap_or(false)
    }
}

impl NotificationService {
    /// Without a sender only the audit log can be read.
    pub fn new(repo: Arc<dyn NotificationRepository>) -> Self {
        Self { sender: None, repo }
    }

    pub fn with_sender(mut self, sender: Arc<dyn NotificationSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    pub async fn send(
        &self,
        user_id: &str,
        title: &str,
        message: &str,
    ) -> Result<SentNotification, AppError> {
        let user_id = parse_id("user ID", user_id)?;
        let sender = self
            .sender
            .as_ref()
            .ok_or(AppError::NotConfigured("notification service"))?;
        let outgoing = OutgoingNotification {
            user_id,
            title: title.to_string(),
            message: message.to_string(),
        };

        let receipt = sender
            .send(&outgoing)
            .await
            .map_err(|source| AppError::Downstream {
                service: "notification",
                source,
            })?;

        let record = Notification::new(user_id, outgoing.title, outgoing.message, receipt.sent_at);
        let repo = Arc::clone(&self.repo);
        let audit = tokio::spawn(async move {
            match repo.create_notification(&record).await {
                Ok(()) => true,
                Err(err) => {
                    tracing::error!(
                        notification_id = %record.id,
                        user_id = %record.user_id,
                        error = %format!("{err:#}"),
                        "failed to record sent notification"
                    );
                    false
                }
            }
        });

        Ok(SentNotification {
            receipt,
            audit: AuditHandle(audit),
        })
    }

    /// Audit log of a user's notifications, newest first.
    pub async fn list(&self, user_id: &str, limit: u32) -> Result<Vec<Notification>, AppError> {
        let user_id = parse_id("user ID", user_id)?;
        self.repo
            .get_notifications_by_user(user_id, limit)
            .await
            .map_err(AppError::retrieval("get notifications"))
    }
}
