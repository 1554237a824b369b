use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::domain::{Notification, UserId};

use super::{decode_timestamp, decode_uuid, encode_timestamp};

/// Audit log of delivered notifications.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create_notification(&self, notification: &Notification) -> Result<()>;

    /// Newest first.
    async fn get_notifications_by_user(&self, user_id: UserId, limit: u32)
    -> Result<Vec<Notification>>;
}

pub struct SqliteNotificationRepository {
    pool: SqlitePool,
}

impl SqliteNotificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_notification(row: &SqliteRow) -> Result<Notification> {
        let sent_at: String = row.get("sent_at");
        let created_at: String = row.get("created_at");

        Ok(Notification {
            id: decode_uuid(row.get("id"), "notification ID")?,
            user_id: decode_uuid(row.get("user_id"), "user ID")?,
            title: row.get("title"),
            message: row.get("message"),
            sent_at: decode_timestamp(&sent_at, "sent_at")?,
            created_at: decode_timestamp(&created_at, "created_at")?,
        })
    }
}

#[async_trait]
impl NotificationRepository for SqliteNotificationRepository {
    async fn create_notification(&self, notification: &Notification) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, title, message, sent_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(notification.id.to_string())
        .bind(notification.user_id.to_string())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(encode_timestamp(notification.sent_at))
        .bind(encode_timestamp(notification.created_at))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to create notification for user {}", notification.user_id))?;
        Ok(())
    }

    async fn get_notifications_by_user(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<Notification>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, title, message, sent_at, created_at
            FROM notifications
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id.to_string())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to get notifications for user {user_id}"))?;

        rows.iter().map(Self::row_to_notification).collect()
    }
}
