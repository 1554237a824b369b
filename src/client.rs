//! Clients for services owned outside this gateway.
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::UserId;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid base url: {0}")]
    InvalidUrl(String),
    #[error("rejected by downstream service: {0}")]
    Validation(String),
    #[error("downstream service unavailable: {0}")]
    Unavailable(String),
    #[error("downstream service error: {0}")]
    Server(String),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingNotification {
    pub user_id: UserId,
    pub title: String,
    pub message: String,
}

/// Acknowledgement returned by the notification service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub delivered: bool,
    #[serde(default)]
    pub delivery_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub sent_at: DateTime<Utc>,
}

/// Transport that delivers notifications to users.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, notification: &OutgoingNotification) -> Result<DeliveryReceipt, ClientError>;
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Sends notifications as JSON to `POST {base_url}/notifications`.
#[derive(Debug, Clone)]
pub struct HttpNotificationSender {
    endpoint: Url,
    http: reqwest::Client,
}

impl HttpNotificationSender {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url).map_err(|err| ClientError::InvalidUrl(err.to_string()))?;
        let endpoint = base_url
            .join("notifications")
            .map_err(|err| ClientError::InvalidUrl(err.to_string()))?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { endpoint, http })
    }
}

#[async_trait]
impl NotificationSender for HttpNotificationSender {
    async fn send(&self, notification: &OutgoingNotification) -> Result<DeliveryReceipt, ClientError> {
        let res = self
            .http
            .post(self.endpoint.clone())
            .json(notification)
            .send()
            .await?;

        if res.status().is_success() {
            return Ok(res.json::<DeliveryReceipt>().await?);
        }

        let status = res.status();
        let body = res
            .json::<ErrorResponse>()
            .await
            .map(|err| err.error)
            .unwrap_or_else(|_| "unknown error".to_string());

        let err = match status.as_u16() {
            400 | 404 | 422 => ClientError::Validation(body),
            429 | 502 | 503 | 504 => ClientError::Unavailable(body),
            _ => ClientError::Server(body),
        };
        Err(err)
    }
}
