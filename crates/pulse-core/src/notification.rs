use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{NotificationId, UserId};

/// Visual weight of a notification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// A notification as held in the local store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub message: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_entity_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Notification record as the REST API returns it. The server names the
/// read flag `isRead`; everything else maps straight across.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerNotification {
    pub id: i64,
    #[serde(default)]
    pub user_id: Option<i64>,
    pub message: String,
    #[serde(rename = "type", default)]
    pub severity: Severity,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub related_entity_id: Option<i64>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<ServerNotification> for Notification {
    fn from(rec: ServerNotification) -> Self {
        Self {
            id: NotificationId::from_raw(rec.id.to_string()),
            user_id: rec.user_id.map(UserId::new),
            message: rec.message,
            severity: rec.severity,
            read: rec.is_read,
            related_entity_id: rec.related_entity_id,
            payload: rec.data,
            created_at: rec.created_at.unwrap_or_else(Utc::now),
        }
    }
}

/// Raw payload of an inbound realtime `notification` event.
///
/// `data` arrives either as structured JSON or as a serialized string that
/// still needs deserializing.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNotification {
    pub message: String,
    #[serde(rename = "type", default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub related_entity_id: Option<i64>,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("malformed data payload: {0}")]
    BadData(#[from] serde_json::Error),
}

impl RawNotification {
    /// Normalize into a storable [`Notification`].
    ///
    /// Missing severity defaults to `info`, `read` starts false, and a
    /// missing id falls back to the delivery timestamp. A string `data`
    /// field that fails to deserialize rejects the whole event; the caller
    /// logs and drops it without touching the store.
    pub fn normalize(self, now: DateTime<Utc>) -> Result<Notification, NormalizeError> {
        let payload = match self.data {
            Some(Value::String(s)) => Some(serde_json::from_str(&s)?),
            other => other,
        };

        let id = match self.id {
            Some(id) => NotificationId::from_raw(id.to_string()),
            None => NotificationId::from_timestamp(now),
        };

        Ok(Notification {
            id,
            user_id: None,
            message: self.message,
            severity: self.severity.unwrap_or_default(),
            read: false,
            related_entity_id: self.related_entity_id,
            payload,
            created_at: now,
        })
    }
}
