use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use pulse_core::ServerNotification;

use crate::error::SyncError;

/// The two REST operations this subsystem consumes. Behind a trait so the
/// controller can be exercised without a live server.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    async fn fetch_notifications(&self) -> Result<Vec<ServerNotification>, SyncError>;
    async fn mark_all_read(&self) -> Result<(), SyncError>;
}

/// reqwest-backed API client with bearer auth.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: SecretString,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: SecretString) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self {
            http: reqwest::Client::new(),
            base_url,
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl NotificationApi for ApiClient {
    async fn fetch_notifications(&self) -> Result<Vec<ServerNotification>, SyncError> {
        let resp = self
            .http
            .get(self.url("/api/notifications"))
            .bearer_auth(self.token.expose_secret())
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SyncError::Status {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        let list: Vec<ServerNotification> = resp.json().await?;
        debug!(count = list.len(), "fetched notifications");
        Ok(list)
    }

    async fn mark_all_read(&self) -> Result<(), SyncError> {
        let resp = self
            .http
            .put(self.url("/api/notifications/read"))
            .bearer_auth(self.token.expose_secret())
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SyncError::Status {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_path() {
        let api = ApiClient::new("http://localhost:4000", SecretString::from("t"));
        assert_eq!(api.url("/api/notifications"), "http://localhost:4000/api/notifications");
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let api = ApiClient::new("http://localhost:4000/", SecretString::from("t"));
        assert_eq!(
            api.url("/api/notifications/read"),
            "http://localhost:4000/api/notifications/read"
        );
    }
}
