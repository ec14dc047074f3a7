//! The one place realtime events become store mutations and cache
//! invalidations. Active only while a session exists; the shared channel
//! itself is never closed here, other consumers may still need it.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use pulse_channel::{ChannelStatus, RealtimeChannel, Subscription};
use pulse_core::events::{event, DataUpdate};
use pulse_core::{Notification, RawNotification};
use pulse_store::{NotificationStore, SessionStore};

use crate::alerts::{run_sinks, AlertSink};
use crate::api::NotificationApi;
use crate::error::SyncError;
use crate::invalidation::{keys_to_invalidate, QueryCache};

/// Live resources of one activation: released together, exactly once.
struct Active {
    notification_sub: Subscription,
    data_update_sub: Subscription,
    announcer: tokio::task::JoinHandle<()>,
}

pub struct SyncController {
    channel: Arc<RealtimeChannel>,
    notifications: Arc<NotificationStore>,
    sessions: Arc<SessionStore>,
    api: Arc<dyn NotificationApi>,
    cache: Arc<dyn QueryCache>,
    alerts: Vec<Arc<dyn AlertSink>>,
    active: parking_lot::Mutex<Option<Active>>,
}

impl SyncController {
    pub fn new(
        channel: Arc<RealtimeChannel>,
        notifications: Arc<NotificationStore>,
        sessions: Arc<SessionStore>,
        api: Arc<dyn NotificationApi>,
        cache: Arc<dyn QueryCache>,
        alerts: Vec<Arc<dyn AlertSink>>,
    ) -> Self {
        Self {
            channel,
            notifications,
            sessions,
            api,
            cache,
            alerts,
            active: parking_lot::Mutex::new(None),
        }
    }

    /// Bring the controller up for the current session: connect the shared
    /// channel, announce identity, register both event handlers, seed the
    /// store with a bulk fetch.
    ///
    /// Idempotent: with no session, or when already active, nothing
    /// happens — repeated activation never registers duplicate handlers.
    pub fn activate(&self) {
        let Some(session) = self.sessions.current().filter(|s| s.is_authenticated) else {
            debug!("no session, sync controller stays inactive");
            return;
        };

        let mut active = self.active.lock();
        if active.is_some() {
            debug!("sync controller already active");
            return;
        }

        self.channel.connect();
        if let Err(e) = self.channel.announce(session.user_id) {
            warn!(error = %e, "initial announce not queued");
        }

        let notification_sub = self.channel.subscribe(event::NOTIFICATION, {
            let notifications = Arc::clone(&self.notifications);
            let alerts = self.alerts.clone();
            move |data| handle_notification(&notifications, &alerts, data)
        });

        let data_update_sub = self.channel.subscribe(event::DATA_UPDATE, {
            let cache = Arc::clone(&self.cache);
            move |data| handle_data_update(cache.as_ref(), data)
        });

        // The channel never re-announces by itself; do it on every
        // Connected edge so reconnects keep targeted delivery working.
        let announcer = tokio::spawn({
            let channel = Arc::clone(&self.channel);
            let mut status = self.channel.status_watch();
            let user_id = session.user_id;
            async move {
                while status.changed().await.is_ok() {
                    if *status.borrow_and_update() == ChannelStatus::Connected {
                        if let Err(e) = channel.announce(user_id) {
                            warn!(error = %e, "re-announce after reconnect failed");
                        }
                    }
                }
            }
        });

        // Seed the store. Replace semantics: a realtime notification that
        // arrives before this resolves is discarded by the replace.
        tokio::spawn({
            let api = Arc::clone(&self.api);
            let notifications = Arc::clone(&self.notifications);
            async move {
                if let Err(e) = refresh_into(api.as_ref(), &notifications).await {
                    warn!(error = %e, "initial notification fetch failed");
                }
            }
        });

        *active = Some(Active {
            notification_sub,
            data_update_sub,
            announcer,
        });
        info!(user_id = %session.user_id, "sync controller activated");
    }

    /// Release both handlers and the re-announce watcher. The shared
    /// channel stays open. Paired 1:1 with [`activate`](Self::activate).
    pub fn deactivate(&self) {
        let Some(active) = self.active.lock().take() else {
            return;
        };
        self.channel.unsubscribe(&active.notification_sub);
        self.channel.unsubscribe(&active.data_update_sub);
        active.announcer.abort();
        info!("sync controller deactivated");
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Bulk fetch: replace the store's list wholesale with the server's.
    /// On failure the store keeps its last-known-good state.
    pub async fn refresh(&self) -> Result<(), SyncError> {
        refresh_into(self.api.as_ref(), &self.notifications).await
    }

    /// Mark everything read, server first. Only a successful server call
    /// mutates local state; failure is logged and the store is untouched.
    pub async fn mark_all_read(&self) {
        match self.api.mark_all_read().await {
            Ok(()) => self.notifications.apply_all_read(),
            Err(e) => warn!(error = %e, "mark all read failed, keeping local state"),
        }
    }
}

async fn refresh_into(
    api: &dyn NotificationApi,
    notifications: &NotificationStore,
) -> Result<(), SyncError> {
    let list = api.fetch_notifications().await?;
    notifications.set_all(list.into_iter().map(Notification::from).collect());
    Ok(())
}

/// Inbound `notification` event: normalize, store, alert. Malformed
/// payloads are dropped and logged; the store is never touched for them.
fn handle_notification(
    store: &NotificationStore,
    alerts: &[Arc<dyn AlertSink>],
    data: Value,
) {
    let raw: RawNotification = match serde_json::from_value(data) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "malformed notification event dropped");
            return;
        }
    };

    let notification = match raw.normalize(Utc::now()) {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "notification event rejected");
            return;
        }
    };

    store.add_one(notification.clone());
    run_sinks(alerts, &notification);
}

/// Inbound `dataUpdate` event: map the subject tag to cache keys and
/// invalidate each. A missing or empty subject is a no-op.
fn handle_data_update(cache: &dyn QueryCache, data: Value) {
    let update: DataUpdate = match serde_json::from_value(data) {
        Ok(u) => u,
        Err(e) => {
            debug!(error = %e, "malformed dataUpdate event dropped");
            return;
        }
    };
    let Some(subject) = update.subject_type else {
        return;
    };
    for key in keys_to_invalidate(&subject) {
        cache.invalidate(&key);
    }
}
