pub mod alerts;
pub mod api;
pub mod controller;
pub mod error;
pub mod invalidation;

pub use alerts::{AlertError, AlertSink, LogToast, TerminalBell};
pub use api::{ApiClient, NotificationApi};
pub use controller::SyncController;
pub use error::SyncError;
pub use invalidation::{keys_to_invalidate, QueryCache, StaleMarker};
