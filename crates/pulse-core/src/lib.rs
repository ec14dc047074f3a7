pub mod events;
pub mod ids;
pub mod notification;
pub mod session;

pub use ids::{NotificationId, UserId};
pub use notification::{Notification, NormalizeError, RawNotification, ServerNotification, Severity};
pub use session::{Session, SessionRecord};
