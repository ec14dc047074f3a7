use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// The current user's session. Created on login, cleared on logout; owned
/// exclusively by the session store. Everything else only reads it.
///
/// The token is secrecy-wrapped: redacted in Debug, zeroized on drop.
#[derive(Clone, Debug)]
pub struct Session {
    pub user_id: UserId,
    pub token: SecretString,
    pub is_authenticated: bool,
}

impl Session {
    pub fn new(user_id: UserId, token: impl Into<String>) -> Self {
        Self {
            user_id,
            token: SecretString::from(token.into()),
            is_authenticated: true,
        }
    }
}

/// Serde shape of the persisted session blob. The secret is exposed only
/// here, at the storage boundary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRecord {
    pub user_id: i64,
    pub token: String,
    pub is_authenticated: bool,
}

impl From<&Session> for SessionRecord {
    fn from(session: &Session) -> Self {
        Self {
            user_id: session.user_id.as_i64(),
            token: session.token.expose_secret().to_owned(),
            is_authenticated: session.is_authenticated,
        }
    }
}

impl From<SessionRecord> for Session {
    fn from(rec: SessionRecord) -> Self {
        Self {
            user_id: UserId::new(rec.user_id),
            token: SecretString::from(rec.token),
            is_authenticated: rec.is_authenticated,
        }
    }
}
