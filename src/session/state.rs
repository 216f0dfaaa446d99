//! Per-session state. Timestamps are unix seconds; `0` means unset.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SessionUser {
    pub id: i64,
    pub login: String,
    pub federated_login: Option<String>,
    pub profile_id: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub logged_in: bool,
    pub user: Option<SessionUser>,
    pub last_activity_at: i64,
    pub session_start_at: i64,
    pub sid_rotated_at: i64,
    pub timeout_seconds: Option<i64>,
    pub auth_completed: bool,
    /// Cached account grants; dropped when the page is reloaded.
    pub account_acl: Vec<i64>,
}

impl SessionState {
    /// Id of the logged-in user, or 0.
    #[must_use]
    pub fn user_id(&self) -> i64 {
        self.user.as_ref().map_or(0, |user| user.id)
    }

    /// No identifier has been issued for this session yet.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.sid_rotated_at == 0
    }
}

/// Read-only copy of a session handed to code outside the lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session_id: Option<String>,
    pub state: SessionState,
}

impl SessionSnapshot {
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.state.logged_in
    }

    #[must_use]
    pub fn user(&self) -> Option<&SessionUser> {
        self.state.user.as_ref()
    }
}
