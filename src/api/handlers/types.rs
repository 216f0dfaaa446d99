use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::{AuthKind, AuthStatus},
    session::SessionUser,
};

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("login", &self.login)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub user_id: i64,
    pub login: String,
    pub backend: AuthKind,
    pub status: AuthStatus,
}

/// Authenticated by a backend that also reported a denial status.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeniedResponse {
    pub backend: AuthKind,
    pub status: AuthStatus,
    pub code: u16,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub user: SessionUser,
    pub session_start_at: i64,
    pub last_activity_at: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}
