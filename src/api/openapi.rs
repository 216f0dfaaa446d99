use utoipa::OpenApi;

use super::handlers::{health, login, session, types};
use crate::{
    auth::{AuthKind, AuthStatus},
    session::SessionUser,
};

#[derive(OpenApi)]
#[openapi(
    paths(health::health, login::login, session::session, session::logout),
    components(schemas(
        types::LoginRequest,
        types::LoginResponse,
        types::DeniedResponse,
        types::SessionResponse,
        types::ErrorResponse,
        AuthKind,
        AuthStatus,
        SessionUser
    )),
    tags(
        (name = "health", description = "Service status"),
        (name = "auth", description = "Login, session and logout")
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.title = env!("CARGO_PKG_NAME").to_string();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_auth_routes() {
        let doc = openapi();
        for path in ["/health", "/v1/auth/login", "/v1/auth/session", "/v1/auth/logout"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        assert_eq!(doc.info.title, env!("CARGO_PKG_NAME"));
    }
}
