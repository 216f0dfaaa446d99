//! Session endpoints and the cookie plumbing shared by the auth handlers.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, COOKIE, LOCATION, RETRY_AFTER, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode, Uri,
    },
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{error, info};

use super::types::{ErrorResponse, SessionResponse};
use crate::{
    api::state::AppState,
    gate::{GateDecision, GateError, GateRequest, RequestContext},
    session::{SessionLifecycle, SessionSnapshot},
};

pub const SESSION_COOKIE_NAME: &str = "syspass_session";

/// Build an `HttpOnly` cookie carrying the session id.
pub(crate) fn session_cookie(sid: &str, secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}={sid}; Path=/; HttpOnly; SameSite=Lax");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn clear_session_cookie(secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn extract_session_id(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(COOKIE)?.to_str().ok()?;
    value.split(';').find_map(|pair| {
        let (key, val) = pair.trim().split_once('=')?;
        (key.trim() == SESSION_COOKIE_NAME && !val.trim().is_empty())
            .then(|| val.trim().to_string())
    })
}

/// Response headers that hand the current session id back to the client when
/// it changed during the request.
pub(crate) fn session_headers(
    presented: Option<&str>,
    snapshot: &SessionSnapshot,
    secure: bool,
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(sid) = snapshot.session_id.as_deref() {
        if presented != Some(sid) {
            if let Ok(cookie) = session_cookie(sid, secure) {
                headers.insert(SET_COOKIE, cookie);
            }
        }
    }
    headers
}

/// Finish a request whose own work failed. A session the client never saw
/// is dropped; a kept session whose id rotated is handed back.
pub(crate) async fn settle(
    mut lifecycle: SessionLifecycle,
    presented: Option<&str>,
    secure: bool,
    response: Response,
) -> Response {
    lifecycle.abandon().await;
    let headers = session_headers(presented, &lifecycle.snapshot(), secure);
    (headers, response).into_response()
}

pub(crate) fn gate_error_response(err: &GateError, secure: bool) -> Response {
    let status = err.status();
    if status.is_server_error() && !matches!(err, GateError::Maintenance) {
        error!("request gate failed: {err}");
    } else {
        info!("request gate refused: {err}");
    }

    let mut headers = HeaderMap::new();
    if let Some(seconds) = err.retry_after() {
        headers.insert(RETRY_AFTER, HeaderValue::from(seconds));
    }
    if matches!(err, GateError::Logout) {
        if let Ok(cookie) = clear_session_cookie(secure) {
            headers.insert(SET_COOKIE, cookie);
        }
    }

    let hint = match err {
        GateError::Initialization { hint, .. } => hint.clone(),
        GateError::Maintenance => Some("The application will be available shortly".to_string()),
        _ => None,
    };
    let body = ErrorResponse {
        error: err.to_string(),
        hint,
    };
    (status, headers, Json(body)).into_response()
}

/// Outcome of running the gate inside a handler.
pub(crate) enum Admitted {
    Proceed {
        lifecycle: SessionLifecycle,
        snapshot: SessionSnapshot,
        request: GateRequest,
        context: RequestContext,
    },
    Respond(Response),
}

/// Run the request gate and turn any short-circuit into a response.
pub(crate) async fn admit(state: &AppState, headers: &HeaderMap, uri: &Uri) -> Admitted {
    let mut headers = headers.clone();
    crate::gate::headers::normalize_authorization(&mut headers);

    let request = GateRequest::from_parts(
        &headers,
        uri,
        extract_session_id(&headers),
        state.server_user_header(),
    );
    let mut lifecycle = state.lifecycle();
    let secure = state.cookie_secure();

    let decision = state
        .gate()
        .admit(&request, &mut lifecycle, state.now())
        .await;
    if !matches!(decision, Ok(GateDecision::Proceed { .. })) {
        lifecycle.abandon().await;
    }

    match decision {
        Ok(GateDecision::Proceed { session, context }) => Admitted::Proceed {
            lifecycle,
            snapshot: session,
            request,
            context,
        },
        Ok(GateDecision::Redirect(location)) => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(&location) {
                headers.insert(LOCATION, value);
            }
            Admitted::Respond((StatusCode::SEE_OTHER, headers).into_response())
        }
        Ok(GateDecision::SessionExpired { clear_cookie }) => {
            let mut headers = HeaderMap::new();
            if clear_cookie {
                if let Ok(cookie) = clear_session_cookie(secure) {
                    headers.insert(SET_COOKIE, cookie);
                }
            }
            Admitted::Respond((StatusCode::UNAUTHORIZED, headers).into_response())
        }
        Err(err) => Admitted::Respond(gate_error_response(&err, secure)),
    }
}

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 204, description = "No logged-in user"),
        (status = 401, description = "Session expired"),
        (status = 503, description = "Maintenance", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    uri: Uri,
    state: Extension<Arc<AppState>>,
) -> impl IntoResponse {
    let (snapshot, request) = match admit(&state, &headers, &uri).await {
        Admitted::Proceed {
            snapshot, request, ..
        } => (snapshot, request),
        Admitted::Respond(response) => return response,
    };

    let response_headers = session_headers(
        request.session_id.as_deref(),
        &snapshot,
        state.cookie_secure(),
    );

    match snapshot.user() {
        Some(user) if snapshot.is_logged_in() => {
            let body = SessionResponse {
                user: user.clone(),
                session_start_at: snapshot.state.session_start_at,
                last_activity_at: snapshot.state.last_activity_at,
            };
            (StatusCode::OK, response_headers, Json(body)).into_response()
        }
        _ => (StatusCode::NO_CONTENT, response_headers).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(headers: HeaderMap, state: Extension<Arc<AppState>>) -> impl IntoResponse {
    if let Some(sid) = extract_session_id(&headers) {
        let mut lifecycle = state.lifecycle();
        match lifecycle.start(Some(&sid)).await {
            Ok(()) => {
                lifecycle.logout(state.now()).await;
            }
            Err(err) => error!("Failed to start session for logout: {err}"),
        }
    }

    // Always clear the cookie, even if the session was already gone.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(state.cookie_secure()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}
