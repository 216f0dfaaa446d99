use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{
    session::{admit, session_headers, settle, Admitted},
    types::{DeniedResponse, ErrorResponse, LoginRequest, LoginResponse},
};
use crate::{
    api::state::AppState,
    auth::{AuthError, AuthOutcome, ClientContext, Credential, OutcomeDetail, SsoProvision},
    session::SessionUser,
};

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated; session cookie set", body = LoginResponse),
        (status = 401, description = "No backend granted access"),
        (status = 403, description = "Account expired or outside the required group", body = DeniedResponse),
        (status = 500, description = "Authentication backend failure", body = ErrorResponse),
        (status = 503, description = "Maintenance", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    uri: Uri,
    state: Extension<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> impl IntoResponse {
    let (mut lifecycle, gate_request, context) = match admit(&state, &headers, &uri).await {
        Admitted::Proceed {
            lifecycle,
            request,
            context,
            ..
        } => (lifecycle, request, context),
        Admitted::Respond(response) => return response,
    };

    let client = ClientContext {
        server_user: gate_request.server_user.clone(),
        user_agent: headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string),
        ..ClientContext::default()
    };
    let credential = Credential::new(request.login, request.password).with_client(client);

    let presented = gate_request.session_id.as_deref();
    let secure = state.cookie_secure();

    let results = match state.dispatcher().run_all(&credential).await {
        Ok(results) => results,
        Err(err) => return settle(lifecycle, presented, secure, fault_response(&err)).await,
    };

    let Some(outcome) = results.resolve(state.policy()) else {
        let response = if let Some(denied) = results.denial() {
            info!(
                backend = denied.kind().name(),
                code = denied.status.code(),
                "login denied by status"
            );
            let body = DeniedResponse {
                backend: denied.kind(),
                status: denied.status,
                code: denied.status.code(),
            };
            (StatusCode::FORBIDDEN, Json(body)).into_response()
        } else {
            info!(outcomes = results.len(), "login rejected");
            StatusCode::UNAUTHORIZED.into_response()
        };
        return settle(lifecycle, presented, secure, response).await;
    };

    let user_id = match resolve_user_id(&state, outcome, &credential).await {
        Ok(Some(user_id)) => user_id,
        Ok(None) => {
            let response = StatusCode::UNAUTHORIZED.into_response();
            return settle(lifecycle, presented, secure, response).await;
        }
        Err(err) => return settle(lifecycle, presented, secure, fault_response(&err)).await,
    };

    let user = SessionUser {
        id: user_id,
        login: credential.login().to_string(),
        federated_login: credential.federated_login().map(ToString::to_string),
        profile_id: 0,
    };
    if let Err(err) = lifecycle.login(user, state.now()).await {
        error!("Failed to establish session: {err}");
        let response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
        return settle(lifecycle, presented, secure, response).await;
    }

    info!(
        user_id,
        backend = outcome.kind().name(),
        web_uri = %context.web_uri,
        "login succeeded"
    );

    let response_headers = session_headers(presented, &lifecycle.snapshot(), secure);
    let body = LoginResponse {
        user_id,
        login: credential.login().to_string(),
        backend: outcome.kind(),
        status: outcome.status,
    };
    (StatusCode::OK, response_headers, Json(body)).into_response()
}

/// User id for a granted outcome. `None` means the user may not log in.
async fn resolve_user_id(
    state: &AppState,
    outcome: &AuthOutcome,
    credential: &Credential,
) -> Result<Option<i64>, AuthError> {
    match outcome.detail {
        // The database backend already refuses disabled users.
        OutcomeDetail::Database {
            user_id: Some(user_id),
            ..
        } => return Ok(Some(user_id)),
        OutcomeDetail::Browser { .. } => {
            if let Some(sso) = state.sso() {
                match sso.provision(credential).await? {
                    SsoProvision::Created {
                        disabled: true,
                        user_id,
                    } => {
                        warn!(user_id, "SSO user created disabled");
                        return Ok(None);
                    }
                    SsoProvision::Created { user_id, .. } => return Ok(Some(user_id)),
                    SsoProvision::Updated => {}
                }
            }
        }
        _ => {}
    }

    let Some(store) = state.credentials() else {
        return Ok(Some(0));
    };
    match store.lookup_credential(credential.login()).await? {
        Some(record) if record.disabled => {
            info!(user_id = record.user_id, "login refused for disabled user");
            Ok(None)
        }
        Some(record) => Ok(Some(record.user_id)),
        None => Ok(Some(0)),
    }
}

fn fault_response(err: &AuthError) -> Response {
    error!("Authentication failed: {err}");
    let body = ErrorResponse {
        error: "authentication backend failure".to_string(),
        hint: None,
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
