//! Login, session and logout through the HTTP router with in-memory backends.

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, Response, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};
use syspass::{
    api::{self, AppState, SESSION_COOKIE_NAME},
    auth::{
        hash::hash_key, AuthDispatcher, AuthError, Backends, CredentialRecord, CredentialStore,
        SsoDirectory, SsoProvisioner, SsoUser,
    },
    config::{ConfigData, FileConfigSource},
    gate::RequestGate,
    session::{Clock, MemorySessionStore},
};
use tokio::sync::Mutex;
use tower::ServiceExt;

const T0: i64 = 1_700_000_000;

/// Users table shared by the database backend and SSO provisioning.
#[derive(Default)]
struct Users {
    records: Mutex<HashMap<String, CredentialRecord>>,
}

impl Users {
    fn with_user(user_id: i64, login: &str, password: &str) -> Result<Self> {
        let record = CredentialRecord {
            user_id,
            login: login.to_string(),
            hash: hash_key(password)?,
            salt: None,
            disabled: false,
        };
        let mut records = HashMap::new();
        records.insert(login.to_lowercase(), record);
        Ok(Self {
            records: Mutex::new(records),
        })
    }
}

#[async_trait]
impl CredentialStore for Users {
    async fn lookup_credential(&self, login: &str) -> Result<Option<CredentialRecord>, AuthError> {
        Ok(self.records.lock().await.get(&login.to_lowercase()).cloned())
    }

    async fn update_credential_hash(&self, _login: &str, _new_hash: &str) -> Result<(), AuthError> {
        Ok(())
    }
}

#[async_trait]
impl SsoDirectory for Users {
    async fn sso_user_exists(&self, login: &str) -> Result<bool, AuthError> {
        Ok(self.records.lock().await.contains_key(&login.to_lowercase()))
    }

    async fn insert_sso_user(&self, user: &SsoUser, hash: &str) -> Result<i64, AuthError> {
        let mut records = self.records.lock().await;
        let user_id = i64::try_from(records.len()).unwrap_or(i64::MAX) + 100;
        records.insert(
            user.login.to_lowercase(),
            CredentialRecord {
                user_id,
                login: user.login.clone(),
                hash: hash.to_string(),
                salt: None,
                disabled: user.disabled,
            },
        );
        Ok(user_id)
    }

    async fn update_on_login(&self, login: &str, hash: &str) -> Result<(), AuthError> {
        if let Some(record) = self.records.lock().await.get_mut(&login.to_lowercase()) {
            record.hash = hash.to_string();
        }
        Ok(())
    }
}

struct Harness {
    router: Router,
    sessions: Arc<MemorySessionStore>,
    users: Arc<Users>,
    now: Arc<AtomicI64>,
}

impl Harness {
    fn new(data: ConfigData, max_sessions: usize) -> Result<Self> {
        let now = Arc::new(AtomicI64::new(T0));
        let clock: Clock = {
            let now = now.clone();
            Arc::new(move || now.load(Ordering::SeqCst))
        };

        let users = Arc::new(Users::with_user(7, "alice", "correct horse")?);
        let credentials: Arc<dyn CredentialStore> = users.clone();
        let sessions = Arc::new(MemorySessionStore::new(max_sessions).with_clock(clock.clone()));

        let config = Arc::new(FileConfigSource::from_data(data));
        let dispatcher = AuthDispatcher::from_config(
            config.as_ref(),
            Backends::default().with_credentials(credentials.clone()),
        )?;
        let state = AppState::new(RequestGate::new(config), dispatcher, sessions.clone())
            .with_credentials(credentials)
            .with_sso(SsoProvisioner::new(users.clone(), 0, 0))
            .with_clock(clock);

        Ok(Self {
            router: api::router(Arc::new(state)),
            sessions,
            users,
            now,
        })
    }

    async fn send(&self, request: Request<Body>) -> Result<Response<Body>> {
        Ok(self.router.clone().oneshot(request).await?)
    }

    fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

fn app(data: ConfigData) -> Result<Router> {
    Ok(Harness::new(data, 10_000)?.router)
}

fn installed() -> ConfigData {
    ConfigData {
        installed: true,
        ..ConfigData::default()
    }
}

fn login_request(login: &str, password: &str) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method("POST")
        .uri("/v1/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "login": login, "password": password }).to_string(),
        ))?)
}

fn with_cookie(method: &str, uri: &str, sid: &str) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, format!("{SESSION_COOKIE_NAME}={sid}"))
        .body(Body::empty())?)
}

fn sso_login_request(login: &str, password: &str) -> Result<Request<Body>> {
    let mut request = login_request(login, password)?;
    request
        .headers_mut()
        .insert("x-remote-user", login.parse()?);
    Ok(request)
}

fn get(uri: &str) -> Result<Request<Body>> {
    Ok(Request::builder().uri(uri).body(Body::empty())?)
}

fn set_cookie(response: &Response<Body>) -> Option<&str> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
}

fn session_id(response: &Response<Body>) -> Option<String> {
    let cookie = response.headers().get(header::SET_COOKIE)?.to_str().ok()?;
    let (pair, _) = cookie.split_once(';')?;
    let (name, value) = pair.split_once('=')?;
    (name == SESSION_COOKIE_NAME && !value.is_empty()).then(|| value.to_string())
}

async fn json_body(response: Response<Body>) -> Result<Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[tokio::test]
async fn login_session_logout() -> Result<()> {
    let app = app(installed())?;

    let response = app
        .clone()
        .oneshot(login_request("alice", "correct horse")?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let sid = session_id(&response).context("login must set the session cookie")?;
    let body = json_body(response).await?;
    assert_eq!(body["user_id"], 7);
    assert_eq!(body["backend"], "database");

    let response = app
        .clone()
        .oneshot(with_cookie("GET", "/v1/auth/session", &sid)?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["user"]["login"], "alice");
    assert_eq!(body["user"]["id"], 7);

    let response = app
        .clone()
        .oneshot(with_cookie("POST", "/v1/auth/logout", &sid)?)
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cleared = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    assert!(cleared.contains("Max-Age=0"));

    // The old id no longer resolves; a fresh anonymous session is issued.
    let response = app
        .oneshot(with_cookie("GET", "/v1/auth/session", &sid)?)
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let fresh = session_id(&response).context("a new session id is issued")?;
    assert_ne!(fresh, sid);
    Ok(())
}

#[tokio::test]
async fn wrong_password_is_unauthorized() -> Result<()> {
    let harness = Harness::new(installed(), 10_000)?;

    let response = harness.send(login_request("alice", "wrong")?).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(session_id(&response).is_none());
    assert!(harness.sessions.is_empty().await);
    Ok(())
}

#[tokio::test]
async fn failed_logins_do_not_fill_the_session_store() -> Result<()> {
    let harness = Harness::new(installed(), 3)?;

    for _ in 0..5 {
        let response = harness.send(login_request("alice", "wrong")?).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(set_cookie(&response).is_none());
    }
    assert!(harness.sessions.is_empty().await);

    let response = harness
        .send(login_request("alice", "correct horse")?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let sid = session_id(&response).context("login must set the session cookie")?;
    assert_eq!(harness.sessions.len().await, 1);
    assert!(harness.sessions.contains(&sid).await);
    Ok(())
}

#[tokio::test]
async fn full_store_recovers_once_sessions_expire() -> Result<()> {
    let harness = Harness::new(installed(), 2)?;

    for _ in 0..2 {
        let response = harness.send(get("/v1/auth/session")?).await?;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(session_id(&response).is_some());
    }
    let response = harness
        .send(login_request("alice", "correct horse")?)
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    harness.advance(301);
    let response = harness
        .send(login_request("alice", "correct horse")?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(harness.sessions.len().await, 1);
    Ok(())
}

#[tokio::test]
async fn disabled_sso_user_is_refused_on_every_login() -> Result<()> {
    let harness = Harness::new(
        ConfigData {
            auth_basic_enabled: true,
            ..installed()
        },
        10_000,
    )?;

    let first = harness.send(sso_login_request("carol", "pw")?).await?;
    assert_eq!(first.status(), StatusCode::UNAUTHORIZED);
    assert!(session_id(&first).is_none());

    let provisioned = harness
        .users
        .lookup_credential("carol")
        .await?
        .context("carol is provisioned on first login")?;
    assert!(provisioned.disabled);

    let second = harness.send(sso_login_request("carol", "pw")?).await?;
    assert_eq!(second.status(), StatusCode::UNAUTHORIZED);
    assert!(session_id(&second).is_none());
    assert!(harness.sessions.is_empty().await);
    Ok(())
}

#[tokio::test]
async fn idle_session_expires_and_clears_cookie() -> Result<()> {
    let harness = Harness::new(installed(), 10_000)?;

    let response = harness
        .send(login_request("alice", "correct horse")?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let mut sid = session_id(&response).context("login must set the session cookie")?;

    harness.advance(200);
    let response = harness
        .send(with_cookie("GET", "/v1/auth/session", &sid)?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    // The id rotates after two minutes.
    if let Some(rotated) = session_id(&response) {
        sid = rotated;
    }

    harness.advance(301);
    let response = harness
        .send(with_cookie("GET", "/v1/auth/session", &sid)?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookie(&response).is_some_and(|cookie| cookie.contains("Max-Age=0")));
    assert!(harness.sessions.is_empty().await);

    // Without a live id there is nothing to clear: a new session is issued.
    let response = harness.send(get("/v1/auth/session")?).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cookie = set_cookie(&response).context("a new session cookie is issued")?;
    assert!(!cookie.contains("Max-Age=0"));
    Ok(())
}

#[tokio::test]
async fn not_installed_redirects_to_installer() -> Result<()> {
    let app = app(ConfigData::default())?;

    let response = app.oneshot(login_request("alice", "correct horse")?).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok()),
        Some("index.php?r=install/index")
    );
    Ok(())
}

#[tokio::test]
async fn maintenance_answers_service_unavailable() -> Result<()> {
    let app = app(ConfigData {
        installed: true,
        maintenance: true,
        ..ConfigData::default()
    })?;

    let response = app.oneshot(login_request("alice", "correct horse")?).await?;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok()),
        Some("120")
    );
    Ok(())
}

#[tokio::test]
async fn health_reports_name() -> Result<()> {
    let app = app(installed())?;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["name"], env!("CARGO_PKG_NAME"));
    Ok(())
}
