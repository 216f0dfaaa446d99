//! Shared state handed to every handler.

use axum::http::HeaderName;
use std::sync::Arc;

use crate::{
    auth::{AuthDispatcher, CredentialStore, ResolutionPolicy, SsoProvisioner},
    gate::RequestGate,
    session::{system_clock, Clock, SessionKey, SessionLifecycle, SessionStore},
};

pub const DEFAULT_SERVER_USER_HEADER: &str = "x-remote-user";

pub struct AppState {
    gate: RequestGate,
    dispatcher: AuthDispatcher,
    sessions: Arc<dyn SessionStore>,
    session_key: Option<SessionKey>,
    policy: ResolutionPolicy,
    server_user_header: HeaderName,
    credentials: Option<Arc<dyn CredentialStore>>,
    sso: Option<SsoProvisioner>,
    cookie_secure: bool,
    clock: Clock,
}

impl AppState {
    #[must_use]
    pub fn new(gate: RequestGate, dispatcher: AuthDispatcher, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            gate,
            dispatcher,
            sessions,
            session_key: None,
            policy: ResolutionPolicy::default(),
            server_user_header: HeaderName::from_static(DEFAULT_SERVER_USER_HEADER),
            credentials: None,
            sso: None,
            cookie_secure: false,
            clock: system_clock(),
        }
    }

    /// Key used when the configuration asks for encrypted sessions.
    #[must_use]
    pub fn with_session_key(mut self, key: SessionKey) -> Self {
        self.session_key = Some(key);
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ResolutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_server_user_header(mut self, header: HeaderName) -> Self {
        self.server_user_header = header;
        self
    }

    /// Used to resolve user ids for backends that do not report one.
    #[must_use]
    pub fn with_credentials(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(store);
        self
    }

    #[must_use]
    pub fn with_sso(mut self, provisioner: SsoProvisioner) -> Self {
        self.sso = Some(provisioner);
        self
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub(crate) fn now(&self) -> i64 {
        (self.clock)()
    }

    pub(crate) fn gate(&self) -> &RequestGate {
        &self.gate
    }

    pub(crate) fn dispatcher(&self) -> &AuthDispatcher {
        &self.dispatcher
    }

    pub(crate) fn policy(&self) -> ResolutionPolicy {
        self.policy
    }

    pub(crate) fn server_user_header(&self) -> &HeaderName {
        &self.server_user_header
    }

    pub(crate) fn credentials(&self) -> Option<&Arc<dyn CredentialStore>> {
        self.credentials.as_ref()
    }

    pub(crate) fn sso(&self) -> Option<&SsoProvisioner> {
        self.sso.as_ref()
    }

    pub(crate) fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }

    /// A lifecycle for one request. Records are sealed only when the
    /// configuration enables session encryption and a key is available.
    pub(crate) fn lifecycle(&self) -> SessionLifecycle {
        let key = if self.gate.config().data().encrypt_session {
            self.session_key.clone()
        } else {
            None
        };
        SessionLifecycle::new(self.sessions.clone(), key)
    }
}
