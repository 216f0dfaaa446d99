//! Per-request session state machine: timeout, id rotation, login/logout.

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::{
    crypto::SessionKey,
    error::{CryptoFault, SessionInitError},
    state::{SessionSnapshot, SessionState, SessionUser},
    store::SessionStore,
};

/// Seconds between session id rotations for logged-in users.
pub const ROTATION_INTERVAL_SECONDS: i64 = 120;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// First touch; timestamps were initialized.
    Started,
    Active,
    /// The session id was replaced.
    Rotated,
    /// The session was reset. Callers stop handling the request.
    Expired { clear_cookie: bool },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogoutSummary {
    pub inactive_minutes: i64,
    pub total_minutes: i64,
}

pub struct SessionLifecycle {
    store: Arc<dyn SessionStore>,
    key: Option<SessionKey>,
    sid: Option<String>,
    resumed: bool,
    state: SessionState,
}

impl SessionLifecycle {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, key: Option<SessionKey>) -> Self {
        Self {
            store,
            key,
            sid: None,
            resumed: false,
            state: SessionState::default(),
        }
    }

    /// Resume `sid` or open a new session.
    ///
    /// # Errors
    /// Returns [`SessionInitError`] if the store cannot start a session.
    #[instrument(skip_all)]
    pub async fn start(&mut self, sid: Option<&str>) -> Result<(), SessionInitError> {
        let started = self.store.start(sid, self.key.as_ref()).await?;
        self.sid = Some(started.session_id);
        self.resumed = started.resumed;
        self.state = started.state;
        Ok(())
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    /// Whether the session came from an id the client presented.
    #[must_use]
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.key.is_some()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.sid.clone(),
            state: self.state.clone(),
        }
    }

    /// Session lifetime in seconds. An unset session timeout takes the
    /// configured one.
    pub fn lifetime(&mut self, config_timeout: i64) -> i64 {
        *self.state.timeout_seconds.get_or_insert(config_timeout)
    }

    /// Advance the session by one request.
    pub async fn tick(&mut self, now: i64, maintenance: bool, config_timeout: i64) -> TickOutcome {
        let lifetime = self.lifetime(config_timeout);

        if self.state.last_activity_at > 0
            && !maintenance
            && now - self.state.last_activity_at > lifetime
        {
            info!(
                idle_seconds = now - self.state.last_activity_at,
                lifetime, "session timed out"
            );
            return self.expire().await;
        }

        let outcome = if self.state.is_fresh() {
            self.state.sid_rotated_at = now;
            self.state.session_start_at = now;
            TickOutcome::Started
        } else if !maintenance
            && now - self.state.sid_rotated_at > ROTATION_INTERVAL_SECONDS
            && self.state.user_id() > 0
        {
            match self.rotate(now).await {
                Ok(()) => TickOutcome::Rotated,
                Err(err) => {
                    warn!("session rotation failed: {err}");
                    return self.expire().await;
                }
            }
        } else {
            TickOutcome::Active
        };

        self.state.last_activity_at = now;
        self.persist_or_warn().await;
        outcome
    }

    async fn rotate(&mut self, now: i64) -> Result<(), CryptoFault> {
        let Some(old) = self.sid.clone() else {
            return Err(CryptoFault("no session to rotate".to_string()));
        };
        let mut rotated = self.state.clone();
        rotated.sid_rotated_at = now;
        let new_sid = self
            .store
            .regenerate_id(&old, &rotated, self.key.as_ref())
            .await?;
        debug!("session id rotated");
        self.sid = Some(new_sid);
        self.state = rotated;
        Ok(())
    }

    async fn expire(&mut self) -> TickOutcome {
        if let Err(err) = self.restart().await {
            warn!("failed to restart session: {err}");
            self.sid = None;
        }
        TickOutcome::Expired { clear_cookie: true }
    }

    /// Drop the current session and open a new one with fresh state.
    ///
    /// # Errors
    /// Returns [`SessionInitError`] if the store cannot start a session.
    pub async fn restart(&mut self) -> Result<(), SessionInitError> {
        if let Some(sid) = self.sid.take() {
            self.store.destroy(&sid).await;
        }
        self.state = SessionState::default();
        self.resumed = false;
        self.start(None).await
    }

    /// Establish an authenticated session for `user`.
    ///
    /// # Errors
    /// Returns [`CryptoFault`] if the session cannot be stored.
    pub async fn login(&mut self, user: SessionUser, now: i64) -> Result<(), CryptoFault> {
        info!(user_id = user.id, login = %user.login, "session login");
        self.state.logged_in = true;
        self.state.auth_completed = true;
        self.state.user = Some(user);
        self.state.last_activity_at = now;
        if self.state.session_start_at == 0 {
            self.state.session_start_at = now;
        }
        // Rotate on privilege change.
        self.rotate(now).await
    }

    /// Destroy the session and report how long it lived.
    pub async fn logout(&mut self, now: i64) -> LogoutSummary {
        let summary = LogoutSummary {
            inactive_minutes: minutes_since(self.state.last_activity_at, now),
            total_minutes: minutes_since(self.state.session_start_at, now),
        };
        info!(
            user_id = self.state.user_id(),
            inactive_minutes = summary.inactive_minutes,
            total_minutes = summary.total_minutes,
            "session logout"
        );
        if let Some(sid) = self.sid.take() {
            self.store.destroy(&sid).await;
        }
        self.state = SessionState::default();
        self.resumed = false;
        summary
    }

    /// Drop a session the client was never handed an id for. Sessions
    /// resumed from a presented id are left alone.
    pub async fn abandon(&mut self) {
        if self.resumed {
            return;
        }
        if let Some(sid) = self.sid.take() {
            self.store.destroy(&sid).await;
        }
    }

    pub fn reset_account_acl(&mut self) {
        self.state.account_acl.clear();
    }

    /// Write the current state back to the store.
    ///
    /// # Errors
    /// Returns [`CryptoFault`] if the record cannot be sealed.
    pub async fn persist(&self) -> Result<(), CryptoFault> {
        match &self.sid {
            Some(sid) => self.store.save(sid, &self.state, self.key.as_ref()).await,
            None => Ok(()),
        }
    }

    async fn persist_or_warn(&self) {
        if let Err(err) = self.persist().await {
            warn!("failed to persist session: {err}");
        }
    }
}

fn minutes_since(start: i64, now: i64) -> i64 {
    if start <= 0 {
        0
    } else {
        (now - start).max(0) / 60
    }
}
