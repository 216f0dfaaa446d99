//! Session persistence keyed by session id.

use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{sync::Mutex, task::JoinHandle, time::sleep};
use tracing::{debug, warn};

use super::{
    clock::{system_clock, Clock},
    crypto::{generate_session_id, open, seal, SessionKey},
    error::{CryptoFault, SessionInitError},
    state::SessionState,
};

const DEFAULT_MAX_SESSIONS: usize = 10_000;
const DEFAULT_LIFETIME_SECONDS: i64 = 300;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Resume `sid` when it exists and can be read, otherwise hand out a new
    /// id. A new session is not stored until its first `save` or
    /// `regenerate_id`.
    async fn start(
        &self,
        sid: Option<&str>,
        key: Option<&SessionKey>,
    ) -> Result<StartedSession, SessionInitError>;

    async fn save(
        &self,
        sid: &str,
        state: &SessionState,
        key: Option<&SessionKey>,
    ) -> Result<(), CryptoFault>;

    /// Move the session to a new id, keeping its data. The old id stops
    /// resolving.
    async fn regenerate_id(
        &self,
        sid: &str,
        state: &SessionState,
        key: Option<&SessionKey>,
    ) -> Result<String, CryptoFault>;

    async fn destroy(&self, sid: &str);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartedSession {
    pub session_id: String,
    pub state: SessionState,
    pub resumed: bool,
}

#[derive(Clone)]
enum Record {
    Plain(SessionState),
    Sealed(Vec<u8>),
}

struct Entry {
    record: Record,
    /// Unix seconds after which the entry may be swept.
    expires_at: i64,
}

/// In-process session store. Records are sealed when a key is supplied.
///
/// Entries expire `timeout_seconds` after their last write (the default
/// lifetime when the session has none). Expired entries are swept when a new
/// session would not fit and by [`spawn_sweeper`].
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, Entry>>,
    max_sessions: usize,
    default_lifetime: i64,
    clock: Clock,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SESSIONS)
    }
}

impl MemorySessionStore {
    #[must_use]
    pub fn new(max_sessions: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_sessions,
            default_lifetime: DEFAULT_LIFETIME_SECONDS,
            clock: system_clock(),
        }
    }

    /// Lifetime for sessions that carry no timeout of their own.
    #[must_use]
    pub fn with_default_lifetime(mut self, seconds: i64) -> Self {
        self.default_lifetime = seconds;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn contains(&self, sid: &str) -> bool {
        self.entries.lock().await.contains_key(sid)
    }

    /// Drop every entry expired at `now`. Returns how many were removed.
    pub async fn sweep(&self, now: i64) -> usize {
        let mut entries = self.entries.lock().await;
        sweep_expired(&mut entries, now)
    }

    fn entry(
        &self,
        sid: &str,
        state: &SessionState,
        key: Option<&SessionKey>,
    ) -> Result<Entry, CryptoFault> {
        let lifetime = state.timeout_seconds.unwrap_or(self.default_lifetime);
        Ok(Entry {
            record: encode(sid, state, key)?,
            expires_at: (self.clock)().saturating_add(lifetime),
        })
    }
}

/// Sweep `store` every `every` until the task is aborted.
pub fn spawn_sweeper(store: Arc<MemorySessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let every = if every.is_zero() {
            Duration::from_secs(1)
        } else {
            every
        };

        loop {
            sleep(every).await;
            let removed = store.sweep((store.clock)()).await;
            if removed > 0 {
                debug!(removed, "swept expired sessions");
            }
        }
    })
}

fn sweep_expired(entries: &mut HashMap<String, Entry>, now: i64) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| entry.expires_at >= now);
    before - entries.len()
}

fn encode(sid: &str, state: &SessionState, key: Option<&SessionKey>) -> Result<Record, CryptoFault> {
    match key {
        None => Ok(Record::Plain(state.clone())),
        Some(key) => {
            let raw = serde_json::to_vec(state)
                .map_err(|e| CryptoFault(format!("serialize session: {e}")))?;
            seal(key, sid, &raw).map(Record::Sealed)
        }
    }
}

fn decode(sid: &str, record: &Record, key: Option<&SessionKey>) -> Result<SessionState, CryptoFault> {
    match (record, key) {
        (Record::Plain(state), _) => Ok(state.clone()),
        (Record::Sealed(sealed), Some(key)) => {
            let raw = open(key, sid, sealed)?;
            serde_json::from_slice(&raw).map_err(|e| CryptoFault(format!("deserialize session: {e}")))
        }
        (Record::Sealed(_), None) => Err(CryptoFault("sealed session without key".to_string())),
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn start(
        &self,
        sid: Option<&str>,
        key: Option<&SessionKey>,
    ) -> Result<StartedSession, SessionInitError> {
        let now = (self.clock)();
        let mut entries = self.entries.lock().await;

        // Expired records still resume here; the lifecycle decides on the
        // timeout so the client can be told to drop its cookie.
        if let Some(sid) = sid {
            if let Some(entry) = entries.get(sid) {
                match decode(sid, &entry.record, key) {
                    Ok(state) => {
                        return Ok(StartedSession {
                            session_id: sid.to_string(),
                            state,
                            resumed: true,
                        });
                    }
                    Err(err) => {
                        warn!("discarding unreadable session: {err}");
                        entries.remove(sid);
                    }
                }
            }
        }

        if entries.len() >= self.max_sessions && sweep_expired(&mut entries, now) == 0 {
            return Err(SessionInitError::Unavailable(format!(
                "session limit of {} reached",
                self.max_sessions
            )));
        }

        Ok(StartedSession {
            session_id: generate_session_id()?,
            state: SessionState::default(),
            resumed: false,
        })
    }

    async fn save(
        &self,
        sid: &str,
        state: &SessionState,
        key: Option<&SessionKey>,
    ) -> Result<(), CryptoFault> {
        let entry = self.entry(sid, state, key)?;
        self.entries.lock().await.insert(sid.to_string(), entry);
        Ok(())
    }

    async fn regenerate_id(
        &self,
        sid: &str,
        state: &SessionState,
        key: Option<&SessionKey>,
    ) -> Result<String, CryptoFault> {
        let new_sid = generate_session_id().map_err(|e| CryptoFault(e.to_string()))?;
        // Re-seal under the new id before dropping the old record.
        let entry = self.entry(&new_sid, state, key)?;

        let mut entries = self.entries.lock().await;
        entries.remove(sid);
        entries.insert(new_sid.clone(), entry);
        Ok(new_sid)
    }

    async fn destroy(&self, sid: &str) {
        self.entries.lock().await.remove(sid);
    }
}
