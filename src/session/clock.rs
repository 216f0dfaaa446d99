use std::sync::Arc;

/// Source of unix seconds, shared by the session store and the handlers.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

#[must_use]
pub fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp())
}
