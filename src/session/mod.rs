//! Session lifecycle: storage, optional record encryption, idle timeout and
//! periodic id rotation.

pub mod clock;
pub mod crypto;
pub mod error;
pub mod lifecycle;
pub mod state;
pub mod store;

pub use clock::{system_clock, Clock};
pub use crypto::SessionKey;
pub use error::{CryptoFault, SessionInitError};
pub use lifecycle::{LogoutSummary, SessionLifecycle, TickOutcome, ROTATION_INTERVAL_SECONDS};
pub use state::{SessionSnapshot, SessionState, SessionUser};
pub use store::{spawn_sweeper, MemorySessionStore, SessionStore, StartedSession};
