//! Authentication backends and the dispatcher that runs them.
//!
//! ## Dispatch
//!
//! Backends are registered once, in order: browser (when basic auth is
//! enabled), directory (when the directory is enabled), then database. Every
//! enabled backend runs on each login attempt, strictly one after another.
//!
//! - **No opinion:** a backend that cannot judge the attempt is left out.
//! - **Rejection:** an outcome with `authenticated == false` or a denial status.
//! - **Fault:** aborts the whole dispatch and propagates to the caller.
//!
//! ## Directory quirk
//!
//! A successful directory bind sets `authenticated = true` even when the
//! account is expired (`701`) or outside the required group (`702`). Callers
//! must check the status; [`AuthResults::resolve`] does.

pub mod browser;
pub mod credential;
pub mod database;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod hash;
pub mod outcome;
pub mod sso;

pub use browser::{check_server_auth_user, BrowserAuthenticator};
pub use credential::{ClientContext, Credential};
pub use database::{CredentialRecord, CredentialStore, DatabaseAuthenticator};
pub use directory::{DirectoryAuthenticator, DirectoryBind, DirectoryService, HttpDirectory};
pub use dispatcher::{AuthDispatcher, Authenticator, Backends};
pub use error::{AuthError, ConfigError};
pub use outcome::{AuthKind, AuthOutcome, AuthResults, AuthStatus, OutcomeDetail, ResolutionPolicy};
pub use sso::{SsoDirectory, SsoProvision, SsoProvisioner, SsoUser};
