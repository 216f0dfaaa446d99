//! Authentication outcomes and the policies used to combine them.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Backend that produced an outcome.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    Browser,
    Directory,
    Database,
}

impl AuthKind {
    /// Registry key for this backend.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Browser => "browser",
            Self::Directory => "directory",
            Self::Database => "database",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "browser" => Some(Self::Browser),
            "directory" => Some(Self::Directory),
            "database" => Some(Self::Database),
            _ => None,
        }
    }
}

/// Fine-grained status attached to an outcome.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    #[default]
    Ok,
    /// Directory account is locked or expired.
    Expired,
    /// Directory account is not a member of the required group.
    NotInGroup,
}

impl AuthStatus {
    /// Numeric code exposed to the web layer.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Ok => 0,
            Self::Expired => 701,
            Self::NotInGroup => 702,
        }
    }
}

/// Backend-specific attributes of an outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutcomeDetail {
    Browser { server_user: String },
    Directory { expire: i64, in_group: bool },
    Database { user_id: Option<i64>, migrated: bool },
}

/// Result of one authenticator's attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthOutcome {
    pub authenticated: bool,
    pub status: AuthStatus,
    pub detail: OutcomeDetail,
}

impl AuthOutcome {
    #[must_use]
    pub fn kind(&self) -> AuthKind {
        match self.detail {
            OutcomeDetail::Browser { .. } => AuthKind::Browser,
            OutcomeDetail::Directory { .. } => AuthKind::Directory,
            OutcomeDetail::Database { .. } => AuthKind::Database,
        }
    }

    /// Authenticated with no denial status.
    #[must_use]
    pub fn is_granted(&self) -> bool {
        self.authenticated && self.status == AuthStatus::Ok
    }
}

/// How a caller combines several outcomes into one decision.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ResolutionPolicy {
    /// The first granted outcome wins.
    #[default]
    FirstSuccess,
    /// Every outcome must be granted; the first one is returned.
    Unanimous,
}

impl std::str::FromStr for ResolutionPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "first" | "first-success" => Ok(Self::FirstSuccess),
            "unanimous" | "all" => Ok(Self::Unanimous),
            other => Err(format!("invalid auth policy: {other}")),
        }
    }
}

/// Ordered outcomes of one dispatch. Empty means denied by all.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthResults {
    outcomes: Vec<AuthOutcome>,
}

impl AuthResults {
    pub(crate) fn push(&mut self, outcome: AuthOutcome) {
        self.outcomes.push(outcome);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AuthOutcome> {
        self.outcomes.iter()
    }

    #[must_use]
    pub fn find(&self, kind: AuthKind) -> Option<&AuthOutcome> {
        self.outcomes.iter().find(|outcome| outcome.kind() == kind)
    }

    /// Pick the outcome that authorizes the login, if any.
    #[must_use]
    pub fn resolve(&self, policy: ResolutionPolicy) -> Option<&AuthOutcome> {
        match policy {
            ResolutionPolicy::FirstSuccess => self.outcomes.iter().find(|o| o.is_granted()),
            ResolutionPolicy::Unanimous => {
                if !self.outcomes.is_empty() && self.outcomes.iter().all(AuthOutcome::is_granted) {
                    self.outcomes.first()
                } else {
                    None
                }
            }
        }
    }

    /// First authenticated outcome carrying a denial status.
    #[must_use]
    pub fn denial(&self) -> Option<&AuthOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.authenticated && o.status != AuthStatus::Ok)
    }
}

impl IntoIterator for AuthResults {
    type Item = AuthOutcome;
    type IntoIter = std::vec::IntoIter<AuthOutcome>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.into_iter()
    }
}

impl From<Vec<AuthOutcome>> for AuthResults {
    fn from(outcomes: Vec<AuthOutcome>) -> Self {
        Self { outcomes }
    }
}
