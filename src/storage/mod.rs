//! PostgreSQL persistence for credentials, SSO users, and the database
//! existence probe.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use thiserror::Error;
use tracing::Instrument;

use crate::auth::{
    AuthError, CredentialRecord, CredentialStore, SsoDirectory, SsoUser,
};

/// SQLSTATE for "database does not exist".
const UNKNOWN_DATABASE: &str = "3D000";
/// Legacy driver code for the same condition.
const UNKNOWN_DATABASE_LEGACY: &str = "1049";

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("unknown database: {0}")]
    UnknownDatabase(String),
    #[error("database probe failed: {0}")]
    Other(String),
}

#[async_trait]
pub trait DatabaseProbe: Send + Sync {
    /// # Errors
    /// [`ProbeError::UnknownDatabase`] when the schema is missing; any other
    /// failure is [`ProbeError::Other`].
    async fn check_database_exists(&self, db_name: &str) -> Result<(), ProbeError>;
}

pub(crate) fn is_unknown_database(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .is_some_and(|code| matches!(code.as_ref(), UNKNOWN_DATABASE | UNKNOWN_DATABASE_LEGACY)),
        _ => false,
    }
}

fn db_span(operation: &'static str, statement: &'static str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn lookup_credential(&self, login: &str) -> Result<Option<CredentialRecord>, AuthError> {
        let query = r"
            SELECT id, login, pass, hash_salt, is_disabled
            FROM users
            WHERE LOWER(login) = LOWER($1) OR LOWER(sso_login) = LOWER($1)
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(login)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;

        Ok(row.map(|row| {
            let salt: String = row.get("hash_salt");
            CredentialRecord {
                user_id: row.get("id"),
                login: row.get("login"),
                hash: row.get("pass"),
                salt: (!salt.is_empty()).then_some(salt),
                disabled: row.get("is_disabled"),
            }
        }))
    }

    async fn update_credential_hash(&self, login: &str, new_hash: &str) -> Result<(), AuthError> {
        let query = r"
            UPDATE users
            SET pass = $1, hash_salt = '', last_update = NOW()
            WHERE LOWER(login) = LOWER($2)
        ";
        sqlx::query(query)
            .bind(new_hash)
            .bind(login)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SsoDirectory for PgStore {
    async fn sso_user_exists(&self, login: &str) -> Result<bool, AuthError> {
        let query = r"
            SELECT login FROM users
            WHERE LOWER(login) = LOWER($1) OR LOWER(sso_login) = LOWER($1)
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(login)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        Ok(row.is_some())
    }

    async fn insert_sso_user(&self, user: &SsoUser, hash: &str) -> Result<i64, AuthError> {
        let query = r"
            INSERT INTO users
                (name, login, sso_login, notes, group_id, profile_id, is_disabled, pass, hash_salt)
            VALUES ($1, $2, $2, 'SSO user', $3, $4, $5, $6, '')
            RETURNING id
        ";
        let row = sqlx::query(query)
            .bind(&user.name)
            .bind(&user.login)
            .bind(user.group_id)
            .bind(user.profile_id)
            .bind(user.disabled)
            .bind(hash)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", query))
            .await?;
        Ok(row.get("id"))
    }

    async fn update_on_login(&self, login: &str, hash: &str) -> Result<(), AuthError> {
        let query = r"
            UPDATE users
            SET pass = $1, hash_salt = '', last_update = NOW(), last_login = NOW()
            WHERE LOWER(login) = LOWER($2) OR LOWER(sso_login) = LOWER($2)
        ";
        sqlx::query(query)
            .bind(hash)
            .bind(login)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DatabaseProbe for PgStore {
    async fn check_database_exists(&self, db_name: &str) -> Result<(), ProbeError> {
        let query = "SELECT 1 FROM pg_database WHERE datname = $1";
        match sqlx::query(query)
            .bind(db_name)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
        {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(ProbeError::UnknownDatabase(db_name.to_string())),
            Err(err) if is_unknown_database(&err) => {
                Err(ProbeError::UnknownDatabase(db_name.to_string()))
            }
            Err(err) => Err(ProbeError::Other(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct CodedError(&'static str);

    impl fmt::Display for CodedError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "coded error {}", self.0)
        }
    }

    impl StdError for CodedError {}

    impl DatabaseError for CodedError {
        fn message(&self) -> &str {
            "coded error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.0))
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    #[test]
    fn detects_unknown_database_code() {
        let err = sqlx::Error::Database(Box::new(CodedError(UNKNOWN_DATABASE)));
        assert!(is_unknown_database(&err));

        let err = sqlx::Error::Database(Box::new(CodedError(UNKNOWN_DATABASE_LEGACY)));
        assert!(is_unknown_database(&err));

        let err = sqlx::Error::Database(Box::new(CodedError("23505")));
        assert!(!is_unknown_database(&err));

        assert!(!is_unknown_database(&sqlx::Error::RowNotFound));
    }
}
