//! Dispatch across real backends wired the way the server wires them.

use anyhow::Result;
use async_trait::async_trait;
use std::{collections::HashMap, net::TcpListener, sync::Arc, time::Duration};
use syspass::{
    auth::{
        hash::hash_key, AuthDispatcher, AuthError, AuthKind, AuthStatus, Backends, ClientContext,
        Credential, CredentialRecord, CredentialStore, DirectoryBind, DirectoryService,
        HttpDirectory, OutcomeDetail, ResolutionPolicy,
    },
    config::{ConfigData, FileConfigSource},
};
use tokio::sync::Mutex;

#[derive(Default)]
struct Credentials {
    records: Mutex<HashMap<String, CredentialRecord>>,
}

impl Credentials {
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
impl CredentialStore for Credentials {
    async fn lookup_credential(&self, login: &str) -> Result<Option<CredentialRecord>, AuthError> {
        Ok(self.records.lock().await.get(&login.to_lowercase()).cloned())
    }

    async fn update_credential_hash(&self, login: &str, new_hash: &str) -> Result<(), AuthError> {
        if let Some(record) = self.records.lock().await.get_mut(&login.to_lowercase()) {
            record.hash = new_hash.to_string();
            record.salt = None;
        }
        Ok(())
    }
}

struct Directory(Result<DirectoryBind, String>);

#[async_trait]
impl DirectoryService for Directory {
    async fn bind(&self, _login: &str, _secret: &str) -> Result<DirectoryBind, AuthError> {
        self.0.clone().map_err(AuthError::DirectoryFault)
    }
}

fn config(basic_auth: bool, directory: bool) -> FileConfigSource {
    FileConfigSource::from_data(ConfigData {
        installed: true,
        auth_basic_enabled: basic_auth,
        ldap_enabled: directory,
        ..ConfigData::default()
    })
}

fn dispatcher(
    basic_auth: bool,
    directory: Arc<dyn DirectoryService>,
    credentials: Arc<dyn CredentialStore>,
) -> Result<AuthDispatcher> {
    let backends = Backends::default()
        .with_directory(directory)
        .with_credentials(credentials);
    Ok(AuthDispatcher::from_config(&config(basic_auth, true), backends)?)
}

#[tokio::test]
async fn directory_without_opinion_leaves_database_outcome() -> Result<()> {
    let credentials = Arc::new(Credentials::with_user(7, "alice", "correct horse")?);
    let dispatcher = dispatcher(
        false,
        Arc::new(Directory(Ok(DirectoryBind::failed()))),
        credentials,
    )?;

    let results = dispatcher
        .run_all(&Credential::new("alice", "correct horse"))
        .await?;

    assert_eq!(results.len(), 1);
    let outcome = results.find(AuthKind::Database);
    assert!(outcome.is_some_and(|o| o.is_granted()));
    assert!(results.find(AuthKind::Browser).is_none());
    assert!(results.find(AuthKind::Directory).is_none());
    Ok(())
}

#[tokio::test]
async fn unreachable_directory_is_no_opinion() -> Result<()> {
    // Bind then release a port so nothing is listening on it.
    let port = TcpListener::bind("127.0.0.1:0")?.local_addr()?.port();
    let directory = HttpDirectory::new(&format!("http://127.0.0.1:{port}"), Duration::from_secs(1))?;

    let credentials = Arc::new(Credentials::with_user(7, "alice", "correct horse")?);
    let dispatcher = dispatcher(false, Arc::new(directory), credentials)?;

    let results = dispatcher
        .run_all(&Credential::new("alice", "correct horse"))
        .await?;

    let kinds: Vec<AuthKind> = results.iter().map(|o| o.kind()).collect();
    assert_eq!(kinds, vec![AuthKind::Database]);
    Ok(())
}

#[tokio::test]
async fn expired_directory_account_is_denied_even_with_valid_password() -> Result<()> {
    let credentials = Arc::new(Credentials::with_user(7, "alice", "correct horse")?);
    let dispatcher = dispatcher(
        false,
        Arc::new(Directory(Ok(DirectoryBind::Accepted {
            expire: 1_700_000_000,
            in_group: true,
        }))),
        credentials,
    )?;

    let results = dispatcher
        .run_all(&Credential::new("alice", "correct horse"))
        .await?;

    let directory = results.find(AuthKind::Directory);
    assert!(directory.is_some_and(|o| o.authenticated && o.status == AuthStatus::Expired));
    assert!(results.resolve(ResolutionPolicy::Unanimous).is_none());
    assert_eq!(
        results.resolve(ResolutionPolicy::FirstSuccess).map(|o| o.kind()),
        Some(AuthKind::Database)
    );
    assert_eq!(
        results.denial().map(|o| o.status.code()),
        Some(AuthStatus::Expired.code())
    );
    Ok(())
}

#[tokio::test]
async fn directory_fault_aborts_dispatch() -> Result<()> {
    let credentials = Arc::new(Credentials::with_user(7, "alice", "correct horse")?);
    let dispatcher = dispatcher(
        false,
        Arc::new(Directory(Err("malformed reply".to_string()))),
        credentials,
    )?;

    let result = dispatcher
        .run_all(&Credential::new("alice", "correct horse"))
        .await;

    assert!(matches!(result, Err(AuthError::DirectoryFault(_))));
    Ok(())
}

#[tokio::test]
async fn browser_outcome_comes_first() -> Result<()> {
    let credentials = Arc::new(Credentials::with_user(7, "alice", "correct horse")?);
    let dispatcher = dispatcher(
        true,
        Arc::new(Directory(Ok(DirectoryBind::failed()))),
        credentials,
    )?;

    let credential = Credential::new("alice", "wrong")
        .with_client(ClientContext::default().with_server_user("alice"));
    let results = dispatcher.run_all(&credential).await?;

    let first = results.iter().next();
    assert!(matches!(
        first.map(|o| &o.detail),
        Some(OutcomeDetail::Browser { server_user }) if server_user == "alice"
    ));
    assert!(results
        .find(AuthKind::Database)
        .is_some_and(|o| !o.authenticated));
    assert_eq!(
        results.resolve(ResolutionPolicy::FirstSuccess).map(|o| o.kind()),
        Some(AuthKind::Browser)
    );
    Ok(())
}
