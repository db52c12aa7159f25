use super::AuthClient;
use crate::{
    credential::{Credential, CredentialState, CredentialStore},
    error::AuthError,
};
use chrono::Utc;
use reqwest::StatusCode;
use tokio::sync::{Mutex, RwLock};

/// A refresh token the server refused, kept so that callers queued behind the
/// failed attempt get the same answer instead of retrying a dead token.
struct Rejected {
    refresh_token: String,
    status: StatusCode,
    body: String,
}

/// Credential shared between the core and other request issuers.
///
/// Reads are concurrent. Refreshing is serialized through one gate: the first
/// caller that finds the credential expired performs the network refresh while
/// the others wait, then observe its outcome.
pub struct SharedCredential {
    store: RwLock<CredentialStore>,
    gate: Mutex<Option<Rejected>>,
}

impl SharedCredential {
    pub fn new(store: CredentialStore) -> Self {
        Self {
            store: RwLock::new(store),
            gate: Mutex::new(None),
        }
    }

    pub fn empty() -> Self {
        Self::new(CredentialStore::new())
    }

    pub async fn snapshot(&self) -> Option<Credential> {
        self.store.read().await.get().cloned()
    }

    pub async fn state(&self) -> CredentialState {
        self.store.read().await.state(Utc::now())
    }

    pub async fn replace(&self, credential: Credential) {
        let mut gate = self.gate.lock().await;
        self.store.write().await.replace(credential);
        *gate = None;
    }

    /// Logs in and stores the resulting credential.
    pub async fn authenticate(
        &self,
        auth: &AuthClient,
        username: &str,
        password: &str,
    ) -> Result<Credential, AuthError> {
        let mut gate = self.gate.lock().await;
        let credential = auth.login(username, password).await?;
        self.store.write().await.replace(credential.clone());
        *gate = None;
        Ok(credential)
    }

    /// Returns the stored credential when valid, refreshing it first otherwise.
    pub async fn ensure_valid(&self, auth: &AuthClient) -> Result<Credential, AuthError> {
        if let Some(credential) = self.current_if_valid().await? {
            return Ok(credential);
        }

        let mut gate = self.gate.lock().await;

        // Whoever held the gate before us may have refreshed already.
        if let Some(credential) = self.current_if_valid().await? {
            return Ok(credential);
        }

        self.refresh_locked(auth, &mut gate).await
    }

    /// Refreshes after the server answered 401 for `rejected`, unless another
    /// caller already replaced that credential.
    pub async fn refresh_rejected(
        &self,
        auth: &AuthClient,
        rejected: &Credential,
    ) -> Result<Credential, AuthError> {
        let mut gate = self.gate.lock().await;

        match self.store.read().await.get() {
            None => return Err(AuthError::NotAuthenticated),
            Some(current) if current.access_token != rejected.access_token => {
                return Ok(current.clone());
            }
            Some(_) => (),
        }

        self.refresh_locked(auth, &mut gate).await
    }

    async fn current_if_valid(&self) -> Result<Option<Credential>, AuthError> {
        let store = self.store.read().await;
        let credential = store.get().ok_or(AuthError::NotAuthenticated)?;

        Ok(credential.is_valid(Utc::now()).then(|| credential.clone()))
    }

    async fn refresh_locked(
        &self,
        auth: &AuthClient,
        gate: &mut Option<Rejected>,
    ) -> Result<Credential, AuthError> {
        let refresh_token = self
            .store
            .read()
            .await
            .get()
            .map(|x| x.refresh_token.clone())
            .ok_or(AuthError::NotAuthenticated)?;

        if let Some(rejected) = gate.as_ref()
            && rejected.refresh_token == refresh_token
        {
            return Err(AuthError::RefreshFailed {
                status: rejected.status,
                body: rejected.body.clone(),
            });
        }

        match auth.refresh(&refresh_token).await {
            Ok(credential) => {
                self.store.write().await.replace(credential.clone());
                *gate = None;
                Ok(credential)
            }
            Err(AuthError::RefreshFailed { status, body }) => {
                *gate = Some(Rejected {
                    refresh_token,
                    status,
                    body: body.clone(),
                });
                Err(AuthError::RefreshFailed { status, body })
            }
            Err(e) => Err(e),
        }
    }
}

impl Default for SharedCredential {
    fn default() -> Self {
        Self::empty()
    }
}
