use crate::error::FetchError;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Bearer credential issued by the token endpoint.
///
/// This is also the opaque record a caller persists between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Builds a credential which expires `ttl_seconds` after `now`.
    ///
    /// Expiry saturates at the representable range of timestamps.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        ttl_seconds: i64,
        now: DateTime<Utc>,
    ) -> Self {
        let expires_at = TimeDelta::try_seconds(ttl_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(if ttl_seconds < 0 {
                DateTime::<Utc>::MIN_UTC
            } else {
                DateTime::<Utc>::MAX_UTC
            });

        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty() && now < self.expires_at
    }

    pub fn state(&self, now: DateTime<Utc>) -> CredentialState {
        if self.is_valid(now) {
            CredentialState::Valid
        } else {
            CredentialState::Expired
        }
    }

    /// `Authorization` header value. Only a valid credential may be attached.
    pub(crate) fn authorization(&self) -> Result<String, FetchError> {
        if self.is_valid(Utc::now()) {
            Ok(format!("Bearer {}", self.access_token))
        } else {
            Err(FetchError::CredentialExpired)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    Absent,
    Valid,
    Expired,
}

/// Holds the current credential, if any. No I/O happens here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialStore {
    credential: Option<Credential>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            credential: Some(credential),
        }
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.credential.as_ref().is_some_and(|x| x.is_valid(now))
    }

    pub fn state(&self, now: DateTime<Utc>) -> CredentialState {
        self.credential
            .as_ref()
            .map_or(CredentialState::Absent, |x| x.state(now))
    }

    /// Replaces all three fields at once.
    pub fn update(
        &mut self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        ttl_seconds: i64,
        now: DateTime<Utc>,
    ) {
        self.credential = Some(Credential::new(
            access_token,
            refresh_token,
            ttl_seconds,
            now,
        ));
    }

    pub fn replace(&mut self, credential: Credential) {
        self.credential = Some(credential);
    }

    pub fn clear(&mut self) {
        self.credential = None;
    }

    pub fn get(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }
}
