use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while obtaining or refreshing a credential.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("login rejected (HTTP {status}): {body}")]
    InvalidCredentials { status: StatusCode, body: String },

    #[error("authorization endpoint answered HTTP {status} instead of a redirect: {body}")]
    AuthorizationFailed { status: StatusCode, body: String },

    #[error("authorization redirect is malformed: {0}")]
    ProtocolViolation(String),

    #[error("authorization code exchange failed (HTTP {status}): {body}")]
    TokenExchangeFailed { status: StatusCode, body: String },

    #[error("token refresh failed (HTTP {status}): {body}")]
    RefreshFailed { status: StatusCode, body: String },

    #[error("token endpoint returned an unreadable response: {0}")]
    InvalidResponse(String),

    #[error("no credential available, login is required")]
    NotAuthenticated,

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors raised while resolving a stream manifest or its key.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("server rejected the bearer credential (HTTP 401): {0}")]
    Unauthorized(String),

    #[error("credential is expired and cannot be attached to requests")]
    CredentialExpired,

    #[error("stream url unavailable for track {media_id} (HTTP {status}): {body}")]
    StreamUnavailable {
        media_id: String,
        status: StatusCode,
        body: String,
    },

    #[error("manifest unavailable (HTTP {status}): {body}")]
    ManifestUnavailable { status: StatusCode, body: String },

    #[error("could not parse manifest: {0}")]
    MalformedManifest(String),

    #[error("encryption key unavailable (HTTP {status})")]
    KeyUnavailable { status: StatusCode },

    #[error("encryption key must be 16 bytes, got {0} bytes")]
    MalformedKey(usize),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors raised while downloading and decrypting segments.
#[derive(Debug, Error)]
pub enum DecryptError {
    #[error("segment {index} download failed (HTTP {status})")]
    SegmentDownloadFailed { index: usize, status: StatusCode },

    #[error("segment {index} is {len} bytes, not a whole number of AES blocks")]
    MalformedCiphertext { index: usize, len: usize },

    #[error("segment {index} download failed: {source}")]
    Http {
        index: usize,
        #[source]
        source: reqwest::Error,
    },

    #[error("segment worker stopped unexpectedly: {0}")]
    Worker(String),
}

/// Errors raised while repackaging the decrypted stream.
#[derive(Debug, Error)]
pub enum RemuxError {
    #[error("ffmpeg couldn't be found, it is required to continue further.")]
    FfmpegNotFound,

    #[error("ffmpeg failed to remux {} ({status}): {stderr}", .output.display())]
    RemuxFailed {
        output: PathBuf,
        status: String,
        stderr: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decrypt(#[from] DecryptError),

    #[error(transparent)]
    Remux(#[from] RemuxError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true when the server rejected the bearer credential, or when it
    /// had already expired before being sent. Refreshing and retrying once is
    /// left to the caller.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Self::Fetch(FetchError::Unauthorized(_) | FetchError::CredentialExpired)
        )
    }
}

/// A `Result` alias where the `Err` case is `bpdl::Error`.
pub type Result<T> = std::result::Result<T, Error>;
