//! Beatport mobile API client: credential lifecycle and encrypted HLS track downloads.
//!
//! [`AuthClient`] obtains and refreshes credentials, [`SharedCredential`] serializes
//! refreshes between concurrent users of one credential, and [`StreamDownloader`]
//! turns a track id into a remuxed `.m4a` file.

mod auth;
mod catalog;
mod commands;
mod config;
mod credential;
mod error;
mod logger;
mod stream;
mod utils;

pub use auth::{AuthClient, SharedCredential};
pub use catalog::{CatalogClient, StreamInfo};
#[doc(hidden)]
pub use commands::Args;
pub use config::{
    AuthConfig, Config, DALVIK_USER_AGENT, OKHTTP_USER_AGENT, StreamConfig, WEBVIEW_USER_AGENT,
};
pub use credential::{Credential, CredentialState, CredentialStore};
pub use error::{AuthError, DecryptError, Error, FetchError, RemuxError, Result};
pub use logger::Logger;
pub use reqwest;
pub use stream::{
    EncryptionKey, Manifest, ManifestFetcher, Remuxer, Segment, SegmentDecryptor,
    StreamDownloader,
};
