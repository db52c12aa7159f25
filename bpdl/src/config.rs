use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const OKHTTP_USER_AGENT: &str = "okhttp/4.12.0";
pub const DALVIK_USER_AGENT: &str =
    "Dalvik/2.1.0 (Linux; U; Android 13; sdk_gphone64_arm64 Build/TE1A.240213.009)";
pub const WEBVIEW_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 13; sdk_gphone64_arm64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/109.0.0.0 Mobile Safari/537.36";

/// Settings for the mobile-app authorization flow.
///
/// The PKCE pair is fixed: the server pairs it with the mobile client id, so
/// it is configuration data and must not be regenerated per login.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub auth_base: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub code_verifier: String,
    pub code_challenge: String,
    /// Sent by the JSON login and the form encoded token requests.
    pub api_user_agent: String,
    /// Sent by the authorize request, which the app opens in a web view.
    pub browser_user_agent: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            auth_base: "https://account.beatport.com".to_owned(),
            client_id: "5yfTsQ6B31nNXPsImGyeZiZ6oDzDiwG50E7FS92j".to_owned(),
            redirect_uri: "beatport://bp_mobile_oauth".to_owned(),
            code_verifier: "zSpnef_Xs38AF8ZTW7N3ENkaD506wawhvLyDSNdNEB8".to_owned(),
            code_challenge: "VxE9bAsvWy4U2PZvlEepiUsg5JHpk8P968owhKDjGFY".to_owned(),
            api_user_agent: OKHTTP_USER_AGENT.to_owned(),
            browser_user_agent: WEBVIEW_USER_AGENT.to_owned(),
        }
    }
}

impl AuthConfig {
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.auth_base.trim_end_matches('/'), path)
    }
}

/// Settings for the catalog stream endpoint and the segment pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub api_base: String,
    /// Sent by catalog requests.
    pub api_user_agent: String,
    /// Sent by manifest and key requests.
    pub media_user_agent: String,
    /// Maximum number of segments downloaded at the same time (1-16).
    pub max_concurrency: u8,
    /// Explicit ffmpeg binary. Looked up on `PATH` when unset.
    pub ffmpeg: Option<PathBuf>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.beatport.com/v4/".to_owned(),
            api_user_agent: OKHTTP_USER_AGENT.to_owned(),
            media_user_agent: DALVIK_USER_AGENT.to_owned(),
            max_concurrency: 5,
            ffmpeg: None,
        }
    }
}

impl StreamConfig {
    pub(crate) fn concurrency(&self) -> usize {
        self.max_concurrency.clamp(1, 16) as usize
    }
}

/// Both configuration sections, as read from a JSON config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub auth: AuthConfig,
    pub stream: StreamConfig,
}
