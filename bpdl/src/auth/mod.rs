//! Mobile-app OAuth flow: password login, PKCE authorization code, token exchange,
//! plus the refresh-token grant.

mod shared;

pub use shared::SharedCredential;

use crate::{
    config::AuthConfig,
    credential::Credential,
    error::AuthError,
    logger::{Logger, debug, info},
    utils,
};
use chrono::Utc;
use reqwest::{Client, Response, StatusCode, Url, header, redirect::Policy};
use serde::{Deserialize, Serialize};

const ACCEPT_JSON: &str = "application/json, text/plain, */*";
const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// Performs the login and refresh flows. Holds no credential itself.
#[derive(Debug, Clone)]
pub struct AuthClient {
    client: Client,
    config: AuthConfig,
    logger: Logger,
}

impl AuthClient {
    pub fn new(config: AuthConfig, logger: Logger) -> Result<Self, AuthError> {
        // The login step sets a session cookie which the authorize step relies on,
        // and the authorize step must observe the 302 itself.
        let client = Client::builder()
            .cookie_store(true)
            .redirect(Policy::none())
            .build()?;

        Ok(Self {
            client,
            config,
            logger,
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Runs the three step login and returns a fresh credential.
    pub async fn login(&self, username: &str, password: &str) -> Result<Credential, AuthError> {
        info!(self.logger, "Logging in as {}", username);

        self.submit_password(username, password).await?;
        let code = self.authorization_code().await?;
        let credential = self.exchange_code(&code).await?;

        info!(
            self.logger,
            "Logged in, access token expires at {}", credential.expires_at
        );
        Ok(credential)
    }

    /// Exchanges a refresh token for a new credential.
    /// Both tokens are replaced since the server may rotate the refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Credential, AuthError> {
        let url = self.config.endpoint("o/token/");
        debug!(
            self.logger,
            "POST {} (grant_type=refresh_token, refresh_token={})",
            url,
            utils::redact(refresh_token)
        );

        let response = self
            .client
            .post(&url)
            .header(header::CONNECTION, "Keep-Alive")
            .header(header::USER_AGENT, &self.config.api_user_agent)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = response.status();
        debug!(self.logger, "POST {} -> {}", url, status);

        if status != StatusCode::OK {
            return Err(AuthError::RefreshFailed {
                status,
                body: body_text(response).await,
            });
        }

        let credential = self.read_tokens(response).await?;
        info!(self.logger, "Access token refreshed");
        Ok(credential)
    }

    async fn submit_password(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let url = self.config.endpoint("identity/v1/login/");
        debug!(self.logger, "POST {} (username={})", url, username);

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, ACCEPT_JSON)
            .header(header::CONNECTION, "Keep-Alive")
            .header(header::USER_AGENT, &self.config.api_user_agent)
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        let status = response.status();
        debug!(self.logger, "POST {} -> {}", url, status);

        if status != StatusCode::OK {
            return Err(AuthError::InvalidCredentials {
                status,
                body: body_text(response).await,
            });
        }

        Ok(())
    }

    async fn authorization_code(&self) -> Result<String, AuthError> {
        let url = self.config.endpoint("o/authorize/");
        debug!(self.logger, "GET {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("client_id", self.config.client_id.as_str()),
                ("response_type", "code"),
                ("code_challenge", self.config.code_challenge.as_str()),
                ("code_challenge_method", "S256"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .header(header::ACCEPT, ACCEPT_HTML)
            .header(header::CONNECTION, "Keep-Alive")
            .header(header::USER_AGENT, &self.config.browser_user_agent)
            .send()
            .await?;

        let status = response.status();
        debug!(self.logger, "GET {} -> {}", url, status);

        if status != StatusCode::FOUND {
            return Err(AuthError::AuthorizationFailed {
                status,
                body: body_text(response).await,
            });
        }

        let location = response
            .headers()
            .get(header::LOCATION)
            .ok_or_else(|| AuthError::ProtocolViolation("missing Location header".to_owned()))?
            .to_str()
            .map_err(|_| AuthError::ProtocolViolation("Location header is not ASCII".to_owned()))?;

        authorization_code_from_location(location, response.url())
    }

    async fn exchange_code(&self, code: &str) -> Result<Credential, AuthError> {
        let url = self.config.endpoint("o/token/");
        debug!(
            self.logger,
            "POST {} (grant_type=authorization_code, code={})",
            url,
            utils::redact(code)
        );

        let response = self
            .client
            .post(&url)
            .header(header::CONNECTION, "Keep-Alive")
            .header(header::USER_AGENT, &self.config.api_user_agent)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("code_verifier", self.config.code_verifier.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        debug!(self.logger, "POST {} -> {}", url, status);

        if status != StatusCode::OK {
            return Err(AuthError::TokenExchangeFailed {
                status,
                body: body_text(response).await,
            });
        }

        self.read_tokens(response).await
    }

    async fn read_tokens(&self, response: Response) -> Result<Credential, AuthError> {
        let bytes = response.bytes().await?;
        let tokens = serde_json::from_slice::<TokenResponse>(&bytes)
            .map_err(|x| AuthError::InvalidResponse(x.to_string()))?;

        debug!(
            self.logger,
            "Received access_token={} refresh_token={} expires_in={}",
            utils::redact(&tokens.access_token),
            utils::redact(&tokens.refresh_token),
            tokens.expires_in
        );

        Ok(Credential::new(
            tokens.access_token,
            tokens.refresh_token,
            tokens.expires_in,
            Utc::now(),
        ))
    }
}

/// Extracts `code` from the authorize redirect target.
/// Relative targets are resolved against the request url.
fn authorization_code_from_location(
    location: &str,
    request_url: &Url,
) -> Result<String, AuthError> {
    let target = Url::parse(location)
        .or_else(|_| request_url.join(location))
        .map_err(|x| AuthError::ProtocolViolation(format!("invalid Location {location:?}: {x}")))?;

    target
        .query_pairs()
        .find(|(name, _)| name == "code")
        .map(|(_, value)| value.into_owned())
        .filter(|x| !x.is_empty())
        .ok_or_else(|| {
            AuthError::ProtocolViolation(format!("no code parameter in Location {location:?}"))
        })
}

async fn body_text(response: Response) -> String {
    utils::truncate_body(response.text().await.unwrap_or_default())
}
