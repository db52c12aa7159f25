use crate::{
    config::StreamConfig,
    credential::Credential,
    error::FetchError,
    logger::{Logger, debug},
    utils,
};
use reqwest::{Client, StatusCode, Url, header};
use serde::Deserialize;

/// Answer of `catalog/tracks/{id}/stream/`.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamInfo {
    pub stream_url: String,
    #[serde(default)]
    pub sample_start_ms: Option<u64>,
    #[serde(default)]
    pub sample_end_ms: Option<u64>,
}

/// Bearer authenticated client for the catalog API.
/// Only the stream lookup lives here; every other catalog endpoint belongs to callers.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    client: Client,
    api_base: String,
    user_agent: String,
    logger: Logger,
}

impl CatalogClient {
    pub fn new(config: &StreamConfig, logger: Logger) -> Result<Self, FetchError> {
        Ok(Self {
            client: Client::builder().build()?,
            api_base: config.api_base.clone(),
            user_agent: config.api_user_agent.clone(),
            logger,
        })
    }

    pub async fn stream_info(
        &self,
        media_id: &str,
        credential: &Credential,
    ) -> Result<StreamInfo, FetchError> {
        let authorization = credential.authorization()?;
        let url = self.endpoint(&format!("catalog/tracks/{}/stream/", media_id))?;
        debug!(
            self.logger,
            "GET {} (Authorization: Bearer {})",
            url,
            utils::redact(&credential.access_token)
        );

        let response = self
            .client
            .get(url.clone())
            .header(header::AUTHORIZATION, authorization)
            .header(header::CONNECTION, "Keep-Alive")
            .header(header::USER_AGENT, &self.user_agent)
            .send()
            .await?;

        let status = response.status();
        debug!(self.logger, "GET {} -> {}", url, status);

        match status {
            StatusCode::OK => Ok(response.json::<StreamInfo>().await?),
            StatusCode::UNAUTHORIZED => Err(FetchError::Unauthorized(
                utils::truncate_body(response.text().await.unwrap_or_default()),
            )),
            status => Err(FetchError::StreamUnavailable {
                media_id: media_id.to_owned(),
                status,
                body: utils::truncate_body(response.text().await.unwrap_or_default()),
            }),
        }
    }

    /// Resolves the manifest url for a track.
    pub async fn stream_url(
        &self,
        media_id: &str,
        credential: &Credential,
    ) -> Result<Url, FetchError> {
        let info = self.stream_info(media_id, credential).await?;

        info.stream_url.parse::<Url>().map_err(|x| {
            FetchError::MalformedManifest(format!(
                "invalid stream url {:?}: {}",
                info.stream_url, x
            ))
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        let base = if self.api_base.ends_with('/') {
            self.api_base.clone()
        } else {
            format!("{}/", self.api_base)
        };

        base.parse::<Url>()
            .and_then(|x| x.join(path))
            .map_err(|x| {
                FetchError::MalformedManifest(format!("invalid api base {:?}: {}", base, x))
            })
    }
}
