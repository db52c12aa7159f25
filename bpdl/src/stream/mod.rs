mod decrypt;
mod manifest;
mod merger;
mod remux;

pub use decrypt::{EncryptionKey, SegmentDecryptor};
pub use manifest::{Manifest, ManifestFetcher, Segment};
pub use remux::Remuxer;

use crate::{
    catalog::CatalogClient,
    config::StreamConfig,
    credential::Credential,
    error::Result,
    logger::{Logger, info},
};
use remux::PartialOutput;
use reqwest::Url;
use std::path::{Path, PathBuf};

/// Track id to `.m4a` file: catalog lookup, manifest, key, segments, remux.
///
/// Dropping the returned future at any point leaves neither the transient
/// stream file nor a partial output behind.
#[derive(Debug, Clone)]
pub struct StreamDownloader {
    catalog: CatalogClient,
    manifests: ManifestFetcher,
    segments: SegmentDecryptor,
    remuxer: Remuxer,
    logger: Logger,
}

impl StreamDownloader {
    pub fn new(config: &StreamConfig, logger: Logger) -> Result<Self> {
        Ok(Self {
            catalog: CatalogClient::new(config, logger.clone())?,
            manifests: ManifestFetcher::new(&config.media_user_agent, logger.clone())?,
            segments: SegmentDecryptor::new(
                &config.media_user_agent,
                config.concurrency(),
                logger.clone(),
            )?,
            remuxer: Remuxer::new(config.ffmpeg.clone(), logger.clone())?,
            logger,
        })
    }

    pub fn remuxer(&self) -> &Remuxer {
        &self.remuxer
    }

    /// Saves track `media_id` to `output`.
    ///
    /// A 401 from any authenticated request surfaces as an error for which
    /// [`crate::Error::is_unauthorized`] is true; nothing is retried here.
    pub async fn download(
        &self,
        media_id: &str,
        credential: &Credential,
        output: &Path,
    ) -> Result<PathBuf> {
        info!(self.logger, "Resolving stream of track {}", media_id);
        let stream_url = self.catalog.stream_url(media_id, credential).await?;
        self.download_stream(&stream_url, credential, output).await
    }

    /// Same as [`Self::download`] for an already known manifest url.
    pub async fn download_stream(
        &self,
        stream_url: &Url,
        credential: &Credential,
        output: &Path,
    ) -> Result<PathBuf> {
        let manifest = self.manifests.fetch(stream_url, credential).await?;

        // From here on a failure must not leave anything at `output`.
        let output_guard = PartialOutput::new(output);

        let key = match &manifest.key_uri {
            Some(key_uri) => Some(self.segments.fetch_key(key_uri, credential).await?),
            None => None,
        };

        let raw = self.segments.decrypt_all(&manifest, key.as_ref()).await?;
        self.remuxer.remux(&raw, output).await?;

        output_guard.commit();
        Ok(output.to_owned())
    }
}
