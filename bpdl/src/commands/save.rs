use super::Context;
use crate::{
    auth::{AuthClient, SharedCredential},
    credential::CredentialStore,
    logger::{info, warning},
    stream::StreamDownloader,
};
use anyhow::{Result, anyhow, bail};
use clap::Args;
use std::path::PathBuf;

/// Download a track and save it as an .m4a file.
#[derive(Debug, Clone, Args)]
pub struct Save {
    /// Beatport track id.
    #[arg(required = true)]
    pub track_id: String,

    /// Output file path.
    /// Note that an existing file will be overwritten.
    /// By default <TRACK_ID>.m4a in the current working directory is used.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Path of the ffmpeg binary.
    /// By default ffmpeg is looked up in PATH.
    #[arg(long)]
    pub ffmpeg: Option<PathBuf>,

    /// Maximum number of segments downloaded in parallel.
    /// Number of threads should be in range 1-16 (inclusive).
    #[arg(short, long, default_value_t = 5, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub threads: u8,
}

impl Save {
    pub(crate) async fn execute(self, context: &Context) -> Result<()> {
        let Self {
            track_id,
            output,
            ffmpeg,
            threads,
        } = self;

        let stored = context
            .read_session()
            .await?
            .ok_or_else(|| anyhow!("no saved credential, run `bpdl login` first."))?;

        let mut config = context.config.stream.clone();
        config.max_concurrency = threads;

        if ffmpeg.is_some() {
            config.ffmpeg = ffmpeg;
        }

        let auth = AuthClient::new(context.config.auth.clone(), context.logger.clone())?;
        let downloader = StreamDownloader::new(&config, context.logger.clone())?;
        let shared = SharedCredential::new(CredentialStore::with_credential(stored.clone()));
        let output = output.unwrap_or_else(|| PathBuf::from(format!("{}.m4a", track_id)));

        let credential = shared.ensure_valid(&auth).await?;

        if credential != stored {
            context.write_session(&credential).await?;
        }

        let task = async {
            match downloader
                .download(&track_id, &credential, &output)
                .await
            {
                Err(e) if e.is_unauthorized() => {
                    warning!(context.logger, "Credential rejected, refreshing it once.");
                    let credential = shared.refresh_rejected(&auth, &credential).await?;
                    context.write_session(&credential).await?;

                    Ok::<_, anyhow::Error>(
                        downloader
                            .download(&track_id, &credential, &output)
                            .await?,
                    )
                }
                result => Ok(result?),
            }
        };

        // Dropping the download future removes transient and partial files.
        tokio::select! {
            result = task => {
                info!(context.logger, "Track {} saved as {}", track_id, result?.display());
                Ok(())
            }
            _ = tokio::signal::ctrl_c() => bail!("Ctrl+C received, download cancelled."),
        }
    }
}
