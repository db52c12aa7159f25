mod login;
mod save;

pub use login::Login;
pub use save::Save;

use crate::{config::Config, credential::Credential, logger::Logger};
use anyhow::{Context as _, Result};
use clap::{ColorChoice, Parser, Subcommand};
use log::LevelFilter;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Log in to Beatport and save tracks as .m4a files.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// When to output colored text.
    #[arg(long, global = true, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// JSON file overriding endpoints, user agents and download settings.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// File where the credential is kept between runs.
    #[arg(long, global = true, default_value = "session.json")]
    pub session: PathBuf,

    /// Print every request and response status.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    Login(Login),
    Save(Save),
}

impl Args {
    pub async fn execute(self) -> Result<()> {
        let context = Context {
            config: match &self.config {
                Some(path) => read_config(path).await?,
                None => Config::default(),
            },
            logger: Logger::terminal(if self.verbose {
                LevelFilter::Debug
            } else {
                LevelFilter::Info
            }),
            session: self.session,
        };

        match self.command {
            Commands::Login(args) => args.execute(&context).await,
            Commands::Save(args) => args.execute(&context).await,
        }
    }
}

pub(crate) struct Context {
    pub(crate) config: Config,
    pub(crate) logger: Logger,
    pub(crate) session: PathBuf,
}

impl Context {
    pub(crate) async fn read_session(&self) -> Result<Option<Credential>> {
        if !fs::try_exists(&self.session).await? {
            return Ok(None);
        }

        let bytes = fs::read(&self.session)
            .await
            .with_context(|| format!("could not read {}", self.session.display()))?;

        let credential = serde_json::from_slice::<Credential>(&bytes)
            .with_context(|| format!("could not parse session file {}", self.session.display()))?;

        Ok(Some(credential))
    }

    pub(crate) async fn write_session(&self, credential: &Credential) -> Result<()> {
        fs::write(&self.session, serde_json::to_vec_pretty(credential)?)
            .await
            .with_context(|| format!("could not write {}", self.session.display()))
    }
}

async fn read_config(path: &Path) -> Result<Config> {
    let bytes = fs::read(path)
        .await
        .with_context(|| format!("could not read {}", path.display()))?;

    serde_json::from_slice::<Config>(&bytes)
        .with_context(|| format!("could not parse config file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_threads_out_of_range() {
        assert!(Args::try_parse_from(["bpdl", "save", "17", "--threads", "0"]).is_err());
        assert!(Args::try_parse_from(["bpdl", "save", "17", "--threads", "17"]).is_err());

        let args = Args::try_parse_from(["bpdl", "save", "17", "-t", "16", "-v"]).unwrap();
        assert!(args.verbose);
        assert_eq!(args.session, PathBuf::from("session.json"));
    }

    #[tokio::test]
    async fn test_session_file() {
        let dir = tempfile::tempdir().unwrap();
        let context = Context {
            config: Config::default(),
            logger: Logger::silent(),
            session: dir.path().join("session.json"),
        };

        assert!(context.read_session().await.unwrap().is_none());

        let credential = Credential::new("access", "refresh", 600, Utc::now());
        context.write_session(&credential).await.unwrap();
        assert_eq!(context.read_session().await.unwrap(), Some(credential));
    }

    #[tokio::test]
    async fn test_config_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            r#"{ "stream": { "ffmpeg": "/usr/local/bin/ffmpeg" } }"#,
        )
        .unwrap();

        let config = read_config(file.path()).await.unwrap();
        assert_eq!(
            config.stream.ffmpeg,
            Some(PathBuf::from("/usr/local/bin/ffmpeg"))
        );
    }
}
