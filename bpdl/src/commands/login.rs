use super::Context;
use crate::{auth::AuthClient, logger::info};
use anyhow::Result;
use clap::Args;

/// Log in with a Beatport account and save the credential to the session file.
#[derive(Debug, Clone, Args)]
pub struct Login {
    /// Account username or email address.
    #[arg(required = true)]
    pub username: String,

    /// Account password.
    #[arg(required = true)]
    pub password: String,
}

impl Login {
    pub(crate) async fn execute(self, context: &Context) -> Result<()> {
        let auth = AuthClient::new(context.config.auth.clone(), context.logger.clone())?;
        let credential = auth.login(&self.username, &self.password).await?;

        context.write_session(&credential).await?;
        info!(
            context.logger,
            "Credential saved to {}",
            context.session.display()
        );
        Ok(())
    }
}
