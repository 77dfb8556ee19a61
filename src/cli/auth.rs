use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::Path;

use tube_relay::config::Config;
use tube_relay::youtube::auth::user_token_auth;

#[derive(Args)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommands,
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Authorize a Google account in the browser and store its token
    Login,

    /// Show the stored user token
    Status,
}

pub async fn run(args: AuthArgs, config_path: Option<&Path>) -> Result<()> {
    let config = Config::load_unvalidated(config_path)?;
    let auth = user_token_auth(&config)?;

    match args.command {
        AuthCommands::Login => {
            println!("Opening the Google consent page. Waiting for authorization...");
            let token = auth.authorize_interactively().await?;
            println!("Authorized. Token stored at {}", auth.store().path().display());
            if token.refresh_token.is_none() {
                println!(
                    "Warning: no refresh token was issued; you will need to log in again when it expires"
                );
            }
        }
        AuthCommands::Status => match auth.store().load_async().await? {
            Some(token) => {
                println!("Token file: {}", auth.store().path().display());
                println!("Expires at: {}", token.expires_at.to_rfc3339());
                println!("Valid: {}", if token.is_valid() { "yes" } else { "no" });
                println!("Refreshable: {}", if token.can_refresh() { "yes" } else { "no" });
            }
            None => println!(
                "No token stored at {}. Run 'tube-relay auth login'.",
                auth.store().path().display()
            ),
        },
    }

    Ok(())
}
