//! Subcommand implementations.

pub mod login;
pub mod logout;
pub mod signup;
pub mod status;
pub mod whoami;

use anyhow::Result;

use crate::cli::{Cli, Commands};
use crate::settings;

pub async fn handle(cli: Cli) -> Result<()> {
    let session = settings::open_session(&cli)?;

    match cli.command {
        Commands::Login(args) => login::run(args, &session).await,
        Commands::Signup(args) => signup::run(args, &session).await,
        Commands::Logout(args) => logout::run(args, &session).await,
        Commands::Whoami(args) => whoami::run(args, &session).await,
        Commands::Status(args) => status::run(args, &session, &cli.api_url),
    }
}
