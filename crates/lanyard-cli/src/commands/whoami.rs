//! Whoami command implementation.

use anyhow::{Result, bail};
use clap::Args;
use colored::Colorize;
use lanyard::{SessionController, SessionError};

use crate::output;

#[derive(Args, Debug)]
pub struct WhoamiArgs {
    /// Print the verified profile as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: WhoamiArgs, session: &SessionController) -> Result<()> {
    let pending = match session.resolve_current_session() {
        Ok(pending) => pending,
        Err(SessionError::Unauthenticated) => {
            bail!("No active session. Run 'lanyard login' first.")
        }
        Err(e) => return Err(e.into()),
    };

    if !args.json
        && let Some(cached) = pending.cached()
    {
        eprintln!("{}", "Cached profile (unverified):".dimmed());
        output::profile(cached);
        println!();
    }

    let user = match pending.verified().await {
        Ok(user) => user,
        Err(SessionError::Unauthenticated) => {
            bail!("Session expired. Run 'lanyard login' again.")
        }
        Err(e) => return Err(e.into()),
    };

    if args.json {
        output::json_pretty(&user)?;
    } else {
        output::success("Session verified");
        output::profile(&user);
    }

    Ok(())
}
