//! Login command implementation.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use lanyard::{LoginCredentials, SessionController};

use crate::output;

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Account email address
    #[arg(long)]
    pub email: String,

    /// Account password
    #[arg(long)]
    pub password: String,
}

pub async fn run(args: LoginArgs, session: &SessionController) -> Result<()> {
    let credentials = LoginCredentials::new(args.email, args.password);

    eprintln!("{}", "Logging in...".dimmed());

    let user = session.login(&credentials).await?;

    output::success("Logged in successfully");
    println!();
    output::profile(&user);

    Ok(())
}
