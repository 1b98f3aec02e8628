//! Signup command implementation.

use anyhow::{Result, bail};
use clap::Args;
use colored::Colorize;
use lanyard::{SessionController, SignupDetails};

use crate::output;

#[derive(Args, Debug)]
pub struct SignupArgs {
    #[arg(long)]
    pub first_name: String,

    #[arg(long)]
    pub last_name: String,

    /// Account email address
    #[arg(long)]
    pub email: String,

    /// Account password
    #[arg(long)]
    pub password: String,

    /// Repeat the password
    #[arg(long)]
    pub confirm_password: String,
}

pub async fn run(args: SignupArgs, session: &SessionController) -> Result<()> {
    let details = SignupDetails::new(
        args.first_name,
        args.last_name,
        args.email,
        args.password,
        args.confirm_password,
    );

    if !details.passwords_match() {
        bail!("Passwords do not match");
    }

    eprintln!("{}", "Creating account...".dimmed());

    let user = session.signup(&details).await?;

    output::success("Account created");
    println!();
    output::profile(&user);

    Ok(())
}
