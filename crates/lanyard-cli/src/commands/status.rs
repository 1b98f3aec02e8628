//! Status command implementation.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use lanyard::SessionController;
use serde::Serialize;

use crate::output;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print the status as a single JSON object
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Status<'a> {
    api_url: &'a str,
    authenticated: bool,
    access_token_expires_at: Option<DateTime<Utc>>,
    refresh_token_expires_at: Option<DateTime<Utc>>,
}

/// Reports only what is stored locally; the backend is not contacted.
pub fn run(args: StatusArgs, session: &SessionController, api_url: &str) -> Result<()> {
    let expiry = session.store().expiry();
    let status = Status {
        api_url,
        authenticated: session.is_authenticated(),
        access_token_expires_at: expiry.access_token,
        refresh_token_expires_at: expiry.refresh_token,
    };

    if args.json {
        return output::json(&status);
    }

    output::field("API", status.api_url);
    output::field(
        "Signed in",
        if status.authenticated { "yes" } else { "no" },
    );
    output::field(
        "Access token expires",
        &output::timestamp(status.access_token_expires_at),
    );
    output::field(
        "Refresh token expires",
        &output::timestamp(status.refresh_token_expires_at),
    );

    Ok(())
}
