//! Logout command implementation.

use anyhow::Result;
use clap::Args;
use lanyard::SessionController;

use crate::output;

#[derive(Args, Debug)]
pub struct LogoutArgs {}

pub async fn run(_args: LogoutArgs, session: &SessionController) -> Result<()> {
    let had_session = session.is_authenticated();

    session.logout().await;

    if had_session {
        output::success("Logged out");
    } else {
        output::success("No active session");
    }
    Ok(())
}
