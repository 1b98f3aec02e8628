//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use lanyard::config::{API_URL_ENV, DATA_DIR_ENV, DEFAULT_API_URL};

use crate::commands::{login, logout, signup, status, whoami};

/// Sign in and out of a lanyard backend from the terminal.
#[derive(Parser, Debug)]
#[command(name = "lanyard")]
#[command(author, version = env!("LANYARD_VERSION"), about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Backend base URL
    #[arg(long, env = API_URL_ENV, default_value = DEFAULT_API_URL, global = true)]
    pub api_url: String,

    /// Directory holding the stored session (defaults to the platform data dir)
    #[arg(long, env = DATA_DIR_ENV, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Keep the session in memory only; nothing survives this invocation
    #[arg(long, global = true, conflicts_with = "data_dir")]
    pub in_memory: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in with email and password
    Login(login::LoginArgs),

    /// Create an account and sign in to it
    Signup(signup::SignupArgs),

    /// Sign out and forget the stored session
    Logout(logout::LogoutArgs),

    /// Show the signed-in user, verified against the backend
    Whoami(whoami::WhoamiArgs),

    /// Show whether a session is stored and when its tokens expire
    Status(status::StatusArgs),
}
