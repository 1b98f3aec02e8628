//! Client configuration assembled from the global flags.

use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use lanyard::{ApiUrl, ClientConfig, SessionController, StorageConfig};

use crate::cli::Cli;

/// Where the session lives when neither `--data-dir` nor `--in-memory` is given.
fn default_data_dir() -> Result<PathBuf> {
    let dirs =
        ProjectDirs::from("", "", "lanyard").context("Could not determine data directory")?;
    Ok(dirs.data_dir().to_path_buf())
}

pub fn client_config(cli: &Cli) -> Result<ClientConfig> {
    let api_url = ApiUrl::new(&cli.api_url).context("Invalid API URL")?;

    let storage = if cli.in_memory {
        StorageConfig::InMemory
    } else {
        let dir = match &cli.data_dir {
            Some(dir) => dir.clone(),
            None => default_data_dir()?,
        };
        StorageConfig::Durable { dir }
    };

    Ok(ClientConfig::new(api_url).with_storage(storage))
}

pub fn open_session(cli: &Cli) -> Result<SessionController> {
    let config = client_config(cli)?;
    tracing::debug!(api = %config.api_url, storage = ?config.storage, "Opening session");
    SessionController::new(&config).context("Failed to open session store")
}
