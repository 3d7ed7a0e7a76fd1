//! Startup helpers shared by the subcommands.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use joinery_auth::{AuthConfig, AuthSnapshot, Settings};
use joinery_vault::TieredStorage;
use tracing_subscriber::EnvFilter;

const DEFAULT_DATA_DIR: &str = "data";
const DATABASE_FILE: &str = "joinery.db";

pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

/// Settings file plus `JOINERY_*` environment overrides.
pub fn load_settings(path: &Path) -> Result<Settings> {
    let mut settings = Settings::load(path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;
    settings.apply_env();
    Ok(settings)
}

/// `$JOINERY_DATA_DIR/joinery.db`, defaulting to `data/joinery.db`.
pub fn database_path() -> PathBuf {
    let dir = std::env::var("JOINERY_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string());
    Path::new(&dir).join(DATABASE_FILE)
}

pub fn open_storage() -> Result<TieredStorage> {
    let path = database_path();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).context("failed to create data directory")?;
    }
    TieredStorage::open(&path)
        .with_context(|| format!("failed to open session store at {}", path.display()))
}

/// One-line description of the signed-in user.
pub fn describe(snapshot: &AuthSnapshot) -> String {
    match (&snapshot.user, snapshot.mode) {
        (Some(user), Some(mode)) if snapshot.authenticated => {
            format!("{} <{}> ({mode:?})", user.name, user.email)
        }
        _ => "not signed in".to_string(),
    }
}

/// Whether `login` should listen for the provider redirect. Unconfigured
/// OAuth signs in the demo user, so nothing would ever arrive.
pub fn wants_callback_listener(config: &AuthConfig, no_listen: bool) -> bool {
    config.github.is_configured() && !no_listen
}
