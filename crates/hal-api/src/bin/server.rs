//! hal-api server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`) layered under
//! `HAL_*` environment variables, opens the SQLite store, and serves the
//! directory API over HTTP.
//!
//! # Bootstrapping an admin
//!
//! Register an account through the API, then grant it the admin role:
//!
//! ```
//! cargo run -p hal-api --bin server -- --promote-admin owner@example.com
//! ```

use std::{
  net::SocketAddr,
  path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::Parser;
use hal_api::{AppState, ServerConfig};
use hal_core::user::Role;
use hal_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "HAL business directory API server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Grant the admin role to the account registered under this email and
  /// exit.
  #[arg(long, value_name = "EMAIL")]
  promote_admin: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("HAL").try_parsing(true))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&server_cfg.store_path);

  // Open SQLite store.
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  // Helper mode: promote an account and exit.
  if let Some(email) = cli.promote_admin {
    let found = store
      .set_role_by_email(&email, Role::Admin)
      .await
      .context("failed to update role")?;
    anyhow::ensure!(found, "no account registered under {email}");
    tracing::info!(%email, "granted admin role");
    return Ok(());
  }

  let address = format!("{}:{}", server_cfg.host, server_cfg.port);
  if !server_cfg.require_review_moderation {
    tracing::warn!("review moderation disabled; new reviews are published immediately");
  }

  // Build application state.
  let state = AppState::new(store, server_cfg).context("invalid token_secret")?;
  let app = hal_api::router(state);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
    .await
    .context("server error")?;

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
