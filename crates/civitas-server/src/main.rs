//! civitas-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered under
//! `CIVITAS_*` environment variables, opens the SQLite store and serves the
//! JSON API over HTTP.
//!
//! # Bootstrapping the first administrator
//!
//! ```text
//! civitas-server --config config.toml --create-admin admin@mairie.ci
//! ```
//!
//! The password is read from stdin.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::{Context as _, bail};
use clap::Parser;
use civitas_api::{AppState, FileStore, auth};
use civitas_core::{
  account::{NewAccount, Role, normalize_email},
  store::PortalStore,
};
use civitas_server::{ServerConfig, StripeGateway};
use civitas_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Civitas civil-document portal")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,

  /// Create an active administrator with this e-mail and exit.
  #[arg(long, value_name = "EMAIL")]
  create_admin: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    let password = read_password()?;
    println!("{}", auth::hash_password(&password)?);
    return Ok(());
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("CIVITAS"))
    .build()
    .context("failed to read configuration")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  if let Some(email) = cli.create_admin {
    return create_admin(&store, &email).await;
  }

  let upload_dir = expand_tilde(&server_cfg.upload_dir);
  tokio::fs::create_dir_all(&upload_dir)
    .await
    .with_context(|| format!("failed to create upload directory {upload_dir:?}"))?;

  let gateway = StripeGateway::new(&server_cfg.stripe_api_base, &server_cfg.stripe_secret_key)
    .context("failed to build payment gateway client")?;

  let state = AppState {
    store:    Arc::new(store),
    gateway:  Arc::new(gateway),
    files:    Arc::new(FileStore::new(&upload_dir)),
    settings: Arc::new(server_cfg.api_settings()),
  };

  let app = civitas_server::app(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

async fn create_admin(store: &SqliteStore, email: &str) -> anyhow::Result<()> {
  let email = normalize_email(email);
  if !email.contains('@') {
    bail!("invalid e-mail address: {email}");
  }
  let password = read_password()?;
  auth::check_password_strength(&password)?;

  let created = store
    .create_account(NewAccount {
      email:         email.clone(),
      display_name:  "Administrateur".to_owned(),
      phone:         None,
      password_hash: auth::hash_password(&password)?,
      role:          Role::Admin,
    })
    .await
    .context("failed to create administrator")?;

  match created {
    Some(account) => {
      tracing::info!(account_id = %account.account_id, %email, "administrator created");
      Ok(())
    }
    None => bail!("an account already exists for {email}"),
  }
}

/// Read a password line from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_owned())
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
