use crate::services::blob_store::StoreConfig;
use anyhow::{Context, Result};
use clap::Parser;
use std::{env, path::Path, str::FromStr};

const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_connections: u32,
    pub max_body_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Bucket-as-table blob store API")]
pub struct Args {
    /// Host to bind to (overrides BLOBSTORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides BLOBSTORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// SQLite database URL (overrides BLOBSTORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Maximum pooled catalog connections (overrides BLOBSTORE_MAX_CONNECTIONS)
    #[arg(long)]
    pub max_connections: Option<u32>,

    /// Maximum request body size in bytes (overrides BLOBSTORE_MAX_BODY_BYTES)
    #[arg(long)]
    pub max_body_bytes: Option<usize>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    /// Merge already-parsed CLI args over environment values and defaults.
    pub fn from_args(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("BLOBSTORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parse("BLOBSTORE_PORT", 8080)?;
        let env_db = env::var("BLOBSTORE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/blobstore.db".into());
        let env_max_connections = env_parse("BLOBSTORE_MAX_CONNECTIONS", 5)?;
        let env_max_body = env_parse("BLOBSTORE_MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES)?;

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            max_connections: args.max_connections.unwrap_or(env_max_connections),
            max_body_bytes: args.max_body_bytes.unwrap_or(env_max_body),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            database_url: self.database_url.clone(),
            max_connections: self.max_connections,
        }
    }

    /// On-disk location of the SQLite file, or `None` for in-memory catalogs.
    pub fn sqlite_file_path(&self) -> Option<&Path> {
        let path = self
            .database_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:")
            .split('?')
            .next()
            .unwrap_or_default();

        if path.is_empty() || path == ":memory:" {
            None
        } else {
            Some(Path::new(path))
        }
    }
}

/// Read `key` from the environment, falling back to `default` when unset.
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}
