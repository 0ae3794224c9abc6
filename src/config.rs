//! Command line and environment configuration.
//!
//! Every flag can also be set through the environment (a `.env` file in the
//! working directory is loaded first).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use taskboard_core::{Database, StoreError};

use crate::gate::RetryPolicy;

/// Without a subcommand the HTTP server is started.
#[derive(Debug, Parser)]
#[command(name = "taskboard")]
#[command(about = "Server-rendered todo list backed by SQLite", version)]
pub struct Cli {
    #[command(flatten)]
    pub serve: ServeArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create the todo table if it does not exist, then exit
    Migrate(DatabaseArgs),
}

#[derive(Debug, Clone, Args)]
pub struct DatabaseArgs {
    /// Database connection string (`sqlite://path`, a bare path, or `sqlite::memory:`)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,
}

impl DatabaseArgs {
    /// Falls back to the platform data directory when no URL is configured.
    pub fn open(&self) -> Result<Database, StoreError> {
        match &self.database_url {
            Some(url) => Database::from_url(url),
            None => Database::open_default(),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, env = "HOST", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    /// Port for the HTTP server
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    #[command(flatten)]
    pub database: DatabaseArgs,

    /// Directory served for paths no route matches
    #[arg(long, env = "STATIC_DIR", default_value = "public")]
    pub static_dir: PathBuf,

    /// Attempts at opening the database before the process exits
    #[arg(long, env = "DB_INIT_ATTEMPTS", default_value_t = 5)]
    pub init_attempts: u32,

    /// Delay before the first retry, doubled on every further attempt
    #[arg(long, env = "DB_INIT_BACKOFF_MS", default_value_t = 500)]
    pub init_backoff_ms: u64,
}

impl ServeArgs {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.init_attempts,
            initial_backoff: Duration::from_millis(self.init_backoff_ms),
        }
    }
}
