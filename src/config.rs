//! CLI arguments and server configuration defaults.

use clap::{Parser, Subcommand};

pub const SESSION_COOKIE_NAME: &str = "SHAREBOX_SESSION";
pub const LOGIN_ROUTE: &str = "/__login__";
pub const LOGOUT_ROUTE: &str = "/__logout__";
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;
pub const INDEX_NAMES: [&str; 2] = ["index.html", "index.htm"];

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "sharebox", version, about = "Share a directory tree over HTTP")]
pub struct Args {
    #[arg(
        short = 'b',
        long,
        env = "SHAREBOX_BIND",
        default_value = DEFAULT_BIND,
        help = "Bind address"
    )]
    pub bind: String,
    #[arg(
        short = 'p',
        long,
        env = "SHAREBOX_PORT",
        default_value_t = DEFAULT_PORT,
        help = "Listen port"
    )]
    pub port: u16,
    #[arg(
        short = 'd',
        long,
        env = "SHAREBOX_DIR",
        default_value = ".",
        help = "Directory to serve"
    )]
    pub dir: String,
    #[arg(
        long,
        env = "SHAREBOX_PASSWORD",
        help = "Shared password required for every route (omit to serve without auth)"
    )]
    pub password: Option<String>,
    #[arg(
        long,
        env = "SHAREBOX_SESSION_TTL_SECS",
        default_value_t = DEFAULT_SESSION_TTL_SECS,
        help = "Session expiration in seconds"
    )]
    pub session_ttl_secs: u64,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the running instances recorded in the registry.
    List,
}
