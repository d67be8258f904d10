use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "applib")]
#[command(about = "Headless host for applib dashboards")]
#[command(version)]
pub struct Cli {
    /// Client config file (TOML)
    #[arg(short, long, value_name = "PATH", env = "APPLIB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Dashboard server URL, overrides `server_url` from the config file
    #[arg(short = 'u', long, value_name = "URL", env = "APPLIB_URL")]
    pub server_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect and follow the server until interrupted
    Run,
    /// Issue one db-query-constant request and print the reply
    Query {
        query: String,
        /// Callback name the server should reply to
        #[arg(long, default_value = "applib_query")]
        callback: String,
        /// Give up after this many milliseconds
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,
    },
    /// Manage the offline asset cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Read or write client props
    Prop {
        #[command(subcommand)]
        action: PropAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Capture the static assets and server manifest into a new generation
    Install,
    /// Fetch a path through the cache and write the body to stdout
    Get { path: String },
    /// List committed cache generations
    List,
}

#[derive(Subcommand, Debug)]
pub enum PropAction {
    Get { key: String },
    Set { key: String, value: String },
    /// Print every prop as JSON
    List,
}
