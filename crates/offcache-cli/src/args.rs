//! CLI argument definitions using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Offcache - cache-first offline asset cache
///
/// Populates a versioned cache bucket from a fixed manifest, drops buckets
/// from earlier versions, and answers requests from the bucket before the
/// network.
#[derive(Parser, Debug)]
#[command(name = "offcache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, env = "OFFCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Bucket storage directory (overrides the config file)
    #[arg(long, global = true, env = "OFFCACHE_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Populate the current bucket from the manifest, then activate if install succeeded
    Install,

    /// Delete every bucket other than the current version
    Activate,

    /// Resolve a request cache-first
    Fetch(FetchArgs),

    /// List buckets and their entries
    List,

    /// Show or initialize configuration
    Config(ConfigArgs),
}

#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    /// Request URL, absolute or relative to the configured scope
    pub url: String,

    /// HTTP method; anything but GET is passed straight to the network
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// Write the body to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct ConfigArgs {
    /// Write a default configuration file if none exists
    #[arg(long)]
    pub init: bool,
}
