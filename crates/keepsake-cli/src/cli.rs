use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "keepsake",
    about = "Inspect and edit persisted Keepsake stores",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Storage directory (one JSON file per storage name)
    #[arg(short, long, global = true, default_value = ".keepsake")]
    pub dir: PathBuf,

    /// TOML file with persistence defaults
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// List stored entries
    List,
    /// Print an entry exactly as stored
    Get(KeyArgs),
    /// Print an entry's data after expiration and version checks
    Show(ShowArgs),
    /// Write a JSON object as an entry
    Set(SetArgs),
    /// Delete an entry
    Remove(KeyArgs),
}

#[derive(Args)]
pub struct KeyArgs {
    pub name: String,
}

#[derive(Args)]
pub struct ShowArgs {
    pub name: String,
    /// Expected data version; a mismatched entry reads as empty and is purged
    #[arg(long)]
    pub version: Option<u32>,
    /// Leave expired entries in place instead of purging them
    #[arg(long)]
    pub keep_expired: bool,
}

#[derive(Args)]
pub struct SetArgs {
    pub name: String,
    /// JSON object to store
    pub data: String,
    /// Lifetime in milliseconds
    #[arg(long, allow_hyphen_values = true)]
    pub expire_in: Option<i64>,
    #[arg(long)]
    pub version: Option<u32>,
}
