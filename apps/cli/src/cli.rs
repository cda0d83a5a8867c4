//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Resumable uploads to a strato server.
#[derive(Parser, Debug)]
#[command(name = "strato")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options that override values from the configuration file.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Configuration file to use instead of the default location.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Server base URL.
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Bearer token for the storage API.
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Largest chunk in bytes.
    #[arg(long, global = true)]
    pub chunk_size: Option<u64>,

    /// Chunk uploads allowed in flight at once.
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload files and directories.
    Upload(UploadArgs),

    /// Follow push events for a folder until interrupted.
    Watch(WatchArgs),

    /// Show or store the effective configuration.
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Files or directories to upload.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Remote folder that receives the upload.
    #[arg(long)]
    pub folder: String,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Folder to subscribe to.
    #[arg(long)]
    pub folder: String,

    /// Push channel URL; derived from the server URL when omitted.
    #[arg(long)]
    pub url: Option<String>,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Print the effective configuration as JSON.
    #[arg(long)]
    pub print: bool,

    /// Write the effective configuration back to the file.
    #[arg(long)]
    pub save: bool,
}
