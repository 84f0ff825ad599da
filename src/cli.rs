use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cloudframe")]
#[command(author, version, about = "Dropbox photo catalog and preview cache")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a session, relaying JSON-line commands on stdin and notifications on stdout
    Run {
        /// Remote folder to scan (overrides pipeline.folder)
        #[arg(long)]
        folder: Option<String>,

        /// Wait for the host to send INIT and GET instead of starting immediately
        #[arg(long)]
        wait: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
