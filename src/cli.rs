//! Command-line arguments.

use clap::Parser;
use std::path::PathBuf;

/// Back up a Notion workspace into a zip archive
#[derive(Parser, Debug)]
#[command(name = "notion-backup")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Where the zip export will be saved
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Id of the Notion workspace
    #[arg(long)]
    pub space_id: Option<String>,

    /// html or markdown
    #[arg(long, default_value = "markdown")]
    pub export_type: String,

    /// Return an error on a missing token or space id instead of prompting
    #[arg(long)]
    pub noinput: bool,

    /// Optionally save a copy of the export to this directory
    #[arg(long)]
    pub copy_dir: Option<PathBuf>,

    /// Configuration file holding the email, token and last space id
    #[arg(long, env = "NOTION_BACKUP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Seconds between two export status checks
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval: u64,

    /// Give up waiting for the export after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}
