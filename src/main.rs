// Entrypoint for the CLI application.
// - Keeps `main` small: parse arguments, build the client, store and
//   resolver, then hand them to the backup service.
// - Any error ends the run with a red `error:` line and exit status 1.

mod cli;

use anyhow::Context;
use clap::Parser;
use crossterm::style::Stylize;
use notion_backup::{
    BackupOptions, BackupService, ExportType, FileConfigStore, InteractiveResolver, NotionClient,
    Resolver, StrictResolver,
};
use std::time::Duration;
use tracing::Level;

use cli::Cli;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {:#}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(cli.verbose)
        .with_writer(std::io::stderr)
        .init();

    let output_dir = cli.output_dir.canonicalize().unwrap_or_else(|_| cli.output_dir.clone());
    println!("Backup Notion workspace into directory {}", output_dir.display());

    let mut options = BackupOptions::new(cli.output_dir);
    options.export_type = cli.export_type.parse::<ExportType>()?;
    options.space_id = cli.space_id;
    options.copy_dir = cli.copy_dir;
    options.poll_interval = Duration::from_secs(cli.poll_interval);
    options.poll_timeout = cli.timeout.map(Duration::from_secs);

    let config_path = cli.config.unwrap_or_else(FileConfigStore::default_path);
    let store = FileConfigStore::open(config_path)?;
    let api = NotionClient::from_env().context("Failed to build HTTP client")?;
    tracing::debug!(api_root = api.base_url(), config = %store.path().display(), "starting backup");

    let resolver: Box<dyn Resolver> = if cli.noinput {
        Box::new(StrictResolver)
    } else {
        Box::new(InteractiveResolver)
    };

    let mut service = BackupService::new(api, store, resolver, options)?;
    service.backup()?;
    Ok(())
}
