// Library root
// -----------
// This crate exposes the backup workflow as a library. The binary
// (`main.rs`) parses arguments and wires these modules together.
//
// Module responsibilities:
// - `api`: HTTP interactions with Notion's private API (login code,
//   session token, workspaces, export tasks, archive download).
// - `backup`: the workflow itself, from credential check to the copy of
//   the downloaded archive.
// - `config`: the persisted email, token and last-used workspace.
// - `ui`: prompts, the non-interactive resolver and the progress bar.
// - `model` and `error`: shared types.
pub mod api;
pub mod backup;
pub mod config;
pub mod error;
pub mod model;
pub mod ui;

pub use api::{NotionApi, NotionClient};
pub use backup::{export_file_path, BackupOptions, BackupService};
pub use config::{ConfigKey, ConfigStore, FileConfigStore, MemoryConfigStore};
pub use error::{ApiError, BackupError, Result};
pub use model::{CsrfValues, ExportDownload, ExportStatus, ExportTask, ExportType, UserContent, Workspace};
pub use ui::{InteractiveResolver, LoginReason, Resolver, StrictResolver};
