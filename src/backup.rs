// Backup workflow: authenticate, pick a workspace, run an export task on
// the server, wait for it and download the archive.

use crate::api::NotionApi;
use crate::config::{ConfigKey, ConfigStore};
use crate::error::{ApiError, BackupError, Result};
use crate::model::{ExportStatus, ExportTask, ExportType, UserContent};
use crate::ui::{download_progress, LoginReason, Resolver};
use chrono::{Local, NaiveDate};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

/// Delay between two export status checks.
pub const STATUS_WAIT_TIME: Duration = Duration::from_secs(5);

/// What to export and where to put it.
#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub output_dir: PathBuf,
    /// Workspace chosen up front; prompts (or fails) when `None`.
    pub space_id: Option<String>,
    pub export_type: ExportType,
    /// Second directory that receives a copy of the archive.
    pub copy_dir: Option<PathBuf>,
    pub poll_interval: Duration,
    /// Give up waiting on the export after this long. `None` waits forever.
    pub poll_timeout: Option<Duration>,
    pub show_progress: bool,
    /// Date stamped into the archive name.
    pub export_date: NaiveDate,
}

impl BackupOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            space_id: None,
            export_type: ExportType::default(),
            copy_dir: None,
            poll_interval: STATUS_WAIT_TIME,
            poll_timeout: None,
            show_progress: true,
            export_date: Local::now().date_naive(),
        }
    }

    /// Directories must exist before anything touches the network.
    pub fn validate(&self) -> Result<()> {
        if !self.output_dir.is_dir() {
            return Err(BackupError::configuration(format!(
                "output directory {} does not exist",
                self.output_dir.display()
            )));
        }
        if let Some(copy_dir) = &self.copy_dir {
            if !copy_dir.is_dir() {
                return Err(BackupError::configuration(format!(
                    "copy directory {} does not exist",
                    copy_dir.display()
                )));
            }
        }
        Ok(())
    }
}

/// First free `export_{space}_{date}_{format}[_N].zip` in `output_dir`.
/// The suffix starts at 1 for the first collision.
pub fn export_file_path(
    output_dir: &Path,
    space_id: &str,
    date: NaiveDate,
    export_type: &str,
) -> PathBuf {
    let stem = format!("export_{space_id}_{}_{export_type}", date.format("%Y-%m-%d"));
    let mut postfix_number = 0u32;
    loop {
        let file_name = if postfix_number == 0 {
            format!("{stem}.zip")
        } else {
            format!("{stem}_{postfix_number}.zip")
        };
        let candidate = output_dir.join(file_name);
        if !candidate.exists() {
            return candidate;
        }
        postfix_number += 1;
    }
}

/// Runs one backup against a Notion API, a configuration store and a
/// resolver for the decisions that may need the operator.
pub struct BackupService<A, S, R> {
    api: A,
    store: S,
    resolver: R,
    options: BackupOptions,
}

impl<A: NotionApi, S: ConfigStore, R: Resolver> BackupService<A, S, R> {
    /// Fails with a configuration error if the options are unusable.
    pub fn new(api: A, store: S, resolver: R, options: BackupOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            api,
            store,
            resolver,
            options,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run the whole workflow and return the path of the downloaded archive.
    pub fn backup(&mut self) -> Result<PathBuf> {
        let (token, content) = self.authenticate()?;

        if let Some(user_id) = content.user_ids.first() {
            println!("User id: {user_id}");
        }
        println!("Available spaces:");
        for workspace in &content.workspaces {
            println!("\t- {}: {}", workspace.name, workspace.id);
        }

        let space_id = self.select_space(&content)?;

        println!("Launching export task");
        let task_id = self
            .api
            .launch_export_task(&token, &space_id, self.options.export_type)?;
        println!("Export task {task_id} has been launched");
        tracing::info!(%task_id, %space_id, export_type = %self.options.export_type, "export launched");

        let task = self.wait_for_export(&token, &task_id)?;
        println!("Export task is finished");

        let export_url = task
            .export_url
            .ok_or_else(|| ApiError::malformed("getTasks", "completed task has no exportURL"))?;
        // Only a known export type may end up in the file name.
        let export_format = task
            .export_type
            .as_deref()
            .and_then(|echoed| echoed.parse::<ExportType>().ok())
            .unwrap_or(self.options.export_type);
        println!("Downloading zip export from {export_url}");

        let export_path = export_file_path(
            &self.options.output_dir,
            &space_id,
            self.options.export_date,
            export_format.as_str(),
        );
        let bytes = self.download(&export_url, &export_path)?;
        println!("Saved {} ({bytes} bytes)", export_path.display());

        if let Some(copy_dir) = &self.options.copy_dir {
            let copy = copy_export(&export_path, copy_dir)?;
            println!("Copied export to {}", copy.display());
        }
        Ok(export_path)
    }

    /// Stored token if the server still accepts it, otherwise a fresh one.
    /// Re-login happens at most once.
    fn authenticate(&mut self) -> Result<(String, UserContent)> {
        let token = match self.store.get(ConfigKey::Token) {
            Some(token) => token,
            None => {
                println!("First time login");
                self.login(LoginReason::Missing)?
            }
        };

        match self.api.get_user_content(&token) {
            Ok(content) => Ok((token, content)),
            Err(e) if e.is_unauthorized() => {
                tracing::info!("stored token rejected");
                println!("Credentials have expired, login again");
                let token = self.login(LoginReason::Expired)?;
                let content = self.api.get_user_content(&token)?;
                Ok((token, content))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn login(&mut self, reason: LoginReason) -> Result<String> {
        let previous = self.store.get(ConfigKey::Email);
        let email = self.resolver.email(reason, previous.as_deref())?;
        self.store.set(ConfigKey::Email, &email)?;

        let csrf = self.api.ask_otp(&email)?;
        println!("A temporary password has been sent to your email address {email}");
        let otp = self.resolver.one_time_code(&email)?;

        let token = self.api.get_token(&csrf, &otp)?;
        self.store.set(ConfigKey::Token, &token)?;
        println!("Congratulations, you have been successfully authenticated");
        Ok(token)
    }

    fn select_space(&mut self, content: &UserContent) -> Result<String> {
        let space_id = match &self.options.space_id {
            Some(space_id) => {
                println!("Selecting space {space_id}");
                space_id.clone()
            }
            None => {
                let stored = self.store.get(ConfigKey::SpaceId);
                let default = stored
                    .as_deref()
                    .or_else(|| content.workspaces.first().map(|w| w.id.as_str()));
                self.resolver.space_id(default)?
            }
        };

        if !content.contains_workspace(&space_id) {
            return Err(BackupError::validation(format!(
                "selected space id {space_id} is not available to this account"
            )));
        }
        self.store.set(ConfigKey::SpaceId, &space_id)?;
        Ok(space_id)
    }

    fn wait_for_export(&self, token: &str, task_id: &str) -> Result<ExportTask> {
        let started = Instant::now();
        loop {
            let task = self.api.get_task_status(token, task_id)?;
            match task.status {
                ExportStatus::Complete => return Ok(task),
                ExportStatus::Failed => {
                    return Err(BackupError::ExportFailed {
                        task_id: task_id.to_string(),
                        message: task.error.unwrap_or_else(|| "no details given".into()),
                    })
                }
                ExportStatus::InProgress => {}
            }

            if let Some(limit) = self.options.poll_timeout {
                let waited = started.elapsed();
                if waited >= limit {
                    return Err(BackupError::ExportTimeout {
                        task_id: task_id.to_string(),
                        waited,
                    });
                }
            }
            println!(
                "...Export still in progress, waiting for {:?}",
                self.options.poll_interval
            );
            tracing::debug!(%task_id, "export still in progress");
            thread::sleep(self.options.poll_interval);
        }
    }

    /// Stream the archive into a new file. A partial file is removed when
    /// the transfer fails.
    fn download(&self, url: &str, path: &Path) -> Result<u64> {
        let mut export = self.api.open_export(url)?;
        // create_new: never replace an existing archive.
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;

        let bar = download_progress(export.content_length, self.options.show_progress);
        let copied = {
            let mut writer = bar.wrap_write(file);
            io::copy(&mut export.body, &mut writer).and_then(|n| {
                io::Write::flush(&mut writer)?;
                Ok(n)
            })
        };
        bar.finish_and_clear();

        match copied {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(path) {
                    tracing::warn!(path = %path.display(), error = %cleanup, "could not remove partial export");
                }
                Err(e.into())
            }
        }
    }
}

/// Copy the archive into `dir` under its own file name.
fn copy_export(source: &Path, dir: &Path) -> Result<PathBuf> {
    let file_name = source.file_name().ok_or_else(|| {
        BackupError::configuration(format!("{} has no file name", source.display()))
    })?;
    let destination = dir.join(file_name);
    fs::copy(source, &destination)?;
    Ok(destination)
}
