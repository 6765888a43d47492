// UI layer: the decisions that need an operator (login details, which
// workspace to back up) and the download progress bar.
//
// The workflow asks a `Resolver` at each of these points. The interactive
// resolver prompts with `dialoguer`; the strict one refuses, which is how
// `--noinput` runs fail fast instead of hanging on a prompt.

use crate::error::{BackupError, Result};
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};

/// Why a login is being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginReason {
    /// No token has been stored yet.
    Missing,
    /// The stored token was rejected by the server.
    Expired,
}

pub trait Resolver {
    /// Email address to log in with; `previous` is the stored one, if any.
    fn email(&mut self, reason: LoginReason, previous: Option<&str>) -> Result<String>;

    /// The one-time code that was sent to `email`.
    fn one_time_code(&mut self, email: &str) -> Result<String>;

    /// Workspace to export when none was given on the command line.
    fn space_id(&mut self, default: Option<&str>) -> Result<String>;
}

impl<R: Resolver + ?Sized> Resolver for &mut R {
    fn email(&mut self, reason: LoginReason, previous: Option<&str>) -> Result<String> {
        (**self).email(reason, previous)
    }

    fn one_time_code(&mut self, email: &str) -> Result<String> {
        (**self).one_time_code(email)
    }

    fn space_id(&mut self, default: Option<&str>) -> Result<String> {
        (**self).space_id(default)
    }
}

impl<R: Resolver + ?Sized> Resolver for Box<R> {
    fn email(&mut self, reason: LoginReason, previous: Option<&str>) -> Result<String> {
        (**self).email(reason, previous)
    }

    fn one_time_code(&mut self, email: &str) -> Result<String> {
        (**self).one_time_code(email)
    }

    fn space_id(&mut self, default: Option<&str>) -> Result<String> {
        (**self).space_id(default)
    }
}

/// Prompts on the terminal.
#[derive(Debug, Default)]
pub struct InteractiveResolver;

impl Resolver for InteractiveResolver {
    fn email(&mut self, _reason: LoginReason, previous: Option<&str>) -> Result<String> {
        let mut input = Input::<String>::new();
        input.with_prompt("Email address");
        if let Some(previous) = previous {
            input.default(previous.to_string());
        }
        let email = input.interact_text().map_err(BackupError::Prompt)?;
        Ok(email.trim().to_string())
    }

    fn one_time_code(&mut self, _email: &str) -> Result<String> {
        let code: String = Input::new()
            .with_prompt("Temporary password")
            .interact_text()
            .map_err(BackupError::Prompt)?;
        Ok(code.trim().to_string())
    }

    fn space_id(&mut self, default: Option<&str>) -> Result<String> {
        let mut input = Input::<String>::new();
        input.with_prompt("Select space id");
        if let Some(default) = default {
            input.default(default.to_string());
        }
        let id = input.interact_text().map_err(BackupError::Prompt)?;
        Ok(id.trim().to_string())
    }
}

/// Never prompts: every decision that would need input is an error.
#[derive(Debug, Default)]
pub struct StrictResolver;

impl Resolver for StrictResolver {
    fn email(&mut self, reason: LoginReason, _previous: Option<&str>) -> Result<String> {
        Err(BackupError::configuration(match reason {
            LoginReason::Missing => {
                "no stored credentials: run interactively once to obtain an API token"
            }
            LoginReason::Expired => {
                "credentials expired: run interactively to obtain a new API token"
            }
        }))
    }

    fn one_time_code(&mut self, _email: &str) -> Result<String> {
        Err(BackupError::configuration(
            "a temporary password is required but input is disabled",
        ))
    }

    fn space_id(&mut self, _default: Option<&str>) -> Result<String> {
        Err(BackupError::configuration(
            "no workspace selected: pass --space-id when input is disabled",
        ))
    }
}

/// Byte progress bar for the archive download. Falls back to a spinner
/// when the server did not announce a size.
pub fn download_progress(total: Option<u64>, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    match total {
        Some(len) => {
            let bar = ProgressBar::new(len);
            if let Ok(style) = ProgressStyle::with_template(
                "{bar:40.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
            ) {
                bar.set_style(style.progress_chars("=> "));
            }
            bar
        }
        None => {
            let spinner = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner} {bytes} ({bytes_per_sec})") {
                spinner.set_style(style);
            }
            spinner
        }
    }
}
