//! Backup workflow tests against a scripted Notion API and resolver.

use chrono::NaiveDate;
use notion_backup::{
    ApiError, BackupError, BackupOptions, BackupService, ConfigKey, ConfigStore, CsrfValues,
    ExportDownload, ExportTask, ExportType, FileConfigStore, LoginReason, MemoryConfigStore,
    NotionApi, Resolver, StrictResolver, UserContent, Workspace,
};
use pretty_assertions::assert_eq;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

const ARCHIVE: &[u8] = b"PK\x03\x04 fake zip body";
const EXPORT_URL: &str = "https://files.example/export.zip";

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 17).unwrap()
}

/// Notion API double. Every call is appended to `calls`.
struct FakeApi {
    calls: RefCell<Vec<String>>,
    /// `false` entries answer `loadUserContent` with 401; once drained every call succeeds.
    authorized: RefCell<VecDeque<bool>>,
    statuses: RefCell<VecDeque<ExportTask>>,
    polls: Cell<usize>,
    /// Poll count observed when each download was opened.
    downloads: RefCell<Vec<(String, usize)>>,
    /// Serve a body that breaks after its first byte.
    broken_body: Cell<bool>,
}

/// Yields one byte, then fails like a dropped connection.
struct BrokenBody {
    sent: bool,
}

impl Read for BrokenBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.sent || buf.is_empty() {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        }
        self.sent = true;
        buf[0] = b'P';
        Ok(1)
    }
}

impl FakeApi {
    fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            authorized: RefCell::new(VecDeque::new()),
            statuses: RefCell::new(VecDeque::new()),
            polls: Cell::new(0),
            downloads: RefCell::new(Vec::new()),
            broken_body: Cell::new(false),
        }
    }

    fn unauthorized_times(self, n: usize) -> Self {
        self.authorized.borrow_mut().extend(std::iter::repeat(false).take(n));
        self
    }

    fn with_broken_body(self) -> Self {
        self.broken_body.set(true);
        self
    }

    fn with_statuses(self, statuses: Vec<ExportTask>) -> Self {
        self.statuses.borrow_mut().extend(statuses);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.borrow_mut().push(call.into());
    }
}

fn content() -> UserContent {
    UserContent {
        user_ids: vec!["user-1".into()],
        workspaces: vec![Workspace::new("a", "Alpha"), Workspace::new("b", "Beta")],
    }
}

impl NotionApi for FakeApi {
    fn ask_otp(&self, email: &str) -> Result<CsrfValues, ApiError> {
        self.record(format!("ask_otp {email}"));
        Ok(CsrfValues {
            state: "state".into(),
            cookie: "cookie".into(),
        })
    }

    fn get_token(&self, csrf: &CsrfValues, otp: &str) -> Result<String, ApiError> {
        self.record(format!("get_token {} {otp}", csrf.state));
        Ok(format!("token-for-{otp}"))
    }

    fn get_user_content(&self, token: &str) -> Result<UserContent, ApiError> {
        self.record(format!("get_user_content {token}"));
        match self.authorized.borrow_mut().pop_front() {
            Some(false) => Err(ApiError::Unauthorized {
                endpoint: "loadUserContent".into(),
            }),
            _ => Ok(content()),
        }
    }

    fn launch_export_task(
        &self,
        _token: &str,
        space_id: &str,
        export_type: ExportType,
    ) -> Result<String, ApiError> {
        self.record(format!("launch {space_id} {export_type}"));
        Ok("task-1".into())
    }

    fn get_task_status(&self, _token: &str, task_id: &str) -> Result<ExportTask, ApiError> {
        self.record(format!("status {task_id}"));
        self.polls.set(self.polls.get() + 1);
        Ok(self
            .statuses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| ExportTask::complete(task_id, EXPORT_URL, "markdown")))
    }

    fn open_export(&self, url: &str) -> Result<ExportDownload, ApiError> {
        self.record(format!("open {url}"));
        self.downloads.borrow_mut().push((url.to_string(), self.polls.get()));
        if self.broken_body.get() {
            return Ok(ExportDownload {
                content_length: Some(ARCHIVE.len() as u64),
                body: Box::new(BrokenBody { sent: false }),
            });
        }
        Ok(ExportDownload {
            content_length: Some(ARCHIVE.len() as u64),
            body: Box::new(Cursor::new(ARCHIVE.to_vec())),
        })
    }
}

/// Answers prompts from fixed values and records what it was offered.
#[derive(Default)]
struct ScriptedResolver {
    email: String,
    codes: VecDeque<String>,
    space: Option<String>,
    logins: Vec<(LoginReason, Option<String>)>,
    space_defaults: Vec<Option<String>>,
}

impl ScriptedResolver {
    fn new() -> Self {
        Self {
            email: "me@example.com".into(),
            codes: VecDeque::from(vec!["111".to_string(), "222".to_string()]),
            ..Self::default()
        }
    }

    fn choosing(mut self, space: &str) -> Self {
        self.space = Some(space.into());
        self
    }
}

impl Resolver for ScriptedResolver {
    fn email(&mut self, reason: LoginReason, previous: Option<&str>) -> notion_backup::Result<String> {
        self.logins.push((reason, previous.map(str::to_string)));
        Ok(self.email.clone())
    }

    fn one_time_code(&mut self, _email: &str) -> notion_backup::Result<String> {
        Ok(self.codes.pop_front().unwrap_or_else(|| "999".into()))
    }

    fn space_id(&mut self, default: Option<&str>) -> notion_backup::Result<String> {
        self.space_defaults.push(default.map(str::to_string));
        Ok(self
            .space
            .clone()
            .or_else(|| default.map(str::to_string))
            .unwrap_or_default())
    }
}

fn options(dir: &Path) -> BackupOptions {
    let mut options = BackupOptions::new(dir);
    options.poll_interval = Duration::ZERO;
    options.show_progress = false;
    options.export_date = date();
    options
}

fn logged_in() -> MemoryConfigStore {
    MemoryConfigStore::new().with(ConfigKey::Token, "stored-token")
}

#[test]
fn happy_path_downloads_archive() {
    let out = TempDir::new().unwrap();
    let api = FakeApi::new();
    let mut resolver = ScriptedResolver::new();

    let mut service =
        BackupService::new(&api, logged_in(), &mut resolver, options(out.path())).unwrap();
    let path = service.backup().unwrap();
    assert_eq!(service.store().get(ConfigKey::SpaceId).as_deref(), Some("a"));
    drop(service);

    assert_eq!(path, out.path().join("export_a_2024-05-17_markdown.zip"));
    assert_eq!(fs::read(&path).unwrap(), ARCHIVE);
    assert_eq!(
        api.calls(),
        vec![
            "get_user_content stored-token",
            "launch a markdown",
            "status task-1",
            format!("open {EXPORT_URL}").as_str(),
        ]
    );
    // Nothing stored yet, so the first workspace is offered.
    assert_eq!(resolver.space_defaults, vec![Some("a".to_string())]);
    assert!(resolver.logins.is_empty());
}

#[test]
fn noinput_without_token_fails_before_any_request() {
    let out = TempDir::new().unwrap();
    let api = FakeApi::new();
    let mut options = options(out.path());
    options.space_id = Some("a".into());

    let mut service =
        BackupService::new(&api, MemoryConfigStore::new(), StrictResolver, options).unwrap();
    let err = service.backup().unwrap_err();

    assert!(matches!(err, BackupError::Configuration(_)), "{err}");
    assert!(api.calls().is_empty());
    assert!(service.store().is_empty());
}

#[test]
fn first_login_stores_email_and_token() {
    let out = TempDir::new().unwrap();
    let api = FakeApi::new();
    let mut resolver = ScriptedResolver::new();
    let store = MemoryConfigStore::new().with(ConfigKey::Email, "old@example.com");

    let mut service = BackupService::new(&api, store, &mut resolver, options(out.path())).unwrap();
    service.backup().unwrap();
    let store = service.store().clone();
    drop(service);

    assert_eq!(store.get(ConfigKey::Email).as_deref(), Some("me@example.com"));
    assert_eq!(store.get(ConfigKey::Token).as_deref(), Some("token-for-111"));
    assert_eq!(
        resolver.logins,
        vec![(LoginReason::Missing, Some("old@example.com".to_string()))]
    );
    assert_eq!(
        &api.calls()[..3],
        [
            "ask_otp me@example.com",
            "get_token state 111",
            "get_user_content token-for-111",
        ]
    );
}

#[test]
fn expired_token_triggers_one_relogin() {
    let out = TempDir::new().unwrap();
    let api = FakeApi::new().unauthorized_times(1);
    let mut resolver = ScriptedResolver::new();

    let mut service =
        BackupService::new(&api, logged_in(), &mut resolver, options(out.path())).unwrap();
    let path = service.backup().unwrap();
    assert_eq!(service.store().get(ConfigKey::Token).as_deref(), Some("token-for-111"));
    drop(service);

    assert!(path.exists());
    assert_eq!(resolver.logins, vec![(LoginReason::Expired, None)]);
    assert_eq!(
        &api.calls()[..4],
        [
            "get_user_content stored-token",
            "ask_otp me@example.com",
            "get_token state 111",
            "get_user_content token-for-111",
        ]
    );
}

#[test]
fn still_unauthorized_after_relogin_propagates() {
    let out = TempDir::new().unwrap();
    let api = FakeApi::new().unauthorized_times(2);
    let mut resolver = ScriptedResolver::new();

    let mut service =
        BackupService::new(&api, logged_in(), &mut resolver, options(out.path())).unwrap();
    let err = service.backup().unwrap_err();
    drop(service);

    assert!(err.is_unauthorized(), "{err}");
    assert_eq!(resolver.logins.len(), 1);
    assert!(!api.calls().iter().any(|c| c.starts_with("launch")));
    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
}

#[test]
fn noinput_with_expired_token_fails() {
    let out = TempDir::new().unwrap();
    let api = FakeApi::new().unauthorized_times(1);
    let mut options = options(out.path());
    options.space_id = Some("a".into());

    let mut service = BackupService::new(&api, logged_in(), StrictResolver, options).unwrap();
    let err = service.backup().unwrap_err();

    assert!(matches!(err, BackupError::Configuration(ref m) if m.contains("expired")));
    assert_eq!(api.calls(), vec!["get_user_content stored-token"]);
}

#[test]
fn noinput_without_space_id_fails() {
    let out = TempDir::new().unwrap();
    let api = FakeApi::new();

    let mut service =
        BackupService::new(&api, logged_in(), StrictResolver, options(out.path())).unwrap();
    let err = service.backup().unwrap_err();

    assert!(matches!(err, BackupError::Configuration(ref m) if m.contains("--space-id")));
    assert_eq!(service.store().get(ConfigKey::SpaceId), None);
}

#[test]
fn unknown_space_is_rejected_without_writes() {
    let out = TempDir::new().unwrap();
    let api = FakeApi::new();
    let mut options = options(out.path());
    options.space_id = Some("c".into());

    let mut service = BackupService::new(&api, logged_in(), StrictResolver, options).unwrap();
    let err = service.backup().unwrap_err();

    assert!(matches!(err, BackupError::Validation(_)), "{err}");
    assert_eq!(service.store().get(ConfigKey::SpaceId), None);
    assert_eq!(service.store().get(ConfigKey::Email), None);
    assert_eq!(service.store().get(ConfigKey::Token).as_deref(), Some("stored-token"));
    assert_eq!(api.calls(), vec!["get_user_content stored-token"]);
}

#[test]
fn download_waits_for_completed_task() {
    let out = TempDir::new().unwrap();
    let third_url = "https://files.example/third.zip";
    let api = FakeApi::new().with_statuses(vec![
        ExportTask::in_progress("task-1"),
        ExportTask::in_progress("task-1"),
        ExportTask::complete("task-1", third_url, "html"),
    ]);
    let mut options = options(out.path());
    options.space_id = Some("b".into());
    options.export_type = ExportType::Html;

    let mut service = BackupService::new(&api, logged_in(), StrictResolver, options).unwrap();
    let path = service.backup().unwrap();

    assert_eq!(*api.downloads.borrow(), vec![(third_url.to_string(), 3)]);
    assert_eq!(api.polls.get(), 3);
    assert_eq!(path.file_name().unwrap(), "export_b_2024-05-17_html.zip");
}

#[test]
fn failed_task_is_reported() {
    let out = TempDir::new().unwrap();
    let mut failed = ExportTask::in_progress("task-1");
    failed.status = notion_backup::ExportStatus::Failed;
    failed.error = Some("workspace too large".into());
    let api = FakeApi::new().with_statuses(vec![ExportTask::in_progress("task-1"), failed]);
    let mut options = options(out.path());
    options.space_id = Some("a".into());

    let mut service = BackupService::new(&api, logged_in(), StrictResolver, options).unwrap();
    let err = service.backup().unwrap_err();

    assert!(
        matches!(err, BackupError::ExportFailed { ref message, .. } if message == "workspace too large")
    );
    assert!(api.downloads.borrow().is_empty());
}

#[test]
fn poll_timeout_stops_waiting() {
    let out = TempDir::new().unwrap();
    let api = FakeApi::new().with_statuses(vec![ExportTask::in_progress("task-1"); 10]);
    let mut options = options(out.path());
    options.space_id = Some("a".into());
    options.poll_timeout = Some(Duration::ZERO);

    let mut service = BackupService::new(&api, logged_in(), StrictResolver, options).unwrap();
    let err = service.backup().unwrap_err();

    assert!(matches!(err, BackupError::ExportTimeout { .. }), "{err}");
    assert_eq!(api.polls.get(), 1);
}

#[test]
fn existing_archive_is_not_overwritten() {
    let out = TempDir::new().unwrap();
    let existing = out.path().join("export_a_2024-05-17_markdown.zip");
    fs::write(&existing, b"yesterday").unwrap();
    let api = FakeApi::new();
    let mut options = options(out.path());
    options.space_id = Some("a".into());

    let mut service = BackupService::new(&api, logged_in(), StrictResolver, options).unwrap();
    let path = service.backup().unwrap();

    assert_eq!(path, out.path().join("export_a_2024-05-17_markdown_1.zip"));
    assert_eq!(fs::read(&existing).unwrap(), b"yesterday");
    assert_eq!(fs::read(&path).unwrap(), ARCHIVE);
}

#[test]
fn archive_is_copied_to_copy_dir() {
    let out = TempDir::new().unwrap();
    let copies = TempDir::new().unwrap();
    let api = FakeApi::new();
    let mut options = options(out.path());
    options.space_id = Some("a".into());
    options.copy_dir = Some(copies.path().to_path_buf());

    let mut service = BackupService::new(&api, logged_in(), StrictResolver, options).unwrap();
    let path = service.backup().unwrap();

    let copy = copies.path().join(path.file_name().unwrap());
    assert_eq!(fs::read(&copy).unwrap(), ARCHIVE);
    assert_eq!(fs::read(&path).unwrap(), ARCHIVE);
}

#[test]
fn missing_directories_fail_before_any_request() {
    let out = TempDir::new().unwrap();
    let api = FakeApi::new();
    let mut options = options(out.path());
    options.copy_dir = Some(out.path().join("nope"));

    let result = BackupService::new(&api, logged_in(), StrictResolver, options);

    assert!(matches!(result, Err(BackupError::Configuration(_))));
    assert!(api.calls().is_empty());
}

#[test]
fn selected_space_becomes_next_default() {
    let out = TempDir::new().unwrap();
    let config = TempDir::new().unwrap();
    let config_path = config.path().join("config.toml");
    {
        let mut store = FileConfigStore::open(&config_path).unwrap();
        store.set(ConfigKey::Token, "stored-token").unwrap();
    }

    let api = FakeApi::new();
    let mut first = ScriptedResolver::new().choosing("b");
    let store = FileConfigStore::open(&config_path).unwrap();
    BackupService::new(&api, store, &mut first, options(out.path()))
        .unwrap()
        .backup()
        .unwrap();

    let mut second = ScriptedResolver::new();
    let store = FileConfigStore::open(&config_path).unwrap();
    let path = BackupService::new(&api, store, &mut second, options(out.path()))
        .unwrap()
        .backup()
        .unwrap();

    assert_eq!(first.space_defaults, vec![Some("a".to_string())]);
    assert_eq!(second.space_defaults, vec![Some("b".to_string())]);
    assert_eq!(path.file_name().unwrap(), "export_b_2024-05-17_markdown_1.zip");
}

#[test]
fn interrupted_download_leaves_no_partial_file() {
    let out = TempDir::new().unwrap();
    let api = FakeApi::new().with_broken_body();
    let mut options = options(out.path());
    options.space_id = Some("a".into());

    let mut service = BackupService::new(&api, logged_in(), StrictResolver, options).unwrap();
    let err = service.backup().unwrap_err();

    assert!(
        matches!(err, BackupError::Io(ref e) if e.kind() == io::ErrorKind::ConnectionReset),
        "{err}"
    );
    assert_eq!(api.downloads.borrow().len(), 1);
    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
}

#[test]
fn file_name_falls_back_to_requested_type() {
    let out = TempDir::new().unwrap();
    let mut done = ExportTask::complete("task-1", EXPORT_URL, "markdown");
    done.export_type = None;
    let api = FakeApi::new().with_statuses(vec![done]);
    let mut options = options(out.path());
    options.space_id = Some("a".into());
    options.export_type = ExportType::Html;

    let mut service = BackupService::new(&api, logged_in(), StrictResolver, options).unwrap();
    let path = service.backup().unwrap();

    assert_eq!(path, out.path().join("export_a_2024-05-17_html.zip"));
    assert_eq!(fs::read(&path).unwrap(), ARCHIVE);
}

#[test]
fn unknown_echoed_type_is_not_used_in_file_name() {
    let out = TempDir::new().unwrap();
    let api = FakeApi::new().with_statuses(vec![ExportTask::complete(
        "task-1",
        EXPORT_URL,
        "x/../../escaped",
    )]);
    let mut options = options(out.path());
    options.space_id = Some("a".into());

    let mut service = BackupService::new(&api, logged_in(), StrictResolver, options).unwrap();
    let path = service.backup().unwrap();

    assert_eq!(path, out.path().join("export_a_2024-05-17_markdown.zip"));
    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 1);
}
