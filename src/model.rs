// Domain types exchanged between the API client and the backup workflow.
//
// The `Raw*` structs mirror Notion's JSON; the public types are what the
// rest of the crate works with.

use crate::error::BackupError;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::io::Read;
use std::str::FromStr;

/// Format of the exported archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportType {
    Html,
    #[default]
    Markdown,
}

impl ExportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportType::Html => "html",
            ExportType::Markdown => "markdown",
        }
    }
}

impl fmt::Display for ExportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportType {
    type Err = BackupError;

    /// Only the exact lowercase names are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "html" => Ok(ExportType::Html),
            "markdown" => Ok(ExportType::Markdown),
            other => Err(BackupError::configuration(format!(
                "export type should be either \"html\" or \"markdown\", got \"{other}\""
            ))),
        }
    }
}

/// Opaque values binding a login-code request to its redemption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfValues {
    /// `csrfState` from the JSON body.
    pub state: String,
    /// Value of the `csrf` cookie.
    pub cookie: String,
}

/// A Notion workspace ("space" in the API).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub id: String,
    pub name: String,
}

impl Workspace {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Account metadata: the users and workspaces visible to the session,
/// in the order the server listed them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserContent {
    pub user_ids: Vec<String>,
    pub workspaces: Vec<Workspace>,
}

#[derive(Deserialize)]
struct RawUserContent {
    #[serde(default)]
    notion_user: Map<String, Value>,
    #[serde(default)]
    space: Map<String, Value>,
}

impl UserContent {
    /// Build from a `{notion_user, space}` record map. A `recordMap`
    /// wrapper around it is unwrapped.
    pub fn from_json(body: Value) -> serde_json::Result<Self> {
        let body = match body {
            Value::Object(mut map) if map.contains_key("recordMap") => {
                map.remove("recordMap").unwrap_or(Value::Null)
            }
            other => other,
        };
        let raw: RawUserContent = serde_json::from_value(body)?;
        let workspaces = raw
            .space
            .iter()
            .map(|(id, record)| Workspace::new(id.clone(), space_name(record).unwrap_or(id)))
            .collect();
        Ok(Self {
            user_ids: raw.notion_user.keys().cloned().collect(),
            workspaces,
        })
    }

    pub fn contains_workspace(&self, id: &str) -> bool {
        self.workspaces.iter().any(|w| w.id == id)
    }
}

// Records come either as `{value: {name}}` or nested as `{value: {value: {name}}}`.
fn space_name(record: &Value) -> Option<&str> {
    let value = record.get("value")?;
    value
        .get("name")
        .or_else(|| value.get("value").and_then(|inner| inner.get("name")))
        .and_then(Value::as_str)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStatus {
    InProgress,
    Complete,
    Failed,
}

/// Snapshot of a server-side export task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTask {
    pub id: String,
    pub status: ExportStatus,
    /// Present once the task is complete.
    pub export_url: Option<String>,
    /// Export type echoed back by the server.
    pub export_type: Option<String>,
    pub error: Option<String>,
}

impl ExportTask {
    pub fn in_progress(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: ExportStatus::InProgress,
            export_url: None,
            export_type: None,
            error: None,
        }
    }

    pub fn complete(id: impl Into<String>, url: impl Into<String>, export_type: &str) -> Self {
        Self {
            id: id.into(),
            status: ExportStatus::Complete,
            export_url: Some(url.into()),
            export_type: Some(export_type.to_string()),
            error: None,
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct RawTask {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    status: Option<RawTaskStatus>,
    #[serde(default)]
    request: Option<RawTaskRequest>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct RawTaskStatus {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(rename = "exportURL", default)]
    export_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTaskRequest {
    #[serde(default)]
    export_options: Option<RawExportOptions>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExportOptions {
    #[serde(default)]
    export_type: Option<String>,
}

impl RawTask {
    pub(crate) fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Anything that is neither failed nor complete is still running.
    pub(crate) fn into_task(self, fallback_id: &str) -> ExportTask {
        let (kind, export_url) = match self.status {
            Some(status) => (status.kind, status.export_url),
            None => (None, None),
        };
        let status = if self.state.as_deref() == Some("failure") {
            ExportStatus::Failed
        } else if kind.as_deref() == Some("complete") {
            ExportStatus::Complete
        } else {
            ExportStatus::InProgress
        };
        ExportTask {
            id: self.id.unwrap_or_else(|| fallback_id.to_string()),
            status,
            export_url,
            export_type: self
                .request
                .and_then(|r| r.export_options)
                .and_then(|o| o.export_type),
            error: self.error,
        }
    }
}

/// An open export download: the body stream and its size if announced.
pub struct ExportDownload {
    pub content_length: Option<u64>,
    pub body: Box<dyn Read>,
}

impl fmt::Debug for ExportDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportDownload")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}
