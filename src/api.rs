// API client module: a small blocking HTTP client for Notion's private
// v3 API. It holds no session state; CSRF values and the session token
// are passed in explicitly on every call.

use crate::error::ApiError;
use crate::model::{CsrfValues, ExportDownload, ExportTask, ExportType, RawTask, UserContent};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::COOKIE;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Default root of the private API.
pub const NOTION_API_ROOT: &str = "https://www.notion.so/api/v3";

/// Applied to every API call; the archive download itself is unbounded.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const CSRF_COOKIE: &str = "csrf";
const SESSION_COOKIE: &str = "token_v2";

/// The remote operations the backup workflow needs.
pub trait NotionApi {
    /// Ask Notion to email a one-time login code.
    fn ask_otp(&self, email: &str) -> Result<CsrfValues, ApiError>;

    /// Redeem a one-time code for a session token.
    fn get_token(&self, csrf: &CsrfValues, otp: &str) -> Result<String, ApiError>;

    /// Users and workspaces visible to the session.
    fn get_user_content(&self, token: &str) -> Result<UserContent, ApiError>;

    /// Start an export of one workspace and return the task id.
    fn launch_export_task(
        &self,
        token: &str,
        space_id: &str,
        export_type: ExportType,
    ) -> Result<String, ApiError>;

    fn get_task_status(&self, token: &str, task_id: &str) -> Result<ExportTask, ApiError>;

    /// Open a streaming download of a finished export.
    fn open_export(&self, url: &str) -> Result<ExportDownload, ApiError>;
}

impl<T: NotionApi + ?Sized> NotionApi for &T {
    fn ask_otp(&self, email: &str) -> Result<CsrfValues, ApiError> {
        (**self).ask_otp(email)
    }

    fn get_token(&self, csrf: &CsrfValues, otp: &str) -> Result<String, ApiError> {
        (**self).get_token(csrf, otp)
    }

    fn get_user_content(&self, token: &str) -> Result<UserContent, ApiError> {
        (**self).get_user_content(token)
    }

    fn launch_export_task(
        &self,
        token: &str,
        space_id: &str,
        export_type: ExportType,
    ) -> Result<String, ApiError> {
        (**self).launch_export_task(token, space_id, export_type)
    }

    fn get_task_status(&self, token: &str, task_id: &str) -> Result<ExportTask, ApiError> {
        (**self).get_task_status(token, task_id)
    }

    fn open_export(&self, url: &str) -> Result<ExportDownload, ApiError> {
        (**self).open_export(url)
    }
}

/// Blocking reqwest client bound to an API root.
#[derive(Clone)]
pub struct NotionClient {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendTemporaryPasswordResponse {
    csrf_state: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnqueueTaskResponse {
    task_id: String,
}

#[derive(Deserialize)]
struct GetTasksResponse {
    #[serde(default)]
    results: Vec<RawTask>,
}

impl NotionClient {
    /// Create a client for the given API root, e.g. `https://www.notion.so/api/v3`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        // No client-wide timeout: API calls set their own, downloads run unbounded.
        let client = Client::builder()
            .timeout(None::<Duration>)
            .build()
            .map_err(|source| ApiError::Transport {
                endpoint: "client".into(),
                source,
            })?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(NotionClient { client, base_url })
    }

    /// Create a client configured from the environment variable
    /// `NOTION_API_ROOT`, falling back to the public Notion endpoint.
    pub fn from_env() -> Result<Self, ApiError> {
        let base_url = std::env::var("NOTION_API_ROOT").unwrap_or_else(|_| NOTION_API_ROOT.into());
        Self::new(base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post(&self, endpoint: &str, body: &Value) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, endpoint);
        tracing::debug!(%url, "POST");
        self.client.post(url).timeout(REQUEST_TIMEOUT).json(body)
    }

    fn authenticated(&self, endpoint: &str, token: &str, body: &Value) -> RequestBuilder {
        self.post(endpoint, body)
            .header(COOKIE, format!("{SESSION_COOKIE}={token}"))
    }

    fn send(endpoint: &str, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().map_err(|source| ApiError::Transport {
            endpoint: endpoint.to_string(),
            source,
        })?;
        check_status(endpoint, response)
    }

    fn read_json<T: serde::de::DeserializeOwned>(
        endpoint: &str,
        response: Response,
    ) -> Result<T, ApiError> {
        response.json().map_err(|e| ApiError::malformed(endpoint, e.to_string()))
    }
}

fn check_status(endpoint: &str, response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    tracing::debug!(endpoint, %status, "response");
    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized {
            endpoint: endpoint.to_string(),
        });
    }
    if !status.is_success() {
        return Err(ApiError::Status {
            endpoint: endpoint.to_string(),
            status,
        });
    }
    Ok(response)
}

fn cookie_value(response: &Response, name: &str) -> Option<String> {
    response
        .cookies()
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
}

impl NotionApi for NotionClient {
    fn ask_otp(&self, email: &str) -> Result<CsrfValues, ApiError> {
        let endpoint = "sendTemporaryPassword";
        let body = json!({
            "email": email,
            "disableLoginLink": false,
            "native": false,
            "isSignup": false,
        });
        let response = Self::send(endpoint, self.post(endpoint, &body))?;
        // Read the cookie before the body consumes the response.
        let cookie = cookie_value(&response, CSRF_COOKIE)
            .ok_or_else(|| ApiError::malformed(endpoint, "missing csrf cookie"))?;
        let parsed: SendTemporaryPasswordResponse = Self::read_json(endpoint, response)?;
        Ok(CsrfValues {
            state: parsed.csrf_state,
            cookie,
        })
    }

    fn get_token(&self, csrf: &CsrfValues, otp: &str) -> Result<String, ApiError> {
        let endpoint = "loginWithEmail";
        let body = json!({ "state": csrf.state, "password": otp });
        let request = self
            .post(endpoint, &body)
            .header(COOKIE, format!("{CSRF_COOKIE}={}", csrf.cookie));
        let response = Self::send(endpoint, request)?;
        cookie_value(&response, SESSION_COOKIE)
            .ok_or_else(|| ApiError::malformed(endpoint, "missing token_v2 cookie"))
    }

    fn get_user_content(&self, token: &str) -> Result<UserContent, ApiError> {
        let endpoint = "loadUserContent";
        let response = Self::send(endpoint, self.authenticated(endpoint, token, &json!({})))?;
        let body: Value = Self::read_json(endpoint, response)?;
        UserContent::from_json(body).map_err(|e| ApiError::malformed(endpoint, e.to_string()))
    }

    fn launch_export_task(
        &self,
        token: &str,
        space_id: &str,
        export_type: ExportType,
    ) -> Result<String, ApiError> {
        let endpoint = "enqueueTask";
        let body = json!({
            "task": {
                "eventName": "exportSpace",
                "request": {
                    "spaceId": space_id,
                    "exportOptions": {
                        "exportType": export_type.as_str(),
                        "timeZone": "UTC",
                        "locale": "en",
                    },
                },
            },
        });
        let response = Self::send(endpoint, self.authenticated(endpoint, token, &body))?;
        let parsed: EnqueueTaskResponse = Self::read_json(endpoint, response)?;
        Ok(parsed.task_id)
    }

    fn get_task_status(&self, token: &str, task_id: &str) -> Result<ExportTask, ApiError> {
        let endpoint = "getTasks";
        let body = json!({ "taskIds": [task_id] });
        let response = Self::send(endpoint, self.authenticated(endpoint, token, &body))?;
        let parsed: GetTasksResponse = Self::read_json(endpoint, response)?;
        let mut results = parsed.results;
        let index = results
            .iter()
            .position(|t| t.id().map_or(true, |id| id == task_id))
            .ok_or_else(|| ApiError::malformed(endpoint, format!("task {task_id} not listed")))?;
        Ok(results.swap_remove(index).into_task(task_id))
    }

    fn open_export(&self, url: &str) -> Result<ExportDownload, ApiError> {
        let endpoint = "export download";
        tracing::debug!(%url, "GET");
        let response = Self::send(endpoint, self.client.get(url))?;
        Ok(ExportDownload {
            content_length: response.content_length(),
            body: Box::new(response),
        })
    }
}
