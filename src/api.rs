//! HTTP client for the quest server
//!
//! Thin wrapper over reqwest: JSON in/out, 5 second timeout, bearer token on
//! authenticated routes. The server is a stock DRF viewset, so list
//! filtering/ordering happens server-side via the `search` and `ordering`
//! query parameters.

use crate::model::{NewTask, SortKey, Task, TaskPatch};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from talking to the server, grouped by how callers recover.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// 401 from the token endpoint. Surfaced as-is, never retried.
    #[error("invalid username or password")]
    InvalidCredentials,
    /// Any other non-success HTTP status.
    #[error("server returned {status}: {detail}")]
    Status { status: u16, detail: String },
    /// Connect failure, timeout, or undecodable body.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access: String,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
}

/// Client for one server. Cheap to clone; background tasks each own a copy.
///
/// The token is captured at construction (or via [`ApiClient::set_token`]).
/// Login/logout rebuild the client rather than re-reading storage per
/// request: in-process memory is the source of truth for the session.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("questlog/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach the bearer header when a token is present; anonymous otherwise.
    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.header("Authorization", format!("Bearer {}", token)),
            None => builder,
        }
    }

    /// Exchange credentials for an access token. Does not store the token;
    /// the session layer owns that.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, ApiError> {
        let response = self
            .http
            .post(self.url("/token/"))
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ApiError::InvalidCredentials);
        }
        let response = check_status(response).await?;
        let token: TokenResponse = response.json().await?;
        Ok(token.access)
    }

    /// Create an account. The server responds with the created user payload,
    /// which the client has no use for.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<(), ApiError> {
        let response = self
            .http
            .post(self.url("/register/"))
            .json(&RegisterRequest {
                username,
                email,
                password,
            })
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    /// Fetch the task list, filtered and ordered server-side.
    pub async fn list_tasks(&self, search: &str, sort: SortKey) -> Result<Vec<Task>, ApiError> {
        let request = self
            .http
            .get(self.url("/tasks/"))
            .query(&[("search", search), ("ordering", sort.as_param())]);
        let response = self.authed(request).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    pub async fn get_task(&self, id: i64) -> Result<Task, ApiError> {
        let request = self.http.get(self.url(&format!("/tasks/{}/", id)));
        let response = check_status(self.authed(request).send().await?).await?;
        Ok(response.json().await?)
    }

    pub async fn create_task(&self, task: &NewTask) -> Result<Task, ApiError> {
        let request = self.http.post(self.url("/tasks/")).json(task);
        let response = check_status(self.authed(request).send().await?).await?;
        Ok(response.json().await?)
    }

    pub async fn update_task(&self, id: i64, patch: &TaskPatch) -> Result<Task, ApiError> {
        let request = self
            .http
            .patch(self.url(&format!("/tasks/{}/", id)))
            .json(patch);
        let response = check_status(self.authed(request).send().await?).await?;
        Ok(response.json().await?)
    }

    pub async fn delete_task(&self, id: i64) -> Result<(), ApiError> {
        let request = self.http.delete(self.url(&format!("/tasks/{}/", id)));
        check_status(self.authed(request).send().await?).await?;
        Ok(())
    }
}

/// Turn a non-success response into `ApiError::Status`, keeping a trimmed
/// body excerpt for the status line.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response.text().await.unwrap_or_default();
    let detail = if detail.len() > 200 {
        let mut end = 200;
        while end > 0 && !detail.is_char_boundary(end) {
            end -= 1;
        }
        detail[..end].to_string()
    } else {
        detail
    };
    Err(ApiError::Status {
        status: status.as_u16(),
        detail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_deserialization() {
        let json = r#"{"access": "abc.def.ghi"}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.access, "abc.def.ghi");
    }

    #[test]
    fn test_login_request_serialization() {
        let body = serde_json::to_string(&LoginRequest {
            username: "hero",
            password: "hunter2",
        })
        .unwrap();
        assert_eq!(body, r#"{"username":"hero","password":"hunter2"}"#);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ApiClient::new("http://localhost:8000/api/").unwrap();
        assert_eq!(client.url("/tasks/"), "http://localhost:8000/api/tasks/");
    }

    #[test]
    fn test_task_list_deserialization() {
        let json = r#"[
            {"id": 1, "title": "a", "description": "d", "is_done": false, "user": "u"},
            {"id": 2, "title": "b", "description": null, "is_done": true, "user": "u"}
        ]"#;
        let tasks: Vec<Task> = serde_json::from_str(json).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].description.as_deref(), Some("d"));
        assert!(tasks[1].is_done);
    }
}
