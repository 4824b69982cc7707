// src/services/api_client.rs
//! HTTP adapter to the workout application.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::models::{SportId, UserId, WorkoutId};
use crate::services::collaborators::{
    CatalogError, ImportError, SportCatalog, UserDirectory, UserLookupError, WorkoutImporter,
};

const IMPORT_NOTES: &str = "Imported from sink folder";

#[derive(Debug, thiserror::Error)]
pub enum ApiClientError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Invalid API URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

#[derive(Debug, Deserialize)]
struct SinkUserResponse {
    id: i64,
    #[serde(default)]
    suspended: bool,
}

#[derive(Debug, Deserialize)]
struct ImportResponse {
    workout_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

#[derive(Clone)]
pub struct WorkoutApiClient {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl std::fmt::Debug for WorkoutApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkoutApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl WorkoutApiClient {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ApiClientError> {
        let invalid = |reason: String| ApiClientError::InvalidUrl {
            url: base_url.to_string(),
            reason,
        };
        let parsed = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if parsed.cannot_be_a_base() {
            return Err(invalid("not a base URL".to_string()));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: parsed,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiClientError::InvalidUrl {
                url: self.base_url.to_string(),
                reason: "not a base URL".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    pub async fn health_check(&self) -> Result<bool, ApiClientError> {
        let url = self.endpoint(&["api", "ping"])?;
        let response = self.authorized(self.client.get(url)).send().await?;
        Ok(response.status().is_success())
    }
}

async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(parsed) => parsed.message,
        Err(_) if !body.trim().is_empty() => body.trim().to_string(),
        Err(_) => format!("HTTP {}", status),
    }
}

#[async_trait]
impl UserDirectory for WorkoutApiClient {
    async fn resolve_user(&self, username: &str) -> Result<UserId, UserLookupError> {
        let url = self
            .endpoint(&["api", "sink", "users", username])
            .map_err(|e| UserLookupError::Unavailable(e.to_string()))?;
        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(|e| UserLookupError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(UserLookupError::NotFound(username.to_string())),
            status if status.is_success() => {
                let user: SinkUserResponse = response
                    .json()
                    .await
                    .map_err(|e| UserLookupError::Unavailable(e.to_string()))?;
                if user.suspended {
                    Err(UserLookupError::Suspended(username.to_string()))
                } else {
                    Ok(UserId(user.id))
                }
            }
            _ => Err(UserLookupError::Unavailable(error_message(response).await)),
        }
    }
}

#[async_trait]
impl SportCatalog for WorkoutApiClient {
    async fn validate_sport(&self, sport_id: SportId) -> Result<bool, CatalogError> {
        let id = sport_id.to_string();
        let url = self
            .endpoint(&["api", "sports", &id])
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;
        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(CatalogError::Unavailable(error_message(response).await)),
        }
    }
}

#[async_trait]
impl WorkoutImporter for WorkoutApiClient {
    async fn import_workout(
        &self,
        owner: UserId,
        sport_id: SportId,
        file: &Path,
    ) -> Result<WorkoutId, ImportError> {
        let bytes = tokio::fs::read(file).await.map_err(|source| ImportError::Io {
            path: file.to_path_buf(),
            source,
        })?;
        let file_name = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workout".to_string());

        let form = Form::new()
            .text("user_id", owner.to_string())
            .text("sport_id", sport_id.to_string())
            .text("notes", IMPORT_NOTES)
            .part("file", Part::bytes(bytes).file_name(file_name));

        let url = self
            .endpoint(&["api", "sink", "workouts"])
            .map_err(|e| ImportError::Unavailable(e.to_string()))?;
        let response = self
            .authorized(self.client.post(url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ImportError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(ImportError::Rejected(error_message(response).await));
        }
        if !status.is_success() {
            return Err(ImportError::Unavailable(error_message(response).await));
        }

        let created: ImportResponse = response
            .json()
            .await
            .map_err(|e| ImportError::Unavailable(format!("Invalid response: {}", e)))?;
        Ok(WorkoutId(created.workout_id))
    }
}
