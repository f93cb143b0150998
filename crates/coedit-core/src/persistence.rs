//! Persistence adapter for project content.
//!
//! The session lifecycle consumes this interface at exactly two points:
//! bootstrap (download prior content) and teardown (upload the materialized
//! text). Failures are degraded, never propagated to clients: a failed
//! download yields empty content and a failed upload is dropped, both logged.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use thiserror::Error;

/// Persistence adapter I/O failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned status {0}")]
    Status(u16),
}

/// Stores and retrieves the flat text of a project on behalf of a user.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Fetches the latest stored content for `project`.
    async fn download(&self, user: &str, project: &str) -> Result<String, StoreError>;

    /// Best-effort store of materialized content.
    async fn upload(&self, user: &str, project: &str, text: &str) -> Result<(), StoreError>;
}

/// HTTP file backend: `GET`/`PUT {base}/files/{user}/{project}`.
pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.into() })
    }

    fn file_url(&self, user: &str, project: &str) -> String {
        format!("{}/files/{}/{}", self.base_url.trim_end_matches('/'), user, project)
    }
}

#[async_trait]
impl ProjectStore for HttpStore {
    async fn download(&self, user: &str, project: &str) -> Result<String, StoreError> {
        let response = self.client.get(self.file_url(user, project)).send().await?;
        if !response.status().is_success() {
            return Err(StoreError::Status(response.status().as_u16()));
        }
        Ok(response.text().await?)
    }

    async fn upload(&self, user: &str, project: &str, text: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .put(self.file_url(user, project))
            .body(text.to_string())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(StoreError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

/// In-process store used by tests and local development.
#[derive(Default)]
pub struct MemoryStore {
    files: DashMap<(String, String), String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct read-back, bypassing the adapter interface.
    pub fn get(&self, user: &str, project: &str) -> Option<String> {
        self.files
            .get(&(user.to_string(), project.to_string()))
            .map(|entry| entry.clone())
    }

    /// Pre-seed content, bypassing the adapter interface.
    pub fn put(&self, user: &str, project: &str, text: &str) {
        self.files
            .insert((user.to_string(), project.to_string()), text.to_string());
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn download(&self, user: &str, project: &str) -> Result<String, StoreError> {
        Ok(self.get(user, project).unwrap_or_default())
    }

    async fn upload(&self, user: &str, project: &str, text: &str) -> Result<(), StoreError> {
        self.put(user, project, text);
        Ok(())
    }
}
