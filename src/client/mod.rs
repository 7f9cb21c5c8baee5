//! HTTP transport for the agent backend.
//!
//! Provides the subset of the backend API the client consumes: the streamed
//! chat endpoint, its synchronous fallback, and the task endpoints. The
//! coordinator and poller only see the `ChatTransport` / `TaskTransport`
//! traits, so tests swap in in-memory fakes.

pub mod types;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::Config;
use crate::error::{FeedError, Result};

pub use types::{
    ChatRequest, ChatResponse, CreateTaskRequest, CreatedTask, TaskList, TaskPayload,
    TaskStepPayload, TaskSummary,
};

/// Raw body chunks of a streamed response, in arrival order.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Push-path transport.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Open the streamed chat response. Fails on connection errors and
    /// non-success statuses.
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream>;

    /// Non-streamed chat, used only as a fallback.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse>;
}

/// Pull-path transport.
#[async_trait]
pub trait TaskTransport: Send + Sync {
    async fn create_task(&self, request: &CreateTaskRequest) -> Result<CreatedTask>;
    async fn fetch_task(&self, task_id: &str) -> Result<TaskPayload>;
    async fn list_tasks(&self) -> Result<Vec<TaskSummary>>;
}

/// reqwest-backed client for both transports.
#[derive(Clone)]
pub struct FeedClient {
    base_url: String,
    client: reqwest::Client,
}

impl FeedClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self::with_client(config.base_url.as_str(), client))
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url, client }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(path: &str, resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(FeedError::status(path, status.as_u16(), body))
    }

    async fn decode<T: DeserializeOwned>(path: &str, resp: reqwest::Response) -> Result<T> {
        let resp = Self::check(path, resp).await?;
        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|e| FeedError::decode(format!("{} response", path), e))
    }
}

#[async_trait]
impl ChatTransport for FeedClient {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
        let path = "/chat/stream";
        debug!(url = %self.url(path), docs = ?request.selected_docs, "Opening chat stream");
        let resp = self
            .client
            .post(self.url(path))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;
        let resp = Self::check(path, resp).await?;
        Ok(resp.bytes_stream().map_err(FeedError::from).boxed())
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let path = "/chat";
        let resp = self.client.post(self.url(path)).json(request).send().await?;
        Self::decode(path, resp).await
    }
}

#[async_trait]
impl TaskTransport for FeedClient {
    async fn create_task(&self, request: &CreateTaskRequest) -> Result<CreatedTask> {
        let path = "/tasks";
        let resp = self.client.post(self.url(path)).json(request).send().await?;
        Self::decode(path, resp).await
    }

    async fn fetch_task(&self, task_id: &str) -> Result<TaskPayload> {
        let path = format!("/tasks/{}", urlencoding::encode(task_id));
        let resp = self.client.get(self.url(&path)).send().await?;
        Self::decode(&path, resp).await
    }

    async fn list_tasks(&self) -> Result<Vec<TaskSummary>> {
        let path = "/tasks";
        let resp = self.client.get(self.url(path)).send().await?;
        let list: TaskList = Self::decode(path, resp).await?;
        Ok(list.tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slashes() {
        let client = FeedClient::with_client("http://localhost:8000/api//", reqwest::Client::new());
        assert_eq!(client.base_url(), "http://localhost:8000/api");
        assert_eq!(client.url("/chat/stream"), "http://localhost:8000/api/chat/stream");
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        // Port 9 (discard) is not expected to accept HTTP on loopback.
        let client = FeedClient::with_client("http://127.0.0.1:9", reqwest::Client::new());
        let err = match client.open_stream(&ChatRequest::new("hi")).await {
            Ok(_) => panic!("expected connection failure"),
            Err(e) => e,
        };
        assert!(err.is_transport());
    }
}
