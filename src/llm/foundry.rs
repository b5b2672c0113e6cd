//! Foundry / Azure OpenAI Agents REST 客户端
//!
//! 直接用 reqwest 调用 assistants / threads / messages / runs 接口；
//! create_and_process_run 创建 run 后按固定间隔轮询，直到终态或超时。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::time::Instant;

use crate::llm::{AgentsApi, ApiError, ResourceId, Run, ThreadMessage};

pub const DEFAULT_API_VERSION: &str = "2024-07-01-preview";

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    data: Vec<ThreadMessage>,
}

pub struct FoundryClient {
    http: Client,
    endpoint: String,
    api_version: String,
    api_key: Option<String>,
    poll_interval: Duration,
    run_timeout: Duration,
}

impl FoundryClient {
    pub fn new(
        endpoint: &str,
        api_key: Option<&str>,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            api_key: api_key.map(String::from).filter(|k| !k.trim().is_empty()),
            poll_interval: Duration::from_millis(500),
            run_timeout: Duration::from_secs(300),
        })
    }

    pub fn with_api_version(mut self, version: &str) -> Self {
        if !version.trim().is_empty() {
            self.api_version = version.trim().to_string();
        }
        self
    }

    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.run_timeout = timeout;
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.endpoint, path);
        let mut req = self
            .http
            .request(method, url)
            .query(&[("api-version", self.api_version.as_str())]);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, ApiError> {
        let response = req
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { status, body });
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        self.send(req)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn get_run(&self, thread: &ResourceId, run_id: &str) -> Result<Run, ApiError> {
        let path = format!("threads/{}/runs/{}", thread, run_id);
        self.send_json(self.request(Method::GET, &path)).await
    }
}

#[async_trait]
impl AgentsApi for FoundryClient {
    async fn create_agent(&self, params: &Map<String, Value>) -> Result<Value, ApiError> {
        self.send_json(self.request(Method::POST, "assistants").json(params))
            .await
    }

    async fn delete_agent(&self, agent: &ResourceId) -> Result<(), ApiError> {
        let path = format!("assistants/{}", agent);
        self.send(self.request(Method::DELETE, &path)).await?;
        Ok(())
    }

    async fn create_thread(&self, params: &Map<String, Value>) -> Result<Value, ApiError> {
        self.send_json(self.request(Method::POST, "threads").json(params))
            .await
    }

    async fn delete_thread(&self, thread: &ResourceId) -> Result<(), ApiError> {
        let path = format!("threads/{}", thread);
        self.send(self.request(Method::DELETE, &path)).await?;
        Ok(())
    }

    async fn post_message(&self, thread: &ResourceId, content: &str) -> Result<(), ApiError> {
        let path = format!("threads/{}/messages", thread);
        let payload = json!({ "role": "user", "content": content });
        self.send(self.request(Method::POST, &path).json(&payload))
            .await?;
        Ok(())
    }

    async fn create_and_process_run(
        &self,
        thread: &ResourceId,
        agent: &ResourceId,
    ) -> Result<Run, ApiError> {
        let path = format!("threads/{}/runs", thread);
        let payload = json!({ "assistant_id": agent.as_str() });
        let mut run: Run = self
            .send_json(self.request(Method::POST, &path).json(&payload))
            .await?;
        tracing::debug!("Created run {} on thread {}", run.id, thread);

        let started = Instant::now();
        while !run.status.is_terminal() {
            if started.elapsed() >= self.run_timeout {
                return Err(ApiError::RunTimeout {
                    run_id: run.id,
                    waited_secs: self.run_timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
            run = self.get_run(thread, &run.id).await?;
            tracing::debug!("Run {} status: {:?}", run.id, run.status);
        }
        Ok(run)
    }

    async fn list_messages(&self, thread: &ResourceId) -> Result<Vec<ThreadMessage>, ApiError> {
        let path = format!("threads/{}/messages", thread);
        let list: MessageList = self
            .send_json(self.request(Method::GET, &path).query(&[("order", "desc")]))
            .await?;
        Ok(list.data)
    }
}
