//! 远程 Agent 服务抽象
//!
//! 所有后端（HTTP / Mock）实现 AgentsApi：agent 与 thread 的创建删除、发消息、跑 run、拉取回复。

use std::fmt::Display;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::llm::ResourceId;

/// 远程调用失败（传输层）
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("run {run_id} did not finish within {waited_secs}s")]
    RunTimeout { run_id: String, waited_secs: u64 },

    #[error("{0}")]
    Other(String),
}

impl ApiError {
    pub fn other(message: impl Display) -> Self {
        Self::Other(message.to_string())
    }
}

/// 消息角色；其它角色统一为 Other
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UrlCitation {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Annotation {
    UrlCitation { url_citation: UrlCitation },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TextContent {
    pub value: String,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl TextContent {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            annotations: Vec::new(),
        }
    }

    /// 注解中的引用 URL（保持出现顺序）
    pub fn citation_urls(&self) -> Vec<String> {
        self.annotations
            .iter()
            .filter_map(|a| match a {
                Annotation::UrlCitation { url_citation } => Some(url_citation.url.clone()),
                Annotation::Other => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: TextContent },
    #[serde(other)]
    Other,
}

/// thread 中的一条消息
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ThreadMessage {
    #[serde(default)]
    pub id: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub content: Vec<MessageContent>,
}

impl ThreadMessage {
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            id: None,
            role: Role::Assistant,
            content: vec![MessageContent::Text {
                text: TextContent::new(text),
            }],
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            ..Self::assistant_text(text)
        }
    }

    /// 第一段文本内容
    pub fn text(&self) -> Option<&TextContent> {
        self.content.iter().find_map(|c| match c {
            MessageContent::Text { text } => Some(text),
            MessageContent::Other => None,
        })
    }
}

/// 按列表顺序找第一条带文本的 assistant 回复
pub fn first_text_reply(messages: &[ThreadMessage]) -> Option<&TextContent> {
    messages
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .find_map(ThreadMessage::text)
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Expired,
    Incomplete,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Cancelled
                | RunStatus::Failed
                | RunStatus::Completed
                | RunStatus::Expired
                | RunStatus::Incomplete
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub last_error: Option<RunError>,
}

impl Run {
    /// 失败原因摘要（用于 StageCall 错误信息）
    pub fn failure_summary(&self) -> String {
        let detail = self
            .last_error
            .as_ref()
            .and_then(|e| e.message.clone().or_else(|| e.code.clone()))
            .unwrap_or_else(|| "Unknown error".to_string());
        format!("run {} ended with status {:?}: {}", self.id, self.status, detail)
    }
}

/// 远程 Agent 服务：创建/删除资源返回原始 JSON，由调用方归一化标识
#[async_trait]
pub trait AgentsApi: Send + Sync {
    async fn create_agent(&self, params: &Map<String, Value>) -> Result<Value, ApiError>;

    async fn delete_agent(&self, agent: &ResourceId) -> Result<(), ApiError>;

    async fn create_thread(&self, params: &Map<String, Value>) -> Result<Value, ApiError>;

    async fn delete_thread(&self, thread: &ResourceId) -> Result<(), ApiError>;

    /// 以 user 身份向 thread 写入一条消息
    async fn post_message(&self, thread: &ResourceId, content: &str) -> Result<(), ApiError>;

    /// 创建 run 并等待其进入终态
    async fn create_and_process_run(
        &self,
        thread: &ResourceId,
        agent: &ResourceId,
    ) -> Result<Run, ApiError>;

    /// thread 中的消息，最新在前
    async fn list_messages(&self, thread: &ResourceId) -> Result<Vec<ThreadMessage>, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_deserialize_with_citations() {
        let msg: ThreadMessage = serde_json::from_value(json!({
            "id": "msg_1",
            "role": "assistant",
            "content": [
                {"type": "image_file", "image_file": {"file_id": "f"}},
                {"type": "text", "text": {
                    "value": "Rayleigh scattering [1]",
                    "annotations": [
                        {"type": "url_citation", "url_citation": {
                            "url": "https://en.wikipedia.org/wiki/Rayleigh_scattering",
                            "title": "Wiki"
                        }},
                        {"type": "file_citation", "file_citation": {}}
                    ]
                }}
            ]
        }))
        .unwrap();

        let text = msg.text().unwrap();
        assert_eq!(text.value, "Rayleigh scattering [1]");
        assert_eq!(
            text.citation_urls(),
            vec!["https://en.wikipedia.org/wiki/Rayleigh_scattering".to_string()]
        );
    }

    #[test]
    fn test_first_text_reply_skips_user_and_empty() {
        let empty = ThreadMessage {
            id: None,
            role: Role::Assistant,
            content: vec![MessageContent::Other],
        };
        let messages = vec![
            ThreadMessage::user_text("question"),
            empty,
            ThreadMessage::assistant_text("VALID"),
            ThreadMessage::assistant_text("older"),
        ];
        assert_eq!(first_text_reply(&messages).unwrap().value, "VALID");
        assert!(first_text_reply(&[]).is_none());
    }

    #[test]
    fn test_run_status() {
        let run: Run = serde_json::from_value(json!({
            "id": "run_1",
            "status": "failed",
            "last_error": {"code": "rate_limit_exceeded", "message": "slow down"}
        }))
        .unwrap();
        assert!(run.status.is_terminal());
        assert!(run.failure_summary().contains("slow down"));

        let run: Run = serde_json::from_value(json!({"id": "r", "status": "brand_new"})).unwrap();
        assert_eq!(run.status, RunStatus::Unknown);
        assert!(!RunStatus::InProgress.is_terminal());
    }
}
