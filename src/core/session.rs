//! Agent 会话：一次阶段调用内的 agent + thread 生命周期
//!
//! `run` 进入时依次创建 agent、thread，执行调用方的 body，退出时无论成功、被拒或出错都会
//! 先删 thread 再删 agent。删除失败只记录不抛出，绝不覆盖 body 的原始错误。
//!
//! 状态流转：
//! Unopened -> AgentCreated -> FullyOpen -> Released
//! Unopened -> CreateFailed -> Released（未创建任何资源，不做删除）
//! AgentCreated -> ThreadCreateFailed -> Released（只删 agent）

use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::{QnaError, ResourceKind};
use crate::llm::{AgentsApi, ApiError, IntoResourceId, ResourceId};

/// 创建 agent 的参数；值为空的选项在发往远程前被剔除
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentSpec {
    pub model: Option<String>,
    pub name: Option<String>,
    pub instructions: Option<String>,
    pub tools: Option<Vec<Value>>,
    pub metadata: Option<Map<String, Value>>,
    /// 其它透传参数，同名时覆盖上面的字段
    pub extra: Map<String, Value>,
}

impl AgentSpec {
    pub fn new(model: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// 远程接口拒绝 null / 空字段，这里统一过滤
    pub fn creation_params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        let strings = [
            ("model", &self.model),
            ("name", &self.name),
            ("instructions", &self.instructions),
        ];
        for (key, value) in strings {
            if let Some(v) = value {
                params.insert(key.to_string(), Value::String(v.clone()));
            }
        }
        if let Some(tools) = &self.tools {
            params.insert("tools".to_string(), Value::Array(tools.clone()));
        }
        if let Some(metadata) = &self.metadata {
            params.insert("metadata".to_string(), Value::Object(metadata.clone()));
        }
        params.extend(self.extra.clone());
        params.retain(|_, v| !is_blank(v));
        params
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unopened,
    AgentCreated,
    FullyOpen,
    CreateFailed,
    ThreadCreateFailed,
    Released,
}

/// body 可用的句柄对，仅在 `run` 的作用域内有效
#[derive(Debug, Clone)]
pub struct SessionHandles {
    pub agent: ResourceId,
    pub thread: ResourceId,
}

/// 删除失败的记录（不会向上传播）
#[derive(Error, Debug, Clone)]
#[error("failed to delete {resource} {id}: {source}")]
pub struct CleanupError {
    pub resource: ResourceKind,
    pub id: ResourceId,
    #[source]
    pub source: ApiError,
}

/// 单次使用的 agent + thread 会话
pub struct AgentSession {
    api: Arc<dyn AgentsApi>,
    spec: AgentSpec,
    state: SessionState,
    agent_id: Option<ResourceId>,
    thread_id: Option<ResourceId>,
    cleanup_errors: Vec<CleanupError>,
}

impl AgentSession {
    pub fn new(api: Arc<dyn AgentsApi>, spec: AgentSpec) -> Self {
        Self {
            api,
            spec,
            state: SessionState::Unopened,
            agent_id: None,
            thread_id: None,
            cleanup_errors: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// 当前 agent 句柄；尚未创建时为 None
    pub fn agent_id(&self) -> Option<&ResourceId> {
        self.agent_id.as_ref()
    }

    /// 当前 thread 句柄；尚未创建时为 None
    pub fn thread_id(&self) -> Option<&ResourceId> {
        self.thread_id.as_ref()
    }

    /// 释放阶段被吞掉的删除错误
    pub fn cleanup_errors(&self) -> &[CleanupError] {
        &self.cleanup_errors
    }

    /// 打开会话、执行 body、释放资源。
    ///
    /// - 创建失败：返回 `QnaError::SessionCreation`，已创建的 agent 仍会被删除
    /// - body 出错：先释放，再原样返回 body 的错误
    /// - 删除出错：记录到 `cleanup_errors`，不影响返回值
    pub async fn run<T, F, Fut>(&mut self, body: F) -> Result<T, QnaError>
    where
        F: FnOnce(SessionHandles) -> Fut,
        Fut: Future<Output = Result<T, QnaError>>,
    {
        if self.state != SessionState::Unopened {
            return Err(QnaError::SessionReused);
        }

        let handles = match self.open().await {
            Ok(handles) => handles,
            Err(e) => {
                self.release().await;
                return Err(e);
            }
        };

        let outcome = body(handles).await;
        self.release().await;
        outcome
    }

    async fn open(&mut self) -> Result<SessionHandles, QnaError> {
        let params = self.spec.creation_params();
        let agent = match self.api.create_agent(&params).await {
            Ok(raw) => raw.resource_id().ok_or_else(|| {
                QnaError::session_creation(ResourceKind::Agent, "response carried no identifier")
            }),
            Err(e) => Err(QnaError::session_creation(ResourceKind::Agent, e)),
        };
        let agent = match agent {
            Ok(id) => id,
            Err(e) => {
                tracing::error!("Failed to create agent: {}", e);
                self.state = SessionState::CreateFailed;
                return Err(e);
            }
        };
        tracing::debug!("Created agent {}", agent);
        self.agent_id = Some(agent.clone());
        self.state = SessionState::AgentCreated;

        let thread = match self.api.create_thread(&Map::new()).await {
            Ok(raw) => raw.resource_id().ok_or_else(|| {
                QnaError::session_creation(ResourceKind::Thread, "response carried no identifier")
            }),
            Err(e) => Err(QnaError::session_creation(ResourceKind::Thread, e)),
        };
        let thread = match thread {
            Ok(id) => id,
            Err(e) => {
                tracing::error!("Failed to create thread for agent {}: {}", agent, e);
                self.state = SessionState::ThreadCreateFailed;
                return Err(e);
            }
        };
        tracing::debug!("Created thread {}", thread);
        self.thread_id = Some(thread.clone());
        self.state = SessionState::FullyOpen;

        Ok(SessionHandles { agent, thread })
    }

    /// 先删 thread 再删 agent；每个删除独立尝试，至多一次
    async fn release(&mut self) {
        if self.state == SessionState::Released {
            return;
        }

        if let Some(thread) = self.thread_id.clone() {
            match self.api.delete_thread(&thread).await {
                Ok(()) => tracing::info!("Deleted thread {}", thread),
                Err(source) => {
                    tracing::warn!("Failed to delete thread {}: {}", thread, source);
                    self.cleanup_errors.push(CleanupError {
                        resource: ResourceKind::Thread,
                        id: thread,
                        source,
                    });
                }
            }
        }

        if let Some(agent) = self.agent_id.clone() {
            match self.api.delete_agent(&agent).await {
                Ok(()) => tracing::info!("Deleted agent {}", agent),
                Err(source) => {
                    tracing::warn!("Failed to delete agent {}: {}", agent, source);
                    self.cleanup_errors.push(CleanupError {
                        resource: ResourceKind::Agent,
                        id: agent,
                        source,
                    });
                }
            }
        }

        self.state = SessionState::Released;
    }
}

impl Drop for AgentSession {
    fn drop(&mut self) {
        // run 的 future 被中途丢弃时走到这里，资源已无法异步删除
        if self.state != SessionState::Released
            && (self.agent_id.is_some() || self.thread_id.is_some())
        {
            tracing::error!(
                "Agent session dropped before release; leaked agent {:?}, thread {:?}",
                self.agent_id.as_ref().map(ResourceId::as_str),
                self.thread_id.as_ref().map(ResourceId::as_str)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageKind;
    use crate::llm::{ApiCall, CallKind, IdShape, MockAgentsApi};
    use serde_json::json;

    fn spec() -> AgentSpec {
        AgentSpec::new("gpt-4.1", "answer-checker").with_instructions("check")
    }

    fn session(api: &Arc<MockAgentsApi>) -> AgentSession {
        AgentSession::new(api.clone(), spec())
    }

    #[test]
    fn test_creation_params_drop_absent_values() {
        let mut spec = AgentSpec {
            model: Some("gpt-4.1".into()),
            name: None,
            instructions: Some("  ".into()),
            tools: Some(vec![]),
            ..AgentSpec::default()
        };
        spec.extra.insert("temperature".into(), json!(0.2));
        spec.extra.insert("top_p".into(), Value::Null);

        let params = spec.creation_params();
        assert_eq!(params.get("model"), Some(&json!("gpt-4.1")));
        assert_eq!(params.get("temperature"), Some(&json!(0.2)));
        assert!(!params.contains_key("name"));
        assert!(!params.contains_key("instructions"));
        assert!(!params.contains_key("tools"));
        assert!(!params.contains_key("top_p"));
    }

    #[test]
    fn test_extra_overrides_typed_fields() {
        let mut spec = spec();
        spec.extra.insert("model".into(), json!("gpt-4o"));
        assert_eq!(spec.creation_params().get("model"), Some(&json!("gpt-4o")));
    }

    #[tokio::test]
    async fn test_happy_path_releases_thread_then_agent() {
        let api = Arc::new(MockAgentsApi::new());
        let mut s = session(&api);
        assert!(s.agent_id().is_none());
        assert!(s.thread_id().is_none());

        let value = s
            .run(|h| async move { Ok(format!("{}|{}", h.agent, h.thread)) })
            .await
            .unwrap();

        let agent = s.agent_id().unwrap().clone();
        let thread = s.thread_id().unwrap().clone();
        assert_eq!(value, format!("{}|{}", agent, thread));
        assert_eq!(s.state(), SessionState::Released);
        assert!(s.cleanup_errors().is_empty());

        let calls = api.calls();
        assert_eq!(calls.len(), 4);
        assert!(matches!(calls[0], ApiCall::CreateAgent(_)));
        assert!(matches!(calls[1], ApiCall::CreateThread));
        assert_eq!(calls[2], ApiCall::DeleteThread(thread));
        assert_eq!(calls[3], ApiCall::DeleteAgent(agent));
        assert_eq!(api.live_resources(), 0);
    }

    #[tokio::test]
    async fn test_agent_creation_failure_releases_nothing() {
        let api = Arc::new(MockAgentsApi::new().failing(CallKind::CreateAgent));
        for _ in 0..3 {
            let mut s = session(&api);
            let err = s.run(|_| async { Ok(()) }).await.unwrap_err();
            assert!(matches!(
                err,
                QnaError::SessionCreation {
                    resource: ResourceKind::Agent,
                    ..
                }
            ));
            assert_eq!(s.state(), SessionState::Released);
        }
        assert_eq!(api.count(CallKind::CreateAgent), 3);
        assert_eq!(api.count(CallKind::CreateThread), 0);
        assert_eq!(api.count(CallKind::DeleteThread), 0);
        assert_eq!(api.count(CallKind::DeleteAgent), 0);
    }

    #[tokio::test]
    async fn test_thread_creation_failure_still_deletes_agent() {
        let api = Arc::new(MockAgentsApi::new().failing(CallKind::CreateThread));
        let mut s = session(&api);
        let mut body_ran = false;
        let err = s
            .run(|_| {
                body_ran = true;
                async { Ok(()) }
            })
            .await
            .unwrap_err();

        assert!(!body_ran);
        assert!(matches!(
            err,
            QnaError::SessionCreation {
                resource: ResourceKind::Thread,
                ..
            }
        ));
        assert!(s.agent_id().is_some());
        assert!(s.thread_id().is_none());
        assert_eq!(api.count(CallKind::DeleteThread), 0);
        assert_eq!(api.count(CallKind::DeleteAgent), 1);
        assert_eq!(api.live_resources(), 0);
    }

    #[tokio::test]
    async fn test_body_error_propagates_after_cleanup() {
        let api = Arc::new(MockAgentsApi::new());
        let mut s = session(&api);
        let err = s
            .run(|_| async { Err::<(), _>(QnaError::stage_call(StageKind::Generation, "boom")) })
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "question answerer call failed: boom");
        assert_eq!(api.count(CallKind::DeleteThread), 1);
        assert_eq!(api.count(CallKind::DeleteAgent), 1);
    }

    #[tokio::test]
    async fn test_cleanup_failure_never_masks_body_error() {
        let api = Arc::new(
            MockAgentsApi::new()
                .failing(CallKind::DeleteAgent)
                .failing(CallKind::DeleteThread),
        );
        let mut s = session(&api);
        let err = s
            .run(|_| async { Err::<(), _>(QnaError::stage_call(StageKind::AnswerCheck, "body")) })
            .await
            .unwrap_err();

        assert!(matches!(err, QnaError::StageCall { .. }));
        assert_eq!(s.cleanup_errors().len(), 2);
        assert_eq!(s.cleanup_errors()[0].resource, ResourceKind::Thread);
        assert_eq!(s.cleanup_errors()[1].resource, ResourceKind::Agent);
        assert_eq!(api.count(CallKind::DeleteThread), 1);
        assert_eq!(api.count(CallKind::DeleteAgent), 1);
    }

    #[tokio::test]
    async fn test_cleanup_failure_swallowed_on_success() {
        let api = Arc::new(MockAgentsApi::new().failing(CallKind::DeleteAgent));
        let mut s = session(&api);
        let value = s.run(|_| async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert_eq!(s.cleanup_errors().len(), 1);
        assert_eq!(s.state(), SessionState::Released);
    }

    #[tokio::test]
    async fn test_session_is_single_shot() {
        let api = Arc::new(MockAgentsApi::new());
        let mut s = session(&api);
        s.run(|_| async { Ok(()) }).await.unwrap();
        let err = s.run(|_| async { Ok(()) }).await.unwrap_err();
        assert!(matches!(err, QnaError::SessionReused));
        assert_eq!(api.count(CallKind::CreateAgent), 1);
        assert_eq!(api.count(CallKind::DeleteAgent), 1);
    }

    #[tokio::test]
    async fn test_all_id_shapes_open_a_session() {
        for shape in [IdShape::Object, IdShape::Map, IdShape::Bare] {
            let api = Arc::new(MockAgentsApi::new().with_id_shape(shape));
            let mut s = session(&api);
            s.run(|h| async move {
                assert!(h.agent.as_str().starts_with("asst_"));
                assert!(h.thread.as_str().starts_with("thread_"));
                Ok(())
            })
            .await
            .unwrap();
            assert_eq!(api.live_resources(), 0);
        }
    }
}
