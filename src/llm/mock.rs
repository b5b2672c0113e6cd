//! Mock Agent 服务（用于测试与离线运行，无需远程端点）
//!
//! 记录每一次远程调用，支持按 agent 名称预置回复脚本、按调用类型注入失败，
//! 以及切换创建接口的返回形态（对象 / 映射 / 裸标识）。

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::llm::{AgentsApi, ApiError, ResourceId, Run, RunStatus, ThreadMessage};

/// 被记录的远程调用
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    CreateAgent(Map<String, Value>),
    DeleteAgent(ResourceId),
    CreateThread,
    DeleteThread(ResourceId),
    PostMessage { thread: ResourceId, content: String },
    Run { thread: ResourceId, agent: ResourceId },
    ListMessages(ResourceId),
}

/// 可注入失败的调用类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    CreateAgent,
    DeleteAgent,
    CreateThread,
    DeleteThread,
    PostMessage,
    Run,
    ListMessages,
}

impl ApiCall {
    pub fn kind(&self) -> CallKind {
        match self {
            ApiCall::CreateAgent(_) => CallKind::CreateAgent,
            ApiCall::DeleteAgent(_) => CallKind::DeleteAgent,
            ApiCall::CreateThread => CallKind::CreateThread,
            ApiCall::DeleteThread(_) => CallKind::DeleteThread,
            ApiCall::PostMessage { .. } => CallKind::PostMessage,
            ApiCall::Run { .. } => CallKind::Run,
            ApiCall::ListMessages(_) => CallKind::ListMessages,
        }
    }
}

/// 创建接口返回的 JSON 形态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdShape {
    /// {"id": "...", "object": "assistant", ...}
    #[default]
    Object,
    /// {"id": "..."}
    Map,
    /// "..."
    Bare,
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<ApiCall>,
    /// agent id -> agent name
    agents: HashMap<ResourceId, String>,
    threads: HashMap<ResourceId, Vec<ThreadMessage>>,
    /// (agent 名称, run 时 thread 中最新的 user 消息)
    prompts: Vec<(String, String)>,
    scripts: HashMap<String, VecDeque<String>>,
    /// 设置了 Fail 的调用类型 -> 剩余失败次数（None 表示一直失败）
    failures: HashMap<CallKind, Option<usize>>,
}

/// Mock 客户端：按 agent 名称弹出预置回复；脚本耗尽时使用默认回复或回显最后一条 user 消息
#[derive(Debug, Default)]
pub struct MockAgentsApi {
    state: Mutex<MockState>,
    defaults: HashMap<String, String>,
    failed_statuses: HashSet<String>,
    shape: IdShape,
}

impl MockAgentsApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// 离线演示用：两个校验器总是 VALID，生成阶段回显问题
    pub fn offline() -> Self {
        Self::new()
            .with_default_reply(crate::core::StageKind::AnswerCheck.agent_name(), "VALID")
            .with_default_reply(crate::core::StageKind::LinkCheck.agent_name(), "VALID")
    }

    pub fn with_id_shape(mut self, shape: IdShape) -> Self {
        self.shape = shape;
        self
    }

    /// 为名为 agent_name 的 agent 追加按序弹出的回复
    pub fn with_replies<I, S>(self, agent_name: &str, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Ok(mut state) = self.state.lock() {
            state
                .scripts
                .entry(agent_name.to_string())
                .or_default()
                .extend(replies.into_iter().map(Into::into));
        }
        self
    }

    pub fn with_default_reply(mut self, agent_name: &str, reply: impl Into<String>) -> Self {
        self.defaults.insert(agent_name.to_string(), reply.into());
        self
    }

    /// 让该 agent 的 run 以 failed 状态结束
    pub fn with_failed_runs(mut self, agent_name: &str) -> Self {
        self.failed_statuses.insert(agent_name.to_string());
        self
    }

    /// 该类调用一直失败
    pub fn failing(self, kind: CallKind) -> Self {
        self.set_failure(kind, None);
        self
    }

    /// 该类调用前 times 次失败，之后恢复
    pub fn failing_times(self, kind: CallKind, times: usize) -> Self {
        self.set_failure(kind, Some(times));
        self
    }

    fn set_failure(&self, kind: CallKind, times: Option<usize>) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.insert(kind, times);
        }
    }

    /// 已记录的全部调用
    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.calls().iter().filter(|c| c.kind() == kind).count()
    }

    /// 尚未删除的 agent 数 + thread 数
    pub fn live_resources(&self) -> usize {
        self.lock()
            .map(|s| s.agents.len() + s.threads.len())
            .unwrap_or_default()
    }

    /// 各次 run 时发给某个 agent 名称的 user 消息（按时间顺序）
    pub fn prompts_for(&self, agent_name: &str) -> Vec<String> {
        self.lock()
            .map(|s| {
                s.prompts
                    .iter()
                    .filter(|(name, _)| name == agent_name)
                    .map(|(_, prompt)| prompt.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MockState>, ApiError> {
        self.state
            .lock()
            .map_err(|_| ApiError::other("mock state poisoned"))
    }

    /// 记录调用；若该类调用被设置为失败则返回错误
    fn record(&self, state: &mut MockState, call: ApiCall) -> Result<(), ApiError> {
        let kind = call.kind();
        state.calls.push(call);
        match state.failures.get_mut(&kind) {
            Some(None) => Err(ApiError::Status {
                status: 500,
                body: format!("injected {:?} failure", kind),
            }),
            Some(Some(left)) if *left > 0 => {
                *left -= 1;
                Err(ApiError::Status {
                    status: 500,
                    body: format!("injected {:?} failure", kind),
                })
            }
            _ => Ok(()),
        }
    }

    fn shaped(&self, id: &str, object: &str) -> Value {
        match self.shape {
            IdShape::Object => json!({"id": id, "object": object, "created_at": 0}),
            IdShape::Map => json!({ "id": id }),
            IdShape::Bare => Value::String(id.to_string()),
        }
    }

    fn not_found(what: &str, id: &ResourceId) -> ApiError {
        ApiError::Status {
            status: 404,
            body: format!("no such {}: {}", what, id),
        }
    }
}

#[async_trait]
impl AgentsApi for MockAgentsApi {
    async fn create_agent(&self, params: &Map<String, Value>) -> Result<Value, ApiError> {
        let mut state = self.lock()?;
        self.record(&mut state, ApiCall::CreateAgent(params.clone()))?;
        let id = format!("asst_{}", uuid::Uuid::new_v4().simple());
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        state.agents.insert(ResourceId::new(id.clone()), name);
        Ok(self.shaped(&id, "assistant"))
    }

    async fn delete_agent(&self, agent: &ResourceId) -> Result<(), ApiError> {
        let mut state = self.lock()?;
        self.record(&mut state, ApiCall::DeleteAgent(agent.clone()))?;
        state
            .agents
            .remove(agent)
            .map(|_| ())
            .ok_or_else(|| Self::not_found("agent", agent))
    }

    async fn create_thread(&self, _params: &Map<String, Value>) -> Result<Value, ApiError> {
        let mut state = self.lock()?;
        self.record(&mut state, ApiCall::CreateThread)?;
        let id = format!("thread_{}", uuid::Uuid::new_v4().simple());
        state.threads.insert(ResourceId::new(id.clone()), Vec::new());
        Ok(self.shaped(&id, "thread"))
    }

    async fn delete_thread(&self, thread: &ResourceId) -> Result<(), ApiError> {
        let mut state = self.lock()?;
        self.record(&mut state, ApiCall::DeleteThread(thread.clone()))?;
        state
            .threads
            .remove(thread)
            .map(|_| ())
            .ok_or_else(|| Self::not_found("thread", thread))
    }

    async fn post_message(&self, thread: &ResourceId, content: &str) -> Result<(), ApiError> {
        let mut state = self.lock()?;
        self.record(
            &mut state,
            ApiCall::PostMessage {
                thread: thread.clone(),
                content: content.to_string(),
            },
        )?;
        let messages = state
            .threads
            .get_mut(thread)
            .ok_or_else(|| Self::not_found("thread", thread))?;
        messages.insert(0, ThreadMessage::user_text(content));
        Ok(())
    }

    async fn create_and_process_run(
        &self,
        thread: &ResourceId,
        agent: &ResourceId,
    ) -> Result<Run, ApiError> {
        let mut state = self.lock()?;
        self.record(
            &mut state,
            ApiCall::Run {
                thread: thread.clone(),
                agent: agent.clone(),
            },
        )?;
        let name = state
            .agents
            .get(agent)
            .cloned()
            .ok_or_else(|| Self::not_found("agent", agent))?;
        let prompt = state
            .threads
            .get(thread)
            .and_then(|m| m.iter().find(|m| m.role == crate::llm::Role::User))
            .and_then(|m| m.text())
            .map(|t| t.value.clone())
            .unwrap_or_default();
        state.prompts.push((name.clone(), prompt.clone()));

        let run_id = format!("run_{}", uuid::Uuid::new_v4().simple());
        if self.failed_statuses.contains(&name) {
            return Ok(Run {
                id: run_id,
                status: RunStatus::Failed,
                last_error: Some(crate::llm::RunError {
                    code: Some("server_error".to_string()),
                    message: Some("mock run failure".to_string()),
                }),
            });
        }

        let scripted = state.scripts.get_mut(&name).and_then(VecDeque::pop_front);
        let messages = state
            .threads
            .get_mut(thread)
            .ok_or_else(|| Self::not_found("thread", thread))?;
        let reply = scripted
            .or_else(|| self.defaults.get(&name).cloned())
            .unwrap_or_else(|| format!("Echo from Mock: {}", prompt));
        messages.insert(0, ThreadMessage::assistant_text(reply));

        Ok(Run {
            id: run_id,
            status: RunStatus::Completed,
            last_error: None,
        })
    }

    async fn list_messages(&self, thread: &ResourceId) -> Result<Vec<ThreadMessage>, ApiError> {
        let mut state = self.lock()?;
        self.record(&mut state, ApiCall::ListMessages(thread.clone()))?;
        state
            .threads
            .get(thread)
            .cloned()
            .ok_or_else(|| Self::not_found("thread", thread))
    }
}
