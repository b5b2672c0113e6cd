//! 错误类型
//!
//! 编排层只认两类致命错误：会话（agent + thread）创建失败、会话打开后远程交互失败。
//! 两者都让整次运行立即终止（fail-fast），不会消耗一次重试；校验器的「拒绝」不是错误。

use std::fmt::Display;

use thiserror::Error;

use crate::core::StageKind;

/// 会话中可创建/删除的远程资源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Agent,
    Thread,
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Agent => write!(f, "agent"),
            ResourceKind::Thread => write!(f, "thread"),
        }
    }
}

/// 运行过程中向上传播的错误
#[derive(Error, Debug)]
pub enum QnaError {
    /// 远程 agent 或 thread 创建失败
    #[error("failed to create {resource}: {message}")]
    SessionCreation {
        resource: ResourceKind,
        message: String,
    },

    /// 会话已打开，但消息 / run / 拉取回复失败
    #[error("{stage} call failed: {message}")]
    StageCall { stage: StageKind, message: String },

    /// 同一个 AgentSession 不能打开两次
    #[error("agent session already used; sessions are single-shot")]
    SessionReused,

    #[error("Config error: {0}")]
    Config(String),
}

impl QnaError {
    pub fn session_creation(resource: ResourceKind, message: impl Display) -> Self {
        Self::SessionCreation {
            resource,
            message: message.to_string(),
        }
    }

    pub fn stage_call(stage: StageKind, message: impl Display) -> Self {
        Self::StageCall {
            stage,
            message: message.to_string(),
        }
    }

    /// 是否为会话创建阶段的失败（资源侧问题，而非答案质量问题）
    pub fn is_session_creation(&self) -> bool {
        matches!(self, Self::SessionCreation { .. })
    }
}
