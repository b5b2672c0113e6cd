//! 核心层：错误、运行状态、agent 会话生命周期、重试编排

pub mod error;
pub mod orchestrator;
pub mod session;
pub mod state;

pub use error::{QnaError, ResourceKind};
pub use orchestrator::{
    create_api_from_config, create_orchestrator, orchestrator_with_api, AgentOrchestrator,
    Orchestrator, OrchestratorConfig, DEFAULT_MAX_ATTEMPTS,
};
pub use session::{AgentSession, AgentSpec, CleanupError, SessionHandles, SessionState};
pub use state::{
    Attempt, CandidateAnswer, Rejection, RejectionSource, RunOutcome, StageKind, Verdict,
};
