//! 远端 agent 平台：接口抽象、句柄规整、HTTP 实现（Foundry / Azure OpenAI Agents）与离线 Mock

pub mod foundry;
pub mod handle;
pub mod mock;
pub mod traits;

pub use foundry::FoundryClient;
pub use handle::{IntoResourceId, ResourceId};
pub use mock::{ApiCall, CallKind, IdShape, MockAgentsApi};
pub use traits::{
    first_text_reply, AgentsApi, Annotation, ApiError, MessageContent, Role, Run, RunError,
    RunStatus, TextContent, ThreadMessage, UrlCitation,
};
