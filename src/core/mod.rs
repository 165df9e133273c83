//! 核心编排层：错误、状态、目标检查、会话监管与主控循环

pub mod error;
pub mod goal;
pub mod orchestrator;
pub mod state;
pub mod supervisor;

pub use error::AgentError;
pub use goal::GoalChecker;
pub use orchestrator::{create_oracle_from_env, Components, Orchestrator};
pub use state::{AgentState, RunOutcome, RunReport};
pub use supervisor::SessionSupervisor;
