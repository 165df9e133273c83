//! Agent 错误类型
//!
//! 与主控循环的错误预算配合：PERCEIVE / REASON / ACT 的失败被吸收进 error_count
//! 并记录日志，绝不向 run 之外抛出；只有 Cancelled 与内部状态损坏（Internal）
//! 会穿透出去。"发现为空"（DiscoveryEmpty）不是错误，用 Ok(vec![]) 表达。

use thiserror::Error;

use crate::action::driver::DriverError;
use crate::oracle::traits::OracleError;
use crate::perception::backend::DiscoveryError;
use crate::planner::plan::PlanError;
use crate::vision::VisionError;

/// Agent 运行过程中可能出现的错误（发现、规划、执行、视觉、取消）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 完全无法枚举应用 / 窗口，与"扫到了但为空"严格区分
    #[error("UI discovery failed: {0}")]
    DiscoveryFailure(String),

    /// 规划 oracle 不可达或输出无法解析
    #[error("Planning failed: {0}")]
    PlanningFailure(String),

    /// 单步动作执行失败
    #[error("Action failed: {0}")]
    ActionFailure(String),

    /// 视觉 oracle 失败（截图或解析）
    #[error("Visual analysis failed: {0}")]
    VisionFailure(String),

    /// 用户中断，穿透出 run
    #[error("Cancelled by user")]
    Cancelled,

    /// 内部状态损坏，穿透出 run
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DiscoveryError> for AgentError {
    fn from(e: DiscoveryError) -> Self {
        AgentError::DiscoveryFailure(e.to_string())
    }
}

impl From<PlanError> for AgentError {
    fn from(e: PlanError) -> Self {
        AgentError::PlanningFailure(e.to_string())
    }
}

impl From<OracleError> for AgentError {
    fn from(e: OracleError) -> Self {
        AgentError::PlanningFailure(e.to_string())
    }
}

impl From<VisionError> for AgentError {
    fn from(e: VisionError) -> Self {
        AgentError::VisionFailure(e.to_string())
    }
}

impl From<DriverError> for AgentError {
    fn from(e: DriverError) -> Self {
        AgentError::ActionFailure(e.to_string())
    }
}
