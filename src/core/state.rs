//! Agent 状态与运行结果
//!
//! AgentState 只由 Orchestrator 在每个迭代步修改，不跨 goal 复用；
//! RunReport 是 run 的结构化返回，五种终止路径各有独立的可读消息。

use serde::Serialize;

/// 一次运行（单个 goal）的可变状态
#[derive(Debug, Clone, Serialize)]
pub struct AgentState {
    pub goal: String,
    /// 0.0 - 1.0，当前计划内已完成步骤的比例
    pub progress: f64,
    /// 最近一次规划结果的置信度
    pub confidence: f64,
    pub last_action: String,
    /// 连续失败计数，任何完整成功的 ACT 将其清零
    pub error_count: u32,
    pub session_id: String,
}

impl AgentState {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            progress: 0.0,
            confidence: 0.0,
            last_action: String::new(),
            error_count: 0,
            session_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// 终止路径：五种结局一一对应，不允许"只说结束了"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    GoalAchieved,
    LowConfidenceAbort,
    ErrorBudgetExceeded,
    IterationBudgetExceeded,
    Cancelled,
}

/// run 的结构化返回：调用方永远拿到完整结果，而不是沉默的 None
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub success: bool,
    pub outcome: RunOutcome,
    pub iterations: u32,
    pub errors: u32,
    pub progress: f64,
    pub message: String,
}

impl RunReport {
    pub fn goal_achieved(goal: &str, iterations: u32, errors: u32) -> Self {
        Self {
            success: true,
            outcome: RunOutcome::GoalAchieved,
            iterations,
            errors,
            progress: 1.0,
            message: format!("Goal achieved: {}", goal),
        }
    }

    pub fn low_confidence(confidence: f64, iterations: u32, errors: u32, progress: f64) -> Self {
        Self {
            success: false,
            outcome: RunOutcome::LowConfidenceAbort,
            iterations,
            errors,
            progress,
            message: format!(
                "Stopped early: confidence {:.2} too low to keep acting safely",
                confidence
            ),
        }
    }

    pub fn error_budget(max_errors: u32, iterations: u32, errors: u32, progress: f64) -> Self {
        Self {
            success: false,
            outcome: RunOutcome::ErrorBudgetExceeded,
            iterations,
            errors,
            progress,
            message: format!("Error budget exhausted ({} errors)", max_errors),
        }
    }

    pub fn iteration_budget(max_iterations: u32, errors: u32, progress: f64) -> Self {
        Self {
            success: false,
            outcome: RunOutcome::IterationBudgetExceeded,
            iterations: max_iterations,
            errors,
            progress,
            message: "Max iterations reached without achieving goal".to_string(),
        }
    }

    pub fn cancelled(iterations: u32, errors: u32, progress: f64) -> Self {
        Self {
            success: false,
            outcome: RunOutcome::Cancelled,
            iterations,
            errors,
            progress,
            message: "Stopped by user".to_string(),
        }
    }
}
