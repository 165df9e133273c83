//! 计划与动作步骤：规划 oracle 输出的类型化边界
//!
//! oracle 返回的 JSON 在这里解析并校验成封闭的 ActionStep 枚举；未知操作名
//! 在此被拒绝，而不是作为字符串继续向下传。滚动方向等执行期才能校验的
//! 字段保持原样，由执行器报告 success=false。

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("no JSON object found in oracle output")]
    JsonMissing,

    #[error("plan JSON malformed: {0}")]
    JsonParse(String),

    #[error("unknown operation '{0}' in plan")]
    UnknownOperation(String),
}

/// 动作目标：具体元素 id，或"作用于整个系统"
///
/// 没有合适元素时，oracle 的约定输出是 target 为 "all" 的 keystroke 步骤，
/// 而不是编造不存在的元素 id。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Element(String),
    System,
}

impl Target {
    pub fn parse(raw: &str) -> Target {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") || trimmed.eq_ignore_ascii_case("system")
        {
            Target::System
        } else {
            Target::Element(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Target::Element(id) => id,
            Target::System => "all",
        }
    }
}

/// 封闭的动作步骤枚举；执行器对它做显式 match
#[derive(Debug, Clone)]
pub enum ActionStep {
    Click {
        target: Target,
        reason: String,
    },
    Type {
        target: Target,
        text: String,
        reason: String,
    },
    Keystroke {
        target: Target,
        text: String,
        reason: String,
    },
    Key {
        key: String,
        reason: String,
    },
    Select {
        target: Target,
        option: String,
        reason: String,
    },
    Scroll {
        target: Target,
        /// 执行期校验；非法方向由执行器报告为失败结果
        direction: String,
        reason: String,
    },
    Wait {
        duration_ms: u64,
        reason: String,
    },
    LaunchApp {
        app_name: String,
        reason: String,
    },
}

impl ActionStep {
    pub fn operation(&self) -> &'static str {
        match self {
            ActionStep::Click { .. } => "click",
            ActionStep::Type { .. } => "type",
            ActionStep::Keystroke { .. } => "keystroke",
            ActionStep::Key { .. } => "key",
            ActionStep::Select { .. } => "select",
            ActionStep::Scroll { .. } => "scroll",
            ActionStep::Wait { .. } => "wait",
            ActionStep::LaunchApp { .. } => "launch_app",
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            ActionStep::Click { reason, .. }
            | ActionStep::Type { reason, .. }
            | ActionStep::Keystroke { reason, .. }
            | ActionStep::Key { reason, .. }
            | ActionStep::Select { reason, .. }
            | ActionStep::Scroll { reason, .. }
            | ActionStep::Wait { reason, .. }
            | ActionStep::LaunchApp { reason, .. } => reason,
        }
    }

    /// 步骤的目标描述（日志用）
    pub fn target_label(&self) -> String {
        match self {
            ActionStep::Click { target, .. }
            | ActionStep::Type { target, .. }
            | ActionStep::Keystroke { target, .. }
            | ActionStep::Select { target, .. }
            | ActionStep::Scroll { target, .. } => target.as_str().to_string(),
            ActionStep::Key { key, .. } => key.clone(),
            ActionStep::Wait { duration_ms, .. } => format!("{}ms", duration_ms),
            ActionStep::LaunchApp { app_name, .. } => app_name.clone(),
        }
    }
}

/// oracle 原始输出里的单个步骤（松散字段，校验后转 ActionStep）
#[derive(Debug, Clone, Deserialize)]
struct RawStep {
    #[serde(default)]
    action: String,
    #[serde(default)]
    target: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    key: String,
    #[serde(default)]
    option: String,
    #[serde(default)]
    direction: String,
    /// 秒；wait 步骤用
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    app_name: String,
    #[serde(default)]
    reason: String,
}

fn step_from_raw(raw: RawStep) -> Result<ActionStep, PlanError> {
    let op = raw.action.trim().to_lowercase();
    let target = Target::parse(&raw.target);
    let reason = raw.reason;
    match op.as_str() {
        "click" => Ok(ActionStep::Click { target, reason }),
        "type" => Ok(ActionStep::Type {
            target,
            text: raw.text,
            reason,
        }),
        "keystroke" => Ok(ActionStep::Keystroke {
            target,
            text: raw.text,
            reason,
        }),
        // press 是 key 的历史别名；无 key 字段时按回车处理
        "key" | "press" => Ok(ActionStep::Key {
            key: if raw.key.is_empty() {
                "enter".to_string()
            } else {
                raw.key
            },
            reason,
        }),
        "select" => Ok(ActionStep::Select {
            target,
            option: raw.option,
            reason,
        }),
        "scroll" => Ok(ActionStep::Scroll {
            target,
            direction: if raw.direction.is_empty() {
                "down".to_string()
            } else {
                raw.direction
            },
            reason,
        }),
        "wait" => Ok(ActionStep::Wait {
            duration_ms: (raw.duration.unwrap_or(1.0).max(0.0) * 1000.0) as u64,
            reason,
        }),
        "launch_app" | "launchapp" => Ok(ActionStep::LaunchApp {
            app_name: if raw.app_name.is_empty() {
                raw.target
            } else {
                raw.app_name
            },
            reason,
        }),
        other => Err(PlanError::UnknownOperation(other.to_string())),
    }
}

/// 一次规划的完整结果；同一迭代内被执行循环消费一次
#[derive(Debug, Clone)]
pub struct Plan {
    pub steps: Vec<ActionStep>,
    /// 0.0 - 1.0
    pub confidence: f64,
    pub narrative: String,
    pub alternatives: Vec<String>,
    pub risks: Vec<String>,
    pub next_step_hint: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawPlan {
    #[serde(default)]
    plan: Vec<RawStep>,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    alternatives: Vec<String>,
    #[serde(default)]
    risks: Vec<String>,
    #[serde(default)]
    next_step: String,
}

/// 从 oracle 文本解析 Plan：提取 JSON 块 → 反序列化 → 逐步校验操作名
pub fn parse_plan(text: &str) -> Result<Plan, PlanError> {
    let json_str = extract_json_block(text).ok_or(PlanError::JsonMissing)?;
    let raw: RawPlan =
        serde_json::from_str(json_str).map_err(|e| PlanError::JsonParse(e.to_string()))?;

    let mut steps = Vec::with_capacity(raw.plan.len());
    for raw_step in raw.plan {
        steps.push(step_from_raw(raw_step)?);
    }

    Ok(Plan {
        steps,
        confidence: raw.confidence.clamp(0.0, 1.0),
        narrative: raw.reasoning,
        alternatives: raw.alternatives,
        risks: raw.risks,
        next_step_hint: raw.next_step,
    })
}

/// 每个 goal 开始前创建一次的远程计划；循环中只读，目标达成检查参考它
#[derive(Debug, Clone, Default)]
pub struct LongRangePlan {
    pub goal: String,
    pub end_state: String,
    pub success_criteria: Vec<String>,
    pub steps: Vec<PlannedStep>,
    pub obstacles: Vec<String>,
    pub alternatives: Vec<String>,
    pub completion_indicators: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlannedStep {
    #[serde(default)]
    pub step: u32,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub expected_outcome: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawLongRangePlan {
    #[serde(default)]
    goal: String,
    #[serde(default)]
    end_state: String,
    #[serde(default)]
    success_criteria: Vec<String>,
    #[serde(default)]
    steps: Vec<PlannedStep>,
    #[serde(default)]
    obstacles: Vec<String>,
    #[serde(default)]
    alternatives: Vec<String>,
    #[serde(default)]
    completion_indicators: Vec<String>,
}

pub fn parse_long_range_plan(text: &str) -> Result<LongRangePlan, PlanError> {
    let json_str = extract_json_block(text).ok_or(PlanError::JsonMissing)?;
    let raw: RawLongRangePlan =
        serde_json::from_str(json_str).map_err(|e| PlanError::JsonParse(e.to_string()))?;
    Ok(LongRangePlan {
        goal: raw.goal,
        end_state: raw.end_state,
        success_criteria: raw.success_criteria,
        steps: raw.steps,
        obstacles: raw.obstacles,
        alternatives: raw.alternatives,
        completion_indicators: raw.completion_indicators,
    })
}

/// 提取 JSON 块：优先 ```json 围栏，其次首个 { 到末尾 } 的范围
pub fn extract_json_block(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(match rest.find("```") {
            Some(end) => rest[..end].trim(),
            None => rest.trim(),
        });
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end > start {
        Some(&trimmed[start..=end])
    } else {
        None
    }
}
