//! 历史存档：快照、计划与执行结果的追加式记录
//!
//! 只追加、从不改写；用于诊断与观测，不参与任何控制决策。核心只要求
//! 计数 / 摘要这一层查询能力，落盘是外部关心的事。

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::action::executor::ActionOutcome;
use crate::perception::signal::PerceptionSnapshot;
use crate::planner::plan::Plan;

/// 快照的轻量存档（完整快照归当前迭代独占，这里只留诊断所需）
#[derive(Debug, Clone, Serialize)]
pub struct PerceptionRecord {
    pub timestamp: DateTime<Utc>,
    pub app_name: String,
    pub ui_count: usize,
    pub visual_count: usize,
    pub matched_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanRecord {
    pub steps: usize,
    pub confidence: f64,
    pub narrative: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistorySummary {
    pub perceptions: usize,
    pub plans: usize,
    pub outcomes: usize,
    pub successful_outcomes: usize,
}

#[derive(Debug, Default)]
pub struct HistoryStore {
    perceptions: Vec<PerceptionRecord>,
    plans: Vec<PlanRecord>,
    outcomes: Vec<ActionOutcome>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_perception(&mut self, snapshot: &PerceptionSnapshot) {
        self.perceptions.push(PerceptionRecord {
            timestamp: snapshot.timestamp,
            app_name: snapshot.context.app_name.clone(),
            ui_count: snapshot.ui_elements.len(),
            visual_count: snapshot.visual.as_ref().map(|v| v.elements.len()).unwrap_or(0),
            matched_count: snapshot
                .correlations
                .as_ref()
                .map(|c| c.matched_elements)
                .unwrap_or(0),
        });
    }

    pub fn record_plan(&mut self, plan: &Plan) {
        self.plans.push(PlanRecord {
            steps: plan.steps.len(),
            confidence: plan.confidence,
            narrative: plan.narrative.clone(),
        });
    }

    pub fn record_outcomes(&mut self, outcomes: &[ActionOutcome]) {
        self.outcomes.extend_from_slice(outcomes);
    }

    pub fn summary(&self) -> HistorySummary {
        HistorySummary {
            perceptions: self.perceptions.len(),
            plans: self.plans.len(),
            outcomes: self.outcomes.len(),
            successful_outcomes: self.outcomes.iter().filter(|o| o.success).count(),
        }
    }
}
