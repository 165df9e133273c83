//! 规划适配器：感知快照 + 目标 → 计划
//!
//! 对外部规划 oracle 的边界封装：拼 prompt（元素 id 是权威，禁止编造）、
//! 发请求（节流）、解析 JSON 为类型化 Plan / LongRangePlan。适配器不做
//! 决策，只做格式转换与契约校验。

use std::sync::Arc;
use std::time::Duration;

use crate::core::error::AgentError;
use crate::oracle::{CallThrottle, OracleClient};
use crate::perception::signal::PerceptionSnapshot;
use crate::planner::plan::{
    parse_long_range_plan, parse_plan, LongRangePlan, Plan,
};

/// prompt 中最多列出的 UI 元素数，避免超长转储
const MAX_PROMPT_ELEMENTS: usize = 80;

pub struct PlannerAdapter {
    oracle: Arc<dyn OracleClient>,
    throttle: CallThrottle,
}

impl PlannerAdapter {
    pub fn new(oracle: Arc<dyn OracleClient>, min_interval: Duration) -> Self {
        Self {
            oracle,
            throttle: CallThrottle::new(min_interval),
        }
    }

    /// 一次规划：快照 + 目标（+ 可选截图）→ Plan
    pub async fn plan(
        &self,
        goal: &str,
        snapshot: &PerceptionSnapshot,
        long_plan: Option<&LongRangePlan>,
        screenshot: Option<&[u8]>,
    ) -> Result<Plan, AgentError> {
        let prompt = self.build_plan_prompt(goal, snapshot, long_plan, screenshot.is_some());

        self.throttle.acquire().await;
        let output = match screenshot {
            Some(png) => self.oracle.generate_with_image(&prompt, png).await?,
            None => self.oracle.generate(&prompt).await?,
        };

        let plan = parse_plan(&output)?;
        tracing::info!(
            steps = plan.steps.len(),
            confidence = plan.confidence,
            "plan received"
        );
        Ok(plan)
    }

    /// 远程计划：每个 goal 最多调用一次，失败时循环照常进行
    pub async fn long_range_plan(
        &self,
        goal: &str,
        target_app: Option<&str>,
        snapshot: &PerceptionSnapshot,
    ) -> Result<LongRangePlan, AgentError> {
        let prompt = self.build_long_range_prompt(goal, target_app, snapshot);

        self.throttle.acquire().await;
        let output = self.oracle.generate(&prompt).await?;
        let plan = parse_long_range_plan(&output)?;
        tracing::info!(
            steps = plan.steps.len(),
            indicators = plan.completion_indicators.len(),
            end_state = %plan.end_state,
            "long-range plan created"
        );
        Ok(plan)
    }

    /// 从候选列表中为 goal 挑选目标应用；oracle 答非所问时返回 None
    pub async fn select_application(&self, goal: &str, candidates: &[String]) -> Option<String> {
        if candidates.is_empty() {
            return None;
        }
        let list = candidates
            .iter()
            .map(|a| format!("- {}", a))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Pick the best application for this goal: \"{goal}\"\n\n\
             Available applications:\n{list}\n\n\
             Respond with just the application name."
        );

        self.throttle.acquire().await;
        match self.oracle.generate(&prompt).await {
            Ok(text) => {
                let selected = text.trim().trim_matches('"').to_string();
                if candidates.iter().any(|c| c == &selected) {
                    tracing::info!(app = %selected, "planner selected target application");
                    Some(selected)
                } else {
                    tracing::warn!(raw = %selected, "app selection not in candidate list");
                    None
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "app selection failed");
                None
            }
        }
    }

    fn build_plan_prompt(
        &self,
        goal: &str,
        snapshot: &PerceptionSnapshot,
        long_plan: Option<&LongRangePlan>,
        has_screenshot: bool,
    ) -> String {
        format!(
            r#"You are an autonomous desktop agent with hybrid perception (accessibility + visual).

GOAL: {goal}

ENVIRONMENT:
- Accessibility UI elements: {ui_count}
- Visual elements: {visual_count}
- Correlated elements: {matched}
- System state: {system}
- Active app: {app} | Window: {window}
- Screenshot attached: {shot}

ACCESSIBILITY UI ELEMENTS (IDs are authoritative; DO NOT invent new IDs):
{elements}

VISUAL ANALYSIS:
{visual}

ELEMENT CORRELATIONS:
{correlations}

LONG-RANGE PLAN:
{long_plan}

TASK:
Create a JSON plan to achieve the goal using ONLY the given element IDs. If no UI element
is suitable, use "keystroke" with target "all" instead of inventing an ID.

Respond ONLY with JSON:
{{
  "plan": [{{"action":"click|type|keystroke|key|select|scroll|wait|launch_app","target":"element_id|all","text":"...","key":"...","option":"...","direction":"...","duration":1.0,"app_name":"...","reason":"..."}}],
  "confidence": 0.0,
  "reasoning": "...",
  "alternatives": ["..."],
  "risks": ["..."],
  "next_step": "..."
}}"#,
            goal = goal,
            ui_count = snapshot.ui_elements.len(),
            visual_count = snapshot.visual.as_ref().map(|v| v.elements.len()).unwrap_or(0),
            matched = snapshot
                .correlations
                .as_ref()
                .map(|c| c.matched_elements)
                .unwrap_or(0),
            system = snapshot.system_state.summary(),
            app = snapshot.context.app_name,
            window = snapshot.context.window_title,
            shot = if has_screenshot { "yes" } else { "no" },
            elements = format_ui_elements(snapshot),
            visual = format_visual(snapshot),
            correlations = format_correlations(snapshot),
            long_plan = format_long_plan(long_plan),
        )
    }

    fn build_long_range_prompt(
        &self,
        goal: &str,
        target_app: Option<&str>,
        snapshot: &PerceptionSnapshot,
    ) -> String {
        format!(
            r#"You are an AI planning expert. Create a comprehensive step-by-step plan to achieve the user's goal.

GOAL: {goal}
TARGET APP: {app}

ENVIRONMENT SNAPSHOT:
- Available UI elements: {count}
- System state: {system}

UI ELEMENTS (IDs are authoritative; do not invent):
{elements}

Respond ONLY with JSON:
{{
  "goal": "...",
  "end_state": "...",
  "success_criteria": ["..."],
  "steps": [
    {{"step": 1, "action": "action_type", "target": "element_id_or_all", "description": "what to do", "expected_outcome": "..."}}
  ],
  "obstacles": ["..."],
  "alternatives": ["..."],
  "completion_indicators": ["..."]
}}"#,
            goal = goal,
            app = target_app.unwrap_or("(none)"),
            count = snapshot.ui_elements.len(),
            system = snapshot.system_state.summary(),
            elements = format_ui_elements(snapshot),
        )
    }
}

fn format_ui_elements(snapshot: &PerceptionSnapshot) -> String {
    if snapshot.ui_elements.is_empty() {
        return "- (none)".to_string();
    }
    let mut lines: Vec<String> = snapshot
        .ui_elements
        .iter()
        .take(MAX_PROMPT_ELEMENTS)
        .map(|e| {
            let options = if e.available_options.is_empty() {
                String::new()
            } else {
                format!(" | options: [{}]", e.available_options.join(", "))
            };
            let value = if e.current_value.is_empty() {
                String::new()
            } else {
                format!(" | value: {}", e.current_value)
            };
            format!("- {} | {} | {}{}{}", e.id, e.role, e.title, value, options)
        })
        .collect();
    if snapshot.ui_elements.len() > MAX_PROMPT_ELEMENTS {
        lines.push(format!(
            "... (+{} more)",
            snapshot.ui_elements.len() - MAX_PROMPT_ELEMENTS
        ));
    }
    lines.join("\n")
}

fn format_visual(snapshot: &PerceptionSnapshot) -> String {
    match &snapshot.visual {
        None => "- (none)".to_string(),
        Some(v) => {
            let relevant = v.elements.iter().filter(|e| e.task_relevant).count();
            format!(
                "- {}\n- Interactive elements: {} ({} task-relevant)",
                if v.screen_description.is_empty() {
                    "(no description)"
                } else {
                    v.screen_description.as_str()
                },
                v.elements.len(),
                relevant
            )
        }
    }
}

fn format_correlations(snapshot: &PerceptionSnapshot) -> String {
    match &snapshot.correlations {
        None => "- (none)".to_string(),
        Some(c) => format!("- Matched elements: {}", c.matched_elements),
    }
}

fn format_long_plan(plan: Option<&LongRangePlan>) -> String {
    match plan {
        None => "- (none)".to_string(),
        Some(p) => format!(
            "- Steps: {} | End state: {}",
            p.steps.len(),
            if p.end_state.is_empty() {
                "(n/a)"
            } else {
                p.end_state.as_str()
            }
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MockOracleClient;
    use crate::perception::signal::{
        ApplicationContext, ElementLabel, SystemState, UIElement,
    };

    fn snapshot_with(elements: Vec<UIElement>) -> PerceptionSnapshot {
        PerceptionSnapshot {
            ui_elements: elements,
            system_state: SystemState::unknown(),
            context: ApplicationContext::default(),
            visual: None,
            correlations: None,
            timestamp: chrono::Utc::now(),
        }
    }

    fn element(id: &str) -> UIElement {
        UIElement {
            id: id.to_string(),
            role: "button".to_string(),
            position: (0.0, 0.0),
            size: (0.0, 0.0),
            current_value: String::new(),
            available_options: vec![],
            supported_operations: vec![],
            title: ElementLabel::Genuine(id.to_string()),
            description: ElementLabel::Genuine(String::new()),
            enabled: true,
            focused: false,
        }
    }

    #[tokio::test]
    async fn plan_parses_oracle_json() {
        let mock = Arc::new(MockOracleClient::new(
            r#"{"plan":[{"action":"click","target":"ok","reason":"go"}],"confidence":0.9,"reasoning":"r"}"#,
        ));
        let adapter = PlannerAdapter::new(mock, Duration::from_millis(0));
        let plan = adapter
            .plan("press ok", &snapshot_with(vec![element("ok")]), None, None)
            .await
            .unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert!((plan.confidence - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn garbage_oracle_output_is_a_planning_failure() {
        let mock = Arc::new(MockOracleClient::new("sorry, no plan today"));
        let adapter = PlannerAdapter::new(mock, Duration::from_millis(0));
        let err = adapter
            .plan("anything", &snapshot_with(vec![]), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::PlanningFailure(_)));
    }

    #[tokio::test]
    async fn app_selection_rejects_names_outside_candidates() {
        let mock = Arc::new(MockOracleClient::new("Netscape Navigator"));
        let adapter = PlannerAdapter::new(mock, Duration::from_millis(0));
        let picked = adapter
            .select_application("browse", &["Safari".to_string()])
            .await;
        assert!(picked.is_none());
    }

    #[tokio::test]
    async fn app_selection_accepts_candidate() {
        let mock = Arc::new(MockOracleClient::new("Safari"));
        let adapter = PlannerAdapter::new(mock, Duration::from_millis(0));
        let picked = adapter
            .select_application("browse", &["Safari".to_string(), "Mail".to_string()])
            .await;
        assert_eq!(picked.as_deref(), Some("Safari"));
    }

    #[test]
    fn prompt_lists_element_ids_and_options() {
        let mock = Arc::new(MockOracleClient::new(""));
        let adapter = PlannerAdapter::new(mock, Duration::from_millis(0));
        let mut e = element("network_mode");
        e.available_options = vec!["On".to_string(), "Off".to_string()];
        let prompt = adapter.build_plan_prompt("x", &snapshot_with(vec![e]), None, false);
        assert!(prompt.contains("network_mode"));
        assert!(prompt.contains("options: [On, Off]"));
        assert!(prompt.contains("DO NOT invent new IDs"));
    }
}
