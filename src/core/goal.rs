//! 目标达成检查：两级判定
//!
//! 一级（有远程计划时优先）：逐条完成指标对照当前系统状态与 UI 文本。
//! "X changes from A to B" 形式只检查终态 B——检查起点 A 会在第一轮
//! 就误报，这条方向性规则是承重的，不是顺手的字符串匹配。
//! 二级（无计划或没有指标命中时）：按目标关键词分类，每类有自己的
//! 置信度阈值；媒体类改为结构性检查（播放控件是否出现）。高置信度
//! 只在对应类别规则允许时才视为成功——规划器的高置信度含义是
//! "我知道下一步做什么"，不是"已经做完了"。

use regex::Regex;

use crate::config::ThresholdsSection;
use crate::perception::signal::{PerceptionSnapshot, UIElement};
use crate::planner::plan::LongRangePlan;

/// 指标分词时忽略的虚词
const STOPWORDS: [&str; 8] = ["is", "the", "a", "an", "to", "of", "in", "now"];

/// 媒体类目标的结构性成功信号：播放控件出现
const PLAYBACK_MARKERS: [&str; 4] = ["play", "pause", "full screen", "seek"];

pub struct GoalChecker {
    thresholds: ThresholdsSection,
    directional: Regex,
}

impl GoalChecker {
    pub fn new(thresholds: ThresholdsSection) -> Self {
        Self {
            thresholds,
            // "subject changes from A to B"
            directional: Regex::new(r"(?i)^(.+?)\s+changes\s+from\s+(.+?)\s+to\s+(.+)$")
                .expect("directional indicator pattern is valid"),
        }
    }

    pub fn is_achieved(
        &self,
        goal: &str,
        snapshot: &PerceptionSnapshot,
        confidence: f64,
        long_plan: Option<&LongRangePlan>,
    ) -> bool {
        if let Some(plan) = long_plan {
            for indicator in &plan.completion_indicators {
                if self.indicator_satisfied(indicator, snapshot) {
                    tracing::info!(indicator = %indicator, "completion indicator satisfied");
                    return true;
                }
            }
            // 指标全部未命中：落到启发式，而不是直接判失败
        }

        self.heuristic_achieved(goal, snapshot, confidence)
    }

    /// 单条完成指标是否被当前快照满足
    fn indicator_satisfied(&self, indicator: &str, snapshot: &PerceptionSnapshot) -> bool {
        if let Some(caps) = self.directional.captures(indicator.trim()) {
            let subject = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let destination = caps.get(3).map(|m| m.as_str()).unwrap_or_default().trim();
            return self.directional_satisfied(subject, destination, snapshot);
        }
        self.plain_satisfied(indicator, snapshot)
    }

    /// 方向性指标：主语命中 + 当前值等于终态（等值而非包含——
    /// "connected" 是 "disconnected" 的子串，包含匹配会误报）
    fn directional_satisfied(
        &self,
        subject: &str,
        destination: &str,
        snapshot: &PerceptionSnapshot,
    ) -> bool {
        let subject_tokens = tokens(subject);
        if subject_tokens.is_empty() || destination.is_empty() {
            return false;
        }

        for (key, value) in snapshot.system_state.as_pairs() {
            let key_tokens = tokens(key);
            let key_matches = key_tokens.iter().all(|k| subject_tokens.contains(k));
            if key_matches && value.trim().eq_ignore_ascii_case(destination) {
                return true;
            }
        }

        for element in &snapshot.ui_elements {
            let label_tokens = element_tokens(element, false);
            let subject_matches = subject_tokens
                .iter()
                .all(|t| token_present(t, &label_tokens));
            if subject_matches
                && element
                    .current_value
                    .trim()
                    .eq_ignore_ascii_case(destination)
            {
                return true;
            }
        }
        false
    }

    /// 非方向性指标：全部有效词被某个 UI 元素（标题 + 描述 + 当前值）
    /// 或某条系统状态键值覆盖
    fn plain_satisfied(&self, indicator: &str, snapshot: &PerceptionSnapshot) -> bool {
        let wanted = tokens(indicator);
        if wanted.is_empty() {
            return false;
        }

        for element in &snapshot.ui_elements {
            let have = element_tokens(element, true);
            if wanted.iter().all(|t| token_present(t, &have)) {
                return true;
            }
        }

        for (key, value) in snapshot.system_state.as_pairs() {
            let blob = format!("{} {}", key.replace('_', " "), value);
            let have = tokens(&blob);
            if wanted.iter().all(|t| token_present(t, &have)) {
                return true;
            }
        }
        false
    }

    /// 二级启发式：按关键词家族分档
    fn heuristic_achieved(
        &self,
        goal: &str,
        snapshot: &PerceptionSnapshot,
        confidence: f64,
    ) -> bool {
        let g = goal.to_lowercase();

        if ["echo", "command", "terminal", "iterm", "bash", "shell"]
            .iter()
            .any(|k| g.contains(k))
        {
            return confidence > self.thresholds.command_confidence;
        }
        if ["search", "find", "look for"].iter().any(|k| g.contains(k)) {
            return confidence > self.thresholds.search_confidence;
        }
        if ["calculate", "math", "calculator", "+", "-", "*", "/"]
            .iter()
            .any(|k| g.contains(k))
        {
            return confidence > self.thresholds.calculator_confidence;
        }

        // 媒体类：不看置信度，看播放控件是否真的出现了
        if ["video", "show", "watch", "play"].iter().any(|k| g.contains(k)) {
            return snapshot.ui_elements.iter().any(|e| {
                let title = e.title.text().to_lowercase();
                let desc = e.description.text().to_lowercase();
                PLAYBACK_MARKERS
                    .iter()
                    .any(|m| title.contains(m) || desc.contains(m))
            });
        }

        confidence > self.thresholds.generic_confidence
    }
}

/// 分词：小写、按空白切、去虚词、去空
fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .replace('_', " ")
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// 元素的可比对词集；include_value 控制是否把当前值算进去
fn element_tokens(element: &UIElement, include_value: bool) -> Vec<String> {
    let mut blob = format!("{} {}", element.title.text(), element.description.text());
    if include_value {
        blob.push(' ');
        blob.push_str(&element.current_value);
    }
    tokens(&blob)
}

/// 词匹配：全等，或（长词）词内包含
fn token_present(token: &str, have: &[String]) -> bool {
    have.iter()
        .any(|h| h == token || (token.len() > 3 && h.contains(token)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::signal::{
        ApplicationContext, ElementLabel, SystemState, UIElement,
    };

    fn checker() -> GoalChecker {
        GoalChecker::new(ThresholdsSection::default())
    }

    fn snapshot(elements: Vec<UIElement>, network: &str) -> PerceptionSnapshot {
        let mut state = SystemState::unknown();
        state.network_status = network.to_string();
        PerceptionSnapshot {
            ui_elements: elements,
            system_state: state,
            context: ApplicationContext::default(),
            visual: None,
            correlations: None,
            timestamp: chrono::Utc::now(),
        }
    }

    fn popup(title: &str, value: &str) -> UIElement {
        UIElement {
            id: "popup_1".to_string(),
            role: "popup".to_string(),
            position: (0.0, 0.0),
            size: (0.0, 0.0),
            current_value: value.to_string(),
            available_options: vec!["On".to_string(), "Off".to_string()],
            supported_operations: vec![],
            title: ElementLabel::Genuine(title.to_string()),
            description: ElementLabel::Genuine(String::new()),
            enabled: true,
            focused: false,
        }
    }

    fn plan_with(indicators: &[&str]) -> LongRangePlan {
        LongRangePlan {
            completion_indicators: indicators.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn directional_indicator_checks_destination_only() {
        let c = checker();
        let plan = plan_with(&["network_status changes from disconnected to connected"]);

        let connected = snapshot(vec![], "connected");
        assert!(c.is_achieved("reconnect", &connected, 0.0, Some(&plan)));

        // 起点状态不得命中——"connected" 是 "disconnected" 的子串，
        // 等值匹配在这里是关键
        let disconnected = snapshot(vec![], "disconnected");
        assert!(!c.is_achieved("reconnect", &disconnected, 0.0, Some(&plan)));
    }

    #[test]
    fn plain_indicator_matches_ui_title_and_value() {
        let c = checker();
        let plan = plan_with(&["Network Mode is On"]);

        let on = snapshot(vec![popup("Network Mode", "On")], "unknown");
        assert!(c.is_achieved("turn on network mode", &on, 0.0, Some(&plan)));

        let off = snapshot(vec![popup("Network Mode", "Off")], "unknown");
        assert!(!c.is_achieved("turn on network mode", &off, 0.0, Some(&plan)));
    }

    #[test]
    fn directional_indicator_against_ui_element_value() {
        let c = checker();
        let plan = plan_with(&["Network Mode changes from Off to On"]);

        let on = snapshot(vec![popup("Network Mode", "On")], "unknown");
        assert!(c.is_achieved("toggle", &on, 0.0, Some(&plan)));

        let off = snapshot(vec![popup("Network Mode", "Off")], "unknown");
        assert!(!c.is_achieved("toggle", &off, 0.0, Some(&plan)));
    }

    #[test]
    fn heuristic_families_have_own_thresholds() {
        let c = checker();
        let empty = snapshot(vec![], "unknown");

        // 搜索类 0.7
        assert!(c.is_achieved("search for rust", &empty, 0.75, None));
        assert!(!c.is_achieved("search for rust", &empty, 0.65, None));

        // 命令类 0.8
        assert!(c.is_achieved("run echo in terminal", &empty, 0.85, None));
        assert!(!c.is_achieved("run echo in terminal", &empty, 0.75, None));

        // 泛化目标 0.9
        assert!(c.is_achieved("tidy things up", &empty, 0.95, None));
        assert!(!c.is_achieved("tidy things up", &empty, 0.85, None));
    }

    #[test]
    fn media_goal_requires_playback_controls_not_confidence() {
        let c = checker();
        let mut player = popup("Pause", "");
        player.role = "button".to_string();

        let with_controls = snapshot(vec![player], "unknown");
        assert!(c.is_achieved("watch a video", &with_controls, 0.1, None));

        let without = snapshot(vec![popup("Network Mode", "On")], "unknown");
        assert!(!c.is_achieved("watch a video", &without, 0.99, None));
    }

    #[test]
    fn unfired_indicators_fall_back_to_heuristics() {
        let c = checker();
        let plan = plan_with(&["Download Complete appears"]);
        let empty = snapshot(vec![], "unknown");
        // 指标未命中，但泛化阈值放行高置信度
        assert!(c.is_achieved("tidy things up", &empty, 0.95, Some(&plan)));
    }
}
