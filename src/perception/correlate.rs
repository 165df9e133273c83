//! 关联器：把可达性元素与视觉元素配成对
//!
//! 对每个 UIElement 给所有 VisualElement 打分（坐标邻近 / 文本相似 /
//! 角色重叠 / 描述-用途重叠），保留单个最高分匹配；再做一次全局去重，
//! 保证没有视觉元素被两条关联复用。输入顺序相同则输出逐字节相同——
//! 全程只用 Vec 与稳定排序，不依赖无序迭代。

use serde::Serialize;

use crate::perception::signal::{UIElement, VisualAnalysis, VisualElement};

/// 会造成虚假高分匹配的泛化词
const GENERIC_TOKENS: [&str; 6] = ["button", "click", "link", "menu", "icon", "element"];

/// 一条评分后的配对
#[derive(Debug, Clone, Serialize)]
pub struct Correlation {
    pub ui_element_id: String,
    pub visual_element: VisualElement,
    pub score: i32,
    /// 完整的来源 UI 信号，供执行层直接取坐标
    pub source_signal: UIElement,
}

/// 一次关联遍历的完整输出；计数字段仅用于观测，不反馈进匹配
#[derive(Debug, Clone, Serialize)]
pub struct CorrelationSet {
    pub correlations: Vec<Correlation>,
    pub total_ui_elements: usize,
    pub total_visual_elements: usize,
    pub matched_elements: usize,
}

pub struct Correlator {
    proximity_threshold: f64,
}

impl Correlator {
    pub fn new(proximity_threshold: f64) -> Self {
        Self {
            proximity_threshold,
        }
    }

    pub fn correlate(&self, ui_elements: &[UIElement], visual: &VisualAnalysis) -> CorrelationSet {
        let mut kept: Vec<Correlation> = Vec::new();

        for ui in ui_elements {
            let mut best: Option<&VisualElement> = None;
            let mut best_score = 0;
            for vis in &visual.elements {
                let score = self.score(ui, vis);
                // 严格大于：平分时保留先见者
                if score > best_score {
                    best = Some(vis);
                    best_score = score;
                }
            }
            if let Some(vis) = best {
                kept.push(Correlation {
                    ui_element_id: ui.id.clone(),
                    visual_element: vis.clone(),
                    score: best_score,
                    source_signal: ui.clone(),
                });
            }
        }

        // 全局去重：按分数降序稳定排序后，每个视觉身份键只保留首次出现，
        // 弱关联不得复用已被更高分配对占用的视觉元素
        kept.sort_by(|a, b| b.score.cmp(&a.score));
        let mut seen_keys: Vec<String> = Vec::new();
        let mut unique: Vec<Correlation> = Vec::new();
        for c in kept {
            let key = c.visual_element.identity_key();
            if !seen_keys.contains(&key) {
                seen_keys.push(key);
                unique.push(c);
            }
        }

        CorrelationSet {
            total_ui_elements: ui_elements.len(),
            total_visual_elements: visual.elements.len(),
            matched_elements: unique.len(),
            correlations: unique,
        }
    }

    /// 单对打分
    ///
    /// +3 精确坐标落在邻近阈值内；+2 文本相似（大小写不敏感的全等，或
    /// 较短一侧长度 > 3 的有效子串）；−1 任一侧是泛化词；+1 角色重叠；
    /// +1 描述与用途有词重叠。启发式标签不参与文本计分。
    fn score(&self, ui: &UIElement, vis: &VisualElement) -> i32 {
        let mut score = 0;

        if let Some((vx, vy)) = vis.click_coordinates {
            let dx = ui.position.0 - vx;
            let dy = ui.position.1 - vy;
            if (dx * dx + dy * dy).sqrt() < self.proximity_threshold {
                score += 3;
            }
        }

        let ui_text = if ui.title.is_genuine() {
            ui.title.text().trim().to_lowercase()
        } else {
            String::new()
        };
        let vis_text = vis.text.trim().to_lowercase();

        if !ui_text.is_empty() && !vis_text.is_empty() {
            let exact = ui_text == vis_text;
            let substring = (ui_text.len() > 3 && vis_text.contains(&ui_text))
                || (vis_text.len() > 3 && ui_text.contains(&vis_text));
            if exact || substring {
                score += 2;
            }
            if GENERIC_TOKENS.contains(&ui_text.as_str())
                || GENERIC_TOKENS.contains(&vis_text.as_str())
            {
                score -= 1;
            }
        }

        let role = ui.role.to_lowercase();
        let kind = vis.kind.trim().to_lowercase();
        if !kind.is_empty() && (role.contains(&kind) || kind.contains(&role)) {
            score += 1;
        }

        if ui.description.is_genuine() && words_overlap(ui.description.text(), &vis.purpose) {
            score += 1;
        }

        score
    }
}

/// 两段文本是否共享一个长度 > 3 的词
fn words_overlap(a: &str, b: &str) -> bool {
    let b_lower = b.to_lowercase();
    let b_words: Vec<&str> = b_lower.split_whitespace().collect();
    a.to_lowercase()
        .split_whitespace()
        .any(|w| w.len() > 3 && b_words.contains(&w))
}
