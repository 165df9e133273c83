//! 视觉 oracle 适配器
//!
//! 截取聚焦窗口 → 发给视觉 oracle → 解析成 VisualAnalysis。核心只消费
//! 输出契约：屏幕描述、视觉元素列表（可带精确坐标）、安全提示与替代方案。
//! 调用受最小间隔节流。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;

use crate::oracle::{CallThrottle, OracleClient};
use crate::perception::backend::{normalize_app_name, AccessibilityProvider};
use crate::perception::signal::{VisualAnalysis, VisualElement};
use crate::planner::plan::extract_json_block;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("screenshot capture failed: {0}")]
    Capture(String),

    #[error("vision oracle failed: {0}")]
    Oracle(#[from] crate::oracle::OracleError),

    #[error("vision output malformed: {0}")]
    Parse(String),
}

/// 聚焦窗口截图接口；返回 PNG 字节
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    async fn capture_window(&self, app: &str) -> Result<Vec<u8>, VisionError>;
}

/// 基于 `screencapture -R` 的真实截图实现：先查窗口框架，再按区域截取
pub struct ScreencaptureCapture {
    provider: Arc<dyn AccessibilityProvider>,
}

impl ScreencaptureCapture {
    pub fn new(provider: Arc<dyn AccessibilityProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ScreenCapture for ScreencaptureCapture {
    async fn capture_window(&self, app: &str) -> Result<Vec<u8>, VisionError> {
        let app = normalize_app_name(app);
        let windows = self
            .provider
            .windows(&app)
            .await
            .map_err(|e| VisionError::Capture(e.to_string()))?;
        // 只截聚焦窗口，绝不回退到全屏
        let window = windows
            .first()
            .ok_or_else(|| VisionError::Capture(format!("no window for {}", app)))?;
        let (x, y, w, h) = window.frame;
        if w <= 0.0 || h <= 0.0 {
            return Err(VisionError::Capture("window has no usable bounds".into()));
        }

        let path = std::env::temp_dir().join(format!("mantis_capture_{}.png", std::process::id()));
        let region = format!("{},{},{},{}", x as i64, y as i64, w as i64, h as i64);
        let status = Command::new("screencapture")
            .args(["-x", "-R"])
            .arg(&region)
            .arg(&path)
            .status()
            .await
            .map_err(|e| VisionError::Capture(e.to_string()))?;
        if !status.success() {
            return Err(VisionError::Capture("screencapture exited nonzero".into()));
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| VisionError::Capture(e.to_string()))?;
        let _ = tokio::fs::remove_file(&path).await;
        Ok(bytes)
    }
}

pub struct VisualOracleAdapter {
    oracle: Arc<dyn OracleClient>,
    capture: Arc<dyn ScreenCapture>,
    throttle: CallThrottle,
}

impl VisualOracleAdapter {
    pub fn new(
        oracle: Arc<dyn OracleClient>,
        capture: Arc<dyn ScreenCapture>,
        min_interval: Duration,
    ) -> Self {
        Self {
            oracle,
            capture,
            throttle: CallThrottle::new(min_interval),
        }
    }

    /// 截取窗口 PNG（REASON 阶段附在规划请求里复用）
    pub async fn capture_png(&self, app: &str) -> Result<Vec<u8>, VisionError> {
        self.capture.capture_window(app).await
    }

    /// 完整视觉分析：截图 → oracle → VisualAnalysis
    pub async fn analyze(&self, app: &str, goal: &str) -> Result<VisualAnalysis, VisionError> {
        let png = self.capture.capture_window(app).await?;

        self.throttle.acquire().await;
        let output = self
            .oracle
            .generate_with_image(&build_vision_prompt(goal), &png)
            .await?;

        let mut analysis = parse_visual_analysis(&output, goal)?;
        mark_task_relevant(&mut analysis.elements, goal);

        for warning in &analysis.safety_warnings {
            tracing::warn!(warning = %warning, "vision safety warning");
        }
        tracing::info!(
            elements = analysis.elements.len(),
            "visual analysis complete"
        );
        Ok(analysis)
    }
}

fn build_vision_prompt(goal: &str) -> String {
    format!(
        r#"Analyze this screenshot of the focused window and identify all interactive elements.

User task: {goal}

For each element provide its type, approximate position (e.g. top-right), visible text,
likely purpose, visual characteristics, and exact click coordinates when you can locate it.
Also list safety warnings (sensitive fields, destructive actions, payment areas) and
alternative approaches if direct interaction is not possible.

Respond ONLY with JSON:
{{
  "screen_description": "...",
  "interactive_elements": [
    {{"type":"button","position":"top-right","text":"Login","purpose":"...","characteristics":"...","coordinates":{{"click_x":0,"click_y":0}}}}
  ],
  "safety_warnings": ["..."],
  "alternative_methods": ["..."]
}}"#
    )
}

#[derive(Debug, Deserialize)]
struct RawCoordinates {
    #[serde(default)]
    click_x: f64,
    #[serde(default)]
    click_y: f64,
}

#[derive(Debug, Deserialize)]
struct RawVisualElement {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    position: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    purpose: String,
    #[serde(default)]
    characteristics: String,
    #[serde(default)]
    coordinates: Option<RawCoordinates>,
}

#[derive(Debug, Deserialize)]
struct RawVisualAnalysis {
    #[serde(default)]
    screen_description: String,
    #[serde(default)]
    interactive_elements: Vec<RawVisualElement>,
    #[serde(default)]
    safety_warnings: Vec<String>,
    #[serde(default)]
    alternative_methods: Vec<String>,
}

fn parse_visual_analysis(text: &str, goal: &str) -> Result<VisualAnalysis, VisionError> {
    let json_str =
        extract_json_block(text).ok_or_else(|| VisionError::Parse("no JSON object".into()))?;
    let raw: RawVisualAnalysis =
        serde_json::from_str(json_str).map_err(|e| VisionError::Parse(e.to_string()))?;

    let elements = raw
        .interactive_elements
        .into_iter()
        .map(|e| VisualElement {
            kind: e.kind,
            position_label: e.position,
            text: e.text,
            purpose: e.purpose,
            visual_traits: e.characteristics,
            task_relevant: false,
            click_coordinates: e.coordinates.map(|c| (c.click_x, c.click_y)),
        })
        .collect();

    Ok(VisualAnalysis {
        screen_description: raw.screen_description,
        elements,
        safety_warnings: raw.safety_warnings,
        alternative_methods: raw.alternative_methods,
        task_context: goal.to_string(),
    })
}

/// 按任务关键词给视觉元素打 task_relevant 标记
fn mark_task_relevant(elements: &mut [VisualElement], goal: &str) {
    if goal.is_empty() {
        return;
    }
    let task = goal.to_lowercase();
    for e in elements.iter_mut() {
        let text = e.text.to_lowercase();
        let kind = e.kind.to_lowercase();
        let purpose = e.purpose.to_lowercase();

        e.task_relevant = (task.contains("search") && (kind == "input" || kind == "search"))
            || (task.contains("login")
                && (text.contains("login") || text.contains("sign") || purpose.contains("auth")))
            || (task.contains("form")
                && matches!(kind.as_str(), "input" | "textarea" | "select"))
            || (task.contains("submit")
                && (text.contains("submit") || purpose.contains("submit")))
            || (task.contains("navigate") && matches!(kind.as_str(), "link" | "button"))
            || (task.contains("click") && matches!(kind.as_str(), "button" | "link"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_vision_json_with_coordinates() {
        let text = r#"```json
{
  "screen_description": "settings pane",
  "interactive_elements": [
    {"type":"button","position":"top-right","text":"Login","purpose":"User authentication","characteristics":"blue","coordinates":{"click_x":912,"click_y":44}},
    {"type":"input","position":"center","text":"Search","purpose":"find things"}
  ],
  "safety_warnings": ["login area"],
  "alternative_methods": []
}
```"#;
        let analysis = parse_visual_analysis(text, "login to my account").unwrap();
        assert_eq!(analysis.elements.len(), 2);
        assert_eq!(analysis.elements[0].click_coordinates, Some((912.0, 44.0)));
        assert_eq!(analysis.elements[1].click_coordinates, None);
        assert_eq!(analysis.task_context, "login to my account");
    }

    #[test]
    fn task_relevance_marks_login_elements() {
        let mut elements = vec![
            VisualElement {
                kind: "button".to_string(),
                position_label: "top".to_string(),
                text: "Sign in".to_string(),
                purpose: "auth".to_string(),
                visual_traits: String::new(),
                task_relevant: false,
                click_coordinates: None,
            },
            VisualElement {
                kind: "link".to_string(),
                position_label: "bottom".to_string(),
                text: "Privacy policy".to_string(),
                purpose: "legal".to_string(),
                visual_traits: String::new(),
                task_relevant: false,
                click_coordinates: None,
            },
        ];
        mark_task_relevant(&mut elements, "login to the site");
        assert!(elements[0].task_relevant);
        assert!(!elements[1].task_relevant);
    }

    #[test]
    fn non_json_vision_output_is_parse_error() {
        assert!(matches!(
            parse_visual_analysis("pretty screen!", "g"),
            Err(VisionError::Parse(_))
        ));
    }
}
