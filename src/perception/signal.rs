//! 感知数据模型：UI 信号、系统状态、视觉元素与快照
//!
//! 这些类型是各组件之间唯一的数据通路：采集器产出 UIElement，视觉适配器产出
//! VisualAnalysis，Orchestrator 每个迭代把它们组装成一份不可变的 PerceptionSnapshot。
//! 快照内的对象不跨迭代存活。

use chrono::{DateTime, Utc};
use serde::Serialize;

/// 标签来源：真实的可达性标签 vs 兜底生成的启发式标签
///
/// 启发式标签只在 title / description / help / value / role-description
/// 全部缺失时才会出现，下游关联逻辑据此决定是否给文本相似度计分。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ElementLabel {
    Genuine(String),
    Heuristic(String),
}

impl ElementLabel {
    pub fn text(&self) -> &str {
        match self {
            ElementLabel::Genuine(s) | ElementLabel::Heuristic(s) => s,
        }
    }

    pub fn is_genuine(&self) -> bool {
        matches!(self, ElementLabel::Genuine(_))
    }

    pub fn is_empty(&self) -> bool {
        self.text().is_empty()
    }
}

impl std::fmt::Display for ElementLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.text())
    }
}

/// 一次发现遍历中归一化后的交互元素
///
/// id 在单次 discover 调用内唯一；没有平台标识符时合成 `role_x_y` 位置键。
/// 两个渲染在同一坐标、同一角色的不同元素会共用这个键——这是沿用下来的
/// 已记录近似，不在别处悄悄"修复"。
#[derive(Debug, Clone, Serialize)]
pub struct UIElement {
    pub id: String,
    /// 归一化角色名，如 button / popup / text-field
    pub role: String,
    pub position: (f64, f64),
    pub size: (f64, f64),
    pub current_value: String,
    /// 可枚举控件（弹出菜单等）的有序选项
    pub available_options: Vec<String>,
    /// 元素支持的操作集合
    pub supported_operations: Vec<String>,
    pub title: ElementLabel,
    pub description: ElementLabel,
    pub enabled: bool,
    pub focused: bool,
}

/// 系统状态采样：电量、电源、网络、时间与负载
#[derive(Debug, Clone, Serialize)]
pub struct SystemState {
    pub battery_level: i32,
    pub power_source: String,
    pub network_status: String,
    /// 墙钟时间 HH:MM
    pub time: String,
    pub memory_usage: f32,
    pub cpu_usage: f32,
}

impl SystemState {
    pub fn unknown() -> Self {
        Self {
            battery_level: 0,
            power_source: "unknown".to_string(),
            network_status: "unknown".to_string(),
            time: "00:00".to_string(),
            memory_usage: 0.0,
            cpu_usage: 0.0,
        }
    }

    /// 以键值对形式展开，供目标达成检查对照完成指标
    pub fn as_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("battery_level", self.battery_level.to_string()),
            ("power_source", self.power_source.clone()),
            ("network_status", self.network_status.clone()),
            ("time", self.time.clone()),
            ("memory_usage", format!("{:.1}", self.memory_usage)),
            ("cpu_usage", format!("{:.1}", self.cpu_usage)),
        ]
    }

    pub fn summary(&self) -> String {
        format!(
            "battery={}%, power={}, net={}, mem={:.1}%, cpu={:.1}%",
            self.battery_level,
            self.power_source,
            self.network_status,
            self.memory_usage,
            self.cpu_usage
        )
    }
}

/// 当前应用上下文：活动应用、窗口标题、聚焦元素标签
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplicationContext {
    pub app_name: String,
    pub window_title: String,
    pub focused_element: String,
}

/// 视觉 oracle 识别出的单个元素；一次调用产出后不再修改
#[derive(Debug, Clone, Serialize)]
pub struct VisualElement {
    pub kind: String,
    /// 粗粒度位置描述，如 "top-right"
    pub position_label: String,
    pub text: String,
    pub purpose: String,
    pub visual_traits: String,
    pub task_relevant: bool,
    /// 模型给出精确点击坐标时填充
    pub click_coordinates: Option<(f64, f64)>,
}

impl VisualElement {
    /// 身份键：text + kind + purpose，关联去重以此为准
    pub fn identity_key(&self) -> String {
        format!("{}|{}|{}", self.text, self.kind, self.purpose)
    }
}

/// 视觉 oracle 的完整输出
#[derive(Debug, Clone, Serialize)]
pub struct VisualAnalysis {
    pub screen_description: String,
    pub elements: Vec<VisualElement>,
    pub safety_warnings: Vec<String>,
    pub alternative_methods: Vec<String>,
    pub task_context: String,
}

/// 每个迭代构造一次的感知快照；构造后不可变，归当前迭代独占
#[derive(Debug, Clone, Serialize)]
pub struct PerceptionSnapshot {
    pub ui_elements: Vec<UIElement>,
    pub system_state: SystemState,
    pub context: ApplicationContext,
    pub visual: Option<VisualAnalysis>,
    pub correlations: Option<crate::perception::correlate::CorrelationSet>,
    pub timestamp: DateTime<Utc>,
}

impl PerceptionSnapshot {
    /// 混合感知（可达性 + 视觉）还是仅可达性
    pub fn perception_type(&self) -> &'static str {
        if self.visual.is_some() {
            "hybrid"
        } else {
            "accessibility_only"
        }
    }
}
