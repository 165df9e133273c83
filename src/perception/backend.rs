//! 可达性树后端抽象
//!
//! SignalCollector 只依赖 AccessibilityProvider 这个只读 trait：枚举应用、
//! 窗口与指定角色的元素。真实实现 SystemEventsProvider 通过 osascript 查询
//! System Events；测试里用脚本化的假实现替换。

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

/// 发现层错误：完全无法枚举时报告，部分失败由采集器容忍
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("accessibility query failed: {0}")]
    Query(String),

    #[error("osascript not available: {0}")]
    Backend(String),
}

/// 采集器扫描的固定交互角色集合
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementRole {
    Button,
    Popup,
    Checkbox,
    Radio,
    TextField,
    Slider,
    MenuItem,
    TabGroup,
    ComboBox,
    List,
    Table,
    ScrollArea,
}

impl ElementRole {
    pub const ALL: [ElementRole; 12] = [
        ElementRole::Button,
        ElementRole::Popup,
        ElementRole::Checkbox,
        ElementRole::Radio,
        ElementRole::TextField,
        ElementRole::Slider,
        ElementRole::MenuItem,
        ElementRole::TabGroup,
        ElementRole::ComboBox,
        ElementRole::List,
        ElementRole::Table,
        ElementRole::ScrollArea,
    ];

    /// 归一化角色名，写入 UIElement.role
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementRole::Button => "button",
            ElementRole::Popup => "popup",
            ElementRole::Checkbox => "checkbox",
            ElementRole::Radio => "radio",
            ElementRole::TextField => "text-field",
            ElementRole::Slider => "slider",
            ElementRole::MenuItem => "menu-item",
            ElementRole::TabGroup => "tab-group",
            ElementRole::ComboBox => "combo-box",
            ElementRole::List => "list",
            ElementRole::Table => "table",
            ElementRole::ScrollArea => "scroll-area",
        }
    }

    /// System Events 中对应的元素类名（复数形式，用于 AppleScript 查询）
    pub fn applescript_class(&self) -> &'static str {
        match self {
            ElementRole::Button => "buttons",
            ElementRole::Popup => "pop up buttons",
            ElementRole::Checkbox => "checkboxes",
            ElementRole::Radio => "radio buttons",
            ElementRole::TextField => "text fields",
            ElementRole::Slider => "sliders",
            ElementRole::MenuItem => "menu items",
            ElementRole::TabGroup => "tab groups",
            ElementRole::ComboBox => "combo boxes",
            ElementRole::List => "lists",
            ElementRole::Table => "tables",
            ElementRole::ScrollArea => "scroll areas",
        }
    }

    pub fn from_normalized(name: &str) -> Option<ElementRole> {
        Self::ALL.iter().copied().find(|r| r.as_str() == name)
    }
}

/// 某应用的一个窗口引用（带框架坐标，截图时复用）
#[derive(Debug, Clone)]
pub struct WindowRef {
    pub app: String,
    /// 从 1 开始的窗口序号（AppleScript 习惯）
    pub index: usize,
    pub title: String,
    /// (x, y, w, h)
    pub frame: (f64, f64, f64, f64),
}

/// 后端返回的未归一化元素属性
#[derive(Debug, Clone, Default)]
pub struct RawElement {
    pub role: String,
    pub identifier: String,
    pub title: String,
    pub description: String,
    pub help: String,
    pub value: String,
    pub role_description: String,
    pub position: (f64, f64),
    pub size: (f64, f64),
    pub enabled: bool,
    pub focused: bool,
    pub options: Vec<String>,
    pub actions: Vec<String>,
}

/// 可达性树只读访问接口
#[async_trait]
pub trait AccessibilityProvider: Send + Sync {
    /// 前台可见的运行中应用名
    async fn running_applications(&self) -> Result<Vec<String>, DiscoveryError>;

    /// 指定应用的窗口列表；应用未运行时返回空列表而非错误
    async fn windows(&self, app: &str) -> Result<Vec<WindowRef>, DiscoveryError>;

    /// 窗口内指定角色的全部元素
    async fn elements(
        &self,
        window: &WindowRef,
        role: ElementRole,
    ) -> Result<Vec<RawElement>, DiscoveryError>;

    /// 窗口内聚焦元素的标签（无聚焦时为空串）
    async fn focused_element_label(&self, window: &WindowRef) -> Result<String, DiscoveryError>;

    async fn frontmost_application(&self) -> Result<Option<String>, DiscoveryError>;
}

/// 常见应用名归一化："Chrome" → "Google Chrome" 等
pub fn normalize_app_name(app: &str) -> String {
    match app {
        "iTerm" | "iTerm2" => "iTerm2".to_string(),
        "Chrome" => "Google Chrome".to_string(),
        "System Preferences" => "System Settings".to_string(),
        other => other.to_string(),
    }
}

/// 字段分隔符：AppleScript 侧用它拼接元素属性，Rust 侧按它切分
const FIELD_SEP: &str = "\u{1f}";

/// 基于 System Events（osascript）的真实后端
///
/// 每次查询派生一个 osascript 子进程；单条查询失败只影响对应的窗口 / 角色，
/// 由采集器吸收为部分结果。
#[derive(Debug, Default)]
pub struct SystemEventsProvider;

impl SystemEventsProvider {
    pub fn new() -> Self {
        Self
    }

    async fn run_script(&self, script: &str) -> Result<String, DiscoveryError> {
        let output = Command::new("osascript")
            .arg("-e")
            .arg(script)
            .output()
            .await
            .map_err(|e| DiscoveryError::Backend(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(DiscoveryError::Query(stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

fn parse_number_pair(s: &str) -> (f64, f64) {
    let mut it = s
        .split(',')
        .map(|p| p.trim().parse::<f64>().unwrap_or(0.0));
    (it.next().unwrap_or(0.0), it.next().unwrap_or(0.0))
}

#[async_trait]
impl AccessibilityProvider for SystemEventsProvider {
    async fn running_applications(&self) -> Result<Vec<String>, DiscoveryError> {
        let script = r#"tell application "System Events"
    set out to ""
    repeat with p in (every application process whose background only is false)
        set out to out & (name of p) & linefeed
    end repeat
    return out
end tell"#;
        let raw = self.run_script(script).await?;
        Ok(raw
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    async fn windows(&self, app: &str) -> Result<Vec<WindowRef>, DiscoveryError> {
        let app = normalize_app_name(app);
        let script = format!(
            r#"tell application "System Events"
    if not (exists process "{app}") then return ""
    set out to ""
    tell process "{app}"
        set n to count of windows
        repeat with i from 1 to n
            set w to window i
            set pos to position of w
            set sz to size of w
            set t to ""
            try
                set t to name of w
            end try
            set out to out & t & "{sep}" & (item 1 of pos) & "," & (item 2 of pos) & "{sep}" & (item 1 of sz) & "," & (item 2 of sz) & linefeed
        end repeat
    end tell
    return out
end tell"#,
            app = app,
            sep = FIELD_SEP
        );
        let raw = self.run_script(&script).await?;
        let mut windows = Vec::new();
        for (i, line) in raw.lines().filter(|l| !l.trim().is_empty()).enumerate() {
            let fields: Vec<&str> = line.split(FIELD_SEP).collect();
            let title = fields.first().unwrap_or(&"").trim().to_string();
            let (x, y) = parse_number_pair(fields.get(1).unwrap_or(&"0,0"));
            let (w, h) = parse_number_pair(fields.get(2).unwrap_or(&"0,0"));
            windows.push(WindowRef {
                app: app.clone(),
                index: i + 1,
                title,
                frame: (x, y, w, h),
            });
        }
        Ok(windows)
    }

    async fn elements(
        &self,
        window: &WindowRef,
        role: ElementRole,
    ) -> Result<Vec<RawElement>, DiscoveryError> {
        // 每个元素输出一行，字段用 FIELD_SEP 分隔；取不到的属性留空而不是失败
        let script = format!(
            r#"tell application "System Events"
    tell process "{app}"
        set out to ""
        repeat with e in ({class} of window {index})
            set f1 to ""
            set f2 to ""
            set f3 to ""
            set f4 to ""
            set f5 to ""
            set f6 to ""
            try
                set f1 to value of attribute "AXIdentifier" of e
            end try
            try
                set f2 to name of e
            end try
            try
                set f3 to description of e
            end try
            try
                set f4 to help of e
            end try
            try
                set f5 to (value of e) as text
            end try
            try
                set f6 to role description of e
            end try
            set pos to {{0, 0}}
            set sz to {{0, 0}}
            try
                set pos to position of e
            end try
            try
                set sz to size of e
            end try
            set en to "true"
            try
                set en to (enabled of e) as text
            end try
            set fo to "false"
            try
                set fo to (focused of e) as text
            end try
            set acts to ""
            try
                repeat with a in (actions of e)
                    set acts to acts & (name of a) & ";"
                end repeat
            end try
            set opts to ""
            try
                repeat with m in (menu items of menu 1 of e)
                    set opts to opts & (name of m) & ";"
                end repeat
            end try
            set out to out & f1 & "{sep}" & f2 & "{sep}" & f3 & "{sep}" & f4 & "{sep}" & f5 & "{sep}" & f6 & "{sep}" & (item 1 of pos) & "," & (item 2 of pos) & "{sep}" & (item 1 of sz) & "," & (item 2 of sz) & "{sep}" & en & "{sep}" & fo & "{sep}" & acts & "{sep}" & opts & linefeed
        end repeat
        return out
    end tell
end tell"#,
            app = window.app,
            class = role.applescript_class(),
            index = window.index,
            sep = FIELD_SEP
        );

        let raw = self.run_script(&script).await?;
        let mut elements = Vec::new();
        for line in raw.lines().filter(|l| !l.trim().is_empty()) {
            let f: Vec<&str> = line.split(FIELD_SEP).collect();
            let get = |i: usize| f.get(i).map(|s| s.trim().to_string()).unwrap_or_default();
            let split_list = |s: String| -> Vec<String> {
                s.split(';')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect()
            };
            elements.push(RawElement {
                role: role.as_str().to_string(),
                identifier: get(0),
                title: get(1),
                description: get(2),
                help: get(3),
                value: get(4),
                role_description: get(5),
                position: parse_number_pair(&get(6)),
                size: parse_number_pair(&get(7)),
                enabled: get(8) != "false",
                focused: get(9) == "true",
                actions: split_list(get(10)),
                options: split_list(get(11)),
            });
        }
        Ok(elements)
    }

    async fn focused_element_label(&self, window: &WindowRef) -> Result<String, DiscoveryError> {
        let script = format!(
            r#"tell application "System Events"
    tell process "{app}"
        try
            set e to (first UI element of window {index} whose focused is true)
            try
                return name of e
            end try
            return value of attribute "AXIdentifier" of e
        end try
        return ""
    end tell
end tell"#,
            app = window.app,
            index = window.index
        );
        self.run_script(&script).await
    }

    async fn frontmost_application(&self) -> Result<Option<String>, DiscoveryError> {
        let script = r#"tell application "System Events" to get name of first application process whose frontmost is true"#;
        match self.run_script(script).await {
            Ok(name) if !name.is_empty() => Ok(Some(name)),
            Ok(_) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_maps_known_aliases() {
        assert_eq!(normalize_app_name("Chrome"), "Google Chrome");
        assert_eq!(normalize_app_name("System Preferences"), "System Settings");
        assert_eq!(normalize_app_name("iTerm"), "iTerm2");
        assert_eq!(normalize_app_name("Calculator"), "Calculator");
    }

    #[test]
    fn role_round_trips_through_normalized_name() {
        for role in ElementRole::ALL {
            assert_eq!(ElementRole::from_normalized(role.as_str()), Some(role));
        }
    }

    #[test]
    fn number_pair_parses_with_spaces() {
        assert_eq!(parse_number_pair("533, 310"), (533.0, 310.0));
        assert_eq!(parse_number_pair("garbage"), (0.0, 0.0));
    }
}
