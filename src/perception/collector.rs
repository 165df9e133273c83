//! 信号采集器：遍历可达性树，产出去重且顺序稳定的 UIElement 列表
//!
//! 每次 discover 调用都是一次全新的完整采样：去重身份集在调用开头重建，
//! 不携带任何跨调用状态。单个窗口或角色扫描失败不拖垮整次发现，
//! 只有完全无法枚举应用 / 窗口才作为 DiscoveryFailure 上报，
//! 让调用方能区分"没找到"与"看不了"。

use std::collections::HashSet;
use std::sync::Arc;

use crate::perception::backend::{
    normalize_app_name, AccessibilityProvider, DiscoveryError, ElementRole, RawElement, WindowRef,
};
use crate::perception::signal::{ApplicationContext, ElementLabel, UIElement};

/// 未指定目标应用时参与扫描的常见应用
const KNOWN_APPS: [&str; 9] = [
    "System Settings",
    "Calculator",
    "Google Chrome",
    "Safari",
    "Cursor",
    "Visual Studio Code",
    "Mail",
    "Calendar",
    "Finder",
];

/// 不面向用户、不应被选为目标的系统组件
const APP_BLACKLIST: [&str; 17] = [
    "Siri",
    "VoiceOver",
    "VoiceOver Utility",
    "Accessibility Inspector",
    "Console",
    "Activity Monitor",
    "Disk Utility",
    "Script Editor",
    "Automator",
    "Shortcuts",
    "Mission Control",
    "Launchpad",
    "Dock",
    "Control Center",
    "Notification Center",
    "Spotlight",
    "Trash",
];

pub struct SignalCollector {
    provider: Arc<dyn AccessibilityProvider>,
}

impl SignalCollector {
    pub fn new(provider: Arc<dyn AccessibilityProvider>) -> Self {
        Self { provider }
    }

    /// 发现交互元素
    ///
    /// 指定 target_app 时只扫它的窗口；否则扫常见应用集合。
    /// 返回 Ok(vec![]) 表示"扫到了但为空"，由 Orchestrator 决定是否触发
    /// 应用启动重试；Err 表示连枚举都失败了。
    pub async fn discover(
        &self,
        target_app: Option<&str>,
    ) -> Result<Vec<UIElement>, DiscoveryError> {
        // 每次调用重建身份集：发现是幂等的，id 可以跨调用复用
        let mut seen: HashSet<String> = HashSet::new();
        let mut out: Vec<UIElement> = Vec::new();

        let windows = self.enumerate_windows(target_app).await?;
        tracing::debug!(windows = windows.len(), "ui scan starting");

        for window in &windows {
            for role in ElementRole::ALL {
                match self.provider.elements(window, role).await {
                    Ok(raws) => {
                        for raw in raws {
                            let element = normalize_element(raw, role);
                            if seen.insert(element.id.clone()) {
                                out.push(element);
                            }
                        }
                    }
                    Err(e) => {
                        // 单个角色扫描失败：记录后继续，返回部分结果
                        tracing::warn!(
                            app = %window.app,
                            window = window.index,
                            role = role.as_str(),
                            error = %e,
                            "role scan failed, continuing"
                        );
                    }
                }
            }
        }

        tracing::info!(elements = out.len(), "ui discovery complete");
        Ok(out)
    }

    async fn enumerate_windows(
        &self,
        target_app: Option<&str>,
    ) -> Result<Vec<WindowRef>, DiscoveryError> {
        match target_app {
            Some(app) => {
                // 目标明确：窗口枚举失败即发现级错误
                self.provider.windows(&normalize_app_name(app)).await
            }
            None => {
                let mut windows = Vec::new();
                for app in KNOWN_APPS {
                    match self.provider.windows(app).await {
                        Ok(mut w) => windows.append(&mut w),
                        Err(e) => {
                            tracing::warn!(app, error = %e, "window enumeration failed, skipping app");
                        }
                    }
                }
                Ok(windows)
            }
        }
    }

    /// 当前应用上下文：活动应用、首个窗口标题、聚焦元素标签
    pub async fn application_context(&self, target_app: Option<&str>) -> ApplicationContext {
        let app_name = match target_app {
            Some(a) => normalize_app_name(a),
            None => match self.provider.frontmost_application().await {
                Ok(Some(name)) => name,
                _ => "Unknown".to_string(),
            },
        };

        match self.provider.windows(&app_name).await {
            Ok(windows) if !windows.is_empty() => {
                let window = &windows[0];
                let focused = self
                    .provider
                    .focused_element_label(window)
                    .await
                    .unwrap_or_default();
                ApplicationContext {
                    app_name,
                    window_title: window.title.clone(),
                    focused_element: focused,
                }
            }
            _ => ApplicationContext {
                app_name,
                window_title: String::new(),
                focused_element: String::new(),
            },
        }
    }

    /// 目标应用候选：运行中的应用 + 常见应用，过滤黑名单
    pub async fn available_applications(&self) -> Vec<String> {
        let mut apps: Vec<String> = Vec::new();
        match self.provider.running_applications().await {
            Ok(running) => {
                for app in running {
                    let app = normalize_app_name(&app);
                    if !apps.contains(&app) {
                        apps.push(app);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not enumerate running applications");
            }
        }
        for app in KNOWN_APPS {
            if !apps.iter().any(|a| a == app) {
                apps.push(app.to_string());
            }
        }

        let before = apps.len();
        apps.retain(|a| !APP_BLACKLIST.contains(&a.as_str()));
        tracing::debug!(before, after = apps.len(), "app candidates filtered");
        apps
    }
}

/// 原始元素 → 归一化 UIElement：id 兜底与标签兜底都在这里
fn normalize_element(raw: RawElement, role: ElementRole) -> UIElement {
    let id = if raw.identifier.is_empty() {
        // 位置键兜底：同角色同坐标的元素会共用 id（已记录的近似）
        format!(
            "{}_{}_{}",
            role.as_str(),
            raw.position.0.round(),
            raw.position.1.round()
        )
    } else {
        raw.identifier.clone()
    };

    let title = fallback_label(
        &[
            &raw.title,
            &raw.description,
            &raw.help,
            &raw.value,
            &raw.role_description,
        ],
        role,
        raw.position,
    );
    let description = fallback_label(
        &[
            &raw.description,
            &raw.help,
            &raw.value,
            &raw.role_description,
        ],
        role,
        raw.position,
    );

    UIElement {
        id,
        role: role.as_str().to_string(),
        position: raw.position,
        size: raw.size,
        current_value: raw.value,
        available_options: raw.options,
        supported_operations: raw.actions,
        title,
        description,
        enabled: raw.enabled,
        focused: raw.focused,
    }
}

/// 标签兜底链：按序取第一个非空来源为 Genuine；全空时生成 Heuristic，
/// 保证下游永远能把猜出来的标签与真实标签区分开。
fn fallback_label(sources: &[&String], role: ElementRole, position: (f64, f64)) -> ElementLabel {
    for source in sources {
        let trimmed = source.trim();
        if !trimmed.is_empty() {
            return ElementLabel::Genuine(trimmed.to_string());
        }
    }
    ElementLabel::Heuristic(format!(
        "{} near {}",
        role.as_str(),
        position_bucket(position)
    ))
}

/// 坐标 → 粗粒度九宫格描述；只用于启发式标签
fn position_bucket((x, y): (f64, f64)) -> &'static str {
    let col = if x < 400.0 {
        "left"
    } else if x < 900.0 {
        "center"
    } else {
        "right"
    };
    let row = if y < 300.0 {
        "top"
    } else if y < 600.0 {
        "middle"
    } else {
        "bottom"
    };
    match (row, col) {
        ("top", "left") => "top-left",
        ("top", "center") => "top-center",
        ("top", "right") => "top-right",
        ("middle", "left") => "middle-left",
        ("middle", "center") => "center",
        ("middle", "right") => "middle-right",
        ("bottom", "left") => "bottom-left",
        ("bottom", "center") => "bottom-center",
        _ => "bottom-right",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// 脚本化后端：固定返回同一棵合成 UI 树
    struct FixedProvider {
        elements: Vec<RawElement>,
        fail_roles: Vec<ElementRole>,
        fail_windows: bool,
    }

    impl FixedProvider {
        fn with_elements(elements: Vec<RawElement>) -> Self {
            Self {
                elements,
                fail_roles: vec![],
                fail_windows: false,
            }
        }
    }

    #[async_trait]
    impl AccessibilityProvider for FixedProvider {
        async fn running_applications(&self) -> Result<Vec<String>, DiscoveryError> {
            Ok(vec!["Demo".to_string(), "Siri".to_string()])
        }

        async fn windows(&self, app: &str) -> Result<Vec<WindowRef>, DiscoveryError> {
            if self.fail_windows {
                return Err(DiscoveryError::Query("no accessibility access".into()));
            }
            if app == "Demo" {
                Ok(vec![WindowRef {
                    app: app.to_string(),
                    index: 1,
                    title: "Demo Window".to_string(),
                    frame: (0.0, 0.0, 800.0, 600.0),
                }])
            } else {
                Ok(vec![])
            }
        }

        async fn elements(
            &self,
            _window: &WindowRef,
            role: ElementRole,
        ) -> Result<Vec<RawElement>, DiscoveryError> {
            if self.fail_roles.contains(&role) {
                return Err(DiscoveryError::Query("role scan exploded".into()));
            }
            Ok(self
                .elements
                .iter()
                .filter(|e| e.role == role.as_str())
                .cloned()
                .collect())
        }

        async fn focused_element_label(
            &self,
            _window: &WindowRef,
        ) -> Result<String, DiscoveryError> {
            Ok(String::new())
        }

        async fn frontmost_application(&self) -> Result<Option<String>, DiscoveryError> {
            Ok(Some("Demo".to_string()))
        }
    }

    fn button(identifier: &str, title: &str, x: f64, y: f64) -> RawElement {
        RawElement {
            role: "button".to_string(),
            identifier: identifier.to_string(),
            title: title.to_string(),
            position: (x, y),
            size: (40.0, 20.0),
            enabled: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn discover_is_idempotent_across_calls() {
        let provider = Arc::new(FixedProvider::with_elements(vec![
            button("save", "Save", 10.0, 10.0),
            button("", "Cancel", 60.0, 10.0),
        ]));
        let collector = SignalCollector::new(provider);

        let first = collector.discover(Some("Demo")).await.unwrap();
        let second = collector.discover(Some("Demo")).await.unwrap();

        let ids = |v: &[UIElement]| v.iter().map(|e| e.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
        // 单次调用内无重复 id
        let mut unique = ids(&first);
        unique.dedup();
        assert_eq!(unique.len(), first.len());
    }

    #[tokio::test]
    async fn duplicate_ids_within_one_pass_are_collapsed() {
        // 两个无标识符按钮渲染在同一坐标：共用位置键，只保留首个
        let provider = Arc::new(FixedProvider::with_elements(vec![
            button("", "First", 100.0, 100.0),
            button("", "Second", 100.0, 100.0),
        ]));
        let collector = SignalCollector::new(provider);

        let found = collector.discover(Some("Demo")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "button_100_100");
        assert_eq!(found[0].title.text(), "First");
    }

    #[tokio::test]
    async fn role_failure_yields_partial_results() {
        let provider = Arc::new(FixedProvider {
            elements: vec![button("ok", "OK", 10.0, 10.0)],
            fail_roles: vec![ElementRole::Table, ElementRole::List],
            fail_windows: false,
        });
        let collector = SignalCollector::new(provider);

        let found = collector.discover(Some("Demo")).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn total_failure_is_an_error_not_empty() {
        let provider = Arc::new(FixedProvider {
            elements: vec![],
            fail_roles: vec![],
            fail_windows: true,
        });
        let collector = SignalCollector::new(provider);

        assert!(collector.discover(Some("Demo")).await.is_err());
    }

    #[tokio::test]
    async fn missing_app_is_empty_not_error() {
        let provider = Arc::new(FixedProvider::with_elements(vec![]));
        let collector = SignalCollector::new(provider);

        let found = collector.discover(Some("NotRunning")).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn blacklisted_apps_are_filtered_from_candidates() {
        let provider = Arc::new(FixedProvider::with_elements(vec![]));
        let collector = SignalCollector::new(provider);

        let apps = collector.available_applications().await;
        assert!(apps.iter().any(|a| a == "Demo"));
        assert!(!apps.iter().any(|a| a == "Siri"));
    }

    #[test]
    fn label_fallback_prefers_title_then_description() {
        let mut raw = button("x", "", 10.0, 10.0);
        raw.description = "a toggle".to_string();
        let el = normalize_element(raw, ElementRole::Button);
        assert_eq!(el.title, ElementLabel::Genuine("a toggle".to_string()));

        let bare = button("y", "", 10.0, 10.0);
        let el = normalize_element(bare, ElementRole::Button);
        assert!(!el.title.is_genuine());
        assert!(el.title.text().starts_with("button near "));
    }
}
