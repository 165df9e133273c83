//! 执行适配器：单个 ActionStep → ActionOutcome
//!
//! 对封闭的 ActionStep 枚举做显式 match；所有可预期的失败（元素不存在、
//! 不可选择、选项缺失、方向非法）都报告为 success=false 的结果而不是抛错。
//! 每个动作后有一次有界的 UI 沉降等待；每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::action::driver::{key_code_for, InputDriver};
use crate::action::lookup::ElementLookup;
use crate::perception::backend::{normalize_app_name, AccessibilityProvider, RawElement};
use crate::planner::plan::{ActionStep, Target};

/// 回车键 key code（文本输入完成后的自动提交）
const KEY_RETURN: u32 = 36;
/// 删除键 key code（清空输入框）
const KEY_DELETE: u32 = 51;

/// 单步执行结果
#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub success: bool,
    pub result: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl ActionOutcome {
    pub fn ok(result: impl Into<String>) -> Self {
        Self {
            success: true,
            result: result.into(),
            error: String::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: String::new(),
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}

pub struct ExecutorAdapter {
    driver: Arc<dyn InputDriver>,
    lookup: ElementLookup,
    /// 每个动作后的 UI 沉降等待
    settle: Duration,
}

impl ExecutorAdapter {
    pub fn new(
        provider: Arc<dyn AccessibilityProvider>,
        driver: Arc<dyn InputDriver>,
        settle: Duration,
    ) -> Self {
        Self {
            driver,
            lookup: ElementLookup::new(provider),
            settle,
        }
    }

    /// 执行一个步骤；永不 panic，可预期失败都进 ActionOutcome
    pub async fn execute(&self, app: Option<&str>, step: &ActionStep) -> ActionOutcome {
        let started = tokio::time::Instant::now();

        let outcome = match step {
            ActionStep::Click { target, .. } => self.do_click(app, target).await,
            ActionStep::Type { target, text, .. } => self.do_type(app, target, text).await,
            ActionStep::Keystroke { target, text, .. } => {
                self.do_keystroke(app, target, text).await
            }
            ActionStep::Key { key, .. } => self.do_key(key).await,
            ActionStep::Select { target, option, .. } => {
                self.do_select(app, target, option).await
            }
            ActionStep::Scroll {
                target, direction, ..
            } => self.do_scroll(app, target, direction).await,
            ActionStep::Wait { duration_ms, .. } => {
                tokio::time::sleep(Duration::from_millis(*duration_ms)).await;
                ActionOutcome::ok(format!("Waited {}ms", duration_ms))
            }
            ActionStep::LaunchApp { app_name, .. } => self.do_launch(app_name).await,
        };

        // 给 UI 一点时间跟上（wait 自身不需要额外沉降）
        if !matches!(step, ActionStep::Wait { .. }) {
            tokio::time::sleep(self.settle).await;
        }

        let audit = serde_json::json!({
            "event": "action_audit",
            "operation": step.operation(),
            "target": step.target_label(),
            "ok": outcome.success,
            "duration_ms": started.elapsed().as_millis() as u64,
            "error": outcome.error,
        });
        tracing::info!(audit = %audit.to_string(), "action");

        outcome
    }

    /// 把目标应用带到前台；失败只记日志（INIT 阶段 best-effort）
    pub async fn focus_application(&self, app: &str) -> bool {
        let app = normalize_app_name(app);
        if self.driver.activate_app(&app).await.is_ok() {
            return true;
        }
        // 未运行则先启动再激活
        if let Err(e) = self.driver.launch_app(&app).await {
            tracing::warn!(app = %app, error = %e, "launch during focus failed");
            return false;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        self.driver.activate_app(&app).await.is_ok()
    }

    async fn resolve(
        &self,
        app: Option<&str>,
        target: &str,
    ) -> Result<Option<RawElement>, ActionOutcome> {
        let Some(app) = app else {
            return Err(ActionOutcome::failed(
                "no target application to resolve element in",
            ));
        };
        match self.lookup.resolve(&normalize_app_name(app), target).await {
            Ok(Some((_, element))) => Ok(Some(element)),
            Ok(None) => Ok(None),
            Err(e) => Err(ActionOutcome::failed(format!(
                "element lookup failed: {}",
                e
            ))),
        }
    }

    fn element_center(element: &RawElement) -> (f64, f64) {
        (
            element.position.0 + element.size.0 / 2.0,
            element.position.1 + element.size.1 / 2.0,
        )
    }

    async fn do_click(&self, app: Option<&str>, target: &Target) -> ActionOutcome {
        let id = match target {
            Target::System => {
                // 点"整个系统"不是合法目标，换 keystroke
                return ActionOutcome::failed("cannot click 'all' - use a keystroke step instead");
            }
            Target::Element(id) => id,
        };
        let element = match self.resolve(app, id).await {
            Ok(Some(e)) => e,
            Ok(None) => return ActionOutcome::failed(format!("element not found: {}", id)),
            Err(outcome) => return outcome,
        };
        if !element.enabled {
            return ActionOutcome::failed(format!("element disabled: {}", id));
        }
        let (x, y) = Self::element_center(&element);
        match self.driver.click_at(x, y).await {
            Ok(()) => ActionOutcome::ok(format!("Clicked {} at ({:.0}, {:.0})", id, x, y)),
            Err(e) => ActionOutcome::failed(e.to_string()),
        }
    }

    async fn do_type(&self, app: Option<&str>, target: &Target, text: &str) -> ActionOutcome {
        match target {
            Target::System => self.type_system_wide(text).await,
            Target::Element(id) => {
                let element = match self.resolve(app, id).await {
                    Ok(Some(e)) => e,
                    Ok(None) => {
                        return ActionOutcome::failed(format!("element not found: {}", id))
                    }
                    Err(outcome) => return outcome,
                };
                // 先点中元素夺焦，再清空、键入、回车
                let (x, y) = Self::element_center(&element);
                if let Err(e) = self.driver.click_at(x, y).await {
                    return ActionOutcome::failed(format!("could not focus element: {}", e));
                }
                tokio::time::sleep(self.settle).await;
                self.type_system_wide(text).await
            }
        }
    }

    /// 清空 → 键入 → 回车，作用于当前聚焦位置
    async fn type_system_wide(&self, text: &str) -> ActionOutcome {
        let sequence = async {
            self.driver.keystroke_with_command('a').await?;
            self.driver.key_code(KEY_DELETE).await?;
            self.driver.type_text(text).await?;
            self.driver.key_code(KEY_RETURN).await
        };
        match sequence.await {
            Ok(()) => ActionOutcome::ok(format!("Typed '{}' and pressed Enter", text)),
            Err(e) => ActionOutcome::failed(e.to_string()),
        }
    }

    async fn do_keystroke(
        &self,
        app: Option<&str>,
        target: &Target,
        text: &str,
    ) -> ActionOutcome {
        // `open xxx` / `launch xxx` 前缀改道为应用启动（保留应用名原始大小写）
        let trimmed = text.trim();
        let lowered = trimmed.to_lowercase();
        let app_name = if lowered.starts_with("open ") {
            Some(trimmed["open ".len()..].trim())
        } else if lowered.starts_with("launch ") {
            Some(trimmed["launch ".len()..].trim())
        } else {
            None
        };
        if let Some(name) = app_name {
            if !name.is_empty() {
                return self.do_launch(name).await;
            }
        }

        match target {
            Target::System => self.type_system_wide(text).await,
            Target::Element(_) => self.do_type(app, target, text).await,
        }
    }

    async fn do_key(&self, key: &str) -> ActionOutcome {
        match key_code_for(key) {
            Some(code) => match self.driver.key_code(code).await {
                Ok(()) => ActionOutcome::ok(format!("Pressed {} key", key)),
                Err(e) => ActionOutcome::failed(e.to_string()),
            },
            None => ActionOutcome::failed(format!("unknown key: {}", key)),
        }
    }

    async fn do_select(
        &self,
        app: Option<&str>,
        target: &Target,
        option: &str,
    ) -> ActionOutcome {
        let id = match target {
            Target::System => return ActionOutcome::failed("select needs a concrete element"),
            Target::Element(id) => id,
        };
        let Some(app_name) = app else {
            return ActionOutcome::failed("no target application to resolve element in");
        };
        let app_name = normalize_app_name(app_name);

        let (window, element) = match self.lookup.resolve(&app_name, id).await {
            Ok(Some(pair)) => pair,
            Ok(None) => return ActionOutcome::failed(format!("element not found: {}", id)),
            Err(e) => return ActionOutcome::failed(format!("element lookup failed: {}", e)),
        };
        if element.role != "popup" && element.role != "combo-box" {
            return ActionOutcome::failed(format!("element {} is not selectable", id));
        }

        // 打开弹出菜单，等它展开，再找选项
        let (x, y) = Self::element_center(&element);
        if let Err(e) = self.driver.click_at(x, y).await {
            return ActionOutcome::failed(format!("could not open popup: {}", e));
        }
        tokio::time::sleep(Duration::from_millis(1000)).await;

        match self.lookup.resolve_option(&window, option).await {
            Ok(Some(item)) => {
                let (ox, oy) = Self::element_center(&item);
                match self.driver.click_at(ox, oy).await {
                    Ok(()) => ActionOutcome::ok(format!("Selected '{}' from {}", option, id)),
                    Err(e) => ActionOutcome::failed(e.to_string()),
                }
            }
            Ok(None) => ActionOutcome::failed(format!("option '{}' not found", option)),
            Err(e) => ActionOutcome::failed(format!("option lookup failed: {}", e)),
        }
    }

    async fn do_scroll(
        &self,
        app: Option<&str>,
        target: &Target,
        direction: &str,
    ) -> ActionOutcome {
        // 方向在执行期校验；非法方向是失败结果而不是 panic
        let code = match direction.to_lowercase().as_str() {
            "up" => 116,
            "down" => 121,
            "left" => 123,
            "right" => 124,
            other => {
                return ActionOutcome::failed(format!("invalid scroll direction: {}", other))
            }
        };

        if let Target::Element(id) = target {
            match self.resolve(app, id).await {
                Ok(Some(element)) => {
                    let (x, y) = Self::element_center(&element);
                    if let Err(e) = self.driver.click_at(x, y).await {
                        return ActionOutcome::failed(format!("could not focus element: {}", e));
                    }
                }
                Ok(None) => return ActionOutcome::failed(format!("element not found: {}", id)),
                Err(outcome) => return outcome,
            }
        }

        match self.driver.key_code(code).await {
            Ok(()) => ActionOutcome::ok(format!("Scrolled {}", direction)),
            Err(e) => ActionOutcome::failed(e.to_string()),
        }
    }

    async fn do_launch(&self, app_name: &str) -> ActionOutcome {
        let app = normalize_app_name(app_name);
        if let Err(e) = self.driver.launch_app(&app).await {
            return ActionOutcome::failed(e.to_string());
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
        match self.driver.activate_app(&app).await {
            Ok(()) => ActionOutcome::ok(format!("Launched and focused {}", app)),
            Err(_) => ActionOutcome::ok(format!("Launched {} (no focus yet)", app)),
        }
    }
}
