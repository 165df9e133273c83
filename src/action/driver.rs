//! 输入注入驱动
//!
//! 单个点击 / 键入 / 按键的 OS 级原语。核心不拥有注入机制本身，只定义
//! 这层窄接口；真实实现 OsaScriptDriver 通过 System Events（osascript）
//! 与 `open` 子进程完成注入，测试里用脚本化假驱动替换。

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::perception::backend::normalize_app_name;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("osascript failed: {0}")]
    Script(String),

    #[error("process spawn failed: {0}")]
    Io(String),

    #[error("could not launch application: {0}")]
    Launch(String),
}

/// OS 输入原语
#[async_trait]
pub trait InputDriver: Send + Sync {
    /// 在屏幕坐标处点击
    async fn click_at(&self, x: f64, y: f64) -> Result<(), DriverError>;

    /// 向当前聚焦位置键入文本
    async fn type_text(&self, text: &str) -> Result<(), DriverError>;

    /// 按下指定 key code
    async fn key_code(&self, code: u32) -> Result<(), DriverError>;

    /// Cmd+字符组合（清空输入框用 Cmd+A）
    async fn keystroke_with_command(&self, ch: char) -> Result<(), DriverError>;

    /// 启动应用（已在运行则无副作用）
    async fn launch_app(&self, app: &str) -> Result<(), DriverError>;

    /// 把应用带到前台
    async fn activate_app(&self, app: &str) -> Result<(), DriverError>;
}

/// 常用按键名 → macOS key code
pub fn key_code_for(key: &str) -> Option<u32> {
    match key.to_lowercase().as_str() {
        "enter" | "return" => Some(36),
        "tab" => Some(48),
        "space" => Some(49),
        "delete" | "backspace" => Some(51),
        "escape" => Some(53),
        "left" => Some(123),
        "right" => Some(124),
        "down" => Some(125),
        "up" => Some(126),
        "page-up" | "pageup" => Some(116),
        "page-down" | "pagedown" => Some(121),
        _ => None,
    }
}

/// System Events 实现
#[derive(Debug, Default)]
pub struct OsaScriptDriver;

impl OsaScriptDriver {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, script: &str) -> Result<(), DriverError> {
        let output = Command::new("osascript")
            .arg("-e")
            .arg(script)
            .output()
            .await
            .map_err(|e| DriverError::Io(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(DriverError::Script(stderr));
        }
        Ok(())
    }
}

/// AppleScript 字符串字面量转义
fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[async_trait]
impl InputDriver for OsaScriptDriver {
    async fn click_at(&self, x: f64, y: f64) -> Result<(), DriverError> {
        self.run(&format!(
            r#"tell application "System Events" to click at {{{}, {}}}"#,
            x as i64, y as i64
        ))
        .await
    }

    async fn type_text(&self, text: &str) -> Result<(), DriverError> {
        self.run(&format!(
            r#"tell application "System Events" to keystroke "{}""#,
            escape(text)
        ))
        .await
    }

    async fn key_code(&self, code: u32) -> Result<(), DriverError> {
        self.run(&format!(
            r#"tell application "System Events" to key code {}"#,
            code
        ))
        .await
    }

    async fn keystroke_with_command(&self, ch: char) -> Result<(), DriverError> {
        self.run(&format!(
            r#"tell application "System Events" to keystroke "{}" using command down"#,
            ch
        ))
        .await
    }

    async fn launch_app(&self, app: &str) -> Result<(), DriverError> {
        let app = normalize_app_name(app);
        let status = Command::new("open")
            .args(["-a", &app])
            .status()
            .await
            .map_err(|e| DriverError::Io(e.to_string()))?;
        if !status.success() {
            return Err(DriverError::Launch(app));
        }
        Ok(())
    }

    async fn activate_app(&self, app: &str) -> Result<(), DriverError> {
        let app = normalize_app_name(app);
        self.run(&format!(
            r#"tell application "{}" to activate"#,
            escape(&app)
        ))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_names_map_to_codes() {
        assert_eq!(key_code_for("enter"), Some(36));
        assert_eq!(key_code_for("Return"), Some(36));
        assert_eq!(key_code_for("escape"), Some(53));
        assert_eq!(key_code_for("warp-drive"), None);
    }

    #[test]
    fn applescript_strings_are_escaped() {
        assert_eq!(escape(r#"say "hi""#), r#"say \"hi\""#);
    }
}
