//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MANTIS__*` 覆盖（双下划线表示嵌套，
//! 如 `MANTIS__AGENT__MAX_ITERATIONS=20`）。距离阈值、置信度档位、节流间隔、
//! 迭代与错误预算都是策略旋钮，集中在这里而不是散落在代码里。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub thresholds: ThresholdsSection,
    #[serde(default)]
    pub oracle: OracleSection,
}

/// [agent] 段：迭代 / 错误预算与各类等待
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub max_iterations: u32,
    pub max_errors: u32,
    /// 每个动作后的 UI 沉降等待（毫秒）
    pub settle_ms: u64,
    /// 两次迭代之间的停顿（毫秒）
    pub iteration_pause_ms: u64,
    pub launch_wait_default_secs: u64,
    pub launch_wait_browser_secs: u64,
    pub launch_wait_heavy_secs: u64,
    pub launch_wait_light_secs: u64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_errors: 5,
            settle_ms: 400,
            iteration_pause_ms: 800,
            launch_wait_default_secs: 3,
            launch_wait_browser_secs: 5,
            launch_wait_heavy_secs: 8,
            launch_wait_light_secs: 2,
        }
    }
}

/// [thresholds] 段：关联距离与置信度档位
///
/// 这些常数来自观测而非推导，视为策略旋钮。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThresholdsSection {
    /// 视觉坐标与可达性坐标的匹配距离上限
    pub proximity: f64,
    /// 低于此值立即中止本次运行
    pub abort_confidence: f64,
    /// 低于此值继续运行但标记为低置信
    pub low_confidence: f64,
    pub search_confidence: f64,
    pub command_confidence: f64,
    pub calculator_confidence: f64,
    pub generic_confidence: f64,
}

impl Default for ThresholdsSection {
    fn default() -> Self {
        Self {
            proximity: 50.0,
            abort_confidence: 0.1,
            low_confidence: 0.3,
            search_confidence: 0.7,
            command_confidence: 0.8,
            calculator_confidence: 0.8,
            generic_confidence: 0.9,
        }
    }
}

/// [oracle] 段：模型选择与调用节流
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OracleSection {
    pub provider: String,
    /// 规划 oracle 使用的模型
    pub model: String,
    /// 视觉 oracle 使用的模型
    pub vision_model: String,
    pub base_url: Option<String>,
    /// 对 oracle 的最小调用间隔（秒）
    pub throttle_secs: u64,
}

impl Default for OracleSection {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.5-pro".to_string(),
            vision_model: "gemini-2.0-flash".to_string(),
            base_url: None,
            throttle_secs: 5,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            agent: AgentSection::default(),
            thresholds: ThresholdsSection::default(),
            oracle: OracleSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 MANTIS__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 MANTIS__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MANTIS")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
