//! Mantis - Rust 桌面 UI 自动化智能体
//!
//! 模块划分：
//! - **action**: 输入注入原语、元素定位策略与单步执行适配器
//! - **config**: 应用配置加载（TOML + 环境变量），全部策略旋钮在此
//! - **core**: 错误、状态、目标达成检查、会话监管与主控循环
//! - **history**: 追加式运行存档（快照 / 计划 / 结果摘要）
//! - **observability**: tracing 初始化
//! - **oracle**: 规划 / 视觉 oracle 的客户端抽象、Gemini 实现与节流
//! - **perception**: 可达性树发现、系统状态采样、视觉关联与快照组装
//! - **planner**: 计划类型与规划 oracle 边界适配
//! - **vision**: 截图与视觉 oracle 适配

pub mod action;
pub mod config;
pub mod core;
pub mod history;
pub mod observability;
pub mod oracle;
pub mod perception;
pub mod planner;
pub mod vision;
