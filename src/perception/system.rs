//! 系统状态探针
//!
//! 内存 / CPU / 网络用 sysinfo 采样，电量与电源走 `pmset -g batt` 子进程，
//! 墙钟时间取本地 HH:MM。任何一项采不到都降级为 unknown，而不是让感知失败。

use async_trait::async_trait;
use sysinfo::{Networks, System};
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::perception::signal::SystemState;

#[async_trait]
pub trait SystemProbe: Send + Sync {
    async fn sample(&self) -> SystemState;
}

/// sysinfo + pmset 的真实探针
pub struct SysinfoProbe {
    sys: Mutex<System>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            sys: Mutex::new(System::new()),
        }
    }

    async fn battery(&self) -> (i32, String) {
        let output = match Command::new("pmset").args(["-g", "batt"]).output().await {
            Ok(o) if o.status.success() => String::from_utf8_lossy(&o.stdout).to_string(),
            _ => return (0, "unknown".to_string()),
        };
        parse_pmset(&output)
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// pmset 输出样例：
/// `Now drawing from 'AC Power'` / `-InternalBattery-0 ... 85%; discharging; ...`
fn parse_pmset(output: &str) -> (i32, String) {
    let source = if output.contains("'AC Power'") {
        "power"
    } else if output.contains("'Battery Power'") {
        "battery"
    } else {
        "unknown"
    };

    let level = output
        .split_whitespace()
        .find_map(|tok| tok.strip_suffix("%;").or_else(|| tok.strip_suffix('%')))
        .and_then(|n| n.parse::<i32>().ok())
        .unwrap_or(0);

    (level, source.to_string())
}

#[async_trait]
impl SystemProbe for SysinfoProbe {
    async fn sample(&self) -> SystemState {
        let (memory_usage, cpu_usage) = {
            let mut sys = self.sys.lock().await;
            sys.refresh_memory();
            sys.refresh_cpu();
            let mem = if sys.total_memory() > 0 {
                (sys.used_memory() as f32 / sys.total_memory() as f32) * 100.0
            } else {
                0.0
            };
            (mem, sys.global_cpu_info().cpu_usage())
        };

        // 与来源实现同级的粗略判断：有流量的接口视为已联网
        let networks = Networks::new_with_refreshed_list();
        let network_status = if networks
            .iter()
            .any(|(_, data)| data.total_received() > 0)
        {
            "connected"
        } else {
            "disconnected"
        };

        let (battery_level, power_source) = self.battery().await;

        SystemState {
            battery_level,
            power_source,
            network_status: network_status.to_string(),
            time: chrono::Local::now().format("%H:%M").to_string(),
            memory_usage,
            cpu_usage,
        }
    }
}
