//! 主控循环集成测试
//!
//! 用脚本化的假后端 / 假驱动 / Mock oracle 跑完整的感知-推理-执行循环，
//! 覆盖错误预算、错误清零、置信度闸门、取消与端到端的弹出菜单场景。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use mantis::action::driver::{DriverError, InputDriver};
use mantis::action::ExecutorAdapter;
use mantis::config::AppConfig;
use mantis::core::state::RunOutcome;
use mantis::core::{Components, Orchestrator};
use mantis::oracle::MockOracleClient;
use mantis::perception::backend::{
    AccessibilityProvider, DiscoveryError, ElementRole, RawElement, WindowRef,
};
use mantis::perception::signal::SystemState;
use mantis::perception::system::SystemProbe;
use mantis::perception::SignalCollector;
use mantis::planner::PlannerAdapter;

/// 共享的"桌面"状态：一个 Network Mode 弹出菜单，可被点击改值
#[derive(Default)]
struct WorldState {
    network_mode: String,
}

/// 合成 UI 树：一个窗口，一个 popup 与两条菜单项
struct FakeProvider {
    world: Arc<Mutex<WorldState>>,
    /// 为空世界（错误预算类测试）提供开关
    empty: bool,
}

impl FakeProvider {
    fn window(&self) -> WindowRef {
        WindowRef {
            app: "Demo".to_string(),
            index: 1,
            title: "Demo Window".to_string(),
            frame: (0.0, 0.0, 800.0, 600.0),
        }
    }
}

#[async_trait]
impl AccessibilityProvider for FakeProvider {
    async fn running_applications(&self) -> Result<Vec<String>, DiscoveryError> {
        Ok(vec!["Demo".to_string()])
    }

    async fn windows(&self, _app: &str) -> Result<Vec<WindowRef>, DiscoveryError> {
        Ok(vec![self.window()])
    }

    async fn elements(
        &self,
        _window: &WindowRef,
        role: ElementRole,
    ) -> Result<Vec<RawElement>, DiscoveryError> {
        if self.empty {
            return Ok(vec![]);
        }
        let value = self.world.lock().unwrap().network_mode.clone();
        match role {
            ElementRole::Popup => Ok(vec![RawElement {
                role: "popup".to_string(),
                identifier: "network_mode".to_string(),
                title: "Network Mode".to_string(),
                value,
                position: (100.0, 100.0),
                size: (80.0, 20.0),
                enabled: true,
                options: vec!["On".to_string(), "Off".to_string()],
                ..Default::default()
            }]),
            ElementRole::MenuItem => Ok(vec![
                RawElement {
                    role: "menu-item".to_string(),
                    title: "On".to_string(),
                    position: (100.0, 130.0),
                    size: (80.0, 20.0),
                    enabled: true,
                    ..Default::default()
                },
                RawElement {
                    role: "menu-item".to_string(),
                    title: "Off".to_string(),
                    position: (100.0, 160.0),
                    size: (80.0, 20.0),
                    enabled: true,
                    ..Default::default()
                },
            ]),
            _ => Ok(vec![]),
        }
    }

    async fn focused_element_label(&self, _window: &WindowRef) -> Result<String, DiscoveryError> {
        Ok(String::new())
    }

    async fn frontmost_application(&self) -> Result<Option<String>, DiscoveryError> {
        Ok(Some("Demo".to_string()))
    }
}

/// 假驱动：点到 "On" 菜单项中心就把世界里的值改成 On
struct FakeDriver {
    world: Arc<Mutex<WorldState>>,
}

#[async_trait]
impl InputDriver for FakeDriver {
    async fn click_at(&self, x: f64, y: f64) -> Result<(), DriverError> {
        if (x - 140.0).abs() < 1.0 && (y - 140.0).abs() < 1.0 {
            self.world.lock().unwrap().network_mode = "On".to_string();
        }
        Ok(())
    }
    async fn type_text(&self, _text: &str) -> Result<(), DriverError> {
        Ok(())
    }
    async fn key_code(&self, _code: u32) -> Result<(), DriverError> {
        Ok(())
    }
    async fn keystroke_with_command(&self, _ch: char) -> Result<(), DriverError> {
        Ok(())
    }
    async fn launch_app(&self, _app: &str) -> Result<(), DriverError> {
        Ok(())
    }
    async fn activate_app(&self, _app: &str) -> Result<(), DriverError> {
        Ok(())
    }
}

/// 固定系统状态探针
struct FixedProbe;

#[async_trait]
impl SystemProbe for FixedProbe {
    async fn sample(&self) -> SystemState {
        SystemState::unknown()
    }
}

fn build_orchestrator(
    cfg: AppConfig,
    oracle: Arc<MockOracleClient>,
    empty_world: bool,
) -> (Orchestrator, Arc<Mutex<WorldState>>) {
    let world = Arc::new(Mutex::new(WorldState {
        network_mode: "Off".to_string(),
    }));
    let provider = Arc::new(FakeProvider {
        world: world.clone(),
        empty: empty_world,
    });
    let driver = Arc::new(FakeDriver {
        world: world.clone(),
    });

    let components = Components {
        collector: SignalCollector::new(provider.clone()),
        probe: Arc::new(FixedProbe),
        planner: PlannerAdapter::new(oracle, Duration::from_millis(0)),
        vision: None,
        executor: ExecutorAdapter::new(provider, driver, Duration::from_millis(0)),
    };
    (Orchestrator::new(cfg, components), world)
}

const LONG_RANGE_JSON: &str = r#"{
  "goal": "turn on the network mode toggle",
  "end_state": "Network Mode shows On",
  "success_criteria": ["popup reads On"],
  "steps": [{"step": 1, "action": "select", "target": "network_mode", "description": "pick On", "expected_outcome": "value is On"}],
  "obstacles": [],
  "alternatives": [],
  "completion_indicators": ["Network Mode is On"]
}"#;

const SELECT_PLAN_JSON: &str = r#"{
  "plan": [{"action": "select", "target": "network_mode", "option": "On", "reason": "enable network mode"}],
  "confidence": 0.9,
  "reasoning": "the popup controls the toggle",
  "alternatives": [],
  "risks": [],
  "next_step": "verify the value"
}"#;

const EMPTY_PLAN_JSON: &str = r#"{"plan":[],"confidence":0.9,"reasoning":"verifying"}"#;

const GHOST_CLICK_JSON: &str =
    r#"{"plan":[{"action":"click","target":"ghost","reason":"try"}],"confidence":0.9,"reasoning":"r"}"#;

const WAIT_PLAN_LOW_CONFIDENCE: &str =
    r#"{"plan":[{"action":"wait","duration":0.1,"reason":"pause"}],"confidence":0.05,"reasoning":"unsure"}"#;

#[tokio::test(start_paused = true)]
async fn network_mode_select_scenario_reaches_goal_in_one_iteration() {
    let oracle = Arc::new(MockOracleClient::new(EMPTY_PLAN_JSON));
    oracle.push(LONG_RANGE_JSON); // LONG_PLAN
    oracle.push(SELECT_PLAN_JSON); // 迭代 1 的 REASON
    oracle.push(EMPTY_PLAN_JSON); // OBSERVE 阶段的重推理

    let (mut orchestrator, world) = build_orchestrator(AppConfig::default(), oracle, false);
    let report = orchestrator
        .run(
            "turn on the network mode toggle",
            Some("Demo".to_string()),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(report.success, "unexpected report: {:?}", report);
    assert_eq!(report.outcome, RunOutcome::GoalAchieved);
    assert_eq!(report.iterations, 1);
    assert_eq!(world.lock().unwrap().network_mode, "On");

    // 动作确实执行成功过
    let summary = orchestrator.history().summary();
    assert!(summary.successful_outcomes >= 1);
}

#[tokio::test(start_paused = true)]
async fn three_consecutive_action_failures_exhaust_the_error_budget() {
    let oracle = Arc::new(MockOracleClient::new(GHOST_CLICK_JSON));

    let mut cfg = AppConfig::default();
    cfg.agent.max_errors = 3;
    cfg.agent.max_iterations = 10;

    let (mut orchestrator, _) = build_orchestrator(cfg, oracle, true);
    let report = orchestrator
        .run(
            "press the ghost button",
            Some("Demo".to_string()),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::ErrorBudgetExceeded);
    assert_eq!(report.errors, 3);
    // 预算先于迭代上限耗尽
    assert!(report.iterations < 10);
}

#[tokio::test(start_paused = true)]
async fn one_success_resets_the_error_counter() {
    let oracle = Arc::new(MockOracleClient::new(GHOST_CLICK_JSON));
    oracle.push(EMPTY_PLAN_JSON); // LONG_PLAN（解析为无指标的空计划）
    oracle.push(GHOST_CLICK_JSON); // 迭代 1：失败
    oracle.push(GHOST_CLICK_JSON); // 迭代 2：失败
    oracle.push(SELECT_PLAN_JSON); // 迭代 3：成功，错误清零
    oracle.push(EMPTY_PLAN_JSON); // 迭代 3 OBSERVE
    oracle.push(GHOST_CLICK_JSON); // 迭代 4：失败
    oracle.push(GHOST_CLICK_JSON); // 迭代 5：失败

    let mut cfg = AppConfig::default();
    cfg.agent.max_errors = 3;
    cfg.agent.max_iterations = 5;

    let (mut orchestrator, _) = build_orchestrator(cfg, oracle, false);
    let report = orchestrator
        .run(
            // 不落入任何启发式家族，避免误判成功
            "flip the demo toggle",
            Some("Demo".to_string()),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    // 成功清零后再错两次也没有触顶：以迭代上限收场而不是错误预算
    assert_eq!(report.outcome, RunOutcome::IterationBudgetExceeded);
    assert_eq!(report.errors, 2);
}

#[tokio::test(start_paused = true)]
async fn confidence_below_abort_threshold_stops_the_run() {
    let oracle = Arc::new(MockOracleClient::new(WAIT_PLAN_LOW_CONFIDENCE));

    let (mut orchestrator, _) = build_orchestrator(AppConfig::default(), oracle, false);
    let report = orchestrator
        .run(
            "do something vague",
            Some("Demo".to_string()),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::LowConfidenceAbort);
    assert_eq!(report.iterations, 1);
    assert!(report.message.contains("0.05"));
}

#[tokio::test(start_paused = true)]
async fn cancellation_returns_stopped_by_user() {
    let oracle = Arc::new(MockOracleClient::new(EMPTY_PLAN_JSON));
    let (mut orchestrator, _) = build_orchestrator(AppConfig::default(), oracle, false);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = orchestrator
        .run("anything", Some("Demo".to_string()), cancel)
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert_eq!(report.message, "Stopped by user");
}

#[tokio::test(start_paused = true)]
async fn empty_plans_count_against_the_error_budget() {
    // oracle 永远给空计划：没有可执行步骤应计入错误预算而不是无限空转
    let oracle = Arc::new(MockOracleClient::new(EMPTY_PLAN_JSON));

    let mut cfg = AppConfig::default();
    cfg.agent.max_errors = 2;
    cfg.agent.max_iterations = 10;

    let (mut orchestrator, _) = build_orchestrator(cfg, oracle, false);
    let report = orchestrator
        .run(
            "flip the demo toggle",
            Some("Demo".to_string()),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::ErrorBudgetExceeded);
}
