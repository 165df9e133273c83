//! mantis 可执行入口
//!
//! 用法：`mantis "<goal>" [target_app]`。goal 是自然语言目标；
//! 不指定 target_app 时由规划 oracle 从候选应用里挑选。

use std::sync::Arc;
use std::time::Duration;

use mantis::action::{ExecutorAdapter, OsaScriptDriver};
use mantis::config::load_config;
use mantis::core::{create_oracle_from_env, Components, Orchestrator, SessionSupervisor};
use mantis::oracle::GeminiClient;
use mantis::perception::{SignalCollector, SysinfoProbe, SystemEventsProvider};
use mantis::planner::PlannerAdapter;
use mantis::vision::{ScreencaptureCapture, VisualOracleAdapter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mantis::observability::init();

    let mut args = std::env::args().skip(1);
    let goal = match args.next() {
        Some(g) if !g.trim().is_empty() => g,
        _ => {
            eprintln!("usage: mantis \"<goal>\" [target_app]");
            std::process::exit(2);
        }
    };
    let target_app = args.next();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("config load failed ({}), using defaults", e);
        mantis::config::AppConfig::default()
    });

    let provider = Arc::new(SystemEventsProvider::new());
    let driver = Arc::new(OsaScriptDriver::new());
    let throttle = Duration::from_secs(cfg.oracle.throttle_secs);

    let planner_oracle = create_oracle_from_env(&cfg);

    // 视觉通路只在有 API Key 时搭建；缺席时感知退化为仅可达性
    let vision = std::env::var("GEMINI_API_KEY").ok().map(|key| {
        let vision_oracle = Arc::new(GeminiClient::new(
            key,
            cfg.oracle.vision_model.clone(),
            cfg.oracle.base_url.as_deref(),
        ));
        let capture = Arc::new(ScreencaptureCapture::new(provider.clone()));
        VisualOracleAdapter::new(vision_oracle, capture, throttle)
    });

    let components = Components {
        collector: SignalCollector::new(provider.clone()),
        probe: Arc::new(SysinfoProbe::new()),
        planner: PlannerAdapter::new(planner_oracle, throttle),
        vision,
        executor: ExecutorAdapter::new(
            provider,
            driver,
            Duration::from_millis(cfg.agent.settle_ms),
        ),
    };

    let supervisor = SessionSupervisor::new();
    let cancel = supervisor.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            supervisor.cancel();
        }
    });

    let mut orchestrator = Orchestrator::new(cfg, components);
    let report = orchestrator.run(&goal, target_app, cancel).await?;

    let history = orchestrator.history().summary();
    println!();
    println!("Result:     {}", report.message);
    println!("Success:    {}", report.success);
    println!("Iterations: {}", report.iterations);
    println!("Errors:     {}", report.errors);
    println!("Progress:   {:.2}", report.progress);
    println!(
        "History:    {} perceptions, {} plans, {} outcomes ({} ok)",
        history.perceptions, history.plans, history.outcomes, history.successful_outcomes
    );

    if !report.success {
        std::process::exit(1);
    }
    Ok(())
}
