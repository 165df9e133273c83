//! 主控循环：INIT → LONG_PLAN → ITERATE{感知 → 推理 → 执行 → 观察 → 目标检查}
//!
//! 严格单线程顺序执行：同一迭代内感知先于推理先于执行，任何一步失败
//! 短路到错误记账，绝不静默跳步。计划一次只执行一步，执行后把控制权
//! 交还循环——UI 可能已经变了，下一轮重新感知、通常重新请求新计划，
//! 而不是盲目续用旧计划，以此压缩过期计划的破坏半径。
//!
//! 错误预算：感知 / 推理 / 执行失败各计一次，完整成功的执行清零；
//! 先耗尽 maxErrors 或 maxIterations 都以带独立消息的失败结束。
//! 取消令牌在每个挂起点检查，停止后返回已知的最佳状态。

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::action::executor::{ActionOutcome, ExecutorAdapter};
use crate::config::AppConfig;
use crate::core::error::AgentError;
use crate::core::goal::GoalChecker;
use crate::core::state::{AgentState, RunReport};
use crate::history::HistoryStore;
use crate::oracle::{GeminiClient, MockOracleClient, OracleClient};
use crate::perception::collector::SignalCollector;
use crate::perception::signal::PerceptionSnapshot;
use crate::perception::system::SystemProbe;
use crate::planner::adapter::PlannerAdapter;
use crate::planner::plan::{LongRangePlan, Plan};
use crate::vision::VisualOracleAdapter;

/// 预构建的 Agent 组件：采集、探针、规划、视觉、执行
pub struct Components {
    pub collector: SignalCollector,
    pub probe: Arc<dyn SystemProbe>,
    pub planner: PlannerAdapter,
    /// 无视觉 oracle 时整个视觉通路缺席，感知退化为仅可达性
    pub vision: Option<VisualOracleAdapter>,
    pub executor: ExecutorAdapter,
}

/// 根据配置与环境变量选择 oracle 后端（Gemini / Mock）
pub fn create_oracle_from_env(cfg: &AppConfig) -> Arc<dyn OracleClient> {
    match std::env::var("GEMINI_API_KEY") {
        Ok(key) if !key.is_empty() => {
            tracing::info!(model = %cfg.oracle.model, "using Gemini oracle");
            Arc::new(GeminiClient::new(
                key,
                cfg.oracle.model.clone(),
                cfg.oracle.base_url.as_deref(),
            ))
        }
        _ => {
            tracing::warn!("GEMINI_API_KEY not set, using mock oracle");
            Arc::new(MockOracleClient::new(
                r#"{"plan":[],"confidence":0.0,"reasoning":"mock oracle"}"#,
            ))
        }
    }
}

/// 一次 ACT 的结果：是否成功、是否只是计划的一部分
struct ActResult {
    success: bool,
    partial: bool,
    completed: usize,
    total: usize,
    error: String,
}

pub struct Orchestrator {
    components: Components,
    correlator: crate::perception::correlate::Correlator,
    goal_checker: GoalChecker,
    history: HistoryStore,
    cfg: AppConfig,
    state: AgentState,
}

impl Orchestrator {
    pub fn new(cfg: AppConfig, components: Components) -> Self {
        Self {
            correlator: crate::perception::correlate::Correlator::new(cfg.thresholds.proximity),
            goal_checker: GoalChecker::new(cfg.thresholds.clone()),
            history: HistoryStore::new(),
            state: AgentState::new(""),
            components,
            cfg,
        }
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// 运行一个 goal 直到五种终止路径之一
    ///
    /// 感知 / 推理 / 执行层的失败全部吸收进错误预算；只有取消与内部
    /// 故障作为 Err 穿透。正常返回总是结构化 RunReport。
    pub async fn run(
        &mut self,
        goal: &str,
        target_app: Option<String>,
        cancel: CancellationToken,
    ) -> Result<RunReport, AgentError> {
        self.state = AgentState::new(goal);
        let max_iterations = self.cfg.agent.max_iterations;
        let max_errors = self.cfg.agent.max_errors;
        let mut iterations: u32 = 0;

        // INIT：确定目标应用并带到前台（best-effort）
        let target_app = self.resolve_target_app(goal, target_app).await;
        if let Some(app) = &target_app {
            let focused = self.components.executor.focus_application(app).await;
            if focused {
                tracing::info!(app = %app, "target application focused");
            } else {
                tracing::warn!(app = %app, "could not focus target application, continuing");
            }
        }

        // LONG_PLAN：一次性远程计划，失败不阻塞循环
        let long_plan = self
            .create_long_range_plan(goal, target_app.as_deref(), &cancel)
            .await;

        tracing::info!(
            goal,
            app = target_app.as_deref().unwrap_or("(none)"),
            max_iterations,
            max_errors,
            session = %self.state.session_id,
            "perceive-reason-act loop starting"
        );

        while iterations < max_iterations && self.state.error_count < max_errors {
            if cancel.is_cancelled() {
                return Ok(self.cancelled_report(iterations));
            }
            iterations += 1;
            tracing::info!(iteration = iterations, max_iterations, "iteration starting");

            // 1) PERCEIVE
            let snapshot = match self.perceive(target_app.as_deref(), goal, &cancel).await {
                Ok(s) => s,
                Err(AgentError::Cancelled) => return Ok(self.cancelled_report(iterations)),
                Err(e) => {
                    self.state.error_count += 1;
                    tracing::warn!(error = %e, errors = self.state.error_count, "perception failed");
                    continue;
                }
            };

            if cancel.is_cancelled() {
                return Ok(self.cancelled_report(iterations));
            }

            // 2) REASON
            let plan = match self
                .reason(goal, &snapshot, long_plan.as_ref(), target_app.as_deref())
                .await
            {
                Ok(p) => p,
                Err(e) => {
                    self.state.error_count += 1;
                    tracing::warn!(error = %e, errors = self.state.error_count, "reasoning failed");
                    continue;
                }
            };
            self.state.confidence = plan.confidence;

            if cancel.is_cancelled() {
                return Ok(self.cancelled_report(iterations));
            }

            // 3) ACT：一次一步，部分完成也交还控制权
            let act = self.act(&plan, target_app.as_deref()).await;
            if !act.success {
                self.state.error_count += 1;
                tracing::warn!(
                    error = %act.error,
                    errors = self.state.error_count,
                    "action failed"
                );
                continue;
            }
            // 完整成功的执行把连续错误清零
            self.state.error_count = 0;
            if act.total > 0 {
                self.state.progress = act.completed as f64 / act.total as f64;
            }
            if act.partial {
                tracing::info!(
                    completed = act.completed,
                    total = act.total,
                    "plan partially executed, returning to perception"
                );
            }

            // 4) OBSERVE：动作后的新快照 + 可选的重推理，刷新置信度
            let (snapshot, confidence) = self
                .observe(goal, &snapshot, target_app.as_deref(), long_plan.as_ref(), &cancel)
                .await;
            self.state.confidence = confidence;

            // 5) CHECK_GOAL
            if self
                .goal_checker
                .is_achieved(goal, &snapshot, confidence, long_plan.as_ref())
            {
                tracing::info!(goal, iterations, "goal achieved");
                self.state.progress = 1.0;
                return Ok(RunReport::goal_achieved(
                    goal,
                    iterations,
                    self.state.error_count,
                ));
            }

            // 置信度闸门：过低立即停，偏低标记后继续
            if confidence < self.cfg.thresholds.abort_confidence {
                tracing::warn!(confidence, "confidence below abort threshold, stopping");
                return Ok(RunReport::low_confidence(
                    confidence,
                    iterations,
                    self.state.error_count,
                    self.state.progress,
                ));
            } else if confidence < self.cfg.thresholds.low_confidence {
                tracing::warn!(confidence, "low confidence, continuing with caution");
            }

            tracing::debug!(
                confidence,
                errors = self.state.error_count,
                "iteration complete"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Ok(self.cancelled_report(iterations)),
                _ = tokio::time::sleep(Duration::from_millis(self.cfg.agent.iteration_pause_ms)) => {}
            }
        }

        if self.state.error_count >= max_errors {
            tracing::warn!(errors = self.state.error_count, "error budget exhausted");
            Ok(RunReport::error_budget(
                max_errors,
                iterations,
                self.state.error_count,
                self.state.progress,
            ))
        } else {
            tracing::warn!(iterations, "max iterations reached");
            Ok(RunReport::iteration_budget(
                iterations,
                self.state.error_count,
                self.state.progress,
            ))
        }
    }

    fn cancelled_report(&self, iterations: u32) -> RunReport {
        tracing::info!("run cancelled by user");
        RunReport::cancelled(iterations, self.state.error_count, self.state.progress)
    }

    /// INIT：显式目标应用优先；否则让规划 oracle 从过滤后的候选里挑
    async fn resolve_target_app(
        &mut self,
        goal: &str,
        explicit: Option<String>,
    ) -> Option<String> {
        if let Some(app) = explicit {
            return Some(crate::perception::backend::normalize_app_name(&app));
        }
        let candidates = self.components.collector.available_applications().await;
        if candidates.is_empty() {
            return None;
        }
        match self
            .components
            .planner
            .select_application(goal, &candidates)
            .await
        {
            Some(app) => Some(app),
            None => candidates.into_iter().next(),
        }
    }

    /// LONG_PLAN：初始快照 + 一次规划调用；任何失败都降级为"无计划"
    async fn create_long_range_plan(
        &mut self,
        goal: &str,
        target_app: Option<&str>,
        cancel: &CancellationToken,
    ) -> Option<LongRangePlan> {
        if cancel.is_cancelled() {
            return None;
        }
        let snapshot = match self.perceive(target_app, goal, cancel).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "initial perception failed, continuing without long-range plan");
                return None;
            }
        };
        match self
            .components
            .planner
            .long_range_plan(goal, target_app, &snapshot)
            .await
        {
            Ok(plan) => Some(plan),
            Err(e) => {
                tracing::warn!(error = %e, "long-range planning failed, continuing without it");
                None
            }
        }
    }

    /// PERCEIVE：发现 + 系统状态 + 上下文 +（可选）视觉与关联
    ///
    /// 目标应用已知但发现为空时，启动应用、按类别等待、重扫一次。
    async fn perceive(
        &mut self,
        target_app: Option<&str>,
        goal: &str,
        cancel: &CancellationToken,
    ) -> Result<PerceptionSnapshot, AgentError> {
        let mut ui_elements = self.components.collector.discover(target_app).await?;

        if ui_elements.is_empty() {
            if let Some(app) = target_app {
                tracing::info!(app, "no ui elements found, launching app and rescanning once");
                let outcome = self.launch_and_wait(app, cancel).await?;
                if outcome.success {
                    ui_elements = self.components.collector.discover(target_app).await?;
                }
            }
        }

        let system_state = self.components.probe.sample().await;
        let context = self
            .components
            .collector
            .application_context(target_app)
            .await;

        // 视觉通路：仅在有适配器且目标应用已知时走；失败降级为仅可达性
        let visual = match (&self.components.vision, target_app) {
            (Some(vision), Some(app)) => match vision.analyze(app, goal).await {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!(error = %e, "visual analysis unavailable this iteration");
                    None
                }
            },
            _ => None,
        };

        let correlations = visual
            .as_ref()
            .map(|v| self.correlator.correlate(&ui_elements, v));

        let snapshot = PerceptionSnapshot {
            ui_elements,
            system_state,
            context,
            visual,
            correlations,
            timestamp: chrono::Utc::now(),
        };

        tracing::info!(
            ui = snapshot.ui_elements.len(),
            visual = snapshot.visual.as_ref().map(|v| v.elements.len()).unwrap_or(0),
            matched = snapshot
                .correlations
                .as_ref()
                .map(|c| c.matched_elements)
                .unwrap_or(0),
            kind = snapshot.perception_type(),
            "perception complete"
        );
        self.history.record_perception(&snapshot);
        Ok(snapshot)
    }

    /// 应用启动 + 按类别的加载等待；等待期间可取消
    async fn launch_and_wait(
        &self,
        app: &str,
        cancel: &CancellationToken,
    ) -> Result<ActionOutcome, AgentError> {
        let outcome = self
            .components
            .executor
            .execute(
                Some(app),
                &crate::planner::plan::ActionStep::LaunchApp {
                    app_name: app.to_string(),
                    reason: "no ui elements discovered".to_string(),
                },
            )
            .await;
        if outcome.success {
            let wait = self.app_load_wait(app);
            tracing::info!(app, wait_secs = wait.as_secs(), "waiting for app to load");
            tokio::select! {
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
        Ok(outcome)
    }

    /// 浏览器等重应用比轻量工具等得久
    fn app_load_wait(&self, app: &str) -> Duration {
        let name = app.to_lowercase();
        let agent = &self.cfg.agent;
        let secs = if ["chrome", "safari", "firefox", "edge"]
            .iter()
            .any(|k| name.contains(k))
        {
            agent.launch_wait_browser_secs
        } else if ["xcode", "photoshop", "final cut", "logic"]
            .iter()
            .any(|k| name.contains(k))
        {
            agent.launch_wait_heavy_secs
        } else if ["calculator", "notes", "textedit", "terminal"]
            .iter()
            .any(|k| name.contains(k))
        {
            agent.launch_wait_light_secs
        } else {
            agent.launch_wait_default_secs
        };
        Duration::from_secs(secs)
    }

    /// REASON：附带截图（如果视觉通路可用）的一次规划调用
    async fn reason(
        &mut self,
        goal: &str,
        snapshot: &PerceptionSnapshot,
        long_plan: Option<&LongRangePlan>,
        target_app: Option<&str>,
    ) -> Result<Plan, AgentError> {
        let screenshot = match (&self.components.vision, target_app) {
            (Some(vision), Some(app)) => match vision.capture_png(app).await {
                Ok(png) => Some(png),
                Err(e) => {
                    tracing::debug!(error = %e, "screenshot unavailable for reasoning");
                    None
                }
            },
            _ => None,
        };

        let plan = self
            .components
            .planner
            .plan(goal, snapshot, long_plan, screenshot.as_deref())
            .await?;
        self.history.record_plan(&plan);
        Ok(plan)
    }

    /// ACT：按序执行，但每个非末尾步骤成功后立即交还控制权；
    /// 步骤失败立即停止整份计划的执行
    async fn act(&mut self, plan: &Plan, target_app: Option<&str>) -> ActResult {
        let total = plan.steps.len();
        if total == 0 {
            return ActResult {
                success: false,
                partial: false,
                completed: 0,
                total: 0,
                error: "no actions in plan".to_string(),
            };
        }

        let mut outcomes: Vec<ActionOutcome> = Vec::new();
        for (i, step) in plan.steps.iter().enumerate() {
            tracing::info!(
                step = i + 1,
                total,
                operation = step.operation(),
                target = %step.target_label(),
                reason = %step.reason(),
                "executing action"
            );
            let outcome = self.components.executor.execute(target_app, step).await;
            self.state.last_action = step.operation().to_string();
            let failed = !outcome.success;
            let error = outcome.error.clone();
            outcomes.push(outcome);

            if failed {
                self.history.record_outcomes(&outcomes);
                return ActResult {
                    success: false,
                    partial: false,
                    completed: i,
                    total,
                    error,
                };
            }

            // 非末尾步骤：让下一次感知先反映新状态，再考虑剩余步骤
            if i + 1 < total {
                self.history.record_outcomes(&outcomes);
                return ActResult {
                    success: true,
                    partial: true,
                    completed: i + 1,
                    total,
                    error: String::new(),
                };
            }
        }

        self.history.record_outcomes(&outcomes);
        ActResult {
            success: true,
            partial: false,
            completed: total,
            total,
            error: String::new(),
        }
    }

    /// OBSERVE：动作后的快照与可选重推理
    ///
    /// 动作可能改变可用元素集合，使动作前计划的置信度失效；观察失败
    /// 不计入错误预算，直接沿用动作前的快照与置信度。
    async fn observe(
        &mut self,
        goal: &str,
        before: &PerceptionSnapshot,
        target_app: Option<&str>,
        long_plan: Option<&LongRangePlan>,
        cancel: &CancellationToken,
    ) -> (PerceptionSnapshot, f64) {
        if cancel.is_cancelled() {
            return (before.clone(), self.state.confidence);
        }
        let after = match self.perceive(target_app, goal, cancel).await {
            Ok(s) => s,
            Err(e) => {
                tracing::debug!(error = %e, "post-action observation failed, keeping prior snapshot");
                return (before.clone(), self.state.confidence);
            }
        };

        match self.reason(goal, &after, long_plan, target_app).await {
            Ok(updated) => {
                tracing::info!(
                    confidence = updated.confidence,
                    "post-action reasoning refreshed confidence"
                );
                (after, updated.confidence)
            }
            Err(e) => {
                tracing::debug!(error = %e, "post-action reasoning failed, keeping prior confidence");
                (after, self.state.confidence)
            }
        }
    }
}
