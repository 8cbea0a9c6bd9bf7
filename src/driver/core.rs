use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::common::{Event, Result, Run, RunStatus, SimulatorError, TimeUtils, calculate_backoff};
use crate::driver::context::DriverContext;
use crate::driver::metrics::MetricsSnapshot;
use crate::driver::observer::{NoOpObserver, RunObserver};
use crate::pipeline::steps::{GATE_STEP, RUN_STEPS, after_gate_index, last_step};
use crate::pipeline::compute_score;

/// 单个 Run 的推进句柄
///
/// 取代全局唯一的计时器：每个 Run 持有自己的取消令牌，互不影响。
struct RunHandle {
    /// 区分同一个 Run 先后两段推进 (start 段 / resume 段)
    generation: u64,
    token: CancellationToken,
    /// start/resume 时传入的观察者，fail 时用于补发通知
    observer: Arc<dyn RunObserver>,
}

/// 一段推进的身份
struct Progression {
    run_id: String,
    generation: u64,
    token: CancellationToken,
    observer: Arc<dyn RunObserver>,
}

/// 单步处理结果
enum Progress {
    /// 等待 `delay` 后处理下标为 `cursor` 的步骤 (越界表示进入收尾)
    Next { cursor: usize, delay: Duration },
    /// 本段推进结束 (到达 Gate、Run 消失、已完成)
    Halt,
}

/// 驱动器Inner 结构体
struct DriverInner {
    /// 全局上下文
    ctx: DriverContext,
    /// 正在推进的 Run 注册表 (ID -> {generation, token, observer})
    active_runs: DashMap<String, RunHandle>,
    /// 全局观察者，先于调用方传入的观察者被通知
    observers: Vec<Arc<dyn RunObserver>>,
    generation: AtomicU64,
}

/// Run 驱动器 (The Engine)
///
/// 负责把 Run 按步骤表向前推进：
/// - `start`: Queued -> Running，推进到第 8 步 (Dojo Gate) 后挂起。
/// - `resume`: AwaitingApproval -> Running，推进第 9、10 步并收尾。
/// - `cancel`: 停止未来的推进，不回滚已持久化的状态。
///
/// 每次变更都是 读取最新快照 -> 修改 -> 乐观锁写回 -> 通知观察者，
/// Gateway 是唯一的权威数据源。
pub struct RunDriver {
    inner: Arc<DriverInner>, //减轻Arc Clone
}

impl Clone for RunDriver {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl RunDriver {
    /// 构造函数
    pub fn new_with_components(ctx: DriverContext, observers: Vec<Arc<dyn RunObserver>>) -> Self {
        let inner = DriverInner {
            ctx,
            active_runs: DashMap::new(),
            observers,
            generation: AtomicU64::new(0),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// 暴露上下文 (Gateway、配置)
    pub fn context(&self) -> &DriverContext {
        &self.inner.ctx
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.ctx.metrics.snapshot()
    }

    /// 该 Run 当前是否有推进中的时间线
    pub fn is_active(&self, run_id: &str) -> bool {
        self.inner.active_runs.contains_key(run_id)
    }

    pub fn active_count(&self) -> usize {
        self.inner.active_runs.len()
    }

    // ==========================================
    // Public API: 状态机入口
    // ==========================================

    /// 启动 Run
    ///
    /// - Run 不存在: no-op，返回 `Ok(())`。
    /// - Run 不是 Queued: 返回 `InvalidTransition`。
    /// - 第 1 步在返回之前处理完毕，之后的步骤在后台任务中按延迟推进。
    pub async fn start(&self, run_id: &str, observer: Arc<dyn RunObserver>) -> Result<()> {
        if self.inner.ctx.is_shutdown() {
            return Err(SimulatorError::DriverShutdown);
        }
        let progression = self.register(run_id, observer)?;

        // 状态流转: Queued -> Running
        let started = self
            .update_run(run_id, |run| {
                ensure_status(run, RunStatus::Queued, "start")?;
                run.mark_running();
                Ok(())
            })
            .await;
        let run = match started {
            Ok(Some(run)) => run,
            Ok(None) => {
                debug!("[Driver] Start ignored, run {} not found.", run_id);
                self.unregister(&progression);
                return Ok(());
            }
            Err(e) => {
                self.unregister(&progression);
                return Err(e);
            }
        };
        self.inner.ctx.metrics.inc_started();
        trace!(
            "[Driver-{}] Run {} started.",
            self.inner.ctx.node_id, run_id
        );
        self.notify_update(&run, &progression.observer).await;

        // 第 1 步同步处理
        match self.process_step(&progression, 0).await {
            Ok(Progress::Next { cursor, delay }) => {
                self.spawn_progression(progression, cursor, delay);
                Ok(())
            }
            Ok(Progress::Halt) => {
                self.unregister(&progression);
                Ok(())
            }
            Err(e) => {
                self.abort(&progression, &e).await;
                Err(e)
            }
        }
    }

    /// 审批通过，继续推进
    ///
    /// - Run 不存在: no-op，返回 `Ok(())`。
    /// - Run 不是 AwaitingApproval: 返回 `InvalidTransition`。
    /// - 等待 `resume_delay` 后推进第 9、10 步，最后一步的延迟结束后收尾。
    pub async fn resume(&self, run_id: &str, observer: Arc<dyn RunObserver>) -> Result<()> {
        if self.inner.ctx.is_shutdown() {
            return Err(SimulatorError::DriverShutdown);
        }
        let progression = self.register(run_id, observer)?;

        // 状态流转: AwaitingApproval -> Running
        let resumed = self
            .update_run(run_id, |run| {
                ensure_status(run, RunStatus::AwaitingApproval, "resume")?;
                run.status = RunStatus::Running;
                Ok(())
            })
            .await;
        let run = match resumed {
            Ok(Some(run)) => run,
            Ok(None) => {
                debug!("[Driver] Resume ignored, run {} not found.", run_id);
                self.unregister(&progression);
                return Ok(());
            }
            Err(e) => {
                self.unregister(&progression);
                return Err(e);
            }
        };
        self.notify_update(&run, &progression.observer).await;

        let approved = Event::info(run_id, GATE_STEP, "Dojo Gate approved! Continuing...");
        if let Err(e) = self.emit_event(&approved, &progression.observer).await {
            self.abort(&progression, &e).await;
            return Err(e);
        }

        let delay = self.inner.ctx.config.timing.resume_delay();
        self.spawn_progression(progression, after_gate_index(), delay);
        Ok(())
    }

    /// 取消某个 Run 的后续推进
    ///
    /// 幂等。不回滚已持久化的状态，也不追加事件。
    /// 返回是否真的有推进被取消。
    pub fn cancel(&self, run_id: &str) -> bool {
        if let Some((_, handle)) = self.inner.active_runs.remove(run_id) {
            handle.token.cancel();
            self.inner.ctx.metrics.dec_active();
            trace!("[Driver] Cancel signal sent to run {}", run_id);
            return true;
        }
        false
    }

    /// 取消全部推进
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<String> = self
            .inner
            .active_runs
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        let count = ids.iter().filter(|id| self.cancel(id)).count();
        trace!("[Driver] Broadcast cancel to {} runs.", count);
        count
    }

    /// 故障注入：把 Run 标记为 Failed
    ///
    /// - 先取消该 Run 挂起的计时器。
    /// - 已是终态的 Run 保持不变。
    /// - Run 不存在: no-op。
    pub async fn fail(&self, run_id: &str, reason: &str) -> Result<()> {
        let observer: Arc<dyn RunObserver> = match self.inner.active_runs.remove(run_id) {
            Some((_, handle)) => {
                handle.token.cancel();
                self.inner.ctx.metrics.dec_active();
                handle.observer
            }
            None => Arc::new(NoOpObserver),
        };
        self.mark_failed(run_id, reason, &observer).await
    }

    /// 触发停机
    /// - 所有 Run 的令牌都是 shutdown 的子令牌，收到通知后停止推进
    pub fn shutdown(&self) {
        trace!("[Driver] Shutdown triggered.");
        self.inner.ctx.shutdown.cancel();
    }

    // ==========================================
    // 注册表
    // ==========================================

    fn register(&self, run_id: &str, observer: Arc<dyn RunObserver>) -> Result<Progression> {
        match self.inner.active_runs.entry(run_id.to_string()) {
            Entry::Occupied(_) => Err(SimulatorError::RunAlreadyActive(run_id.to_string())),
            Entry::Vacant(slot) => {
                let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
                let token = self.inner.ctx.shutdown.child_token();
                slot.insert(RunHandle {
                    generation,
                    token: token.clone(),
                    observer: observer.clone(),
                });
                self.inner.ctx.metrics.inc_active();
                Ok(Progression {
                    run_id: run_id.to_string(),
                    generation,
                    token,
                    observer,
                })
            }
        }
    }

    /// 只移除属于本段推进的句柄，后来者注册的句柄不受影响
    fn unregister(&self, progression: &Progression) {
        let removed = self
            .inner
            .active_runs
            .remove_if(&progression.run_id, |_, handle| {
                handle.generation == progression.generation
            });
        if removed.is_some() {
            self.inner.ctx.metrics.dec_active();
        }
    }

    // ==========================================
    // Core Logic: 推进循环
    // ==========================================

    fn spawn_progression(&self, progression: Progression, cursor: usize, delay: Duration) {
        let driver = self.clone();
        tokio::spawn(async move {
            driver.progress_loop(&progression, cursor, delay).await;
            driver.unregister(&progression);
        });
    }

    /// 推进主循环
    ///
    /// 每一轮：等待计时器 (可被取消) -> 处理一个步骤 / 收尾。
    /// 同一个 Run 的步骤严格串行。
    async fn progress_loop(
        &self,
        progression: &Progression,
        mut cursor: usize,
        mut delay: Duration,
    ) {
        let run_id = progression.run_id.as_str();
        loop {
            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = progression.token.cancelled() => {
                        trace!("[Driver] Run {} cancelled while waiting.", run_id);
                        return;
                    }
                    _ = sleep(delay) => {}
                }
            } else if progression.token.is_cancelled() {
                trace!("[Driver] Run {} cancelled.", run_id);
                return;
            }

            let outcome = if cursor < RUN_STEPS.len() {
                self.process_step(progression, cursor).await
            } else {
                self.finalize(progression).await.map(|_| Progress::Halt)
            };

            match outcome {
                Ok(Progress::Next {
                    cursor: next,
                    delay: wait,
                }) => {
                    cursor = next;
                    delay = wait;
                }
                Ok(Progress::Halt) => return,
                // 被外部改成了别的状态 (例如 fail)，安静退出
                Err(SimulatorError::InvalidTransition { status, .. }) => {
                    debug!("[Driver] Run {} left running state ({}), stop.", run_id, status);
                    return;
                }
                Err(e) => {
                    error!("[Driver] Run {} progression failed: {:?}", run_id, e);
                    self.abort(progression, &e).await;
                    return;
                }
            }
        }
    }

    /// 处理步骤表中下标为 `index` 的步骤
    async fn process_step(&self, progression: &Progression, index: usize) -> Result<Progress> {
        let run_id = progression.run_id.as_str();
        let step = &RUN_STEPS[index];

        // 计时器触发时 Run 可能已被外部删除
        let Some(current) = self.inner.ctx.runs.load_run(run_id).await? else {
            debug!("[Driver] Run {} vanished before step {}.", run_id, step.step);
            return Ok(Progress::Halt);
        };
        if current.status != RunStatus::Running {
            debug!(
                "[Driver] Run {} is {} at step {}, stop.",
                run_id, current.status, step.step
            );
            return Ok(Progress::Halt);
        }

        // 1. 步骤事件
        let event = Event::info(run_id, step.step, format!("{}...", step.name));
        self.emit_event(&event, &progression.observer).await?;

        // Gate 的等待事件先于状态落盘，AwaitingApproval 可见时日志已经完整
        let waiting = if step.is_gate_step() {
            let waiting = Event::warn(run_id, step.step, "Waiting for Dojo Gate approval...");
            self.inner.ctx.events.append_event(&waiting).await?;
            Some(waiting)
        } else {
            None
        };

        // 2. 推进 Run
        let artifacts = &self.inner.ctx.config.artifacts;
        let updated = self
            .update_run(run_id, |run| {
                ensure_status(run, RunStatus::Running, "advance")?;
                run.advance_to(step.step);
                if step.is_pr_step() {
                    run.pr_url = Some(artifacts.pr_url.clone());
                    run.ci_url = Some(artifacts.ci_url.clone());
                }
                if step.is_gate_step() {
                    run.status = RunStatus::AwaitingApproval;
                }
                Ok(())
            })
            .await?;
        let Some(run) = updated else {
            debug!("[Driver] Run {} vanished during step {}.", run_id, step.step);
            return Ok(Progress::Halt);
        };
        self.inner.ctx.metrics.inc_steps();

        // 3. Dojo Gate: 挂起，不再安排计时器
        if let Some(waiting) = waiting {
            // 先注销，观察者收到通知后可以立即 resume
            self.unregister(progression);
            self.inner.ctx.metrics.inc_suspended();
            self.notify_event(&waiting, &progression.observer).await;
            self.notify_update(&run, &progression.observer).await;
            debug!("[Driver] Run {} suspended at Dojo Gate.", run_id);
            return Ok(Progress::Halt);
        }

        self.notify_update(&run, &progression.observer).await;
        Ok(Progress::Next {
            cursor: index + 1,
            delay: self.inner.ctx.config.timing.scaled(step.delay_ms),
        })
    }

    /// 收尾：计算分数、生成报告、标记完成
    async fn finalize(&self, progression: &Progression) -> Result<()> {
        let run_id = progression.run_id.as_str();
        let config = &self.inner.ctx.config;

        // 以收尾时刻的检查项配置为准
        let checks = self.inner.ctx.checks.list_checks().await?;
        let score = compute_score(&checks, &config.scoring);
        let report = self.inner.ctx.report.generate(score, &checks);

        let updated = self
            .update_run(run_id, |run| {
                ensure_status(run, RunStatus::Running, "complete")?;
                run.status = RunStatus::Completed;
                run.finished_at = Some(TimeUtils::now());
                run.preview_url = Some(config.artifacts.preview_url.clone());
                run.score = Some(score);
                run.report_markdown = Some(report.clone());
                run.advance_to(last_step());
                Ok(())
            })
            .await?;
        let Some(run) = updated else {
            debug!("[Driver] Run {} vanished before completion.", run_id);
            return Ok(());
        };

        self.unregister(progression);
        self.inner.ctx.metrics.inc_completed();
        self.notify_update(&run, &progression.observer).await;

        let done = Event::info(
            run_id,
            last_step(),
            format!("Run completed with score {}/100", score),
        );
        self.emit_event(&done, &progression.observer).await?;
        debug!("[Driver] Run {} completed with score {}.", run_id, score);
        Ok(())
    }

    // ==========================================
    // 故障路径
    // ==========================================

    /// 推进出错：注销句柄并尽力把 Run 标记为 Failed
    async fn abort(&self, progression: &Progression, cause: &SimulatorError) {
        self.unregister(progression);
        if let Err(e) = self
            .mark_failed(&progression.run_id, &cause.to_string(), &progression.observer)
            .await
        {
            error!(
                "[Driver] Mark run {} failed also failed: {:?}",
                progression.run_id, e
            );
        }
    }

    async fn mark_failed(
        &self,
        run_id: &str,
        reason: &str,
        observer: &Arc<dyn RunObserver>,
    ) -> Result<()> {
        let failed = self
            .update_run(run_id, |run| {
                if run.status.is_terminal() {
                    return Err(SimulatorError::InvalidTransition {
                        run_id: run.id.clone(),
                        status: run.status,
                        action: "fail",
                    });
                }
                run.mark_failed(reason);
                Ok(())
            })
            .await;

        let run = match failed {
            Ok(Some(run)) => run,
            Ok(None) => {
                debug!("[Driver] Fail ignored, run {} not found.", run_id);
                return Ok(());
            }
            Err(SimulatorError::InvalidTransition { status, .. }) => {
                debug!("[Driver] Run {} already {}, fail ignored.", run_id, status);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        self.inner.ctx.metrics.inc_failed();
        self.notify_update(&run, observer).await;
        let event = Event::error(run_id, run.current_step, format!("Run failed: {}", reason));
        self.emit_event(&event, observer).await?;
        warn!("[Driver] Run {} failed: {}", run_id, reason);
        Ok(())
    }

    // ==========================================
    // Gateway 访问与通知
    // ==========================================

    /// 读取 -> 修改 -> 乐观锁写回
    ///
    /// - Run 不存在 (或写入时已被删除) 返回 `Ok(None)`。
    /// - 版本冲突时重新读取快照，按指数退避重试，最多 `max_update_retries` 次。
    async fn update_run<F>(&self, run_id: &str, mut mutate: F) -> Result<Option<Run>>
    where
        F: FnMut(&mut Run) -> Result<()> + Send,
    {
        let store = &self.inner.ctx.runs;
        let policy = &self.inner.ctx.config.policy;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let Some(mut run) = store.load_run(run_id).await? else {
                return Ok(None);
            };
            let expected = run.version;
            mutate(&mut run)?;

            match store.swap_run(run, expected).await {
                Ok(saved) => return Ok(Some(saved)),
                Err(SimulatorError::RunNotFound(_)) => return Ok(None),
                Err(e) if e.is_retryable() && attempt < policy.max_update_retries => {
                    warn!(
                        "[Driver] Update of run {} failed (attempt {}): {}",
                        run_id, attempt, e
                    );
                    let backoff = calculate_backoff(
                        attempt,
                        policy.retry_base_delay_ms,
                        policy.retry_max_delay_ms,
                    );
                    if !backoff.is_zero() {
                        sleep(backoff).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// 追加事件，然后通知观察者
    async fn emit_event(&self, event: &Event, observer: &Arc<dyn RunObserver>) -> Result<()> {
        self.inner.ctx.events.append_event(event).await?;
        self.notify_event(event, observer).await;
        Ok(())
    }

    async fn notify_event(&self, event: &Event, observer: &Arc<dyn RunObserver>) {
        for o in self.inner.observers.iter() {
            o.on_event(event).await;
        }
        observer.on_event(event).await;
    }

    async fn notify_update(&self, run: &Run, observer: &Arc<dyn RunObserver>) {
        for o in self.inner.observers.iter() {
            o.on_run_update(run).await;
        }
        observer.on_run_update(run).await;
    }
}

fn ensure_status(run: &Run, expected: RunStatus, action: &'static str) -> Result<()> {
    if run.status != expected {
        return Err(SimulatorError::InvalidTransition {
            run_id: run.id.clone(),
            status: run.status,
            action,
        });
    }
    Ok(())
}
