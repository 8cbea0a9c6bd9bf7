use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::common::{Event, Result, Run, RunStatus, SimulatorError};

/// Run 变更观察者接口
///
/// Driver 每完成一次变更 (写 Run 或追加 Event)，都会在开始下一次变更之前
/// 依次 await 所有观察者。同一个 Run 的通知顺序与变更顺序一致。
///
/// 常见用途：
/// - 推送到 UI (WebSocket / SSE)
/// - 自定义日志与报警
/// - 测试中收集状态序列
#[async_trait]
pub trait RunObserver: Send + Sync + 'static {
    /// Run 记录写入后调用，参数是写入后的快照
    async fn on_run_update(&self, _run: &Run) {}

    /// 事件追加后调用
    async fn on_event(&self, _event: &Event) {}
}

// ==========================================
// 默认的空观察者 (No-Op)
// ==========================================

pub struct NoOpObserver;

#[async_trait]
impl RunObserver for NoOpObserver {}

// ==========================================
// 回调观察者
// ==========================================

/// 把两个闭包包装成观察者
pub struct CallbackObserver<U, E> {
    on_update: U,
    on_event: E,
}

impl<U, E> CallbackObserver<U, E>
where
    U: Fn(&Run) + Send + Sync + 'static,
    E: Fn(&Event) + Send + Sync + 'static,
{
    pub fn new(on_update: U, on_event: E) -> Self {
        Self {
            on_update,
            on_event,
        }
    }
}

#[async_trait]
impl<U, E> RunObserver for CallbackObserver<U, E>
where
    U: Fn(&Run) + Send + Sync + 'static,
    E: Fn(&Event) + Send + Sync + 'static,
{
    async fn on_run_update(&self, run: &Run) {
        (self.on_update)(run);
    }

    async fn on_event(&self, event: &Event) {
        (self.on_event)(event);
    }
}

// ==========================================
// 通道观察者 (每个 Run 一条消息通道)
// ==========================================

/// 通道中流转的通知
#[derive(Debug, Clone, PartialEq)]
pub enum RunNotification {
    RunUpdated(Run),
    EventAppended(Event),
}

/// 把通知转发到 tokio mpsc 通道
///
/// 接收端被 Drop 之后通知会被静默丢弃，不影响 Run 的推进。
/// Clone 之后共享同一条通道，start 和 resume 可以复用一个接收端。
#[derive(Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<RunNotification>,
}

impl ChannelObserver {
    /// 创建观察者和对应的接收端
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RunNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl RunObserver for ChannelObserver {
    async fn on_run_update(&self, run: &Run) {
        let _ = self.tx.send(RunNotification::RunUpdated(run.clone()));
    }

    async fn on_event(&self, event: &Event) {
        let _ = self.tx.send(RunNotification::EventAppended(event.clone()));
    }
}

/// 消费通知，直到某个 Run 进入指定状态
///
/// 返回进入该状态时的快照。所有发送端都被 Drop 后返回 `ChannelClosed`。
pub async fn wait_for_status(
    rx: &mut mpsc::UnboundedReceiver<RunNotification>,
    run_id: &str,
    status: RunStatus,
) -> Result<Run> {
    while let Some(notification) = rx.recv().await {
        if let RunNotification::RunUpdated(run) = notification {
            if run.id == run_id && run.status == status {
                return Ok(run);
            }
        }
    }
    Err(SimulatorError::ChannelClosed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    #[tokio::test]
    async fn callback_observer_forwards_both_streams() {
        let updates = Arc::new(AtomicUsize::new(0));
        let events = Arc::new(AtomicUsize::new(0));
        let (u, e) = (updates.clone(), events.clone());
        let observer = CallbackObserver::new(
            move |_run: &Run| {
                u.fetch_add(1, Ordering::SeqCst);
            },
            move |_event: &Event| {
                e.fetch_add(1, Ordering::SeqCst);
            },
        );

        let run = Run::new("repo-1");
        observer.on_run_update(&run).await;
        observer.on_event(&Event::info(&run.id, 1, "x")).await;
        observer.on_event(&Event::info(&run.id, 2, "y")).await;

        assert_eq!(updates.load(Ordering::SeqCst), 1);
        assert_eq!(events.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn wait_for_status_skips_other_runs_and_states() {
        let (observer, mut rx) = ChannelObserver::channel();
        let mut other = Run::with_id("run-b", "repo-1");
        other.status = RunStatus::Completed;
        let mut target = Run::with_id("run-a", "repo-1");
        target.status = RunStatus::Running;

        observer.on_run_update(&other).await;
        observer.on_event(&Event::info("run-a", 1, "Analyzing repository...")).await;
        observer.on_run_update(&target).await;
        target.status = RunStatus::Completed;
        observer.on_run_update(&target).await;

        let run = wait_for_status(&mut rx, "run-a", RunStatus::Completed)
            .await
            .unwrap();
        assert_eq!(run.id, "run-a");

        drop(observer);
        let err = wait_for_status(&mut rx, "run-a", RunStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, SimulatorError::ChannelClosed));
    }

    #[tokio::test]
    async fn channel_observer_survives_dropped_receiver() {
        let (observer, rx) = ChannelObserver::channel();
        drop(rx);
        observer.on_run_update(&Run::new("repo-1")).await;
    }
}
