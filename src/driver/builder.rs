use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    common::{Result, SimulatorConfig},
    driver::{DriverContext, DriverMetrics, RunDriver, RunObserver},
    persistence::{CheckStore, EventStore, Gateway, RunStore, memory::MemoryPersistence},
    pipeline::{MarkdownReport, ReportGenerator},
};

/// Run 驱动构造器 (Builder Pattern)
#[derive(Default)]
pub struct RunDriverBuilder {
    /// 节点ID名 (优先于配置中的 node_id)
    node_id: Option<String>,
    /// 全局配置
    config: Option<SimulatorConfig>,
    /// 持久化 - Run 存储 (Option 用于处理默认值逻辑)
    runs: Option<Arc<dyn RunStore>>,
    /// 持久化 - 事件日志
    events: Option<Arc<dyn EventStore>>,
    /// 持久化 - 检查项
    checks: Option<Arc<dyn CheckStore>>,
    /// 报告生成器
    report: Option<Arc<dyn ReportGenerator>>,
    /// 全局观察者
    observers: Vec<Arc<dyn RunObserver>>,

    shutdown: Option<CancellationToken>,
}

impl RunDriverBuilder {
    /// 创建一个新的构造器
    ///
    /// **默认行为**:
    /// - Config: Default
    /// - Persistence: MemoryPersistence (预置默认检查项)
    /// - Report: MarkdownReport
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置节点 ID (如果不设，使用配置中的值)
    pub fn with_node_id(mut self, id: impl Into<String>) -> Self {
        self.node_id = Some(id.into());
        self
    }

    pub fn with_config(mut self, config: SimulatorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 设置持久化层
    ///
    /// 接收一个同时实现三个 Store 的具体类型 `P`，
    /// 包装为 `Arc` 后分别强转为各自的 trait object。
    pub fn with_persistence<P>(mut self, persistence: P) -> Self
    where
        P: Gateway,
    {
        let arc = Arc::new(persistence);
        self.runs = Some(arc.clone());
        self.events = Some(arc.clone());
        self.checks = Some(arc);
        self
    }

    pub fn with_run_store<S>(mut self, store: S) -> Self
    where
        S: RunStore,
    {
        self.runs = Some(Arc::new(store));
        self
    }

    pub fn with_event_store<S>(mut self, store: S) -> Self
    where
        S: EventStore,
    {
        self.events = Some(Arc::new(store));
        self
    }

    pub fn with_check_store<S>(mut self, store: S) -> Self
    where
        S: CheckStore,
    {
        self.checks = Some(Arc::new(store));
        self
    }

    /// 替换报告生成器
    pub fn with_report<R>(mut self, report: R) -> Self
    where
        R: ReportGenerator,
    {
        self.report = Some(Arc::new(report));
        self
    }

    /// 添加全局观察者 (支持链式调用)
    ///
    /// **注意**: 通知顺序与添加顺序一致，全部先于 start/resume 传入的观察者。
    pub fn with_observer<O>(mut self, observer: O) -> Self
    where
        O: RunObserver,
    {
        self.observers.push(Arc::new(observer));
        self
    }

    /// 使用外部的停机令牌
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// 构建驱动器
    ///
    /// 配置在这里统一校验，不合法时返回 `Config` 错误。
    pub fn build(self) -> Result<RunDriver> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let node_id = self.node_id.unwrap_or_else(|| config.node_id.clone());

        // 未设置的 Store 共用同一个 MemoryPersistence
        if self.runs.is_none() || self.events.is_none() || self.checks.is_none() {
            debug!("Driver Build load Using default MemoryPersistence");
        }
        let fallback = Arc::new(MemoryPersistence::new());
        let runs = self
            .runs
            .unwrap_or_else(|| fallback.clone() as Arc<dyn RunStore>);
        let events = self
            .events
            .unwrap_or_else(|| fallback.clone() as Arc<dyn EventStore>);
        let checks = self
            .checks
            .unwrap_or_else(|| fallback as Arc<dyn CheckStore>);

        let report = self
            .report
            .unwrap_or_else(|| Arc::new(MarkdownReport) as Arc<dyn ReportGenerator>);

        // 初始化全局停机 Token
        let token = self.shutdown.unwrap_or_default();

        let ctx = DriverContext::new(
            node_id,
            runs,
            events,
            checks,
            report,
            config,
            Arc::new(DriverMetrics::default()),
            token,
        );
        Ok(RunDriver::new_with_components(ctx, self.observers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::SimulatorError;

    #[test]
    fn build_rejects_invalid_config() {
        let mut config = SimulatorConfig::new_dev();
        config.timing.delay_scale = f64::NAN;

        let err = RunDriverBuilder::new().with_config(config).build().err();
        assert!(matches!(err, Some(SimulatorError::Config(_))));
    }

    #[test]
    fn builder_node_id_wins_over_config() {
        let driver = RunDriverBuilder::new()
            .with_config(SimulatorConfig::new_dev())
            .with_node_id("node-a")
            .build()
            .unwrap();
        assert_eq!(driver.context().node_id, "node-a");
    }
}
