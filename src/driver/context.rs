use crate::{
    common::SimulatorConfig,
    driver::DriverMetrics,
    persistence::{CheckStore, EventStore, RunStore},
    pipeline::ReportGenerator,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 驱动器上下文 (Driver Context)
///
/// **职责**:
/// 打包 Driver 运行所需的所有共享资源，避免在函数调用时传递一长串参数。
pub struct DriverContext {
    // --- 身份标识 (Identity) ---
    /// 当前节点 ID，只用于日志
    pub node_id: String,

    // --- Gateway ---
    pub runs: Arc<dyn RunStore>,
    pub events: Arc<dyn EventStore>,
    pub checks: Arc<dyn CheckStore>,

    /// 报告生成器
    pub report: Arc<dyn ReportGenerator>,

    /// 全局配置
    pub config: Arc<SimulatorConfig>,

    /// 全局统计指标
    pub metrics: Arc<DriverMetrics>,

    // --- 信号与控制 (Signals & Control) ---
    /// 关机信号
    /// - 每个 Run 的取消令牌都是它的子令牌，shutdown 时全部级联取消。
    pub shutdown: CancellationToken,
}

impl Clone for DriverContext {
    fn clone(&self) -> Self {
        Self {
            node_id: self.node_id.clone(),
            runs: self.runs.clone(),
            events: self.events.clone(),
            checks: self.checks.clone(),
            report: self.report.clone(),
            config: self.config.clone(),
            metrics: self.metrics.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl DriverContext {
    pub fn new(
        node_id: String,
        runs: Arc<dyn RunStore>,
        events: Arc<dyn EventStore>,
        checks: Arc<dyn CheckStore>,
        report: Arc<dyn ReportGenerator>,
        config: SimulatorConfig,
        metrics: Arc<DriverMetrics>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            node_id,
            runs,
            events,
            checks,
            report,
            config: Arc::new(config),
            metrics,
            shutdown,
        }
    }

    /// 检查是否收到停机信号
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
