use thiserror::Error;

use crate::common::model::RunStatus;

/// 模拟器统一结果类型
///
/// 使用此别名可以简化函数签名：`fn do_something() -> Result<()>`
pub type Result<T> = std::result::Result<T, SimulatorError>;

#[derive(Error, Debug)]
pub enum SimulatorError {
    // ==========================================
    // 1. 配置错误 (Configuration)
    // ==========================================
    /// 配置错误
    ///
    /// - 触发场景: 解析 JSON 配置失败、参数校验不通过。
    /// - 处理: 检查配置文件。
    #[error("Configuration error: {0}")]
    Config(String),

    /// 驱动器已停机
    ///
    /// - 触发场景: 调用 `shutdown()` 之后仍有调用方尝试 start/resume。
    /// - 后果: 请求被拒绝，Run 状态不变。
    #[error("Driver is shutting down, rejecting new progressions.")]
    DriverShutdown,

    // ==========================================
    // 2. 状态机错误 (State Machine)
    // ==========================================
    /// Run 不存在
    ///
    /// - 触发场景: 读取一个已经被删除或从未存在的 Run。
    /// - 注意: Driver 的 start/resume 遇到不存在的 Run 不会返回此错误，而是直接 no-op。
    #[error("Run {0} not found.")]
    RunNotFound(String),

    /// 非法状态流转
    ///
    /// - 触发场景: 对非 Queued 的 Run 调用 start，或对非 AwaitingApproval 的 Run 调用 resume。
    /// - 处理: 调用方应先刷新 Run 状态。
    #[error("Run {run_id} cannot {action} while {status}.")]
    InvalidTransition {
        run_id: String,
        status: RunStatus,
        action: &'static str,
    },

    /// Run 已经有一条正在推进的时间线
    ///
    /// - 触发场景: 同一个 Run 在上一轮推进尚未结束时被再次 start/resume。
    #[error("Run {0} already has an active progression.")]
    RunAlreadyActive(String),

    /// [核心] 乐观锁版本不匹配
    ///
    /// - 触发场景: 两个写者同时对同一个 Run 做 read-modify-write。
    /// - 处理: 重新读取最新快照后重试。
    #[error("Version conflict for run {run_id}: expected {expected}, found {actual}.")]
    VersionConflict {
        run_id: String,
        expected: u64,
        actual: u64,
    },

    // ==========================================
    // 3. 检查项错误 (Checks)
    // ==========================================
    /// 必选检查项不允许关闭
    #[error("Check {0} is required and cannot be disabled.")]
    RequiredCheck(String),

    /// 检查项不存在
    #[error("Check {0} not found.")]
    CheckNotFound(String),

    // ==========================================
    // 4. 基础设施错误 (Infrastructure)
    // ==========================================
    /// 序列化/反序列化失败
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 通用 IO 错误 (读取配置文件等)
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    /// 内部通信通道已关闭
    ///
    /// - 触发场景: 等待通知时，ChannelObserver 的发送端已全部被 Drop。
    #[error("Internal communication channel closed.")]
    ChannelClosed,

    /// 持久化层通用错误
    ///
    /// - 说明: 用于包装外部存储实现的驱动错误。
    #[error("Persistence layer failure: {0}")]
    Persistence(String),
}

impl SimulatorError {
    /// 判断该错误是否值得重试 (Retryable)
    ///
    /// - 返回 `true`: 版本冲突、IO 抖动、存储暂时不可用。Driver 会重新读取快照后退避重试。
    /// - 返回 `false`: 配置错误、非法状态流转、数据损坏等永久性错误。
    pub fn is_retryable(&self) -> bool {
        match self {
            SimulatorError::VersionConflict { .. } => true,
            SimulatorError::Io(_) => true,
            SimulatorError::Persistence(_) => true,

            SimulatorError::Config(_) => false,
            SimulatorError::DriverShutdown => false,
            SimulatorError::RunNotFound(_) => false,
            SimulatorError::InvalidTransition { .. } => false,
            SimulatorError::RunAlreadyActive(_) => false,
            SimulatorError::RequiredCheck(_) => false,
            SimulatorError::CheckNotFound(_) => false,
            SimulatorError::Serialization(_) => false,
            SimulatorError::ChannelClosed => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_conflict_is_retryable() {
        let err = SimulatorError::VersionConflict {
            run_id: "run-1".into(),
            expected: 3,
            actual: 4,
        };
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Version conflict for run run-1: expected 3, found 4."
        );
    }

    #[test]
    fn state_machine_errors_are_permanent() {
        let err = SimulatorError::InvalidTransition {
            run_id: "run-1".into(),
            status: RunStatus::Completed,
            action: "start",
        };
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Run run-1 cannot start while completed.");
        assert!(!SimulatorError::RequiredCheck("secrets".into()).is_retryable());
    }
}
