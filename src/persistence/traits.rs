use async_trait::async_trait;

use crate::common::error::Result;
use crate::common::model::{Check, Event, Run};

// ==========================================
// 1. Run 存储接口 (RunStore) - 系统的记录者
// ==========================================

/// Run 存储接口
///
/// **职责**: Run 记录的持久化。Gateway 是 Run 状态的权威来源，
/// Driver 不持有 Run 的副本，每次变更都是 读取 -> 修改 -> `swap_run`。
///
/// **一致性**:
/// - `save_run` 是无条件覆盖 (用于创建)。
/// - `swap_run` 是乐观锁写入 (CAS)，Driver 的所有变更都走这条路径。
#[async_trait]
pub trait RunStore: Send + Sync + 'static {
    /// 加载 Run
    ///
    /// 不存在时返回 `Ok(None)`。
    async fn load_run(&self, id: &str) -> Result<Option<Run>>;

    /// 列出全部 Run (按创建时间排序)
    async fn list_runs(&self) -> Result<Vec<Run>>;

    /// 保存 Run (Save)
    ///
    /// 如果 ID 已存在，则覆盖更新，版本号原样写入。
    async fn save_run(&self, run: &Run) -> Result<()>;

    /// 条件写入 (Compare-And-Swap)
    ///
    /// 只有当存储中的版本号等于 `expected_version` 时才写入，
    /// 写入后版本号为 `expected_version + 1`，并返回写入后的快照。
    ///
    /// # 错误
    /// - `VersionConflict`: 版本号不匹配，调用方应重新读取后重试。
    /// - `RunNotFound`: 记录已被删除。
    async fn swap_run(&self, run: Run, expected_version: u64) -> Result<Run>;

    /// 物理删除 Run
    async fn remove_run(&self, id: &str) -> Result<()>;
}

// ==========================================
// 2. 事件日志接口 (EventStore)
// ==========================================

/// 事件日志接口
///
/// 只追加。同一个 Run 的事件按追加顺序返回。
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    /// 追加事件
    async fn append_event(&self, event: &Event) -> Result<()>;

    /// 按追加顺序列出某个 Run 的事件
    async fn list_events(&self, run_id: &str) -> Result<Vec<Event>>;

    /// 清空某个 Run 的事件 (Run 被删除时由调用方使用)
    async fn clear_events(&self, run_id: &str) -> Result<()>;
}

// ==========================================
// 3. 检查项接口 (CheckStore)
// ==========================================

/// 检查项配置接口
///
/// 模拟器只在完成时读取一次，用于计算分数和生成报告。
#[async_trait]
pub trait CheckStore: Send + Sync + 'static {
    /// 列出全部检查项
    async fn list_checks(&self) -> Result<Vec<Check>>;

    /// 整体替换检查项配置
    ///
    /// 必选检查项会被强制保持开启。
    async fn save_checks(&self, checks: &[Check]) -> Result<()>;

    /// 开关单个检查项
    ///
    /// # 错误
    /// - `RequiredCheck`: 尝试关闭一个必选检查项。
    /// - `CheckNotFound`: ID 不存在。
    async fn set_check_enabled(&self, id: &str, enabled: bool) -> Result<Check>;
}

/// 完整的 Gateway：三个存储接口的组合
pub trait Gateway: RunStore + EventStore + CheckStore {}

impl<T> Gateway for T where T: RunStore + EventStore + CheckStore {}
