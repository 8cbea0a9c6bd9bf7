use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::common::Check;
use crate::common::model::{Event, Run};

/// 内存持久化实现 (In-Memory Persistence)
///
/// 同时实现了 RunStore、EventStore 和 CheckStore。
/// Clone 之后共享同一份数据。
#[derive(Debug)]
pub struct MemoryPersistence {
    /// 【数据仓库】Run 全量数据
    /// - DashMap: 分片锁，`swap_run` 的比较和写入在同一个分片锁内完成
    pub(super) runs: Arc<DashMap<String, Run>>,

    /// 【事件日志】run_id -> 按追加顺序排列的事件
    pub(super) events: Arc<DashMap<String, Vec<Event>>>,

    /// 检查项配置
    pub(super) checks: Arc<Mutex<Vec<Check>>>,
}

impl MemoryPersistence {
    /// 创建一个新的内存持久化实例，预置默认检查项
    pub fn new() -> Self {
        Self::with_checks(Check::defaults())
    }

    /// 使用指定的检查项创建
    pub fn with_checks(checks: Vec<Check>) -> Self {
        Self {
            runs: Arc::new(DashMap::new()),
            events: Arc::new(DashMap::new()),
            checks: Arc::new(Mutex::new(checks)),
        }
    }

    /// 当前保存的 Run 数量
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }
}

impl Default for MemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

// Clone 实现：因为内部都是 Arc，所以 Clone 是廉价的
impl Clone for MemoryPersistence {
    fn clone(&self) -> Self {
        Self {
            runs: self.runs.clone(),
            events: self.events.clone(),
            checks: self.checks.clone(),
        }
    }
}
