use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// 驱动器核心指标
// 使用 Atomic 保证并发下的计数性能
#[derive(Debug, Default, Serialize)]
pub struct DriverMetrics {
    // --- 瞬时状态 (Gauges) ---
    /// 当前持有 RunHandle 的 Run 数 (有计时器挂起或正在处理步骤)
    pub active_runs: AtomicUsize,

    // --- 累积计数 (Counters) ---
    pub runs_started: AtomicU64,

    /// 停在 Dojo Gate 的次数
    pub runs_suspended: AtomicU64,

    pub runs_completed: AtomicU64,

    pub runs_failed: AtomicU64,

    /// 处理过的步骤总数
    pub steps_processed: AtomicU64,
}

impl DriverMetrics {
    pub fn inc_active(&self) {
        self.active_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_active(&self) {
        // 防止重复注销导致下溢
        let _ = self
            .active_runs
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    pub fn inc_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_suspended(&self) {
        self.runs_suspended.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_completed(&self) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_steps(&self) {
        self.steps_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// 快照 (用于日志或导出)
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_runs: self.active_runs.load(Ordering::Relaxed),
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_suspended: self.runs_suspended.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            steps_processed: self.steps_processed.load(Ordering::Relaxed),
        }
    }
}

/// 指标的普通值快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub active_runs: usize,
    pub runs_started: u64,
    pub runs_suspended: u64,
    pub runs_completed: u64,
    pub runs_failed: u64,
    pub steps_processed: u64,
}
