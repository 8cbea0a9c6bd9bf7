use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

/// 最近一次发出的时间戳 (微秒)
static LAST_ISSUED_MICROS: AtomicI64 = AtomicI64::new(i64::MIN);

/// 全局统一的时间工具
pub struct TimeUtils;

impl TimeUtils {
    /// [标准] 获取当前时间
    ///
    /// 全系统统一使用这个方法获取“现在”。
    /// 返回值单调不减：即使墙上时钟被 NTP 往回调，事件时间戳也不会倒流。
    pub fn now() -> DateTime<Utc> {
        let wall = Utc::now().timestamp_micros();
        let prev = LAST_ISSUED_MICROS.fetch_max(wall, Ordering::AcqRel);
        let issued = prev.max(wall);
        DateTime::from_timestamp_micros(issued).unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_monotonic() {
        let mut prev = TimeUtils::now();
        for _ in 0..1000 {
            let next = TimeUtils::now();
            assert!(next >= prev);
            prev = next;
        }
    }
}
