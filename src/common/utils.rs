use nanoid::nanoid;
use rand::Rng;
use std::time::Duration;

// ==========================================
// 1. ID 生成工具 (Identity Utilities)
// ==========================================

/// 去掉 `-` 和 `_` 的字符集，双击即可选中整个 ID
const ALPHABET: [char; 62] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'A', 'B',
    'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U',
    'V', 'W', 'X', 'Y', 'Z',
];

/// 生成 Run ID (`run-` + 12 位 NanoID)
#[inline]
pub fn new_run_id() -> String {
    format!("run-{}", nanoid!(12, &ALPHABET))
}

/// 生成 Event ID (`event-` + 16 位 NanoID)
#[inline]
pub fn new_event_id() -> String {
    format!("event-{}", nanoid!(16, &ALPHABET))
}

/// 获取当前机器的主机名
///
/// 用于生成默认的 `node_id`。
pub fn get_hostname() -> String {
    hostname::get()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|_| format!("node_{}", nanoid!(5, &ALPHABET)))
}

/// 生成节点 ID (`hostname-xxxxx`)
pub fn new_node_id() -> String {
    format!("{}-{}", get_hostname(), nanoid!(5, &ALPHABET))
}

// ==========================================
// 2. 算法工具 (Algorithmic Utilities)
// ==========================================

/// 计算指数退避时间 (Exponential Backoff with Jitter)
///
/// - attempt: 当前重试次数 (1, 2, 3...)
/// - base_delay: 基础延迟 (毫秒)
/// - max_delay: 最大延迟 (毫秒)
pub fn calculate_backoff(attempt: u32, base_delay_ms: u64, max_delay_ms: u64) -> Duration {
    // 1. 指数部分: base * 2^(attempt-1)
    let exponent = 2u64.saturating_pow(attempt.saturating_sub(1));
    let backoff = base_delay_ms.saturating_mul(exponent).min(max_delay_ms);

    if backoff == 0 {
        return Duration::ZERO;
    }

    // 2. Equal Jitter: 在 [backoff/2, backoff] 之间随机，保证不会退化成忙等
    let jittered = rand::rng().random_range(backoff / 2..=backoff);
    Duration::from_millis(jittered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_prefix_and_are_unique() {
        let a = new_run_id();
        let b = new_run_id();
        assert!(a.starts_with("run-"));
        assert_eq!(a.len(), "run-".len() + 12);
        assert_ne!(a, b);
        assert!(new_event_id().starts_with("event-"));
    }

    #[test]
    fn backoff_is_capped() {
        for attempt in 1..20 {
            let d = calculate_backoff(attempt, 10, 200);
            assert!(d <= Duration::from_millis(200));
        }
        assert_eq!(calculate_backoff(3, 0, 200), Duration::ZERO);
    }
}
