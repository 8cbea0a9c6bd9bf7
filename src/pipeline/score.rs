use crate::common::{Check, ScoringConfig};

/// 分数上限
pub const MAX_SCORE: u32 = 100;

/// 计算 ShipDojo 分数
///
/// `min(100, round(weight * enabled / total) + bonus)`，四舍五入 (half-up)。
/// 纯函数：没有随机、没有 IO，只依赖检查项集合。
/// 检查项为空时覆盖率部分记为 0。
pub fn compute_score(checks: &[Check], scoring: &ScoringConfig) -> u8 {
    let total = checks.len() as u64;
    let enabled = checks.iter().filter(|c| c.enabled).count() as u64;

    let base = if total == 0 {
        0
    } else {
        // round(w * k / n) == floor((2 * w * k + n) / (2 * n))
        let weight = scoring.enabled_weight as u64;
        (2 * weight * enabled + total) / (2 * total)
    };

    let score = (base + scoring.completion_bonus as u64).min(MAX_SCORE as u64);
    score as u8
}
