use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

use crate::common::{Result, SimulatorError, utils::new_node_id};

// ==========================================
// 1. 节奏配置 (TimingConfig)
// ==========================================

/// 步骤推进节奏
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// 步骤延迟缩放系数
    ///
    /// - 说明: 步骤表中每一步的 `delay_ms` 都会乘以这个系数。
    /// - 默认值: 1.0
    /// - 建议: 测试或演示时设为 0，步骤之间不再等待。
    pub delay_scale: f64,

    /// 审批通过后到第 9 步之间的等待 (毫秒)
    ///
    /// - 默认值: 500
    pub resume_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            delay_scale: 1.0,
            resume_delay_ms: 500,
        }
    }
}

impl TimingConfig {
    /// 按缩放系数换算后的实际等待时长
    ///
    /// NaN 和非正数视为零等待，超出 `Duration` 范围时饱和到 `Duration::MAX`。
    pub fn scaled(&self, delay_ms: u64) -> Duration {
        if delay_ms == 0 || self.delay_scale.is_nan() || self.delay_scale <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(delay_ms as f64 * self.delay_scale / 1000.0)
            .unwrap_or(Duration::MAX)
    }

    pub fn resume_delay(&self) -> Duration {
        self.scaled(self.resume_delay_ms)
    }
}

// ==========================================
// 2. 评分配置 (ScoringConfig)
// ==========================================

/// 分数计算参数
///
/// `score = min(100, round(enabled_weight * enabled / total) + completion_bonus)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// 检查项覆盖率的权重
    /// - 默认值: 70
    pub enabled_weight: u32,

    /// 完成奖励分
    /// - 默认值: 30
    pub completion_bonus: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            enabled_weight: 70,
            completion_bonus: 30,
        }
    }
}

// ==========================================
// 3. 产物链接 (ArtifactConfig)
// ==========================================

/// 模拟流水线产出的链接
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// 第 7 步写入的 Pull Request 链接
    pub pr_url: String,
    /// 第 7 步写入的 CI 链接
    pub ci_url: String,
    /// 完成时写入的预览环境链接
    pub preview_url: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            pr_url: "https://github.com/shipdojo/demo-vibecoded-app/pull/42".to_string(),
            ci_url: "https://github.com/shipdojo/demo-vibecoded-app/actions/runs/123456"
                .to_string(),
            preview_url: "https://demo-vibecoded-app.vercel.app".to_string(),
        }
    }
}

// ==========================================
// 4. 策略配置 (PolicyConfig)
// ==========================================

/// 并发写入与容错配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// 乐观锁冲突时的最大尝试次数
    ///
    /// - 默认值: 5
    /// - 超过后该次变更放弃，后台推进会把 Run 标记为 Failed。
    pub max_update_retries: u32,

    /// 冲突重试的基础退避 (毫秒)
    pub retry_base_delay_ms: u64,

    /// 冲突重试的最大退避 (毫秒)
    pub retry_max_delay_ms: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_update_retries: 5,
            retry_base_delay_ms: 10,
            retry_max_delay_ms: 200,
        }
    }
}

// ==========================================
// 5. 总配置入口 (SimulatorConfig)
// ==========================================

/// 模拟器总配置
///
/// 使用分层结构组织配置项。支持 `serde` 序列化，可直接从 JSON 加载，
/// 缺省的分区使用默认值。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub artifacts: ArtifactConfig,

    #[serde(default)]
    pub policy: PolicyConfig,

    /// 节点标识，只用于日志
    /// 默认: `hostname-随机串`
    #[serde(default = "new_node_id")]
    pub node_id: String,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            scoring: ScoringConfig::default(),
            artifacts: ArtifactConfig::default(),
            policy: PolicyConfig::default(),
            node_id: new_node_id(),
        }
    }
}

impl SimulatorConfig {
    /// 快速创建一个开发环境配置
    ///
    /// 所有步骤零等待，适合测试和演示。
    pub fn new_dev() -> Self {
        let mut cfg = Self::default();
        cfg.timing.delay_scale = 0.0;
        cfg.timing.resume_delay_ms = 0;
        cfg
    }

    /// 从 JSON 字符串加载并校验
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// 从 JSON 文件加载并校验
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if !self.timing.delay_scale.is_finite() || self.timing.delay_scale < 0.0 {
            return Err(SimulatorError::Config(format!(
                "timing.delay_scale must be a finite number >= 0, got {}",
                self.timing.delay_scale
            )));
        }
        if self.policy.max_update_retries == 0 {
            return Err(SimulatorError::Config(
                "policy.max_update_retries must be at least 1".to_string(),
            ));
        }
        if self.policy.retry_base_delay_ms > self.policy.retry_max_delay_ms {
            return Err(SimulatorError::Config(format!(
                "policy.retry_base_delay_ms ({}) exceeds retry_max_delay_ms ({})",
                self.policy.retry_base_delay_ms, self.policy.retry_max_delay_ms
            )));
        }
        Ok(())
    }
}
