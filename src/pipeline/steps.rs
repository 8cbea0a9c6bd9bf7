use serde::Serialize;

/// 流水线中的一个步骤
///
/// 静态、不可变。步骤号从 1 开始，严格递增。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunStep {
    pub step: u32,
    pub name: &'static str,
    /// 推进到下一步之前的等待 (毫秒)
    pub delay_ms: u64,
}

impl RunStep {
    const fn new(step: u32, name: &'static str, delay_ms: u64) -> Self {
        Self {
            step,
            name,
            delay_ms,
        }
    }

    /// 到达此步骤时写入 PR / CI 链接
    pub fn is_pr_step(&self) -> bool {
        self.step == PR_STEP
    }

    /// 到达此步骤时挂起，等待 Dojo Gate 审批
    pub fn is_gate_step(&self) -> bool {
        self.step == GATE_STEP
    }
}

/// Opening pull request
pub const PR_STEP: u32 = 7;

/// Awaiting Dojo Gate approval
pub const GATE_STEP: u32 = 8;

/// 固定的十步产品化流水线
pub const RUN_STEPS: [RunStep; 10] = [
    RunStep::new(1, "Analyzing repository", 1500),
    RunStep::new(2, "Running security checks", 2000),
    RunStep::new(3, "Adding test coverage", 2000),
    RunStep::new(4, "Configuring CI pipeline", 1500),
    RunStep::new(5, "Adding observability", 1500),
    RunStep::new(6, "Generating documentation", 1000),
    RunStep::new(PR_STEP, "Opening pull request", 1500),
    RunStep::new(GATE_STEP, "Awaiting Dojo Gate approval", 0),
    RunStep::new(9, "Running CI", 2000),
    RunStep::new(10, "Finalizing", 1500),
];

/// 步骤号 -> 表中下标
pub fn index_of(step: u32) -> Option<usize> {
    RUN_STEPS.iter().position(|s| s.step == step)
}

/// 审批通过后继续推进的第一个下标
pub fn after_gate_index() -> usize {
    index_of(GATE_STEP).map(|i| i + 1).unwrap_or(RUN_STEPS.len())
}

/// 最后一个步骤号
pub fn last_step() -> u32 {
    RUN_STEPS[RUN_STEPS.len() - 1].step
}
