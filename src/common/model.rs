use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::common::{TimeUtils, new_event_id, new_run_id};

// ==========================================
// 1. Run 状态枚举 (RunStatus)
// ==========================================

/// Run 生命周期状态
///
/// 流转: `Queued -> Running -> AwaitingApproval -> Running -> Completed`。
/// `Failed` 只能通过故障路径进入 (`RunDriver::fail` 或后台推进时存储失败)。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// 已创建，等待 start
    Queued,

    /// 推进中
    /// - 持有一个 RunHandle，后台任务按步骤表推进。
    Running,

    /// 停在 Dojo Gate
    /// - 没有任何计时器挂起，只能由外部 resume 唤醒，没有超时。
    AwaitingApproval,

    /// 已完成 (终态)
    Completed,

    /// 已失败 (终态)
    Failed,
}

impl RunStatus {
    /// 状态是否是终态（不可流转）
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::AwaitingApproval => "awaiting_approval",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// 2. 核心数据 (Run)
// ==========================================

/// 一次针对某个仓库的流水线执行
///
/// - Gateway 持有权威副本，Driver 每次变更前都重新读取快照。
/// - `version` 是乐观锁版本号，每次 `swap_run` 成功后 +1。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    // --- 基础标识 ---
    /// 全局唯一 ID (`run-xxxxx`)
    pub id: String,

    /// 外部 Repo 记录的引用 (不归模拟器管理)
    pub repo_id: String,

    // --- 状态与进度 ---
    pub status: RunStatus,

    /// 最近一次到达的步骤号，start 之前为 0
    ///
    /// 在完成之前单调不减。
    #[serde(default)]
    pub current_step: u32,

    /// 乐观锁版本号 (CAS 核心)
    #[serde(default)]
    pub version: u64,

    // --- 时间戳 ---
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,

    // --- 产物链接 ---
    /// 第 7 步 (Opening pull request) 写入
    #[serde(default)]
    pub pr_url: Option<String>,
    /// 第 7 步写入
    #[serde(default)]
    pub ci_url: Option<String>,
    /// 完成时写入
    #[serde(default)]
    pub preview_url: Option<String>,

    // --- 结果 ---
    /// 0..=100，只在完成时写入
    #[serde(default)]
    pub score: Option<u8>,
    /// 只在完成时写入
    #[serde(default)]
    pub report_markdown: Option<String>,
    /// 只在进入 Failed 时写入
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl Run {
    /// 创建一个新的 Queued Run
    pub fn new(repo_id: impl Into<String>) -> Self {
        Self::with_id(new_run_id(), repo_id)
    }

    pub fn with_id(id: impl Into<String>, repo_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            repo_id: repo_id.into(),
            status: RunStatus::Queued,
            current_step: 0,
            version: 0,
            created_at: TimeUtils::now(),
            started_at: None,
            finished_at: None,
            pr_url: None,
            ci_url: None,
            preview_url: None,
            score: None,
            report_markdown: None,
            failure_reason: None,
        }
    }

    /// 标记为运行中 (start 时调用)
    pub fn mark_running(&mut self) {
        self.status = RunStatus::Running;
        self.started_at = Some(TimeUtils::now());
        self.current_step = 1;
    }

    /// 推进到指定步骤
    ///
    /// `current_step` 只增不减，旧步骤号会被忽略。
    pub fn advance_to(&mut self, step: u32) {
        self.current_step = self.current_step.max(step);
    }

    /// 标记为失败 (终态)
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = RunStatus::Failed;
        self.finished_at = Some(TimeUtils::now());
        self.failure_reason = Some(reason.into());
    }
}

// ==========================================
// 3. 事件日志 (Event)
// ==========================================

/// 事件级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

impl EventLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventLevel::Info => "info",
            EventLevel::Warn => "warn",
            EventLevel::Error => "error",
        }
    }
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// 只追加的事件日志条目
///
/// 追加之后不可修改、不可删除。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub level: EventLevel,
    pub step: u32,
    pub message: String,
}

impl Event {
    pub fn new(run_id: &str, level: EventLevel, step: u32, message: impl Into<String>) -> Self {
        Self {
            id: new_event_id(),
            run_id: run_id.to_string(),
            timestamp: TimeUtils::now(),
            level,
            step,
            message: message.into(),
        }
    }

    pub fn info(run_id: &str, step: u32, message: impl Into<String>) -> Self {
        Self::new(run_id, EventLevel::Info, step, message)
    }

    pub fn warn(run_id: &str, step: u32, message: impl Into<String>) -> Self {
        Self::new(run_id, EventLevel::Warn, step, message)
    }

    pub fn error(run_id: &str, step: u32, message: impl Into<String>) -> Self {
        Self::new(run_id, EventLevel::Error, step, message)
    }
}

// ==========================================
// 4. 检查项 (Check)
// ==========================================

/// 可开关的产品化策略
///
/// - `required` 的检查项不能被关闭。
/// - 对模拟器而言是只读输入，用于计算分数和生成报告。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    pub id: String,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    #[serde(default)]
    pub required: bool,
}

impl Check {
    pub fn new(id: &str, name: &str, description: &str, enabled: bool, required: bool) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            // 必选项永远是开启的
            enabled: enabled || required,
            required,
        }
    }

    /// 默认检查项目录
    pub fn defaults() -> Vec<Check> {
        vec![
            Check::new(
                "security-scan",
                "Security scan",
                "Static analysis for common vulnerability patterns",
                true,
                true,
            ),
            Check::new(
                "secrets-detection",
                "Secrets detection",
                "Blocks hard-coded credentials and API keys",
                true,
                true,
            ),
            Check::new(
                "unit-tests",
                "Unit tests",
                "Generates tests for untested modules",
                true,
                false,
            ),
            Check::new(
                "ci-pipeline",
                "CI pipeline",
                "Adds a build, lint and test workflow",
                true,
                false,
            ),
            Check::new(
                "error-handling",
                "Error handling",
                "Replaces silent failures with explicit error paths",
                true,
                false,
            ),
            Check::new(
                "structured-logging",
                "Structured logging",
                "Adds request-scoped structured logs",
                false,
                false,
            ),
            Check::new(
                "documentation",
                "Documentation",
                "Writes a README and API reference",
                false,
                false,
            ),
            Check::new(
                "dependency-audit",
                "Dependency audit",
                "Flags outdated and vulnerable dependencies",
                true,
                false,
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_run_is_queued_at_step_zero() {
        let run = Run::new("repo-1");
        assert!(run.id.starts_with("run-"));
        assert_eq!(run.status, RunStatus::Queued);
        assert_eq!(run.current_step, 0);
        assert_eq!(run.version, 0);
        assert!(run.started_at.is_none());
    }

    #[test]
    fn advance_never_moves_backwards() {
        let mut run = Run::new("repo-1");
        run.mark_running();
        run.advance_to(5);
        run.advance_to(3);
        assert_eq!(run.current_step, 5);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&RunStatus::AwaitingApproval).unwrap();
        assert_eq!(json, "\"awaiting_approval\"");
        let level = serde_json::to_string(&EventLevel::Warn).unwrap();
        assert_eq!(level, "\"warn\"");
    }

    #[test]
    fn required_checks_start_enabled() {
        let check = Check::new("x", "X", "", false, true);
        assert!(check.enabled);
        assert!(Check::defaults().iter().filter(|c| c.required).all(|c| c.enabled));
    }
}
