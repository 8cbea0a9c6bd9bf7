pub mod config;
pub mod error;
pub mod model;
pub mod time;
pub(crate) mod utils;

// 导出配置
pub use config::{ArtifactConfig, PolicyConfig, ScoringConfig, SimulatorConfig, TimingConfig};

// 导出错误类型
pub use error::{Result, SimulatorError};

// 导出核心模型
pub use model::{Check, Event, EventLevel, Run, RunStatus};

pub use time::TimeUtils;
// 内部工具的快捷访问
pub(crate) use utils::{calculate_backoff, new_event_id, new_run_id};
