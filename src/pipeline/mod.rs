pub mod report;
pub mod score;
pub mod steps;

pub use report::{MarkdownReport, ReportGenerator};
pub use score::compute_score;
pub use steps::{GATE_STEP, PR_STEP, RUN_STEPS, RunStep};
