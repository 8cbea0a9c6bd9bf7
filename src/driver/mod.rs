pub mod builder;
pub mod context;
pub mod core;
pub mod metrics;
pub mod observer;

pub use builder::RunDriverBuilder;
pub use context::DriverContext;
pub use core::RunDriver;
pub use metrics::{DriverMetrics, MetricsSnapshot};
pub use observer::{
    CallbackObserver, ChannelObserver, NoOpObserver, RunNotification, RunObserver,
    wait_for_status,
};
