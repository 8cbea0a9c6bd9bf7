// 1. 基础模块
pub mod common;

// 2. 流水线定义 (步骤表、评分、报告)
pub mod pipeline;

// 3. 核心接口与实现
pub mod driver;
pub mod persistence;

// 4. 客户端
pub mod client;

pub use client::RunClient;
pub use common::{
    Check, Event, EventLevel, Result, Run, RunStatus, SimulatorConfig, SimulatorError,
};
pub use driver::{
    CallbackObserver, ChannelObserver, NoOpObserver, RunDriver, RunDriverBuilder,
    RunNotification, RunObserver,
};
pub use persistence::{CheckStore, EventStore, Gateway, MemoryPersistence, RunStore};
