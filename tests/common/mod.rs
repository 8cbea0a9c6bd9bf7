#![allow(dead_code)]

use std::sync::Arc;

use dojo_sim::{
    ChannelObserver, Check, MemoryPersistence, RunClient, RunDriver, RunDriverBuilder,
    RunNotification, SimulatorConfig,
};
use tokio::sync::mpsc::UnboundedReceiver;

pub struct Harness {
    pub driver: RunDriver,
    pub client: RunClient,
    pub gateway: MemoryPersistence,
}

impl Harness {
    /// 默认配置 (真实延迟，配合 start_paused 使用)
    pub fn new() -> Self {
        Self::with(SimulatorConfig::default(), MemoryPersistence::new())
    }

    pub fn with_checks(checks: Vec<Check>) -> Self {
        Self::with(SimulatorConfig::default(), MemoryPersistence::with_checks(checks))
    }

    pub fn with(config: SimulatorConfig, gateway: MemoryPersistence) -> Self {
        let driver = RunDriverBuilder::new()
            .with_node_id("test-node")
            .with_config(config)
            .with_persistence(gateway.clone())
            .build()
            .unwrap();
        let client = RunClient::from_gateway(Arc::new(gateway.clone()));
        Self {
            driver,
            client,
            gateway,
        }
    }
}

pub fn observer() -> (Arc<ChannelObserver>, UnboundedReceiver<RunNotification>) {
    let (observer, rx) = ChannelObserver::channel();
    (Arc::new(observer), rx)
}

/// 取出通道中已经到达的全部通知
pub fn drain(rx: &mut UnboundedReceiver<RunNotification>) -> Vec<RunNotification> {
    let mut out = Vec::new();
    while let Ok(n) = rx.try_recv() {
        out.push(n);
    }
    out
}
