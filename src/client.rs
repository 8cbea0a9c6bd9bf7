use std::sync::Arc;

use anyhow::bail;

use crate::{
    common::{Event, Run, new_run_id},
    persistence::{EventStore, Gateway, RunStore},
};

/// 提交与查询 Run 的客户端
///
/// 只负责写入 Queued 状态的 Run，推进由 `RunDriver` 完成。
pub struct RunClient {
    runs: Arc<dyn RunStore>,
    events: Arc<dyn EventStore>,
}

impl RunClient {
    pub fn new(runs: Arc<dyn RunStore>, events: Arc<dyn EventStore>) -> Self {
        Self { runs, events }
    }

    /// 使用同一个 Gateway 同时作为 Run 存储和事件日志
    pub fn from_gateway<G: Gateway>(gateway: Arc<G>) -> Self {
        Self {
            runs: gateway.clone(),
            events: gateway,
        }
    }

    /// 提交原始 Run
    ///
    /// 状态会被重置为 Queued，版本号归零。
    pub async fn submit_raw(&self, run: Run) -> anyhow::Result<Run> {
        // === 数据完整性验证 ===
        if run.id.trim().is_empty() {
            bail!("Run ID cannot be empty");
        }
        if run.repo_id.trim().is_empty() {
            bail!("Repository ID cannot be empty");
        }
        if self.runs.load_run(&run.id).await?.is_some() {
            bail!("Run {} already exists", run.id);
        }

        let run = Run {
            created_at: run.created_at,
            ..Run::with_id(run.id, run.repo_id)
        };

        self.runs.save_run(&run).await?;
        Ok(run)
    }

    /// 为仓库创建一个排队中的 Run
    pub async fn submit(&self, repo_id: &str) -> anyhow::Result<Run> {
        let run = Run::with_id(new_run_id(), repo_id);
        self.submit_raw(run).await
    }

    pub async fn run(&self, run_id: &str) -> anyhow::Result<Option<Run>> {
        Ok(self.runs.load_run(run_id).await?)
    }

    /// 按追加顺序返回事件日志
    pub async fn events(&self, run_id: &str) -> anyhow::Result<Vec<Event>> {
        Ok(self.events.list_events(run_id).await?)
    }

    /// 删除 Run 及其事件日志
    ///
    /// 推进中的 Run 被删除后，下一次计时器触发时会自动停止。
    pub async fn remove(&self, run_id: &str) -> anyhow::Result<bool> {
        let existed = self.runs.load_run(run_id).await?.is_some();
        self.runs.remove_run(run_id).await?;
        self.events.clear_events(run_id).await?;
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::RunStatus;
    use crate::persistence::MemoryPersistence;

    fn client() -> RunClient {
        RunClient::from_gateway(Arc::new(MemoryPersistence::new()))
    }

    #[tokio::test]
    async fn submit_creates_queued_run() {
        let client = client();
        let run = client.submit("repo-1").await.unwrap();

        assert!(run.id.starts_with("run-"));
        assert_eq!(run.status, RunStatus::Queued);
        assert_eq!(run.current_step, 0);

        let loaded = client.run(&run.id).await.unwrap().unwrap();
        assert_eq!(loaded, run);
        assert!(client.events(&run.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn submit_rejects_blank_repo() {
        assert!(client().submit("  ").await.is_err());
    }

    #[tokio::test]
    async fn submit_raw_rejects_duplicate_id() {
        let client = client();
        client.submit_raw(Run::with_id("run-a", "repo-1")).await.unwrap();
        assert!(client.submit_raw(Run::with_id("run-a", "repo-2")).await.is_err());
    }

    #[tokio::test]
    async fn remove_drops_run() {
        let client = client();
        let run = client.submit("repo-1").await.unwrap();
        assert!(client.remove(&run.id).await.unwrap());
        assert!(client.run(&run.id).await.unwrap().is_none());
        assert!(!client.remove(&run.id).await.unwrap());
    }
}
