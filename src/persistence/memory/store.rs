use super::MemoryPersistence;
use crate::common::error::{Result, SimulatorError};
use crate::common::model::{Event, Run};
use crate::persistence::traits::{EventStore, RunStore};
use async_trait::async_trait;

#[async_trait]
impl RunStore for MemoryPersistence {
    async fn load_run(&self, id: &str) -> Result<Option<Run>> {
        Ok(self.runs.get(id).map(|r| r.clone()))
    }

    async fn list_runs(&self) -> Result<Vec<Run>> {
        let mut runs: Vec<Run> = self.runs.iter().map(|r| r.value().clone()).collect();
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(runs)
    }

    async fn save_run(&self, run: &Run) -> Result<()> {
        self.runs.insert(run.id.clone(), run.clone());
        Ok(())
    }

    /// [核心] 乐观锁写入
    /// 比较和写入都在 DashMap 的分片写锁内完成
    async fn swap_run(&self, mut run: Run, expected_version: u64) -> Result<Run> {
        let Some(mut entry) = self.runs.get_mut(&run.id) else {
            return Err(SimulatorError::RunNotFound(run.id));
        };

        let actual = entry.version;
        if actual != expected_version {
            return Err(SimulatorError::VersionConflict {
                run_id: run.id,
                expected: expected_version,
                actual,
            });
        }

        run.version = expected_version + 1;
        *entry.value_mut() = run.clone();
        Ok(run)
    }

    async fn remove_run(&self, id: &str) -> Result<()> {
        self.runs.remove(id);
        Ok(())
    }
}

#[async_trait]
impl EventStore for MemoryPersistence {
    async fn append_event(&self, event: &Event) -> Result<()> {
        self.events
            .entry(event.run_id.clone())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn list_events(&self, run_id: &str) -> Result<Vec<Event>> {
        Ok(self
            .events
            .get(run_id)
            .map(|log| log.clone())
            .unwrap_or_default())
    }

    async fn clear_events(&self, run_id: &str) -> Result<()> {
        self.events.remove(run_id);
        Ok(())
    }
}
