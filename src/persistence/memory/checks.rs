use super::MemoryPersistence;
use crate::common::error::{Result, SimulatorError};
use crate::common::model::Check;
use crate::persistence::traits::CheckStore;
use async_trait::async_trait;

#[async_trait]
impl CheckStore for MemoryPersistence {
    async fn list_checks(&self) -> Result<Vec<Check>> {
        Ok(self.checks.lock().clone())
    }

    async fn save_checks(&self, checks: &[Check]) -> Result<()> {
        let normalized = checks
            .iter()
            .cloned()
            .map(|mut c| {
                c.enabled |= c.required;
                c
            })
            .collect();
        *self.checks.lock() = normalized;
        Ok(())
    }

    async fn set_check_enabled(&self, id: &str, enabled: bool) -> Result<Check> {
        let mut checks = self.checks.lock();
        let check = checks
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| SimulatorError::CheckNotFound(id.to_string()))?;

        if check.required && !enabled {
            return Err(SimulatorError::RequiredCheck(id.to_string()));
        }
        check.enabled = enabled;
        Ok(check.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn required_check_cannot_be_disabled() {
        let store = MemoryPersistence::new();
        let err = store
            .set_check_enabled("security-scan", false)
            .await
            .unwrap_err();
        assert!(matches!(err, SimulatorError::RequiredCheck(_)));
        let checks = store.list_checks().await.unwrap();
        assert!(checks.iter().find(|c| c.id == "security-scan").unwrap().enabled);
    }

    #[tokio::test]
    async fn optional_check_toggles() {
        let store = MemoryPersistence::new();
        let check = store.set_check_enabled("documentation", true).await.unwrap();
        assert!(check.enabled);
        let check = store.set_check_enabled("documentation", false).await.unwrap();
        assert!(!check.enabled);
    }

    #[tokio::test]
    async fn unknown_check_is_reported() {
        let store = MemoryPersistence::new();
        let err = store.set_check_enabled("nope", true).await.unwrap_err();
        assert!(matches!(err, SimulatorError::CheckNotFound(_)));
    }

    #[tokio::test]
    async fn save_checks_forces_required_on() {
        let store = MemoryPersistence::with_checks(Vec::new());
        let mut check = Check::new("a", "A", "", true, true);
        check.enabled = false;
        store.save_checks(&[check]).await.unwrap();
        assert!(store.list_checks().await.unwrap()[0].enabled);
    }
}
