use std::sync::Arc;

use crate::error::EngineError;
use crate::metrics::ATTEMPTS_TOTAL;
use crate::models::{Attempt, AttemptStatus, AttemptSummary, Profession};
use crate::services::store::ProgressStore;

/// Attempt lifecycle: seeding, restarts under the per-profession ceiling,
/// and history reads. Progression through tasks lives in the engine.
pub struct AttemptService {
    store: Arc<dyn ProgressStore>,
    max_attempts: u32,
}

impl AttemptService {
    pub fn new(store: Arc<dyn ProgressStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts,
        }
    }

    pub async fn get_profession(&self, profession_id: &str) -> Result<Profession, EngineError> {
        self.store
            .get_profession(profession_id)
            .await
            .map_err(EngineError::persistence)?
            .filter(|p| p.is_active)
            .ok_or(EngineError::NotFound("profession"))
    }

    /// Free professions are open to everyone; paid ones require a grant.
    pub async fn ensure_access(
        &self,
        user_id: &str,
        profession: &Profession,
    ) -> Result<(), EngineError> {
        if profession.price <= 0.0 {
            return Ok(());
        }
        let granted = self
            .store
            .has_access(user_id, &profession.id)
            .await
            .map_err(EngineError::persistence)?;
        if granted {
            Ok(())
        } else {
            Err(EngineError::AccessDenied)
        }
    }

    /// The attempt the user is currently on, seeding attempt #1 in the
    /// `not_started` state on first contact with a profession.
    pub async fn current_or_seed(
        &self,
        user_id: &str,
        profession_id: &str,
    ) -> Result<Attempt, EngineError> {
        let profession = self.get_profession(profession_id).await?;
        self.ensure_access(user_id, &profession).await?;

        if let Some(attempt) = self
            .store
            .latest_attempt(user_id, profession_id)
            .await
            .map_err(EngineError::persistence)?
        {
            return Ok(attempt);
        }

        let attempt = Attempt::new(user_id, profession_id, 1, AttemptStatus::NotStarted);
        self.store
            .insert_attempt(&attempt)
            .await
            .map_err(EngineError::persistence)?;
        ATTEMPTS_TOTAL.with_label_values(&["seeded"]).inc();
        tracing::info!(
            user_id = %user_id,
            profession_id = %profession_id,
            "Seeded first attempt"
        );
        Ok(attempt)
    }

    /// Open a fresh attempt. The previous one keeps its state as history;
    /// an in-progress attempt is simply abandoned. Restarts beyond the
    /// configured ceiling are rejected.
    pub async fn restart(
        &self,
        user_id: &str,
        profession_id: &str,
    ) -> Result<Attempt, EngineError> {
        let profession = self.get_profession(profession_id).await?;
        self.ensure_access(user_id, &profession).await?;

        let latest = self
            .store
            .latest_attempt(user_id, profession_id)
            .await
            .map_err(EngineError::persistence)?
            .ok_or(EngineError::NotFound("attempt"))?;

        if latest.attempt_number >= self.max_attempts {
            return Err(EngineError::AttemptLimitExceeded(self.max_attempts));
        }

        let attempt = Attempt::new(
            user_id,
            profession_id,
            latest.attempt_number + 1,
            AttemptStatus::NotStarted,
        );
        self.store
            .insert_attempt(&attempt)
            .await
            .map_err(EngineError::persistence)?;
        ATTEMPTS_TOTAL.with_label_values(&["restarted"]).inc();
        tracing::info!(
            user_id = %user_id,
            profession_id = %profession_id,
            attempt_number = attempt.attempt_number,
            "Restarted attempt"
        );
        Ok(attempt)
    }

    pub async fn history(
        &self,
        user_id: &str,
        profession_id: &str,
    ) -> Result<Vec<AttemptSummary>, EngineError> {
        let attempts = self
            .store
            .list_attempts(user_id, profession_id)
            .await
            .map_err(EngineError::persistence)?;
        Ok(attempts.iter().map(AttemptSummary::from).collect())
    }

    pub async fn by_number(
        &self,
        user_id: &str,
        profession_id: &str,
        attempt_number: u32,
    ) -> Result<Attempt, EngineError> {
        self.store
            .get_attempt_by_number(user_id, profession_id, attempt_number)
            .await
            .map_err(EngineError::persistence)?
            .ok_or(EngineError::NotFound("attempt"))
    }
}
