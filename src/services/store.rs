use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    AnsweredTask, Attempt, Package, Payment, Profession, Promocode, ReportTemplate, Scenario,
    TaskTemplate,
};

/// Persistence seam for the whole simulation. Handlers and the progression
/// engine only ever talk to this trait, so tests can swap the Mongo-backed
/// implementation for an in-memory one.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    // Catalog reads.
    async fn list_professions(&self) -> Result<Vec<Profession>>;
    async fn get_profession(&self, profession_id: &str) -> Result<Option<Profession>>;
    async fn get_scenario(&self, profession_id: &str) -> Result<Option<Scenario>>;
    async fn get_scenario_by_id(&self, scenario_id: &str) -> Result<Option<Scenario>>;
    async fn get_task(&self, task_id: &str) -> Result<Option<TaskTemplate>>;
    async fn get_task_by_order(
        &self,
        scenario_id: &str,
        order: u32,
    ) -> Result<Option<TaskTemplate>>;
    async fn count_tasks(&self, scenario_id: &str) -> Result<u32>;
    async fn get_report_template(&self, profession_id: &str) -> Result<Option<ReportTemplate>>;

    // Attempts.
    async fn insert_attempt(&self, attempt: &Attempt) -> Result<()>;
    async fn update_attempt(&self, attempt: &Attempt) -> Result<()>;
    /// The attempt with the highest number for this user and profession.
    async fn latest_attempt(&self, user_id: &str, profession_id: &str)
        -> Result<Option<Attempt>>;
    async fn get_attempt_by_number(
        &self,
        user_id: &str,
        profession_id: &str,
        attempt_number: u32,
    ) -> Result<Option<Attempt>>;
    async fn list_attempts(&self, user_id: &str, profession_id: &str) -> Result<Vec<Attempt>>;

    // Answered tasks.
    async fn insert_answered_task(&self, answered: &AnsweredTask) -> Result<()>;
    async fn answered_for_attempt(&self, attempt_id: &str) -> Result<Vec<AnsweredTask>>;
    async fn answered_exists(&self, attempt_id: &str, task_id: &str) -> Result<bool>;

    // Payments and access.
    async fn insert_payment(&self, payment: &Payment) -> Result<()>;
    async fn update_payment(&self, payment: &Payment) -> Result<()>;
    async fn get_payment(&self, payment_id: &str) -> Result<Option<Payment>>;
    async fn payments_for_user(&self, user_id: &str) -> Result<Vec<Payment>>;
    async fn list_packages(&self) -> Result<Vec<Package>>;
    async fn get_package(&self, package_id: &str) -> Result<Option<Package>>;
    async fn get_promocode(&self, code: &str) -> Result<Option<Promocode>>;
    async fn increment_promocode_use(&self, code: &str) -> Result<()>;
    async fn grant_access(&self, user_id: &str, profession_id: &str) -> Result<()>;
    async fn has_access(&self, user_id: &str, profession_id: &str) -> Result<bool>;
}
