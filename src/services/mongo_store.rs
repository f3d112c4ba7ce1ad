use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::options::FindOptions;
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};

use crate::models::{
    AnsweredTask, Attempt, Package, Payment, Profession, Promocode, ReportTemplate, Scenario,
    TaskTemplate,
};
use crate::services::store::ProgressStore;
use crate::utils::retry::{retry_async_with_config, RetryConfig};

/// One (user, profession) access grant, written when a payment completes.
#[derive(Serialize, Deserialize)]
struct AccessGrant {
    user_id: String,
    profession_id: String,
}

pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn professions(&self) -> Collection<Profession> {
        self.db.collection("professions")
    }

    fn scenarios(&self) -> Collection<Scenario> {
        self.db.collection("scenarios")
    }

    fn tasks(&self) -> Collection<TaskTemplate> {
        self.db.collection("task_templates")
    }

    fn report_templates(&self) -> Collection<ReportTemplate> {
        self.db.collection("report_templates")
    }

    fn attempts(&self) -> Collection<Attempt> {
        self.db.collection("attempts")
    }

    fn answered(&self) -> Collection<AnsweredTask> {
        self.db.collection("answered_tasks")
    }

    fn payments(&self) -> Collection<Payment> {
        self.db.collection("payments")
    }

    fn packages(&self) -> Collection<Package> {
        self.db.collection("packages")
    }

    fn promocodes(&self) -> Collection<Promocode> {
        self.db.collection("promocodes")
    }

    fn access_grants(&self) -> Collection<AccessGrant> {
        self.db.collection("access_grants")
    }
}

#[async_trait]
impl ProgressStore for MongoStore {
    async fn list_professions(&self) -> Result<Vec<Profession>> {
        let options = FindOptions::builder().sort(doc! { "name": 1 }).build();
        let cursor = self
            .professions()
            .find(doc! { "is_active": true })
            .with_options(options)
            .await
            .context("Failed to list professions")?;
        cursor
            .try_collect()
            .await
            .context("Failed to read professions cursor")
    }

    async fn get_profession(&self, profession_id: &str) -> Result<Option<Profession>> {
        self.professions()
            .find_one(doc! { "_id": profession_id })
            .await
            .context("Failed to fetch profession")
    }

    async fn get_scenario(&self, profession_id: &str) -> Result<Option<Scenario>> {
        self.scenarios()
            .find_one(doc! { "profession_id": profession_id })
            .await
            .context("Failed to fetch scenario")
    }

    async fn get_scenario_by_id(&self, scenario_id: &str) -> Result<Option<Scenario>> {
        self.scenarios()
            .find_one(doc! { "_id": scenario_id })
            .await
            .context("Failed to fetch scenario by id")
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<TaskTemplate>> {
        self.tasks()
            .find_one(doc! { "_id": task_id })
            .await
            .context("Failed to fetch task template by id")
    }

    async fn get_task_by_order(
        &self,
        scenario_id: &str,
        order: u32,
    ) -> Result<Option<TaskTemplate>> {
        self.tasks()
            .find_one(doc! { "scenario_id": scenario_id, "order": order })
            .await
            .context("Failed to fetch task template")
    }

    async fn count_tasks(&self, scenario_id: &str) -> Result<u32> {
        let count = self
            .tasks()
            .count_documents(doc! { "scenario_id": scenario_id })
            .await
            .context("Failed to count task templates")?;
        Ok(count as u32)
    }

    async fn get_report_template(&self, profession_id: &str) -> Result<Option<ReportTemplate>> {
        self.report_templates()
            .find_one(doc! { "profession_id": profession_id })
            .await
            .context("Failed to fetch report template")
    }

    async fn insert_attempt(&self, attempt: &Attempt) -> Result<()> {
        retry_async_with_config(RetryConfig::default(), || async {
            self.attempts()
                .insert_one(attempt)
                .await
                .context("Failed to insert attempt")
        })
        .await?;
        Ok(())
    }

    async fn update_attempt(&self, attempt: &Attempt) -> Result<()> {
        // Full-document replace keeps dialogue history and status in one write.
        retry_async_with_config(RetryConfig::aggressive(), || async {
            self.attempts()
                .replace_one(doc! { "_id": &attempt.id }, attempt)
                .await
                .context("Failed to update attempt")
        })
        .await?;
        Ok(())
    }

    async fn latest_attempt(
        &self,
        user_id: &str,
        profession_id: &str,
    ) -> Result<Option<Attempt>> {
        let options = FindOptions::builder()
            .sort(doc! { "attempt_number": -1 })
            .limit(1)
            .build();
        let mut cursor = self
            .attempts()
            .find(doc! { "user_id": user_id, "profession_id": profession_id })
            .with_options(options)
            .await
            .context("Failed to fetch latest attempt")?;
        cursor
            .try_next()
            .await
            .context("Failed to read attempt cursor")
    }

    async fn get_attempt_by_number(
        &self,
        user_id: &str,
        profession_id: &str,
        attempt_number: u32,
    ) -> Result<Option<Attempt>> {
        self.attempts()
            .find_one(doc! {
                "user_id": user_id,
                "profession_id": profession_id,
                "attempt_number": attempt_number,
            })
            .await
            .context("Failed to fetch attempt by number")
    }

    async fn list_attempts(&self, user_id: &str, profession_id: &str) -> Result<Vec<Attempt>> {
        let options = FindOptions::builder()
            .sort(doc! { "attempt_number": 1 })
            .build();
        let cursor = self
            .attempts()
            .find(doc! { "user_id": user_id, "profession_id": profession_id })
            .with_options(options)
            .await
            .context("Failed to list attempts")?;
        cursor
            .try_collect()
            .await
            .context("Failed to read attempts cursor")
    }

    async fn insert_answered_task(&self, answered: &AnsweredTask) -> Result<()> {
        retry_async_with_config(RetryConfig::aggressive(), || async {
            self.answered()
                .insert_one(answered)
                .await
                .context("Failed to insert answered task")
        })
        .await?;
        Ok(())
    }

    async fn answered_for_attempt(&self, attempt_id: &str) -> Result<Vec<AnsweredTask>> {
        let options = FindOptions::builder()
            .sort(doc! { "task_order": 1 })
            .build();
        let cursor = self
            .answered()
            .find(doc! { "attempt_id": attempt_id })
            .with_options(options)
            .await
            .context("Failed to list answered tasks")?;
        cursor
            .try_collect()
            .await
            .context("Failed to read answered tasks cursor")
    }

    async fn answered_exists(&self, attempt_id: &str, task_id: &str) -> Result<bool> {
        let count = self
            .answered()
            .count_documents(doc! { "attempt_id": attempt_id, "task_id": task_id })
            .await
            .context("Failed to check for an existing answer")?;
        Ok(count > 0)
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        retry_async_with_config(RetryConfig::default(), || async {
            self.payments()
                .insert_one(payment)
                .await
                .context("Failed to insert payment")
        })
        .await?;
        Ok(())
    }

    async fn update_payment(&self, payment: &Payment) -> Result<()> {
        retry_async_with_config(RetryConfig::aggressive(), || async {
            self.payments()
                .replace_one(doc! { "_id": &payment.id }, payment)
                .await
                .context("Failed to update payment")
        })
        .await?;
        Ok(())
    }

    async fn get_payment(&self, payment_id: &str) -> Result<Option<Payment>> {
        self.payments()
            .find_one(doc! { "_id": payment_id })
            .await
            .context("Failed to fetch payment")
    }

    async fn payments_for_user(&self, user_id: &str) -> Result<Vec<Payment>> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": 1 })
            .build();
        let cursor = self
            .payments()
            .find(doc! { "user_id": user_id })
            .with_options(options)
            .await
            .context("Failed to list payments")?;
        cursor
            .try_collect()
            .await
            .context("Failed to read payments cursor")
    }

    async fn list_packages(&self) -> Result<Vec<Package>> {
        let cursor = self
            .packages()
            .find(doc! { "is_active": true })
            .await
            .context("Failed to list packages")?;
        cursor
            .try_collect()
            .await
            .context("Failed to read packages cursor")
    }

    async fn get_package(&self, package_id: &str) -> Result<Option<Package>> {
        self.packages()
            .find_one(doc! { "_id": package_id })
            .await
            .context("Failed to fetch package")
    }

    async fn get_promocode(&self, code: &str) -> Result<Option<Promocode>> {
        self.promocodes()
            .find_one(doc! { "code": code })
            .await
            .context("Failed to fetch promocode")
    }

    async fn increment_promocode_use(&self, code: &str) -> Result<()> {
        self.promocodes()
            .update_one(doc! { "code": code }, doc! { "$inc": { "current_uses": 1 } })
            .await
            .context("Failed to increment promocode use")?;
        Ok(())
    }

    async fn grant_access(&self, user_id: &str, profession_id: &str) -> Result<()> {
        // Upsert so webhook retries stay idempotent.
        let filter = doc! { "user_id": user_id, "profession_id": profession_id };
        self.access_grants()
            .update_one(
                filter,
                doc! { "$set": { "user_id": user_id, "profession_id": profession_id } },
            )
            .upsert(true)
            .await
            .context("Failed to grant access")?;
        Ok(())
    }

    async fn has_access(&self, user_id: &str, profession_id: &str) -> Result<bool> {
        let count = self
            .access_grants()
            .count_documents(doc! { "user_id": user_id, "profession_id": profession_id })
            .await
            .context("Failed to check access")?;
        Ok(count > 0)
    }
}
