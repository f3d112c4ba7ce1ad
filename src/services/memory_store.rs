use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::models::{
    AnsweredTask, Attempt, Package, Payment, Profession, Promocode, ReportTemplate, Scenario,
    TaskTemplate,
};
use crate::services::store::ProgressStore;

/// In-memory store used by the test suites and local development. All maps
/// live behind one mutex; nothing awaits while it is held.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    professions: HashMap<String, Profession>,
    scenarios: Vec<Scenario>,
    tasks: Vec<TaskTemplate>,
    report_templates: Vec<ReportTemplate>,
    attempts: HashMap<String, Attempt>,
    answered: Vec<AnsweredTask>,
    payments: HashMap<String, Payment>,
    packages: HashMap<String, Package>,
    promocodes: HashMap<String, Promocode>,
    access: HashSet<(String, String)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_profession(&self, profession: Profession) {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.professions.insert(profession.id.clone(), profession);
    }

    pub fn seed_scenario(&self, scenario: Scenario) {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.scenarios.push(scenario);
    }

    pub fn seed_task(&self, task: TaskTemplate) {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.tasks.push(task);
    }

    pub fn seed_report_template(&self, template: ReportTemplate) {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.report_templates.push(template);
    }

    pub fn seed_package(&self, package: Package) {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.packages.insert(package.id.clone(), package);
    }

    pub fn seed_promocode(&self, promocode: Promocode) {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner
            .promocodes
            .insert(promocode.code.clone(), promocode);
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn list_professions(&self) -> Result<Vec<Profession>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        let mut professions: Vec<_> = inner
            .professions
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect();
        professions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(professions)
    }

    async fn get_profession(&self, profession_id: &str) -> Result<Option<Profession>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.professions.get(profession_id).cloned())
    }

    async fn get_scenario(&self, profession_id: &str) -> Result<Option<Scenario>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner
            .scenarios
            .iter()
            .find(|s| s.profession_id == profession_id)
            .cloned())
    }

    async fn get_scenario_by_id(&self, scenario_id: &str) -> Result<Option<Scenario>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner
            .scenarios
            .iter()
            .find(|s| s.id == scenario_id)
            .cloned())
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<TaskTemplate>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.tasks.iter().find(|t| t.id == task_id).cloned())
    }

    async fn get_task_by_order(
        &self,
        scenario_id: &str,
        order: u32,
    ) -> Result<Option<TaskTemplate>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner
            .tasks
            .iter()
            .find(|t| t.scenario_id == scenario_id && t.order == order)
            .cloned())
    }

    async fn count_tasks(&self, scenario_id: &str) -> Result<u32> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner
            .tasks
            .iter()
            .filter(|t| t.scenario_id == scenario_id)
            .count() as u32)
    }

    async fn get_report_template(&self, profession_id: &str) -> Result<Option<ReportTemplate>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner
            .report_templates
            .iter()
            .find(|t| t.profession_id == profession_id)
            .cloned())
    }

    async fn insert_attempt(&self, attempt: &Attempt) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.attempts.insert(attempt.id.clone(), attempt.clone());
        Ok(())
    }

    async fn update_attempt(&self, attempt: &Attempt) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.attempts.insert(attempt.id.clone(), attempt.clone());
        Ok(())
    }

    async fn latest_attempt(
        &self,
        user_id: &str,
        profession_id: &str,
    ) -> Result<Option<Attempt>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner
            .attempts
            .values()
            .filter(|a| a.user_id == user_id && a.profession_id == profession_id)
            .max_by_key(|a| a.attempt_number)
            .cloned())
    }

    async fn get_attempt_by_number(
        &self,
        user_id: &str,
        profession_id: &str,
        attempt_number: u32,
    ) -> Result<Option<Attempt>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner
            .attempts
            .values()
            .find(|a| {
                a.user_id == user_id
                    && a.profession_id == profession_id
                    && a.attempt_number == attempt_number
            })
            .cloned())
    }

    async fn list_attempts(&self, user_id: &str, profession_id: &str) -> Result<Vec<Attempt>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        let mut attempts: Vec<_> = inner
            .attempts
            .values()
            .filter(|a| a.user_id == user_id && a.profession_id == profession_id)
            .cloned()
            .collect();
        attempts.sort_by_key(|a| a.attempt_number);
        Ok(attempts)
    }

    async fn insert_answered_task(&self, answered: &AnsweredTask) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.answered.push(answered.clone());
        Ok(())
    }

    async fn answered_for_attempt(&self, attempt_id: &str) -> Result<Vec<AnsweredTask>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        let mut answered: Vec<_> = inner
            .answered
            .iter()
            .filter(|a| a.attempt_id == attempt_id)
            .cloned()
            .collect();
        answered.sort_by_key(|a| a.task_order);
        Ok(answered)
    }

    async fn answered_exists(&self, attempt_id: &str, task_id: &str) -> Result<bool> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner
            .answered
            .iter()
            .any(|a| a.attempt_id == attempt_id && a.task_id == task_id))
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.payments.insert(payment.id.clone(), payment.clone());
        Ok(())
    }

    async fn update_payment(&self, payment: &Payment) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.payments.insert(payment.id.clone(), payment.clone());
        Ok(())
    }

    async fn get_payment(&self, payment_id: &str) -> Result<Option<Payment>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.payments.get(payment_id).cloned())
    }

    async fn payments_for_user(&self, user_id: &str) -> Result<Vec<Payment>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        let mut payments: Vec<_> = inner
            .payments
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn list_packages(&self) -> Result<Vec<Package>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        let mut packages: Vec<_> = inner
            .packages
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect();
        packages.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(packages)
    }

    async fn get_package(&self, package_id: &str) -> Result<Option<Package>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.packages.get(package_id).cloned())
    }

    async fn get_promocode(&self, code: &str) -> Result<Option<Promocode>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.promocodes.get(code).cloned())
    }

    async fn increment_promocode_use(&self, code: &str) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        if let Some(promocode) = inner.promocodes.get_mut(code) {
            promocode.current_uses += 1;
        }
        Ok(())
    }

    async fn grant_access(&self, user_id: &str, profession_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner
            .access
            .insert((user_id.to_string(), profession_id.to_string()));
        Ok(())
    }

    async fn has_access(&self, user_id: &str, profession_id: &str) -> Result<bool> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner
            .access
            .contains(&(user_id.to_string(), profession_id.to_string())))
    }
}
