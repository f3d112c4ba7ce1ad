#![allow(dead_code)]

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;

use profsim_api::config::Config;
use profsim_api::middlewares::auth::{JwtClaims, JwtService};
use profsim_api::models::{
    Profession, ReportTemplate, Scenario, TaskStreamEvent, TaskTemplate,
};
use profsim_api::services::ai_client::{AiClient, ScriptedAiClient};
use profsim_api::services::locks::AttemptLocks;
use profsim_api::services::memory_store::MemoryStore;
use profsim_api::services::payment_service::{Charge, PaymentGateway};
use profsim_api::services::progression::ProgressionEngine;
use profsim_api::services::store::ProgressStore;
use profsim_api::services::AppState;

pub const PROFESSION: &str = "analyst";
pub const USER: &str = "user-1";
pub const MAX_ATTEMPTS: u32 = 3;
pub const TEST_SECRET: &str = "test-secret";

/// One free profession with `task_count` ordered tasks and a report template.
pub fn seed_catalog(store: &MemoryStore, task_count: u32) {
    store.seed_profession(Profession {
        id: PROFESSION.to_string(),
        name: "Data Analyst".to_string(),
        description: "A day in the life of a data analyst".to_string(),
        category: Some("analytics".to_string()),
        language: Some("en".to_string()),
        price: 0.0,
        is_active: true,
        created_at: Utc::now(),
    });
    store.seed_scenario(Scenario {
        id: "s1".to_string(),
        profession_id: PROFESSION.to_string(),
        system_prompt: "You are the trainee's team lead at a product company.".to_string(),
    });
    for order in 1..=task_count {
        store.seed_task(TaskTemplate {
            id: format!("t{}", order),
            scenario_id: "s1".to_string(),
            order,
            category: "analysis".to_string(),
            time_limit_minutes: 15,
            description_template: format!("Task {} description", order),
        });
    }
    store.seed_report_template(ReportTemplate {
        id: "rt1".to_string(),
        profession_id: PROFESSION.to_string(),
        template_text: "Review the trainee's day and write a report.".to_string(),
    });
}

pub fn engine(store: Arc<MemoryStore>, ai: Arc<ScriptedAiClient>) -> ProgressionEngine {
    ProgressionEngine::new(store, ai, AttemptLocks::local(), MAX_ATTEMPTS)
}

/// Collect every event of one stream.
pub async fn drain(mut rx: mpsc::Receiver<TaskStreamEvent>) -> Vec<TaskStreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

/// Reassemble the streamed token text of one response.
pub fn token_text(events: &[TaskStreamEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            TaskStreamEvent::Token { token } | TaskStreamEvent::ReportToken { token } => {
                Some(token.as_str())
            }
            _ => None,
        })
        .collect()
}

pub fn auth_token(user_id: &str) -> String {
    let now = Utc::now().timestamp();
    let claims = JwtClaims {
        sub: user_id.to_string(),
        exp: (now + 3600) as usize,
        iat: now as usize,
    };
    JwtService::new(TEST_SECRET)
        .issue(&claims)
        .expect("failed to sign test token")
}

pub fn test_config() -> Config {
    Config {
        mongo_uri: "mongodb://localhost:27017/test".to_string(),
        mongo_database: "test".to_string(),
        redis_uri: "redis://127.0.0.1:6379/0".to_string(),
        jwt_secret: TEST_SECRET.to_string(),
        ai_base_url: "http://localhost:0".to_string(),
        ai_api_key: String::new(),
        ai_model: "test-model".to_string(),
        ai_timeout_seconds: 5,
        app_url: "http://localhost:3000".to_string(),
        payment_shop_id: None,
        payment_secret_key: None,
        max_profession_attempts: MAX_ATTEMPTS,
    }
}

pub fn test_state(
    store: Arc<MemoryStore>,
    ai: Arc<ScriptedAiClient>,
    gateway: Option<Arc<dyn PaymentGateway>>,
) -> Arc<AppState> {
    let store: Arc<dyn ProgressStore> = store;
    let ai: Arc<dyn AiClient> = ai;
    Arc::new(AppState {
        config: Arc::new(test_config()),
        mongo: None,
        redis: None,
        store,
        ai,
        locks: AttemptLocks::local(),
        gateway,
    })
}

/// Gateway double: every charge succeeds immediately.
pub struct StubGateway;

#[async_trait::async_trait]
impl PaymentGateway for StubGateway {
    async fn create_charge(
        &self,
        payment_id: &str,
        _amount: f64,
        _description: &str,
        _return_url: &str,
    ) -> anyhow::Result<Charge> {
        Ok(Charge {
            id: format!("charge-{}", payment_id),
            status: "pending".to_string(),
            confirmation_url: Some("https://pay.example/confirm".to_string()),
        })
    }

    async fn fetch_charge(&self, charge_id: &str) -> anyhow::Result<Charge> {
        Ok(Charge {
            id: charge_id.to_string(),
            status: "succeeded".to_string(),
            confirmation_url: None,
        })
    }
}
