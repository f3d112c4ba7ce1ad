pub mod ai_client;
pub mod attempt_service;
pub mod conversation;
pub mod locks;
pub mod memory_store;
pub mod mongo_store;
pub mod payment_service;
pub mod progression;
pub mod report;
pub mod store;

use mongodb::Database;
use redis::aio::ConnectionManager;
use std::sync::Arc;

use crate::config::Config;
use crate::error::EngineError;
use crate::services::ai_client::AiClient;
use crate::services::attempt_service::AttemptService;
use crate::services::locks::AttemptLocks;
use crate::services::payment_service::{PaymentGateway, PaymentService};
use crate::services::progression::ProgressionEngine;
use crate::services::store::ProgressStore;

/// Shared handles behind every handler. Services are cheap facades built
/// per request from these.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Raw handles kept for the health endpoint; `None` under the
    /// in-memory setup.
    pub mongo: Option<Database>,
    pub redis: Option<ConnectionManager>,
    pub store: Arc<dyn ProgressStore>,
    pub ai: Arc<dyn AiClient>,
    pub locks: AttemptLocks,
    pub gateway: Option<Arc<dyn PaymentGateway>>,
}

impl AppState {
    pub fn engine(&self) -> ProgressionEngine {
        ProgressionEngine::new(
            self.store.clone(),
            self.ai.clone(),
            self.locks.clone(),
            self.config.max_profession_attempts,
        )
    }

    pub fn attempt_service(&self) -> AttemptService {
        AttemptService::new(self.store.clone(), self.config.max_profession_attempts)
    }

    pub fn payment_service(&self) -> Result<PaymentService, EngineError> {
        let gateway = self
            .gateway
            .clone()
            .ok_or(EngineError::Invalid("payments are not configured"))?;
        Ok(PaymentService::new(
            self.store.clone(),
            gateway,
            &self.config.app_url,
        ))
    }
}
