use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profession {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: Option<String>,
    pub language: Option<String>,
    pub price: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// One scenario per profession: a fixed system prompt and an ordered set of
/// task templates. Never mutated by the progression core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(rename = "_id")]
    pub id: String,
    pub profession_id: String,
    pub system_prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTemplate {
    #[serde(rename = "_id")]
    pub id: String,
    pub scenario_id: String,
    /// 1-based, strictly increasing, no gaps within a scenario.
    pub order: u32,
    /// prioritization, conflict, deadline, risk, communication
    pub category: String,
    pub time_limit_minutes: u32,
    pub description_template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportTemplate {
    #[serde(rename = "_id")]
    pub id: String,
    pub profession_id: String,
    pub template_text: String,
}
