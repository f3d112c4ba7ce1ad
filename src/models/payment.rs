use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub amount: f64,
    pub package_id: Option<String>,
    pub profession_id: Option<String>,
    pub promocode: Option<String>,
    pub discount_amount: f64,
    pub status: PaymentStatus,
    /// Charge id at the payment provider.
    pub charge_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn new(
        user_id: &str,
        amount: f64,
        package_id: Option<String>,
        profession_id: Option<String>,
        promocode: Option<String>,
        discount_amount: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            amount,
            package_id,
            profession_id,
            promocode,
            discount_amount,
            status: PaymentStatus::Pending,
            charge_id: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub description: String,
    pub profession_ids: Vec<String>,
    pub price: f64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Promocode {
    #[serde(rename = "_id")]
    pub id: String,
    pub code: String,
    pub discount_percent: u32,
    pub discount_amount: f64,
    pub max_uses: Option<u32>,
    pub current_uses: u32,
    pub is_active: bool,
    pub valid_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentRequest {
    pub package_id: Option<String>,
    pub profession_id: Option<String>,
    pub promocode: Option<String>,
}
