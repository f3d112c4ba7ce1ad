use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{
    Attempt, AttemptStatus, CreatePaymentRequest, Payment, PaymentStatus, Promocode,
};
use crate::services::store::ProgressStore;

const YOOKASSA_API: &str = "https://api.yookassa.ru/v3";

#[derive(Debug, Clone, Deserialize)]
pub struct Charge {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub confirmation_url: Option<String>,
}

/// Payment provider seam. The production implementation talks to YooKassa;
/// tests substitute a scripted gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_charge(
        &self,
        payment_id: &str,
        amount: f64,
        description: &str,
        return_url: &str,
    ) -> Result<Charge>;

    async fn fetch_charge(&self, charge_id: &str) -> Result<Charge>;
}

pub struct YookassaGateway {
    http: reqwest::Client,
    shop_id: String,
    secret_key: String,
}

#[derive(Deserialize)]
struct YookassaPayment {
    id: String,
    status: String,
    confirmation: Option<YookassaConfirmation>,
}

#[derive(Deserialize)]
struct YookassaConfirmation {
    confirmation_url: Option<String>,
}

#[derive(Serialize)]
struct YookassaAmount {
    value: String,
    currency: &'static str,
}

impl YookassaGateway {
    pub fn new(shop_id: &str, secret_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            shop_id: shop_id.to_string(),
            secret_key: secret_key.to_string(),
        }
    }

    fn auth_header(&self) -> String {
        let raw = format!("{}:{}", self.shop_id, self.secret_key);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(raw)
        )
    }
}

impl From<YookassaPayment> for Charge {
    fn from(payment: YookassaPayment) -> Self {
        Charge {
            id: payment.id,
            status: payment.status,
            confirmation_url: payment.confirmation.and_then(|c| c.confirmation_url),
        }
    }
}

#[async_trait]
impl PaymentGateway for YookassaGateway {
    async fn create_charge(
        &self,
        payment_id: &str,
        amount: f64,
        description: &str,
        return_url: &str,
    ) -> Result<Charge> {
        let body = serde_json::json!({
            "amount": YookassaAmount {
                value: format!("{:.2}", amount),
                currency: "RUB",
            },
            "capture": true,
            "confirmation": {
                "type": "redirect",
                "return_url": return_url,
            },
            "description": description,
            "metadata": { "payment_id": payment_id },
        });

        let response = self
            .http
            .post(format!("{}/payments", YOOKASSA_API))
            .header("Authorization", self.auth_header())
            .header("Idempotence-Key", Uuid::new_v4().to_string())
            .json(&body)
            .send()
            .await
            .context("Failed to reach the payment provider")?
            .error_for_status()
            .context("Payment provider rejected the charge")?;

        let payment: YookassaPayment = response
            .json()
            .await
            .context("Malformed payment provider response")?;
        Ok(payment.into())
    }

    async fn fetch_charge(&self, charge_id: &str) -> Result<Charge> {
        let response = self
            .http
            .get(format!("{}/payments/{}", YOOKASSA_API, charge_id))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .context("Failed to reach the payment provider")?
            .error_for_status()
            .context("Payment provider rejected the status check")?;

        let payment: YookassaPayment = response
            .json()
            .await
            .context("Malformed payment provider response")?;
        Ok(payment.into())
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedPayment {
    pub payment_id: String,
    pub amount: f64,
    pub confirmation_url: Option<String>,
}

/// Webhook body subset we act on. YooKassa echoes our payment id back in
/// the metadata we attached at charge creation.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub object: WebhookObject,
}

#[derive(Debug, Deserialize)]
pub struct WebhookObject {
    pub id: String,
    #[serde(default)]
    pub metadata: Option<WebhookMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookMetadata {
    #[serde(default)]
    pub payment_id: Option<String>,
}

/// Percent discount wins when set; otherwise a fixed amount, capped at the
/// price itself.
pub fn calculate_discount(price: f64, promocode: &Promocode) -> f64 {
    if promocode.discount_percent > 0 {
        price * f64::from(promocode.discount_percent) / 100.0
    } else {
        promocode.discount_amount.min(price)
    }
}

pub struct PaymentService {
    store: Arc<dyn ProgressStore>,
    gateway: Arc<dyn PaymentGateway>,
    app_url: String,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn ProgressStore>,
        gateway: Arc<dyn PaymentGateway>,
        app_url: &str,
    ) -> Self {
        Self {
            store,
            gateway,
            app_url: app_url.to_string(),
        }
    }

    async fn resolve_promocode(&self, code: &str) -> Result<Promocode, EngineError> {
        let promocode = self
            .store
            .get_promocode(code)
            .await
            .map_err(EngineError::persistence)?
            .ok_or(EngineError::NotFound("promocode"))?;
        if !promocode.is_active {
            return Err(EngineError::Invalid("promocode is no longer active"));
        }
        if let Some(valid_until) = promocode.valid_until {
            if valid_until < Utc::now() {
                return Err(EngineError::Invalid("promocode has expired"));
            }
        }
        if let Some(max_uses) = promocode.max_uses {
            if promocode.current_uses >= max_uses {
                return Err(EngineError::Invalid("promocode is used up"));
            }
        }
        Ok(promocode)
    }

    pub async fn create_payment(
        &self,
        user_id: &str,
        req: &CreatePaymentRequest,
    ) -> Result<CreatedPayment, EngineError> {
        let (price, description) = match (&req.package_id, &req.profession_id) {
            (Some(package_id), _) => {
                let package = self
                    .store
                    .get_package(package_id)
                    .await
                    .map_err(EngineError::persistence)?
                    .filter(|p| p.is_active)
                    .ok_or(EngineError::NotFound("package"))?;
                (package.price, format!("Package: {}", package.name))
            }
            (None, Some(profession_id)) => {
                let profession = self
                    .store
                    .get_profession(profession_id)
                    .await
                    .map_err(EngineError::persistence)?
                    .filter(|p| p.is_active)
                    .ok_or(EngineError::NotFound("profession"))?;
                (profession.price, format!("Profession: {}", profession.name))
            }
            (None, None) => {
                return Err(EngineError::Invalid(
                    "either package_id or profession_id is required",
                ))
            }
        };

        let discount = match &req.promocode {
            Some(code) => {
                let promocode = self.resolve_promocode(code).await?;
                calculate_discount(price, &promocode)
            }
            None => 0.0,
        };
        let amount = (price - discount).max(0.0);

        let mut payment = Payment::new(
            user_id,
            amount,
            req.package_id.clone(),
            req.profession_id.clone(),
            req.promocode.clone(),
            discount,
        );
        self.store
            .insert_payment(&payment)
            .await
            .map_err(EngineError::persistence)?;

        let return_url = format!("{}/payments/result", self.app_url);
        let charge = self
            .gateway
            .create_charge(&payment.id, amount, &description, &return_url)
            .await
            .map_err(EngineError::persistence)?;

        payment.charge_id = Some(charge.id);
        self.store
            .update_payment(&payment)
            .await
            .map_err(EngineError::persistence)?;

        tracing::info!(
            user_id = %user_id,
            payment_id = %payment.id,
            amount,
            "Created payment"
        );
        Ok(CreatedPayment {
            payment_id: payment.id,
            amount,
            confirmation_url: charge.confirmation_url,
        })
    }

    /// Mark a payment completed and open up what it bought. Safe to call
    /// more than once: an already completed payment is a no-op.
    pub async fn settle(&self, payment_id: &str) -> Result<Payment, EngineError> {
        let mut payment = self
            .store
            .get_payment(payment_id)
            .await
            .map_err(EngineError::persistence)?
            .ok_or(EngineError::NotFound("payment"))?;

        if payment.status == PaymentStatus::Completed {
            return Ok(payment);
        }

        payment.status = PaymentStatus::Completed;
        payment.completed_at = Some(Utc::now());
        self.store
            .update_payment(&payment)
            .await
            .map_err(EngineError::persistence)?;

        if let Some(code) = &payment.promocode {
            self.store
                .increment_promocode_use(code)
                .await
                .map_err(EngineError::persistence)?;
        }

        let mut profession_ids = Vec::new();
        if let Some(profession_id) = &payment.profession_id {
            profession_ids.push(profession_id.clone());
        }
        if let Some(package_id) = &payment.package_id {
            if let Some(package) = self
                .store
                .get_package(package_id)
                .await
                .map_err(EngineError::persistence)?
            {
                profession_ids.extend(package.profession_ids);
            }
        }
        for profession_id in profession_ids {
            self.store
                .grant_access(&payment.user_id, &profession_id)
                .await
                .map_err(EngineError::persistence)?;

            // First purchase of a profession opens attempt #1 right away.
            let existing = self
                .store
                .latest_attempt(&payment.user_id, &profession_id)
                .await
                .map_err(EngineError::persistence)?;
            if existing.is_none() {
                let attempt = Attempt::new(
                    &payment.user_id,
                    &profession_id,
                    1,
                    AttemptStatus::NotStarted,
                );
                self.store
                    .insert_attempt(&attempt)
                    .await
                    .map_err(EngineError::persistence)?;
            }
        }

        tracing::info!(payment_id = %payment.id, "Payment settled");
        Ok(payment)
    }

    /// Poll the provider for a pending payment and settle on success.
    pub async fn confirm(&self, payment_id: &str) -> Result<Payment, EngineError> {
        let payment = self
            .store
            .get_payment(payment_id)
            .await
            .map_err(EngineError::persistence)?
            .ok_or(EngineError::NotFound("payment"))?;

        if payment.status == PaymentStatus::Completed {
            return Ok(payment);
        }
        let charge_id = payment
            .charge_id
            .as_deref()
            .ok_or(EngineError::Invalid("payment has no charge yet"))?;
        let charge = self
            .gateway
            .fetch_charge(charge_id)
            .await
            .map_err(EngineError::persistence)?;

        if charge.status == "succeeded" {
            self.settle(payment_id).await
        } else {
            Ok(payment)
        }
    }

    pub async fn handle_webhook(&self, event: &WebhookEvent) -> Result<(), EngineError> {
        if event.event != "payment.succeeded" {
            tracing::debug!(event = %event.event, "Ignoring webhook event");
            return Ok(());
        }
        let payment_id = event
            .object
            .metadata
            .as_ref()
            .and_then(|m| m.payment_id.as_deref())
            .ok_or(EngineError::Invalid("webhook without payment metadata"))?;
        self.settle(payment_id).await?;
        Ok(())
    }

    pub async fn history(&self, user_id: &str) -> Result<Vec<Payment>, EngineError> {
        self.store
            .payments_for_user(user_id)
            .await
            .map_err(EngineError::persistence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn promocode(percent: u32, amount: f64) -> Promocode {
        Promocode {
            id: "pc1".to_string(),
            code: "WELCOME".to_string(),
            discount_percent: percent,
            discount_amount: amount,
            max_uses: None,
            current_uses: 0,
            is_active: true,
            valid_until: None,
        }
    }

    #[test]
    fn percent_discount_takes_priority() {
        let discount = calculate_discount(1000.0, &promocode(25, 500.0));
        assert_eq!(discount, 250.0);
    }

    #[test]
    fn fixed_discount_is_capped_at_price() {
        let discount = calculate_discount(300.0, &promocode(0, 500.0));
        assert_eq!(discount, 300.0);
    }
}
