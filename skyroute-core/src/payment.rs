use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Success,
    Failed,
    Timeout,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    CreditCard,
    DebitCard,
    Upi,
    NetBanking,
}

impl PaymentType {
    pub const DEFAULT: &'static str = "credit_card";
}

impl FromStr for PaymentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit_card" => Ok(PaymentType::CreditCard),
            "debit_card" => Ok(PaymentType::DebitCard),
            "upi" => Ok(PaymentType::Upi),
            "net_banking" => Ok(PaymentType::NetBanking),
            other => Err(format!("unknown payment type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub booking_id: i64,
    pub amount: f64,
    pub user_id: i64,
    pub payment_type: String,
}

/// What the payment collaborator reports back. Read-only for the booking saga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentOutcome {
    /// Present only when the charge went through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    pub status: PaymentStatus,
    #[serde(default)]
    pub message: String,
    pub booking_id: i64,
    pub amount: f64,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment service unavailable: {0}")]
    Unavailable(String),
    #[error("Malformed payment response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charge `request.amount`. Completes, times out, or fails; never partially.
    async fn process(&self, request: &PaymentRequest) -> Result<PaymentOutcome, PaymentError>;
}
