//! Payment collaborators: an in-process simulator and an HTTP client for a
//! remote payment service speaking the same wire shape.

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use skyroute_core::payment::{
    PaymentError, PaymentGateway, PaymentOutcome, PaymentRequest, PaymentStatus, PaymentType,
};

const FAILURE_MESSAGES: [&str; 10] = [
    "Insufficient funds",
    "Card declined",
    "Invalid card number",
    "Expired card",
    "CVV mismatch",
    "Bank declined transaction",
    "Fraud detection alert",
    "Daily limit exceeded",
    "Card blocked",
    "Network error",
];

/// Outcome a simulated charge can be pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForcedOutcome {
    Success,
    Failure,
    Timeout,
}

/// Randomised stand-in for a card processor.
///
/// Each charge takes `processing` plus up to `jitter`, then times out with
/// probability `timeout_rate`, fails with probability `failure_rate`, and
/// succeeds otherwise.
#[derive(Debug, Clone)]
pub struct SimulatedPaymentGateway {
    failure_rate: f64,
    timeout_rate: f64,
    processing: Duration,
    jitter: Duration,
}

impl Default for SimulatedPaymentGateway {
    fn default() -> Self {
        Self {
            failure_rate: 0.15,
            timeout_rate: 0.05,
            processing: Duration::from_secs(2),
            jitter: Duration::from_secs(3),
        }
    }
}

impl SimulatedPaymentGateway {
    pub fn new(failure_rate: f64, timeout_rate: f64, processing: Duration) -> Self {
        Self {
            failure_rate: failure_rate.clamp(0.0, 1.0),
            timeout_rate: timeout_rate.clamp(0.0, 1.0),
            processing,
            ..Default::default()
        }
    }

    /// Instant, always succeeds.
    pub fn always_succeeds() -> Self {
        Self::new(0.0, 0.0, Duration::ZERO).with_jitter(Duration::ZERO)
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Same timing, but every charge ends in `outcome`.
    pub fn forced(&self, outcome: ForcedOutcome) -> Self {
        let (failure_rate, timeout_rate) = match outcome {
            ForcedOutcome::Success => (0.0, 0.0),
            ForcedOutcome::Failure => (1.0, 0.0),
            ForcedOutcome::Timeout => (0.0, 1.0),
        };
        Self {
            failure_rate,
            timeout_rate,
            ..self.clone()
        }
    }

    fn outcome(request: &PaymentRequest, status: PaymentStatus, message: &str) -> PaymentOutcome {
        PaymentOutcome {
            payment_id: (status == PaymentStatus::Success).then(|| Uuid::new_v4().to_string()),
            status,
            message: message.to_string(),
            booking_id: request.booking_id,
            amount: request.amount,
            processed_at: Utc::now(),
        }
    }
}

#[async_trait]
impl PaymentGateway for SimulatedPaymentGateway {
    async fn process(&self, request: &PaymentRequest) -> Result<PaymentOutcome, PaymentError> {
        info!(booking_id = request.booking_id, amount = request.amount, "Processing payment");

        if request.payment_type.parse::<PaymentType>().is_err() {
            return Ok(Self::outcome(request, PaymentStatus::Failed, "Invalid payment type"));
        }

        // ThreadRng is not Send; draw everything before suspending.
        let (delay, roll, failure) = {
            let mut rng = rand::thread_rng();
            let jitter_ms = self.jitter.as_millis() as u64;
            let extra = if jitter_ms == 0 { 0 } else { rng.gen_range(0..jitter_ms) };
            (
                self.processing + Duration::from_millis(extra),
                rng.gen::<f64>(),
                FAILURE_MESSAGES[rng.gen_range(0..FAILURE_MESSAGES.len())],
            )
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let outcome = if roll < self.timeout_rate {
            Self::outcome(request, PaymentStatus::Timeout, "Payment gateway timeout")
        } else if roll < self.timeout_rate + self.failure_rate {
            Self::outcome(request, PaymentStatus::Failed, failure)
        } else {
            Self::outcome(request, PaymentStatus::Success, "Payment processed successfully")
        };

        info!(
            booking_id = request.booking_id,
            status = ?outcome.status,
            message = %outcome.message,
            "Payment processed"
        );
        Ok(outcome)
    }
}

/// Client for a payment service exposing `POST /api/payments/process`.
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpPaymentGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PaymentError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentError::Unavailable(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn process(&self, request: &PaymentRequest) -> Result<PaymentOutcome, PaymentError> {
        let url = format!("{}/api/payments/process", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| PaymentError::Unavailable(e.to_string()))?;

        // Declines come back as 400 and gateway timeouts as 408, both with an outcome body.
        let status = response.status();
        let declined = status == StatusCode::BAD_REQUEST || status == StatusCode::REQUEST_TIMEOUT;
        if !status.is_success() && !declined {
            return Err(PaymentError::Unavailable(format!(
                "payment service responded with {}",
                status
            )));
        }

        let mut outcome: PaymentOutcome = response.json().await.map_err(|e| {
            if declined {
                PaymentError::Unavailable(format!("payment service responded with {}: {}", status, e))
            } else {
                PaymentError::Malformed(e.to_string())
            }
        })?;

        // Remote services send "" rather than omitting the id.
        outcome.payment_id = outcome.payment_id.filter(|id| !id.is_empty());
        Ok(outcome)
    }
}
