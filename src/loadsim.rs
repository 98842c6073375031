//! Random payment webhook traffic for exercising a running server.
//!
//! Bursts of `MIN_BURST_SIZE..=MAX_BURST_SIZE` webhooks are sent
//! concurrently, separated by a random pause below `MAX_INTERVAL`.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use paywire_api::handlers::ingest::PaymentWebhookRequest;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::{task::JoinSet, time::Instant};
use tracing::debug;

/// Smallest burst.
pub const MIN_BURST_SIZE: usize = 500;

/// Largest burst.
pub const MAX_BURST_SIZE: usize = 1000;

/// Upper bound (exclusive) of the pause between bursts.
pub const MAX_INTERVAL: Duration = Duration::from_millis(MAX_INTERVAL_MS);

const MAX_INTERVAL_MS: u64 = 10_000;

/// Event types the simulator picks from.
pub const EVENT_TYPES: [&str; 4] =
    ["payment.completed", "payment.pending", "payment.failed", "payment.refunded"];

/// Currencies the simulator picks from.
pub const CURRENCIES: [&str; 4] = ["NGN", "USD", "GBP", "EUR"];

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// One webhook ready to send.
#[derive(Debug, Clone)]
pub struct SimulatedWebhook {
    /// Request body.
    pub request: PaymentWebhookRequest,
    /// Value of the `X-Webhook-Signature` header. Random, never verified.
    pub signature: String,
}

/// Source of random webhooks, burst sizes and pauses.
pub struct PaymentGenerator {
    rng: StdRng,
}

impl PaymentGenerator {
    /// Generator seeded from the thread-local RNG.
    pub fn new() -> Self {
        Self { rng: StdRng::from_rng(&mut rand::rng()) }
    }

    /// Deterministic generator.
    pub fn seeded(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    /// Pause before the next burst.
    pub fn next_interval(&mut self) -> Duration {
        Duration::from_millis(self.rng.random_range(0..MAX_INTERVAL_MS))
    }

    /// Number of webhooks in the next burst.
    pub fn burst_size(&mut self) -> usize {
        self.rng.random_range(MIN_BURST_SIZE..=MAX_BURST_SIZE)
    }

    /// A full burst of random webhooks.
    pub fn burst(&mut self) -> Vec<SimulatedWebhook> {
        let size = self.burst_size();
        (0..size).map(|_| self.webhook()).collect()
    }

    /// One random webhook with its signature header.
    pub fn webhook(&mut self) -> SimulatedWebhook {
        SimulatedWebhook { request: self.payment(), signature: self.hex(32) }
    }

    /// A random, valid payment webhook body.
    ///
    /// `occurred_at` lies within the last hour.
    pub fn payment(&mut self) -> PaymentWebhookRequest {
        let amount = 100 + self.rng.random_range(0..1_000_000u32);
        let age = chrono::Duration::seconds(self.rng.random_range(0..3600));

        PaymentWebhookRequest {
            event_id: format!("evt_{}", self.hex(12)),
            event_type: EVENT_TYPES[self.rng.random_range(0..EVENT_TYPES.len())].to_string(),
            amount: amount.to_string(),
            currency: CURRENCIES[self.rng.random_range(0..CURRENCIES.len())].to_string(),
            occurred_at: Some(Utc::now() - age),
        }
    }

    fn hex(&mut self, len: usize) -> String {
        (0..len).map(|_| char::from(HEX_DIGITS[self.rng.random_range(0..HEX_DIGITS.len())])).collect()
    }
}

impl Default for PaymentGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome counts of one burst.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BurstReport {
    /// Webhooks sent.
    pub sent: usize,
    /// Answered with 200.
    pub accepted: usize,
    /// Answered with any other status.
    pub rejected: usize,
    /// Never answered (connection or task failure).
    pub failed: usize,
    /// Wall time from first send to last answer.
    pub elapsed: Duration,
}

enum Outcome {
    Accepted,
    Rejected,
    Failed,
}

/// Sends every webhook in `burst` to `url` concurrently and waits for all
/// answers.
pub async fn send_burst(
    client: &reqwest::Client,
    url: &str,
    burst: Vec<SimulatedWebhook>,
) -> BurstReport {
    let url: Arc<str> = Arc::from(url);
    let started = Instant::now();
    let mut report = BurstReport { sent: burst.len(), ..BurstReport::default() };

    let mut requests = JoinSet::new();
    for webhook in burst {
        let client = client.clone();
        let url = url.clone();
        requests.spawn(async move { send_one(&client, &url, webhook).await });
    }

    while let Some(joined) = requests.join_next().await {
        match joined {
            Ok(Outcome::Accepted) => report.accepted += 1,
            Ok(Outcome::Rejected) => report.rejected += 1,
            Ok(Outcome::Failed) | Err(_) => report.failed += 1,
        }
    }

    report.elapsed = started.elapsed();
    report
}

async fn send_one(client: &reqwest::Client, url: &str, webhook: SimulatedWebhook) -> Outcome {
    let response = match client
        .post(url)
        .header("X-Webhook-Signature", &webhook.signature)
        .json(&webhook.request)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            debug!(error = %e, event_id = %webhook.request.event_id, "webhook request failed");
            return Outcome::Failed;
        },
    };

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), response = %body, "webhook response");

    if status == reqwest::StatusCode::OK {
        Outcome::Accepted
    } else {
        Outcome::Rejected
    }
}
