//! Paywire load simulator.
//!
//! Posts bursts of random payment webhooks to a running server until
//! CTRL+C/SIGTERM.

use anyhow::{Context, Result};
use paywire::{
    init_tracing,
    loadsim::{send_burst, PaymentGenerator},
    shutdown_signal,
};
use paywire_api::Config;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config.rust_log)?;

    let url = format!("{}/webhooks/payments", config.loadsim_base_url.trim_end_matches('/'));
    let client = reqwest::Client::builder().build().context("Failed to build HTTP client")?;
    let mut generator = PaymentGenerator::new();

    info!(
        url = %url,
        min_burst = paywire::loadsim::MIN_BURST_SIZE,
        max_burst = paywire::loadsim::MAX_BURST_SIZE,
        max_interval_ms = paywire::loadsim::MAX_INTERVAL.as_millis(),
        "load simulator started, send SIGINT/SIGTERM to stop"
    );

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let interval = generator.next_interval();
        if !interval.is_zero() {
            debug!(sleep_ms = interval.as_millis(), "waiting until next burst");
        }

        tokio::select! {
            () = &mut shutdown => break,
            () = tokio::time::sleep(interval) => {},
        }

        let burst = generator.burst();
        let report = tokio::select! {
            () = &mut shutdown => break,
            report = send_burst(&client, &url, burst) => report,
        };

        info!(
            requests = report.sent,
            accepted = report.accepted,
            rejected = report.rejected,
            failed = report.failed,
            elapsed_ms = report.elapsed.as_millis(),
            "burst completed"
        );
    }

    info!("load simulator stopped");
    Ok(())
}
