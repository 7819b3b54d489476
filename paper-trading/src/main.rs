use std::time::Duration;

use paper_integration::config::CoreConfig;
use paper_trading::System;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Cadence of [`System::run_cycle`] - the composition root's cooperative scheduling boundary that
/// flushes the Tick Bus, scans working orders for fills, and flushes MTM snapshots (§9).
const CYCLE_INTERVAL: Duration = Duration::from_millis(250);

/// Cadence of the SSE heartbeat fan-out (§4.13 "interleaved with `{type:"heartbeat"}` every 20s").
const HEARTBEAT_INTERVAL: Duration = paper_data::subscription::HEARTBEAT_INTERVAL;

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();

    let config = CoreConfig::from_env();

    if let (Some(ws_url), Some(token)) = (
        config.broker_ws_url.clone(),
        config.broker_access_token.clone(),
    ) {
        match ws_url.parse::<url::Url>() {
            Ok(url) => {
                let system_for_feed = System::new(config.clone());
                system_for_feed.spawn_broker_feed(url, token);
                return run(system_for_feed).await;
            }
            Err(err) => {
                tracing::warn!(%err, "BROKER_WS_URL is not a valid URL, starting without a live feed");
            }
        }
    }

    run(System::new(config)).await;
}

async fn run(system: System) {
    tracing::info!("paper trading core started");

    let mut ticker = tokio::time::interval(CYCLE_INTERVAL);
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                system.run_cycle();
            }
            _ = heartbeat.tick() => {
                system.subscriptions.heartbeat_all();
            }
            _ = tokio::signal::ctrl_c() => {
                system.shutdown();
                break;
            }
        }
    }
}
