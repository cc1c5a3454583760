use anyhow::Result;
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};
use common::AppConfig;
use futures_util::stream::StreamExt;
use messaging::OrderPublisher;
use rand::SeedableRng;
use signal_hook::consts::signal::*;
use signal_hook_tokio::Signals;
use std::time::Duration;
use tracing::{error, info};

mod generator;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    init_telemetry(TelemetryConfig::from_env("order-emulator"))
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    info!("Starting Order Emulator...");
    info!("  Kafka Brokers: {}", config.kafka.brokers);
    info!("  Kafka Topic: {}", config.kafka.topic);
    info!("  Interval: {}ms", config.emulator_interval_ms);

    let publisher = OrderPublisher::new(&config.kafka.brokers, config.kafka.topic.clone())?;

    let mut signals = Signals::new([SIGTERM, SIGINT])?;
    let handle = signals.handle();

    let mut ticker = tokio::time::interval(Duration::from_millis(config.emulator_interval_ms.max(1)));
    let mut rng = rand::rngs::StdRng::from_entropy();
    let mut published = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let order = generator::generate_order(&mut rng);
                match publisher.publish(&order.order_uid, &order).await {
                    Ok((partition, offset)) => {
                        published += 1;
                        info!(
                            "Produced order {} to partition {} at offset {}",
                            order.order_uid, partition, offset
                        );
                    }
                    Err(e) => error!("Failed to produce order {}: {}", order.order_uid, e),
                }
            }
            signal = signals.next() => {
                if let Some(signal) = signal {
                    info!("Received signal {}, stopping...", signal);
                }
                break;
            }
        }
    }

    handle.close();
    if let Err(e) = publisher.flush(Duration::from_secs(5)) {
        error!("Failed to flush pending orders: {}", e);
    }
    info!("Order emulator stopped after publishing {} orders", published);
    shutdown_telemetry();

    Ok(())
}
