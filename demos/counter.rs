use std::env;
use std::time::Duration;

use anyhow::Context;
use log::info;
use tokio::time;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use observe_stream::{ObserveExt, ObservingOptions, Property};

/// Increments a counter every second and follows it with a slow consumer, showing that only
/// the latest value survives while the consumer is busy.  Try
/// `OBSERVE_OPTIONS=initial RUST_LOG=debug cargo run --bin counter`, and Ctrl-C to stop.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let options: ObservingOptions = env::var("OBSERVE_OPTIONS")
        .unwrap_or_default()
        .parse()
        .context("invalid OBSERVE_OPTIONS")?;

    let counter = Property::new(0u32);
    let mut counts = counter.values(&(), options);

    let shutdown = CancellationToken::new();
    let producer_shutdown = shutdown.clone();
    let producer_counter = counter.clone();
    let producer = tokio::spawn(async move {
        let mut ticks = IntervalStream::new(time::interval(Duration::from_secs(1)));
        loop {
            tokio::select! {
                _ = producer_shutdown.cancelled() => return,
                Some(_) = ticks.next() => {
                    let next = producer_counter.get().unwrap_or_default() + 1;
                    producer_counter.set(next);
                }
            }
        }
    });

    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_shutdown.cancel();
        }
    });

    while let Some(count) = counts.next_until(&shutdown).await {
        info!("Counter is now {count:?}");
        // Pretend to be busy; changes made meanwhile are coalesced.
        time::sleep(Duration::from_millis(2500)).await;
    }

    info!("Observation ended");
    shutdown.cancel();
    producer.await.context("producer task failed")?;
    Ok(())
}
