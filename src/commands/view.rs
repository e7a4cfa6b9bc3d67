use crate::cli::ViewArgs;
use biostream::{Consumer, ConsumerConfig, FilterCommand, Result};
use std::time::Duration;
use tracing::info;

pub async fn execute(host: &str, registry_port: u16, args: ViewArgs) -> Result<()> {
    let cancel = super::shutdown_token();
    let consumer = Consumer::configure(
        ConsumerConfig {
            host: host.to_string(),
            registry_port,
            window_secs: args.window_secs,
            apply_car: args.car,
            filters: FilterCommand {
                high_pass: args.hp,
                low_pass: args.lp,
            },
        },
        cancel.clone(),
    )
    .await?;

    // Stand-in for the rendering collaborator: poll the window handle
    // and report how full it is.
    let view = consumer.view();
    let poll_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(5));
        tick.tick().await; // skip the immediate first tick
        loop {
            tokio::select! {
                biased;
                _ = poll_cancel.cancelled() => break,
                _ = tick.tick() => {
                    info!(
                        "window holds {}/{} samples x {} channels",
                        view.samples_buffered(),
                        view.window_len(),
                        view.info().num_channels()
                    );
                }
            }
        }
    });

    consumer.run().await
}
