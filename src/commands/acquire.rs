use crate::cli::AcquireArgs;
use biostream::{parse_device, Producer, ProducerConfig, Result};

pub async fn execute(host: &str, registry_port: u16, args: AcquireArgs) -> Result<()> {
    let source = parse_device(&args.device, args.rate, args.chunk_size)?;
    let cancel = super::shutdown_token();
    let producer = Producer::configure(
        ProducerConfig {
            host: host.to_string(),
            registry_port,
            source,
        },
        cancel.clone(),
    )
    .await?;
    producer.run().await
}
