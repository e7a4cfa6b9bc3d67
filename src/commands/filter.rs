use biostream::{Result, Transform, TransformConfig};

pub async fn execute(host: &str, registry_port: u16) -> Result<()> {
    let cancel = super::shutdown_token();
    let transform = Transform::configure(
        TransformConfig {
            host: host.to_string(),
            registry_port,
        },
        cancel.clone(),
    )
    .await?;
    transform.run().await
}
