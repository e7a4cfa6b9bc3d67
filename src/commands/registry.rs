use crate::cli::RegistryArgs;
use biostream::{Error, PortRegistry, Result};
use std::collections::HashMap;

pub async fn execute(host: &str, registry_port: u16, args: RegistryArgs) -> Result<()> {
    let table: HashMap<String, u16> = serde_json::from_str(&args.ports_json)
        .map_err(|e| Error::Resource(format!("bad --ports-json: {e}")))?;

    let registry = PortRegistry::bind(host, registry_port, table).await?;
    registry.serve(super::shutdown_token()).await;
    Ok(())
}
