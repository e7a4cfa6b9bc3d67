use crate::cli::LaunchArgs;
use biostream::{
    find_free_ports, is_port_free, Error, Result, FILTERED_STREAM, INFO_STREAM, RAW_STREAM,
};
use std::collections::HashMap;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{info, warn};

/// Stream slots allocated for every session. The last three are served by
/// no node here; they are reserved so anonymous subscriber processes
/// (recorder, classifier) can be pointed at the session later.
const STREAM_SLOTS: [&str; 6] = [
    INFO_STREAM,
    RAW_STREAM,
    FILTERED_STREAM,
    "EventBus",
    "OutputMapper",
    "PercPosX",
];

pub async fn execute(host: &str, registry_port: u16, args: LaunchArgs) -> Result<()> {
    if !is_port_free(host, registry_port) {
        return Err(Error::Resource(format!(
            "registry port {registry_port} is not free; choose another port"
        )));
    }

    let ports = find_free_ports(host, STREAM_SLOTS.len())?;
    let table: HashMap<&str, u16> = STREAM_SLOTS.iter().copied().zip(ports).collect();
    let ports_json = serde_json::to_string(&table)
        .map_err(|e| Error::Resource(format!("cannot serialize port table: {e}")))?;
    info!("session ports: {ports_json}");

    let exe = std::env::current_exe()?;
    let spawn = |node_args: &[&str]| -> Result<Child> {
        let mut command = Command::new(&exe);
        command
            .args(node_args)
            .arg("--host")
            .arg(host)
            .arg("--registry-port")
            .arg(registry_port.to_string());
        let child = command.spawn().map_err(|e| {
            Error::Resource(format!("cannot spawn {} node: {e}", node_args[0]))
        })?;
        info!("started {} node (pid {:?})", node_args[0], child.id());
        Ok(child)
    };

    let mut children = vec![
        spawn(&["registry", "--ports-json", &ports_json])?,
        spawn(&["acquire", "--device", &args.device])?,
        spawn(&["filter"])?,
        spawn(&["view", "--window-secs", &args.window_secs.to_string()])?,
    ];

    info!("session running, press Ctrl-C to stop");
    let _ = tokio::signal::ctrl_c().await;
    info!("stopping session");

    // A terminal Ctrl-C reaches the whole process group; give the nodes a
    // moment to shut down on their own before killing stragglers.
    tokio::time::sleep(Duration::from_millis(500)).await;
    for child in children.iter_mut() {
        match child.try_wait() {
            Ok(Some(_)) => {}
            _ => {
                if let Err(e) = child.kill().await {
                    warn!("could not kill child: {e}");
                }
            }
        }
    }
    Ok(())
}
