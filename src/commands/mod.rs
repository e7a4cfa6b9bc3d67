pub mod acquire;
pub mod filter;
pub mod launch;
pub mod registry;
pub mod view;

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancellation token cancelled on the first Ctrl-C.
pub fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("stop signal received");
            trigger.cancel();
        }
    });
    cancel
}
