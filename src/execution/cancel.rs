//! Interrupt wiring for cancellation tokens

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Fire `token` when the process receives Ctrl-C.
///
/// The watcher exits quietly if the token is cancelled first.
pub fn cancel_on_ctrl_c(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => {
                    info!("Interrupt received, cancelling running query");
                    token.cancel();
                }
                Err(e) => warn!("Unable to listen for interrupt: {}", e),
            },
        }
    })
}
