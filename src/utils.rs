//utils for graceful shutdown that can be used on the
//any module in the project
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let tc = token.clone();
    //spawn once to listen for ctrl-c
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => info!("received ctrl-c, shutting down"),
            Err(e) => error!(error = %e, "failed to install ctrl-c handler"),
        }
        tc.cancel();
    });
    token
}
