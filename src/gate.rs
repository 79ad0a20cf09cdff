use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::retry::retry_until;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Reached,
    TimedOut,
}

/// Single plain connection probe; the connect is bounded by `timeout`.
pub async fn probe(host: &str, port: u16, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_stream)) => true,
        Ok(Err(e)) => {
            debug!(host, port, error = %e, "Connection probe failed.");
            false
        }
        Err(_) => {
            debug!(host, port, "Connection probe timed out.");
            false
        }
    }
}

/// Waits until `host:port` accepts TCP connections, polling at a constant
/// `interval` for at most `max_attempts` probes.
pub async fn await_reachable(
    host: &str,
    port: u16,
    interval: Duration,
    max_attempts: u32,
) -> Reachability {
    info!(host, port, "Waiting while the server becomes reachable.");
    let reached = retry_until("connection gate", interval, max_attempts, |attempt| async move {
        debug!(attempt, max_attempts, host, port, "Probing server port.");
        probe(host, port, interval).await
    })
    .await;

    if reached {
        debug!(host, port, "Server is reachable.");
        Reachability::Reached
    } else {
        Reachability::TimedOut
    }
}
