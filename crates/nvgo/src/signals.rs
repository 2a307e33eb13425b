//! Interrupt and terminate handling.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Signals after which the process exits without cleaning up.
const FORCE_EXIT_AFTER: u32 = 3;

/// What to do about a received signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// Start a graceful shutdown.
    Shutdown,
    /// Shutdown already in progress.
    Ignore,
    ForceExit,
}

#[derive(Debug, Default)]
pub struct SignalCounter {
    received: u32,
}

impl SignalCounter {
    pub fn record(&mut self) -> SignalAction {
        self.received += 1;
        match self.received {
            1 => SignalAction::Shutdown,
            n if n >= FORCE_EXIT_AFTER => SignalAction::ForceExit,
            _ => SignalAction::Ignore,
        }
    }
}

#[cfg(unix)]
async fn next_signal(terminate: &mut tokio::signal::unix::Signal) -> &'static str {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => "interrupt",
        _ = terminate.recv() => "terminate",
    }
}

/// Cancel `shutdown` on the first signal and exit on the third.
pub async fn watch(shutdown: CancellationToken) {
    let mut counter = SignalCounter::default();

    #[cfg(unix)]
    let mut terminate = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(signal) => signal,
        Err(e) => {
            warn!(error = %e, "Failed to install terminate handler");
            return;
        }
    };

    loop {
        #[cfg(unix)]
        let name = next_signal(&mut terminate).await;
        #[cfg(not(unix))]
        let name = match tokio::signal::ctrl_c().await {
            Ok(()) => "interrupt",
            Err(e) => {
                warn!(error = %e, "Failed to listen for interrupt");
                return;
            }
        };

        match counter.record() {
            SignalAction::Shutdown => {
                info!(signal = name, "Shutting down");
                shutdown.cancel();
            }
            SignalAction::Ignore => info!(signal = name, "Shutdown in progress"),
            SignalAction::ForceExit => {
                warn!(signal = name, "Forced exit");
                std::process::exit(130);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_third_signal_forces_exit() {
        let mut counter = SignalCounter::default();
        assert_eq!(counter.record(), SignalAction::Shutdown);
        assert_eq!(counter.record(), SignalAction::Ignore);
        assert_eq!(counter.record(), SignalAction::ForceExit);
        assert_eq!(counter.record(), SignalAction::ForceExit);
    }
}
