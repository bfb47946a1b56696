//! Signal handling for configuration reload and shutdown.
//!
//! SIGHUP reloads the configuration file; SIGTERM and SIGINT cancel the
//! renewal loop so in-flight capability calls stop promptly.

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use autossl_config::ConfigStore;

/// Signal type observed by the renewer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalType {
    /// Reload configuration (SIGHUP)
    Reload,
    /// Graceful shutdown (SIGTERM/SIGINT)
    Shutdown,
}

/// Maps OS signals onto the config store and a shutdown token.
pub struct SignalManager {
    store: Arc<ConfigStore>,
    shutdown: CancellationToken,
}

impl SignalManager {
    pub fn new(store: Arc<ConfigStore>, shutdown: CancellationToken) -> Self {
        debug!("Creating signal manager");
        Self { store, shutdown }
    }

    /// Apply one signal.
    pub fn handle(&self, signal: SignalType) {
        match signal {
            SignalType::Reload => {
                info!("Received SIGHUP, reloading configuration");
                // The store logs failures and keeps the previous config.
                if let Err(e) = self.store.reload() {
                    debug!(error = %e, "Keeping previous configuration");
                }
            }
            SignalType::Shutdown => {
                info!("Received shutdown signal, stopping renewal loop");
                self.shutdown.cancel();
            }
        }
    }

    /// Install the handlers and process signals until shutdown.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        let mut hangup = signal(SignalKind::hangup())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let mut interrupt = signal(SignalKind::interrupt())?;

        Ok(tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    Some(()) = hangup.recv() => SignalType::Reload,
                    Some(()) = terminate.recv() => SignalType::Shutdown,
                    Some(()) = interrupt.recv() => SignalType::Shutdown,
                    else => {
                        warn!("Signal streams closed");
                        break;
                    }
                };
                debug!(signal = ?received, "Received signal");
                self.handle(received);
            }
        }))
    }
}

impl std::fmt::Debug for SignalManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalManager")
            .field("config_path", &self.store.path())
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish()
    }
}
