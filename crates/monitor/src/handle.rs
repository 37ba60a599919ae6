use crate::commands::{MonitorCommand, MonitorStats};
use crate::events::MonitorEvent;
use anyhow::Result;
use tokio::sync::{broadcast, mpsc, oneshot};
use trade_relay_core::signal::Signal;
use trade_relay_core::store::TradeBinding;

/// Cloneable handle to the monitoring engine actor.
#[derive(Clone)]
pub struct MonitorHandle {
    tx: mpsc::Sender<MonitorCommand>,
    events: broadcast::Sender<MonitorEvent>,
}

impl MonitorHandle {
    #[must_use]
    pub fn new(tx: mpsc::Sender<MonitorCommand>, events: broadcast::Sender<MonitorEvent>) -> Self {
        Self { tx, events }
    }

    /// Hands an executed signal and its subscriber bindings to the engine.
    ///
    /// # Errors
    /// Returns an error if the engine has shut down.
    pub async fn track(&self, signal: Signal, bindings: Vec<TradeBinding>) -> Result<()> {
        self.tx
            .send(MonitorCommand::Track { signal, bindings })
            .await?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the engine has shut down.
    pub async fn stats(&self) -> Result<MonitorStats> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(MonitorCommand::GetStats(tx)).await?;
        let stats = rx.await?;
        Ok(stats)
    }

    /// Subscribes to the engine's event stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    /// # Errors
    /// Returns an error if the engine has already shut down.
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(MonitorCommand::Shutdown).await?;
        Ok(())
    }
}
