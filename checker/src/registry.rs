//! Checker registry: the facade hosts talk to.
//!
//! Construction is initialization. `start()` builds one [`CheckerInstance`]
//! per configured checker; `reload()` disposes them all and builds a fresh set
//! from new settings. Instances report progress on a shared event channel that
//! the host drains with [`CheckerRegistry::poll_events`] or
//! [`CheckerRegistry::next_event`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::host::{Host, TextDocument};
use crate::instance::CheckerInstance;
use crate::types::{CheckerConfig, CheckerEvent, CheckerSettings};

/// Channel capacity for the event channel between instances and the registry.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Normalize configured entries, dropping the ones that cannot run.
fn build_configs(settings: &CheckerSettings) -> Vec<CheckerConfig> {
    let mut seen = HashSet::new();
    let mut configs = Vec::with_capacity(settings.checkers.len());
    for entry in &settings.checkers {
        if entry.command.trim().is_empty() {
            tracing::warn!(
                "Checker '{}' has an empty command; skipping it",
                entry.display_name
            );
            continue;
        }
        if entry.language_ids.is_empty() {
            tracing::warn!(
                "Checker '{}' lists no language ids and will never run",
                entry.display_name
            );
        }
        if !seen.insert(entry.display_name.clone()) {
            tracing::warn!(
                "Multiple checkers named '{}'; their diagnostics share a collection name",
                entry.display_name
            );
        }
        configs.push(CheckerConfig::from_entry(entry));
    }
    configs
}

/// Public facade for the checker subsystem.
pub struct CheckerRegistry<H: Host> {
    host: Arc<H>,
    checkers: Vec<CheckerInstance>,
    delay: Duration,
    event_rx: mpsc::Receiver<CheckerEvent>,
    event_tx: mpsc::Sender<CheckerEvent>,
}

impl<H: Host> CheckerRegistry<H> {
    /// Build and start every configured checker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(settings: &CheckerSettings, host: Arc<H>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut registry = Self {
            host,
            checkers: Vec::new(),
            delay: Duration::from_millis(settings.delay),
            event_rx,
            event_tx,
        };
        registry.build(settings);
        registry
    }

    fn build(&mut self, settings: &CheckerSettings) {
        self.delay = Duration::from_millis(settings.delay);
        for config in build_configs(settings) {
            tracing::info!(
                "Starting checker '{}' ({})",
                config.display_name(),
                config.command()
            );
            self.checkers.push(CheckerInstance::start(
                config,
                self.delay,
                Arc::clone(&self.host),
                self.event_tx.clone(),
            ));
        }
    }

    /// Replace every instance with ones built from `settings`.
    ///
    /// Old instances are fully disposed before the new ones subscribe, so no
    /// stale run can write into a fresh collection.
    pub async fn reload(&mut self, settings: &CheckerSettings) {
        tracing::info!("Reloading checker configuration");
        self.shutdown().await;
        self.build(settings);
    }

    /// Dispose every instance.
    pub async fn shutdown(&mut self) {
        let checkers = std::mem::take(&mut self.checkers);
        for checker in checkers {
            tracing::debug!("Disposing checker '{}'", checker.name());
            checker.dispose().await;
        }
    }

    /// Schedule a run of every checker that handles `document`'s language.
    pub async fn trigger(&self, document: &Arc<dyn TextDocument>) {
        for checker in &self.checkers {
            checker.trigger(Arc::clone(document)).await;
        }
    }

    #[must_use]
    pub fn checkers(&self) -> &[CheckerInstance] {
        &self.checkers
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    #[must_use]
    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    /// Number of checkers a document with `language_id` would trigger.
    #[must_use]
    pub fn eligible_count(&self, language_id: &str) -> usize {
        self.checkers
            .iter()
            .filter(|checker| checker.config().handles(language_id))
            .count()
    }

    /// Drain pending events without blocking, up to `budget`.
    pub fn poll_events(&mut self, budget: usize) -> Vec<CheckerEvent> {
        let mut events = Vec::new();
        while events.len() < budget {
            match self.event_rx.try_recv() {
                Ok(event) => events.push(event),
                Err(mpsc::error::TryRecvError::Empty | mpsc::error::TryRecvError::Disconnected) => {
                    break;
                }
            }
        }
        events
    }

    /// Wait for the next event.
    ///
    /// The registry keeps a sender of its own, so this only returns `None`
    /// if the channel is closed from outside, which does not happen.
    pub async fn next_event(&mut self) -> Option<CheckerEvent> {
        self.event_rx.recv().await
    }

    #[cfg(test)]
    pub(crate) fn event_tx(&self) -> &mpsc::Sender<CheckerEvent> {
        &self.event_tx
    }
}
