//! In-process stand-in for the remote backend.
//!
//! Consumes [`SequencerCommand`]s and writes their effects into a
//! [`SnapshotStore`], the way the network layer would after a fetch returns.
//! Items listed in `stalled_items` never confirm, which reproduces a remote
//! job that silently fails.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::observer::{
    ExternalSnapshot, ItemMetadata, ItemStatus, SequencerCommand, SnapshotStore, TransferStatus,
};

#[derive(Debug, Clone)]
pub struct SimulatedBackendConfig {
    /// Delay before each command takes effect when driven by [`SimulatedBackend::run`]
    pub latency: Duration,
    /// Catalogue entries; unknown items get external metadata
    pub catalogue: HashMap<String, ItemMetadata>,
    /// Items whose install/activate commands never take effect
    pub stalled_items: HashSet<String>,
    /// Installing an item also activates it
    pub activate_on_install: bool,
    /// Statuses reported, in order, after the transfer status is requested
    pub transfer_progression: Vec<TransferStatus>,
}

impl Default for SimulatedBackendConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(50),
            catalogue: HashMap::new(),
            stalled_items: HashSet::new(),
            activate_on_install: false,
            transfer_progression: vec![
                TransferStatus::Uploading,
                TransferStatus::Backfilling,
                TransferStatus::Complete,
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    store: SnapshotStore,
    config: SimulatedBackendConfig,
    remote: Arc<Mutex<ExternalSnapshot>>,
    setup_complete: Arc<AtomicBool>,
}

impl SimulatedBackend {
    /// Create a backend whose server-side item list starts as `remote`
    pub fn new(
        store: SnapshotStore,
        remote: ExternalSnapshot,
        config: SimulatedBackendConfig,
    ) -> Self {
        Self {
            store,
            config,
            remote: Arc::new(Mutex::new(remote)),
            setup_complete: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Server-side item list, regardless of what the store has fetched
    pub fn remote_items(&self) -> ExternalSnapshot {
        self.remote.lock().clone()
    }

    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.load(Ordering::SeqCst)
    }

    /// Apply one command immediately
    pub fn apply(&self, command: SequencerCommand) {
        debug!(
            command_type = command.command_type(),
            item_id = command.item_id(),
            "Backend applying command"
        );
        match command {
            SequencerCommand::FetchTransferStatus { .. } => {
                if let Some(last) = self.config.transfer_progression.last() {
                    self.store.set_transfer_status(*last);
                }
            }
            SequencerCommand::FetchItems { .. } => {
                self.store.replace_items(self.remote_items());
            }
            SequencerCommand::FetchItemMetadata { item_id } => {
                let metadata = self
                    .config
                    .catalogue
                    .get(&item_id)
                    .cloned()
                    .unwrap_or_else(|| ItemMetadata::external(item_id));
                self.store.set_metadata(metadata);
            }
            SequencerCommand::Install { metadata, .. } => {
                if self.config.stalled_items.contains(&metadata.item_id) {
                    return;
                }
                let status = if self.config.activate_on_install {
                    ItemStatus::active()
                } else {
                    ItemStatus::installed()
                };
                self.remote.lock().insert(metadata.item_id.clone(), status.clone());
                self.store.upsert_item(metadata.item_id, status);
            }
            SequencerCommand::Activate { item_id, .. } => {
                if self.config.stalled_items.contains(&item_id) {
                    return;
                }
                let mut remote = self.remote.lock();
                let mut activated = remote.get(&item_id).cloned().unwrap_or_default();
                activated.installed = true;
                activated.active = true;
                remote.insert(item_id.clone(), activated.clone());
                drop(remote);
                self.store.upsert_item(item_id, activated);
            }
            SequencerCommand::MarkSetupComplete { owner_id, finished } => {
                info!(owner_id, finished, "Backend recorded setup completion");
                self.setup_complete.store(finished, Ordering::SeqCst);
            }
        }
    }

    /// Consume commands from `receiver` until it closes, applying each after
    /// the configured latency. Transfer statuses step through the configured
    /// progression, one per latency period.
    pub async fn run(self, mut receiver: mpsc::UnboundedReceiver<SequencerCommand>) {
        while let Some(command) = receiver.recv().await {
            if let SequencerCommand::FetchTransferStatus { .. } = command {
                for status in &self.config.transfer_progression {
                    tokio::time::sleep(self.config.latency).await;
                    self.store.set_transfer_status(*status);
                }
                continue;
            }
            tokio::time::sleep(self.config.latency).await;
            self.apply(command);
        }
        debug!("Backend command channel closed");
    }

    /// Spawn [`SimulatedBackend::run`] on the current runtime
    pub fn spawn(self, receiver: mpsc::UnboundedReceiver<SequencerCommand>) -> JoinHandle<()> {
        tokio::spawn(self.run(receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::StateObserver;

    fn backend(config: SimulatedBackendConfig) -> SimulatedBackend {
        SimulatedBackend::new(
            SnapshotStore::new(),
            ExternalSnapshot::new().with_item("a", ItemStatus::installed()),
            config,
        )
    }

    #[test]
    fn test_fetch_items_copies_remote_list() {
        let backend = backend(SimulatedBackendConfig::default());
        assert!(backend.store().items().is_none());

        backend.apply(SequencerCommand::FetchItems { owner_id: 1 });
        assert!(backend.store().items().unwrap().is_installed("a"));
    }

    #[test]
    fn test_install_and_activate() {
        let backend = backend(SimulatedBackendConfig::default());
        backend.apply(SequencerCommand::Install {
            owner_id: 1,
            metadata: ItemMetadata::external("b"),
        });
        assert!(backend.store().items().unwrap().is_installed("b"));
        assert!(!backend.store().items().unwrap().is_active("b"));

        backend.apply(SequencerCommand::Activate {
            owner_id: 1,
            item_id: "b".to_string(),
            remote_id: "b/b".to_string(),
        });
        assert!(backend.store().items().unwrap().is_active("b"));
        assert!(backend.remote_items().is_active("b"));
    }

    #[test]
    fn test_stalled_items_never_confirm() {
        let config = SimulatedBackendConfig {
            stalled_items: HashSet::from(["b".to_string()]),
            ..Default::default()
        };
        let backend = backend(config);
        backend.apply(SequencerCommand::Install {
            owner_id: 1,
            metadata: ItemMetadata::external("b"),
        });
        assert!(backend.store().items().is_none());
    }

    #[test]
    fn test_unknown_items_get_external_metadata() {
        let mut config = SimulatedBackendConfig::default();
        config
            .catalogue
            .insert("a".to_string(), ItemMetadata::catalogue("a", "Alpha"));
        let backend = backend(config);

        backend.apply(SequencerCommand::FetchItemMetadata { item_id: "a".to_string() });
        backend.apply(SequencerCommand::FetchItemMetadata { item_id: "z".to_string() });

        assert!(backend.store().item_metadata("a").unwrap().from_catalogue);
        assert!(!backend.store().item_metadata("z").unwrap().from_catalogue);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_steps_through_transfer_progression() {
        let backend = backend(SimulatedBackendConfig::default());
        let store = backend.store().clone();
        let (sender, receiver) = mpsc::unbounded_channel();
        let task = backend.spawn(receiver);

        sender
            .send(SequencerCommand::FetchTransferStatus { owner_id: 1 })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(75)).await;
        assert_eq!(store.transfer_status(), Some(TransferStatus::Uploading));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.transfer_status(), Some(TransferStatus::Complete));

        drop(sender);
        task.await.unwrap();
    }
}
