//! Builders for configs, snapshots and engines used across integration tests

use sequencer_core::config::{RequiredItem, SequencerConfig};
use sequencer_core::observer::{ExternalSnapshot, ItemMetadata, ItemStatus, SnapshotStore};
use sequencer_core::state_machine::StepEngine;
use sequencer_core::AlreadyActivePolicy;

pub const OWNER_ID: u64 = 77;

/// Builder for a [`SequencerConfig`] with a short item list
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: SequencerConfig,
}

impl ConfigBuilder {
    pub fn new(items: &[&str]) -> Self {
        let mut config = SequencerConfig::with_owner(OWNER_ID);
        config.required_items = items
            .iter()
            .map(|id| RequiredItem::new(*id, id.to_uppercase()))
            .collect();
        config.polling.tick_interval_ms = 10;
        Self { config }
    }

    pub fn transfer_in_progress(mut self) -> Self {
        self.config.transfer_in_progress = true;
        self
    }

    pub fn auto_confirm(mut self) -> Self {
        self.config.auto_confirm = true;
        self
    }

    pub fn policy(mut self, policy: AlreadyActivePolicy) -> Self {
        self.config.already_active_policy = policy;
        self
    }

    pub fn refresh_every(mut self, interval_ms: u64) -> Self {
        self.config.polling.refresh_enabled = true;
        self.config.polling.refresh_interval_ms = interval_ms;
        self
    }

    pub fn build(self) -> SequencerConfig {
        self.config
    }

    pub fn engine(self) -> StepEngine {
        StepEngine::new(&self.config)
    }
}

/// Snapshot from `(item, installed, active)` triples
pub fn snapshot(items: &[(&str, bool, bool)]) -> ExternalSnapshot {
    items
        .iter()
        .map(|(id, installed, active)| {
            (
                id.to_string(),
                ItemStatus {
                    installed: *installed,
                    active: *active,
                    remote_id: None,
                },
            )
        })
        .collect()
}

/// Store with a loaded item list and catalogue metadata for `metadata_for`
pub fn store_with(items: &[(&str, bool, bool)], metadata_for: &[&str]) -> SnapshotStore {
    let store = SnapshotStore::new();
    store.replace_items(snapshot(items));
    for id in metadata_for {
        store.set_metadata(ItemMetadata::catalogue(*id, id.to_uppercase()));
    }
    store
}
