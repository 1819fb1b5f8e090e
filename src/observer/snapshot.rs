use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::SequencerError;

/// Server-confirmed status of one item
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ItemStatus {
    pub installed: bool,
    pub active: bool,
    /// Backend handle for the item; not always equal to its slug
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
}

impl ItemStatus {
    pub fn installed() -> Self {
        Self {
            installed: true,
            active: false,
            remote_id: None,
        }
    }

    pub fn active() -> Self {
        Self {
            installed: true,
            active: true,
            remote_id: None,
        }
    }

    pub fn with_remote_id(mut self, remote_id: impl Into<String>) -> Self {
        self.remote_id = Some(remote_id.into());
        self
    }
}

/// Latest known item statuses keyed by item identifier
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExternalSnapshot {
    items: HashMap<String, ItemStatus>,
}

impl ExternalSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(mut self, item_id: impl Into<String>, status: ItemStatus) -> Self {
        self.items.insert(item_id.into(), status);
        self
    }

    pub fn get(&self, item_id: &str) -> Option<&ItemStatus> {
        self.items.get(item_id)
    }

    pub fn insert(&mut self, item_id: impl Into<String>, status: ItemStatus) {
        self.items.insert(item_id.into(), status);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_installed(&self, item_id: &str) -> bool {
        self.get(item_id).is_some_and(|status| status.installed)
    }

    pub fn is_active(&self, item_id: &str) -> bool {
        self.get(item_id).is_some_and(|status| status.active)
    }
}

impl FromIterator<(String, ItemStatus)> for ExternalSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, ItemStatus)>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

/// Catalogue data needed to issue an install command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub item_id: String,
    pub name: Option<String>,
    pub version: Option<String>,
    pub download_url: Option<String>,
    /// False for items the public catalogue does not know; they are still installable
    pub from_catalogue: bool,
}

impl ItemMetadata {
    pub fn catalogue(item_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            name: Some(name.into()),
            version: None,
            download_url: None,
            from_catalogue: true,
        }
    }

    pub fn external(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            name: None,
            version: None,
            download_url: None,
            from_catalogue: false,
        }
    }
}

/// Hosting transfer status observed during TRANSFERRING
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Start,
    Setup,
    Conflicts,
    Active,
    Uploading,
    Backfilling,
    Complete,
    Error,
    Failure,
    Relaunching,
}

impl TransferStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Setup => "setup",
            Self::Conflicts => "conflicts",
            Self::Active => "active",
            Self::Uploading => "uploading",
            Self::Backfilling => "backfilling",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Failure => "failure",
            Self::Relaunching => "relaunching",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for TransferStatus {
    type Err = SequencerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "setup" => Ok(Self::Setup),
            "conflicts" => Ok(Self::Conflicts),
            "active" => Ok(Self::Active),
            "uploading" => Ok(Self::Uploading),
            "backfilling" => Ok(Self::Backfilling),
            "complete" => Ok(Self::Complete),
            "error" => Ok(Self::Error),
            "failure" => Ok(Self::Failure),
            "relaunching" => Ok(Self::Relaunching),
            _ => Err(SequencerError::InvalidTransferStatus(s.to_string())),
        }
    }
}

/// Read path the step engine consumes. Every call is a fresh, possibly
/// stale observation; `None` means the data has not been fetched yet.
pub trait StateObserver: Send + Sync {
    fn items(&self) -> Option<ExternalSnapshot>;

    fn item_metadata(&self, item_id: &str) -> Option<ItemMetadata>;

    fn transfer_status(&self) -> Option<TransferStatus>;
}

#[derive(Debug, Default)]
struct StoreInner {
    items: Option<ExternalSnapshot>,
    metadata: HashMap<String, ItemMetadata>,
    transfer_status: Option<TransferStatus>,
}

/// Shared observer fed by the network layer
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole item list with a freshly fetched one
    pub fn replace_items(&self, snapshot: ExternalSnapshot) {
        self.inner.write().items = Some(snapshot);
    }

    /// Insert or update one item, creating the list if it was never fetched
    pub fn upsert_item(&self, item_id: impl Into<String>, status: ItemStatus) {
        self.inner
            .write()
            .items
            .get_or_insert_with(ExternalSnapshot::new)
            .insert(item_id, status);
    }

    /// Apply a mutation to an existing item
    pub fn update_item<F>(&self, item_id: &str, update: F) -> bool
    where
        F: FnOnce(&mut ItemStatus),
    {
        let mut inner = self.inner.write();
        match inner.items.as_mut().and_then(|items| items.items.get_mut(item_id)) {
            Some(status) => {
                update(status);
                true
            }
            None => false,
        }
    }

    /// Forget the item list, as if it had never been fetched
    pub fn clear_items(&self) {
        self.inner.write().items = None;
    }

    pub fn set_metadata(&self, metadata: ItemMetadata) {
        self.inner
            .write()
            .metadata
            .insert(metadata.item_id.clone(), metadata);
    }

    pub fn remove_metadata(&self, item_id: &str) -> Option<ItemMetadata> {
        self.inner.write().metadata.remove(item_id)
    }

    pub fn set_transfer_status(&self, status: TransferStatus) {
        self.inner.write().transfer_status = Some(status);
    }
}

impl StateObserver for SnapshotStore {
    fn items(&self) -> Option<ExternalSnapshot> {
        self.inner.read().items.clone()
    }

    fn item_metadata(&self, item_id: &str) -> Option<ItemMetadata> {
        self.inner.read().metadata.get(item_id).cloned()
    }

    fn transfer_status(&self) -> Option<TransferStatus> {
        self.inner.read().transfer_status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_predicates() {
        let snapshot = ExternalSnapshot::new()
            .with_item("a", ItemStatus::active())
            .with_item("b", ItemStatus::installed());

        assert!(snapshot.is_installed("a"));
        assert!(snapshot.is_active("a"));
        assert!(snapshot.is_installed("b"));
        assert!(!snapshot.is_active("b"));
        assert!(!snapshot.is_installed("c"));
        assert!(!snapshot.is_active("c"));
    }

    #[test]
    fn test_store_reads_are_independent_copies() {
        let store = SnapshotStore::new();
        assert!(store.items().is_none());

        store.upsert_item("a", ItemStatus::installed());
        let before = store.items().unwrap();

        assert!(store.update_item("a", |status| status.active = true));
        assert!(!before.is_active("a"));
        assert!(store.items().unwrap().is_active("a"));

        assert!(!store.update_item("missing", |status| status.active = true));

        store.clear_items();
        assert!(store.items().is_none());
    }

    #[test]
    fn test_store_metadata_and_transfer_status() {
        let store = SnapshotStore::new();
        assert!(store.item_metadata("a").is_none());
        assert!(store.transfer_status().is_none());

        store.set_metadata(ItemMetadata::external("a"));
        store.set_transfer_status(TransferStatus::Uploading);

        assert!(!store.item_metadata("a").unwrap().from_catalogue);
        assert_eq!(store.transfer_status(), Some(TransferStatus::Uploading));
        assert!(store.remove_metadata("a").is_some());
        assert!(store.item_metadata("a").is_none());
    }

    #[test]
    fn test_transfer_status_string_conversion() {
        assert_eq!(TransferStatus::Backfilling.to_string(), "backfilling");
        assert_eq!(
            "complete".parse::<TransferStatus>().unwrap(),
            TransferStatus::Complete
        );
        assert!("done".parse::<TransferStatus>().is_err());
        assert!(TransferStatus::Complete.is_complete());
        assert!(!TransferStatus::Relaunching.is_complete());
    }
}
