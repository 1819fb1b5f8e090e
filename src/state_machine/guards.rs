use crate::observer::{ExternalSnapshot, TransferStatus};

/// Predicates that decide when a remote command counts as confirmed.
///
/// Injected into the step engine so callers whose backend reports status
/// differently can redefine "installed", "active" and "transfer finished"
/// without touching the phase logic.
pub trait ConfirmationGuard: Send + Sync {
    /// Whether `item_id` is installed according to `snapshot`
    fn is_installed(&self, item_id: &str, snapshot: &ExternalSnapshot) -> bool;

    /// Whether `item_id` is active according to `snapshot`
    fn is_activated(&self, item_id: &str, snapshot: &ExternalSnapshot) -> bool;

    /// Whether the hosting transfer has finished
    fn is_transfer_complete(&self, status: Option<TransferStatus>) -> bool;

    /// Get a description of this guard for logging
    fn description(&self) -> &'static str;
}

/// Reads the `installed`/`active` flags and the `complete` transfer status verbatim
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotConfirmation;

impl ConfirmationGuard for SnapshotConfirmation {
    fn is_installed(&self, item_id: &str, snapshot: &ExternalSnapshot) -> bool {
        snapshot.is_installed(item_id)
    }

    fn is_activated(&self, item_id: &str, snapshot: &ExternalSnapshot) -> bool {
        snapshot.is_active(item_id)
    }

    fn is_transfer_complete(&self, status: Option<TransferStatus>) -> bool {
        status.is_some_and(|status| status.is_complete())
    }

    fn description(&self) -> &'static str {
        "Snapshot flags must report the item installed/active"
    }
}

/// Treats presence in the item list as installed. Matches backends that only
/// list items once they are on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresenceConfirmation;

impl ConfirmationGuard for PresenceConfirmation {
    fn is_installed(&self, item_id: &str, snapshot: &ExternalSnapshot) -> bool {
        snapshot.get(item_id).is_some()
    }

    fn is_activated(&self, item_id: &str, snapshot: &ExternalSnapshot) -> bool {
        snapshot.is_active(item_id)
    }

    fn is_transfer_complete(&self, status: Option<TransferStatus>) -> bool {
        status.is_some_and(|status| status.is_complete())
    }

    fn description(&self) -> &'static str {
        "Item must appear in the item list"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::ItemStatus;

    fn snapshot() -> ExternalSnapshot {
        ExternalSnapshot::new()
            .with_item("listed", ItemStatus::default())
            .with_item("installed", ItemStatus::installed())
            .with_item("active", ItemStatus::active())
    }

    #[test]
    fn test_snapshot_confirmation() {
        let guard = SnapshotConfirmation;
        let snapshot = snapshot();
        assert!(!guard.is_installed("listed", &snapshot));
        assert!(guard.is_installed("installed", &snapshot));
        assert!(!guard.is_activated("installed", &snapshot));
        assert!(guard.is_activated("active", &snapshot));
        assert!(!guard.is_installed("absent", &snapshot));
    }

    #[test]
    fn test_presence_confirmation() {
        let guard = PresenceConfirmation;
        let snapshot = snapshot();
        assert!(guard.is_installed("listed", &snapshot));
        assert!(!guard.is_installed("absent", &snapshot));
        assert!(!guard.is_activated("listed", &snapshot));
    }

    #[test]
    fn test_transfer_completion() {
        let guard = SnapshotConfirmation;
        assert!(!guard.is_transfer_complete(None));
        assert!(!guard.is_transfer_complete(Some(TransferStatus::Backfilling)));
        assert!(guard.is_transfer_complete(Some(TransferStatus::Complete)));
    }
}
