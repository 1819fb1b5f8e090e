use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use super::snapshot::ItemMetadata;

/// Identifier of the site the sequencer works for
pub type OwnerId = u64;

/// Fire-and-forget commands issued to the backend. Success is only ever
/// inferred by re-observing the snapshot on a later tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SequencerCommand {
    /// Refresh the hosting transfer status
    FetchTransferStatus { owner_id: OwnerId },
    /// Refresh the installed item list
    FetchItems { owner_id: OwnerId },
    /// Look up catalogue data for one item
    FetchItemMetadata { item_id: String },
    /// Install one item
    Install {
        owner_id: OwnerId,
        metadata: ItemMetadata,
    },
    /// Activate one installed item using its backend handle
    Activate {
        owner_id: OwnerId,
        item_id: String,
        remote_id: String,
    },
    /// Record that setup of the required items finished
    MarkSetupComplete { owner_id: OwnerId, finished: bool },
}

impl SequencerCommand {
    /// Get a string representation of the command type for logging
    pub fn command_type(&self) -> &'static str {
        match self {
            Self::FetchTransferStatus { .. } => "fetch_transfer_status",
            Self::FetchItems { .. } => "fetch_items",
            Self::FetchItemMetadata { .. } => "fetch_item_metadata",
            Self::Install { .. } => "install",
            Self::Activate { .. } => "activate",
            Self::MarkSetupComplete { .. } => "mark_setup_complete",
        }
    }

    /// Item the command targets, if any
    pub fn item_id(&self) -> Option<&str> {
        match self {
            Self::FetchItemMetadata { item_id } | Self::Activate { item_id, .. } => {
                Some(item_id.as_str())
            }
            Self::Install { metadata, .. } => Some(metadata.item_id.as_str()),
            _ => None,
        }
    }
}

/// Write path the step engine consumes. Implementations must not block.
pub trait CommandDispatcher: Send + Sync {
    fn dispatch(&self, command: SequencerCommand);
}

/// Dispatcher that forwards commands to a consumer over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    sender: mpsc::UnboundedSender<SequencerCommand>,
}

impl ChannelDispatcher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SequencerCommand>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl CommandDispatcher for ChannelDispatcher {
    fn dispatch(&self, command: SequencerCommand) {
        let command_type = command.command_type();
        // A closed consumer looks exactly like a command that never confirms
        if self.sender.send(command).is_err() {
            warn!(command_type, "Command consumer closed; dropping command");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_dispatcher_delivers_in_order() {
        let (dispatcher, mut receiver) = ChannelDispatcher::new();
        dispatcher.dispatch(SequencerCommand::FetchItems { owner_id: 1 });
        dispatcher.dispatch(SequencerCommand::FetchItemMetadata {
            item_id: "a".to_string(),
        });

        assert_eq!(
            receiver.recv().await,
            Some(SequencerCommand::FetchItems { owner_id: 1 })
        );
        let second = receiver.recv().await.unwrap();
        assert_eq!(second.command_type(), "fetch_item_metadata");
        assert_eq!(second.item_id(), Some("a"));
    }

    #[test]
    fn test_dispatch_after_receiver_dropped_does_not_panic() {
        let (dispatcher, receiver) = ChannelDispatcher::new();
        drop(receiver);
        dispatcher.dispatch(SequencerCommand::MarkSetupComplete {
            owner_id: 1,
            finished: true,
        });
    }

    #[test]
    fn test_command_serde_shape() {
        let command = SequencerCommand::Activate {
            owner_id: 3,
            item_id: "woocommerce".to_string(),
            remote_id: "woocommerce/woocommerce".to_string(),
        };
        let json = serde_json::to_value(&command).unwrap();
        assert_eq!(json["type"], "activate");
        assert_eq!(json["data"]["remote_id"], "woocommerce/woocommerce");
    }
}
