//! # Sequencer Configuration System
//!
//! Configuration for a setup sequencer: who owns it, which items must end up
//! installed and active, how fast the pollers tick and how the engine
//! accounts for items that turn out to be active already.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sequencer_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load configuration (environment auto-detected)
//! let manager = ConfigManager::load()?;
//!
//! let tick = manager.config().polling.tick_interval();
//! let items = &manager.config().required_items;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::constants::{
    AlreadyActivePolicy, DEFAULT_EVENT_CHANNEL_CAPACITY, DEFAULT_REFRESH_INTERVAL_MS,
    DEFAULT_TICK_INTERVAL_MS,
};
use crate::observer::OwnerId;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring `config/sequencer/base.yaml`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SequencerConfig {
    /// Owner (site) the commands are issued for
    pub owner_id: OwnerId,

    /// Precondition flag: a hosting transfer must complete before initialization
    #[serde(default)]
    pub transfer_in_progress: bool,

    /// Skip the confirmation gate and start as soon as the sequencer starts
    #[serde(default)]
    pub auto_confirm: bool,

    /// Items that must end up installed and active, in processing order
    pub required_items: Vec<RequiredItem>,

    /// Poller cadences
    #[serde(default)]
    pub polling: PollingConfig,

    /// Step accounting for items found already active during ACTIVATING
    #[serde(default)]
    pub already_active_policy: AlreadyActivePolicy,

    /// Broadcast capacity for sequencer events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

/// One required item with its human-readable label
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RequiredItem {
    pub id: String,
    pub label: String,
}

impl RequiredItem {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PollingConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    #[serde(default)]
    pub refresh_enabled: bool,
}

fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}

fn default_refresh_interval_ms() -> u64 {
    DEFAULT_REFRESH_INTERVAL_MS
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
            refresh_enabled: false,
        }
    }
}

impl PollingConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            owner_id: 0,
            transfer_in_progress: false,
            auto_confirm: false,
            required_items: default_required_items(),
            polling: PollingConfig::default(),
            already_active_policy: AlreadyActivePolicy::default(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

/// The store-setup plugin set
pub fn default_required_items() -> Vec<RequiredItem> {
    vec![
        RequiredItem::new("woocommerce", "WooCommerce"),
        RequiredItem::new("woocommerce-gateway-stripe", "WooCommerce Stripe Gateway"),
        RequiredItem::new("woocommerce-services", "WooCommerce Services"),
        RequiredItem::new(
            "taxjar-simplified-taxes-for-woocommerce",
            "TaxJar - Sales Tax Automation for WooCommerce",
        ),
    ]
}

impl SequencerConfig {
    pub fn with_owner(owner_id: OwnerId) -> Self {
        Self {
            owner_id,
            ..Self::default()
        }
    }

    /// Identifiers of the required items, in configured order
    pub fn required_item_ids(&self) -> Vec<String> {
        self.required_items.iter().map(|item| item.id.clone()).collect()
    }

    /// Label for a required item
    pub fn label_for(&self, item_id: &str) -> Option<&str> {
        self.required_items
            .iter()
            .find(|item| item.id == item_id)
            .map(|item| item.label.as_str())
    }

    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        if self.required_items.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "required_items",
                "sequencer configuration",
            ));
        }

        let mut seen = HashSet::new();
        for item in &self.required_items {
            if item.id.trim().is_empty() {
                return Err(ConfigurationError::invalid_value(
                    "required_items.id",
                    item.id.clone(),
                    "item identifiers must not be blank",
                ));
            }
            if !seen.insert(item.id.as_str()) {
                return Err(ConfigurationError::invalid_value(
                    "required_items.id",
                    item.id.clone(),
                    "duplicate item identifier",
                ));
            }
        }

        if self.polling.tick_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "polling.tick_interval_ms",
                "0",
                "must be greater than zero",
            ));
        }

        if self.polling.refresh_enabled && self.polling.refresh_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "polling.refresh_interval_ms",
                "0",
                "must be greater than zero when refresh is enabled",
            ));
        }

        if self.event_channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "event_channel_capacity",
                "0",
                "broadcast channels need a capacity of at least one",
            ));
        }

        Ok(())
    }
}
