//! Configuration Loader
//!
//! Environment-aware configuration loading. Layers, in increasing precedence:
//! `base.yaml`, an optional `{environment}.yaml` next to it, then
//! `SEQUENCER__*` environment variables (`SEQUENCER__POLLING__TICK_INTERVAL_MS=50`).

use super::error::{ConfigResult, ConfigurationError};
use super::SequencerConfig;
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const BASE_CONFIG_FILE: &str = "base.yaml";
const ENV_PREFIX: &str = "SEQUENCER";
const ENV_SEPARATOR: &str = "__";

/// Loaded, validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: SequencerConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Useful for tests that must not touch global environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let base_path = Self::find_config_file(&config_directory)?;
        let override_path = config_directory.join(format!("{environment}.yaml"));

        let builder = Config::builder()
            .add_source(File::from(base_path.as_path()).format(FileFormat::Yaml))
            .add_source(
                File::from(override_path.as_path())
                    .format(FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            );

        let config = Self::finish(builder, &config_directory.display().to_string())?;

        info!(
            environment = %environment,
            owner_id = config.owner_id,
            required_items = config.required_items.len(),
            tick_interval_ms = config.polling.tick_interval_ms,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Build configuration from an in-memory YAML document (no file or
    /// environment layers)
    pub fn from_yaml_str(yaml: &str, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        let builder = Config::builder().add_source(File::from_str(yaml, FileFormat::Yaml));
        let config = Self::finish(builder, "inline yaml")?;

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::new(),
        }))
    }

    fn finish(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
        source_name: &str,
    ) -> ConfigResult<SequencerConfig> {
        let config: SequencerConfig = builder
            .build()
            .and_then(|merged| merged.try_deserialize())
            .map_err(|e| ConfigurationError::parse_error(source_name, e))?;

        config.validate()?;

        debug!(
            "Resolved configuration: {}",
            serde_json::to_string(&config).unwrap_or_else(|_| "[serialization error]".to_string())
        );

        Ok(config)
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    /// Get the environment the configuration was loaded for
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Get the directory the configuration was loaded from
    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Detect current environment from environment variables
    pub fn detect_environment() -> String {
        env::var("SEQUENCER_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn default_config_directory() -> PathBuf {
        env::var("SEQUENCER_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config").join("sequencer"))
    }

    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let base_path = config_directory.join(BASE_CONFIG_FILE);
        if base_path.is_file() {
            Ok(base_path)
        } else {
            Err(ConfigurationError::config_file_not_found(vec![base_path]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::AlreadyActivePolicy;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_config_yaml() -> &'static str {
        r#"
owner_id: 42
transfer_in_progress: false
required_items:
  - id: woocommerce
    label: WooCommerce
  - id: woocommerce-services
    label: WooCommerce Services
polling:
  tick_interval_ms: 17
  refresh_interval_ms: 60000
"#
    }

    fn setup_test_config_dir() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let config_dir = temp_dir.path().to_path_buf();
        fs::write(config_dir.join(BASE_CONFIG_FILE), create_test_config_yaml()).unwrap();
        (temp_dir, config_dir)
    }

    #[test]
    fn test_config_file_not_found() {
        let temp_dir = TempDir::new().unwrap();

        let result = ConfigManager::load_from_directory_with_env(
            Some(temp_dir.path().to_path_buf()),
            "test",
        );

        if let Err(ConfigurationError::ConfigFileNotFound { searched_paths }) = result {
            assert_eq!(searched_paths.len(), 1);
        } else {
            panic!("Expected ConfigFileNotFound error");
        }
    }

    #[test]
    fn test_basic_config_loading() {
        let (_temp_dir, config_dir) = setup_test_config_dir();

        let manager =
            ConfigManager::load_from_directory_with_env(Some(config_dir), "test").unwrap();
        let config = manager.config();

        assert_eq!(manager.environment(), "test");
        assert_eq!(config.owner_id, 42);
        assert_eq!(config.required_items.len(), 2);
        assert_eq!(config.required_items[1].id, "woocommerce-services");
        assert_eq!(config.already_active_policy, AlreadyActivePolicy::CountAsStep);
        assert!(!config.auto_confirm);
    }

    #[test]
    fn test_environment_specific_overrides() {
        let (_temp_dir, config_dir) = setup_test_config_dir();
        fs::write(
            config_dir.join("production.yaml"),
            "auto_confirm: true\nalready_active_policy: skip_without_counting\npolling:\n  tick_interval_ms: 250\n",
        )
        .unwrap();

        let manager =
            ConfigManager::load_from_directory_with_env(Some(config_dir.clone()), "production")
                .unwrap();
        assert!(manager.config().auto_confirm);
        assert_eq!(manager.config().polling.tick_interval_ms, 250);
        assert_eq!(
            manager.config().already_active_policy,
            AlreadyActivePolicy::SkipWithoutCounting
        );
        // untouched keys keep base values
        assert_eq!(manager.config().owner_id, 42);

        let manager = ConfigManager::load_from_directory_with_env(Some(config_dir), "test").unwrap();
        assert!(!manager.config().auto_confirm);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = ConfigManager::from_yaml_str("owner_id: 1\nrequired_items: []\n", "test");
        assert!(matches!(
            result,
            Err(ConfigurationError::MissingRequiredField { .. })
        ));

        let result = ConfigManager::from_yaml_str("owner_id: [not, a, number]\n", "test");
        assert!(matches!(result, Err(ConfigurationError::ParseError { .. })));
    }
}
