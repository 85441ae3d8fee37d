//! Configuration Loader
//!
//! Environment-aware configuration loading: YAML file discovery, environment
//! detection, environment section merging and `TURNTABLE__SECTION__KEY`
//! overrides.

use super::error::{ConfigResult, ConfigurationError};
use super::TurntableConfig;
use crate::constants::env::{
    APP_ENV, CONFIG_OVERRIDE_PREFIX, CONFIG_OVERRIDE_SEPARATOR, DEFAULT_ENVIRONMENT,
    KNOWN_ENVIRONMENTS, TURNTABLE_ENV,
};
use crate::constants::paths::{CONFIG_FILE_NAMES, DEFAULT_CONFIG_DIR};
use parking_lot::{const_mutex, Mutex};
use serde_yaml::Value as YamlValue;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

const MAX_CONFIG_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB limit

/// Loaded configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: TurntableConfig,
    environment: String,
    config_directory: PathBuf,
    /// `None` when no file was found and defaults were used
    config_file: Option<PathBuf>,
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

    /// Load configuration from a specific directory with explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR));

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config_file = match Self::find_config_file(&config_directory) {
            Ok(path) => Some(path),
            Err(ConfigurationError::ConfigFileNotFound { searched_paths }) => {
                debug!(
                    ?searched_paths,
                    "No configuration file found, using defaults"
                );
                None
            }
            Err(e) => return Err(e),
        };

        let merged = match &config_file {
            Some(path) => Self::load_and_merge_yaml(path, environment)?,
            None => YamlValue::Mapping(Default::default()),
        };

        let config = Self::apply_environment_overrides(merged)?;
        config.validate()?;

        info!(
            environment = %environment,
            config_file = ?config_file,
            processes = ?config.execution.processes,
            max_processes = config.execution.max_processes,
            codec = ?config.codec,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
            config_file,
        }))
    }

    /// Build a manager around an already constructed configuration
    pub fn from_config(config: TurntableConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::from(DEFAULT_CONFIG_DIR),
            config_file: None,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &TurntableConfig {
        &self.config
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Get the configuration directory
    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// File the configuration was read from, if any
    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    /// Configuration as JSON, for display
    pub fn debug_config(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null)
    }

    /// Create an emergency fallback configuration with safe defaults
    fn emergency_fallback() -> ConfigManager {
        warn!("Creating emergency fallback configuration with default values");

        ConfigManager {
            config: TurntableConfig::default(),
            environment: Self::detect_environment(),
            config_directory: PathBuf::from(DEFAULT_CONFIG_DIR),
            config_file: None,
        }
    }

    /// Detect current environment: TURNTABLE_ENV || APP_ENV || 'development'
    pub fn detect_environment() -> String {
        env::var(TURNTABLE_ENV)
            .or_else(|_| env::var(APP_ENV))
            .unwrap_or_else(|_| DEFAULT_ENVIRONMENT.to_string())
            .to_lowercase()
    }

    /// Find the configuration file
    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let mut searched_paths = Vec::new();

        for name in CONFIG_FILE_NAMES {
            let config_path = config_directory.join(name);
            searched_paths.push(config_path.clone());

            if config_path.exists() {
                debug!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        Err(ConfigurationError::config_file_not_found(searched_paths))
    }

    /// Safely read a configuration file with size limits
    fn read_config_file_safely(path: &Path) -> ConfigResult<String> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))?;

        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigurationError::invalid_value(
                "file_size",
                metadata.len().to_string(),
                format!(
                    "Configuration file too large ({}MB > {}MB limit)",
                    metadata.len() / (1024 * 1024),
                    MAX_CONFIG_FILE_SIZE / (1024 * 1024)
                ),
            ));
        }

        if !metadata.is_file() {
            return Err(ConfigurationError::invalid_value(
                "file_type",
                "directory or special file",
                "Configuration path must point to a regular file",
            ));
        }

        std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))
    }

    /// Read the file and merge the section of `environment` over the base
    fn load_and_merge_yaml(config_file: &Path, environment: &str) -> ConfigResult<YamlValue> {
        let yaml_content = Self::read_config_file_safely(config_file)?;

        let mut yaml_data: YamlValue = serde_yaml::from_str(&yaml_content)
            .map_err(|e| ConfigurationError::invalid_yaml(config_file.display().to_string(), e))?;

        if yaml_data.is_null() {
            yaml_data = YamlValue::Mapping(Default::default());
        }

        if let Some(env_overrides) = yaml_data
            .get(YamlValue::String(environment.to_string()))
            .cloned()
        {
            debug!(
                "Applying environment-specific overrides for: {}",
                environment
            );
            Self::merge_yaml_values(&mut yaml_data, env_overrides);
        }

        // Environment sections are not part of the configuration structure
        if let YamlValue::Mapping(ref mut map) = yaml_data {
            for known in KNOWN_ENVIRONMENTS {
                map.remove(YamlValue::String(known.to_string()));
            }
            map.remove(YamlValue::String(environment.to_string()));
        }

        Ok(yaml_data)
    }

    /// Recursively merge YAML values (environment overrides into base config)
    fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) {
        match (&mut *base, override_value) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
                for (key, value) in override_map {
                    if let Some(existing_value) = base_map.get_mut(&key) {
                        Self::merge_yaml_values(existing_value, value);
                    } else {
                        base_map.insert(key, value);
                    }
                }
            }
            (base_ref, override_val) => {
                *base_ref = override_val;
            }
        }
    }

    /// Layer `TURNTABLE__SECTION__KEY` variables over the merged file and deserialize
    fn apply_environment_overrides(merged: YamlValue) -> ConfigResult<TurntableConfig> {
        let base = serde_json::to_string(&merged).map_err(|e| {
            ConfigurationError::invalid_value("configuration", "yaml", e.to_string())
        })?;

        let layered = config::Config::builder()
            .add_source(config::File::from_str(&base, config::FileFormat::Json))
            .add_source(
                config::Environment::with_prefix(CONFIG_OVERRIDE_PREFIX)
                    .separator(CONFIG_OVERRIDE_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::environment_override_error(CONFIG_OVERRIDE_PREFIX, e))?;

        layered
            .try_deserialize::<TurntableConfig>()
            .map_err(|e| ConfigurationError::environment_override_error(CONFIG_OVERRIDE_PREFIX, e))
    }
}

/// Global configuration singleton for easy access throughout the application
static GLOBAL_CONFIG: OnceLock<Arc<ConfigManager>> = OnceLock::new();
static CONFIG_LOCK: Mutex<()> = const_mutex(());

impl ConfigManager {
    /// Get or initialize the global configuration instance
    pub fn global() -> Arc<ConfigManager> {
        GLOBAL_CONFIG
            .get_or_init(|| {
                let _lock = CONFIG_LOCK.lock();
                ConfigManager::load().unwrap_or_else(|e| {
                    warn!("Configuration loading failed, using fallback: {e}");
                    Arc::new(ConfigManager::emergency_fallback())
                })
            })
            .clone()
    }

    /// Initialize global configuration with a specific directory
    pub fn initialize_global(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let _lock = CONFIG_LOCK.lock();

        let config_manager = ConfigManager::load_from_directory(config_dir)?;

        // First initialization wins
        let _ = GLOBAL_CONFIG.set(config_manager.clone());

        Ok(GLOBAL_CONFIG.get().cloned().unwrap_or(config_manager))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogFormat;
    use crate::storage::codec::Codec;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_config_yaml() -> &'static str {
        r#"
# Test configuration
execution:
  processes: auto
  max_processes: 16
  batch_size: null
  quiet: false
scratch:
  root: /tmp/turntable-scratch
store:
  root: /tmp/turntable-store
  offload_enabled: true
codec: bincode
logging:
  level: info
  format: pretty

test:
  execution:
    processes: 2
    quiet: true
  logging:
    level: debug

production:
  execution:
    max_processes: 32
  codec: json
  logging:
    format: json
"#
    }

    fn setup_test_config_dir() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let config_dir = temp_dir.path().to_path_buf();
        fs::write(config_dir.join("turntable-config.yaml"), create_test_config_yaml()).unwrap();
        (temp_dir, config_dir)
    }

    #[test]
    fn test_config_file_discovery() {
        let (_temp_dir, config_dir) = setup_test_config_dir();

        let config_file = ConfigManager::find_config_file(&config_dir).unwrap();
        assert_eq!(config_file.file_name().unwrap(), "turntable-config.yaml");
    }

    #[test]
    fn test_yml_extension_is_found() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("turntable-config.yml"), "codec: json\n").unwrap();

        let config_file = ConfigManager::find_config_file(temp_dir.path()).unwrap();
        assert_eq!(config_file.file_name().unwrap(), "turntable-config.yml");
    }

    #[test]
    fn test_config_file_not_found() {
        let temp_dir = TempDir::new().unwrap();

        let result = ConfigManager::find_config_file(temp_dir.path());
        if let Err(ConfigurationError::ConfigFileNotFound { searched_paths }) = result {
            assert_eq!(searched_paths.len(), 2);
        } else {
            panic!("Expected ConfigFileNotFound error");
        }
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::load_from_directory_with_env(
            Some(temp_dir.path().to_path_buf()),
            "development",
        )
        .unwrap();

        assert!(manager.config_file().is_none());
        assert_eq!(manager.config().execution.max_processes, 20);
    }

    #[test]
    fn test_base_config_loading() {
        let (_temp_dir, config_dir) = setup_test_config_dir();

        let manager =
            ConfigManager::load_from_directory_with_env(Some(config_dir), "development").unwrap();
        let config = manager.config();

        assert_eq!(manager.environment(), "development");
        assert_eq!(config.execution.processes, None);
        assert_eq!(config.execution.max_processes, 16);
        assert_eq!(config.scratch.root, PathBuf::from("/tmp/turntable-scratch"));
        assert_eq!(config.codec, Codec::Bincode);
    }

    #[test]
    fn test_environment_specific_overrides() {
        let (_temp_dir, config_dir) = setup_test_config_dir();

        let test_manager =
            ConfigManager::load_from_directory_with_env(Some(config_dir.clone()), "test").unwrap();
        let config = test_manager.config();
        assert_eq!(config.execution.processes, Some(2));
        assert!(config.execution.quiet);
        assert_eq!(config.execution.max_processes, 16);
        assert_eq!(config.logging.level, "debug");

        let prod_manager =
            ConfigManager::load_from_directory_with_env(Some(config_dir), "production").unwrap();
        let config = prod_manager.config();
        assert_eq!(config.execution.max_processes, 32);
        assert_eq!(config.codec, Codec::Json);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_merge_yaml_values() {
        let mut base: YamlValue = serde_yaml::from_str("a:\n  b: 1\n  c: 2\nd: 3").unwrap();
        let overrides: YamlValue = serde_yaml::from_str("a:\n  c: 20\ne: 5").unwrap();

        ConfigManager::merge_yaml_values(&mut base, overrides);

        let expected: YamlValue =
            serde_yaml::from_str("a:\n  b: 1\n  c: 20\nd: 3\ne: 5").unwrap();
        assert_eq!(base, expected);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("turntable-config.yaml"),
            "execution:\n  batch_size: 0\n",
        )
        .unwrap();

        let result = ConfigManager::load_from_directory_with_env(
            Some(temp_dir.path().to_path_buf()),
            "development",
        );
        assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));
    }

    #[test]
    fn test_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("turntable-config.yaml"),
            "execution: [unclosed",
        )
        .unwrap();

        let result = ConfigManager::load_from_directory_with_env(
            Some(temp_dir.path().to_path_buf()),
            "development",
        );
        assert!(matches!(result, Err(ConfigurationError::InvalidYaml { .. })));
    }

    #[test]
    fn test_from_config_validates() {
        let mut config = TurntableConfig::default();
        config.execution.processes = Some(0);
        assert!(ConfigManager::from_config(config, "test").is_err());

        let manager = ConfigManager::from_config(TurntableConfig::default(), "test").unwrap();
        assert_eq!(manager.debug_config()["codec"], "bincode");
    }
}
