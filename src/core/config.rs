/*
 * Holds the settings that shape a token tree (tokenizer strategy, size cap,
 * excluded extensions, hidden-file visibility, badge text, refresh debounce)
 * and persists them as JSON in the platform's local configuration directory.
 *
 * It uses a trait-based approach (`ConfigManagerOperations`) so that callers
 * can swap the storage backend or mock it in tests. `CoreConfigManager`
 * resolves its directory via `path_utils` unless given an explicit one.
 */
use crate::core::path_utils;
use crate::core::tokenizer_utils::TokenizerStrategy;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const SETTINGS_FILENAME: &str = "settings.json";

pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    NoProjectDirectory,
    Json(serde_json::Error),
}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Json(err)
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Configuration I/O error: {e}"),
            ConfigError::NoProjectDirectory => {
                write!(f, "Could not determine project directory for configuration")
            }
            ConfigError::Json(e) => write!(f, "Configuration file JSON error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Json(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/*
 * Settings of a token tree. Every field has a default so partial or older
 * settings files still load.
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /* Strategy id, see `TokenizerStrategy::from_config`. */
    pub tokenizer: String,
    /* Model identifier for the `model` strategy. */
    pub model: Option<String>,
    /* Files larger than this many bytes count as 0 tokens and are never read. */
    pub max_file_size: u64,
    /* Extensions (with or without the leading dot) whose files count as 0 tokens. */
    pub excluded_extensions: Vec<String>,
    pub show_hidden: bool,
    pub badge_suffix: String,
    pub debounce_ms: u64,
    /* Whether the presentation layer accepts refreshes of individual paths. */
    pub partial_refresh: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        TreeConfig {
            tokenizer: "cl100k_base".to_string(),
            model: None,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            excluded_extensions: Vec::new(),
            show_hidden: false,
            badge_suffix: "tokens".to_string(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            partial_refresh: true,
        }
    }
}

impl TreeConfig {
    pub fn tokenizer_strategy(&self) -> TokenizerStrategy {
        TokenizerStrategy::from_config(&self.tokenizer, self.model.as_deref())
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /*
     * True when switching from `self` to `other` changes how file counts are
     * computed, which makes every cached count invalid.
     */
    pub fn counts_differ_from(&self, other: &TreeConfig) -> bool {
        self.tokenizer_strategy() != other.tokenizer_strategy()
            || self.max_file_size != other.max_file_size
            || self.normalized_extensions() != other.normalized_extensions()
    }

    pub fn is_extension_excluded(&self, path: &Path) -> bool {
        let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let extension = extension.to_lowercase();
        self.excluded_extensions
            .iter()
            .any(|excluded| excluded.trim_start_matches('.').to_lowercase() == extension)
    }

    fn normalized_extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self
            .excluded_extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();
        extensions.sort();
        extensions.dedup();
        extensions
    }
}

pub trait ConfigManagerOperations: Send + Sync {
    fn load_config(&self, app_name: &str) -> Result<TreeConfig>;
    fn save_config(&self, app_name: &str, config: &TreeConfig) -> Result<()>;
}

pub struct CoreConfigManager {
    config_dir_override: Option<PathBuf>,
}

impl CoreConfigManager {
    pub fn new() -> Self {
        CoreConfigManager {
            config_dir_override: None,
        }
    }

    /* Stores settings in `dir` instead of the platform configuration directory. */
    pub fn with_config_dir(dir: PathBuf) -> Self {
        CoreConfigManager {
            config_dir_override: Some(dir),
        }
    }

    fn settings_path(&self, app_name: &str) -> Result<PathBuf> {
        let config_dir = match &self.config_dir_override {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                dir.clone()
            }
            None => path_utils::get_base_app_config_local_dir(app_name)
                .ok_or(ConfigError::NoProjectDirectory)?,
        };
        Ok(config_dir.join(SETTINGS_FILENAME))
    }
}

impl Default for CoreConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManagerOperations for CoreConfigManager {
    /*
     * Loads the settings for an application. A missing or blank settings file
     * yields the defaults; malformed JSON is an error so that a typo is not
     * silently replaced by defaults.
     */
    fn load_config(&self, app_name: &str) -> Result<TreeConfig> {
        log::trace!("CoreConfigManager: Loading settings for app '{app_name}'");
        let file_path = self.settings_path(app_name)?;

        if !file_path.exists() {
            log::debug!("CoreConfigManager: Settings file {file_path:?} does not exist.");
            return Ok(TreeConfig::default());
        }

        let contents = fs::read_to_string(&file_path)?;
        if contents.trim().is_empty() {
            log::debug!("CoreConfigManager: Settings file {file_path:?} is empty.");
            return Ok(TreeConfig::default());
        }
        let config: TreeConfig = serde_json::from_str(&contents)?;
        log::debug!("CoreConfigManager: Loaded settings from {file_path:?}.");
        Ok(config)
    }

    fn save_config(&self, app_name: &str, config: &TreeConfig) -> Result<()> {
        let file_path = self.settings_path(app_name)?;
        let json = serde_json::to_string_pretty(config)?;
        let mut file = File::create(&file_path)?;
        file.write_all(json.as_bytes())?;
        log::debug!("CoreConfigManager: Saved settings to {file_path:?}.");
        Ok(())
    }
}
