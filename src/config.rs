use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::models::{DocumentType, PolicyOverride, ReconcilePolicy};
use crate::services::scan_engine::EngineSettings;
use crate::services::zone_ranker::ZoneSettings;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_COMPLETION_COOLDOWN_MS: u64 = 1000;
const DEFAULT_AUTO_ADVANCE_DELAY_MS: u64 = 800;
const DEFAULT_GUIDANCE_LIMIT: usize = 3;
const DEFAULT_SYNC_QUEUE_CAPACITY: usize = 10_000;
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Placement zone inference tunables
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ZoneConfig {
    /// Number of scanned cells remembered
    #[serde(default = "default_history_capacity")]
    #[validate(range(min = 1, max = 100))]
    pub history_capacity: usize,

    /// Recent entries the zone mode is taken over
    #[serde(default = "default_mode_window")]
    #[validate(range(min = 1, max = 100))]
    pub mode_window: usize,

    /// History length before the mode is used instead of the last scan
    #[serde(default = "default_min_entries")]
    #[validate(range(min = 1, max = 100))]
    pub min_entries: usize,

    /// Distance assigned to cells in different zones
    #[serde(default = "default_cross_zone_distance")]
    pub cross_zone_distance: u32,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            mode_window: default_mode_window(),
            min_entries: default_min_entries(),
            cross_zone_distance: default_cross_zone_distance(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Cooldown after a scan completes a line, in milliseconds
    #[serde(default = "default_completion_cooldown_ms")]
    #[validate(range(max = 60000))]
    pub completion_cooldown_ms: u64,

    /// Delay before a filled route step advances by itself, in milliseconds
    #[serde(default = "default_auto_advance_delay_ms")]
    #[validate(range(max = 60000))]
    pub auto_advance_delay_ms: u64,

    /// Placement zone tracking
    #[serde(default)]
    #[validate]
    pub zone: ZoneConfig,

    /// Pending product names returned with an unresolved scan
    #[serde(default = "default_guidance_limit")]
    #[validate(range(min = 1, max = 50))]
    pub guidance_limit: usize,

    /// Bound of the in-memory sync queue
    #[serde(default = "default_sync_queue_capacity")]
    #[validate(range(min = 1))]
    pub sync_queue_capacity: usize,

    /// Event channel capacity
    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,

    /// Create the placement document when a receiving document completes
    #[serde(default = "default_true_bool")]
    pub auto_create_follow_on: bool,

    /// Directory of exported plans (`<dir>/<type>/<id>.json`)
    #[serde(default)]
    pub plan_dir: Option<PathBuf>,

    /// Fall back to built-in demo plans when no other source has a document
    #[serde(default = "default_true_bool")]
    pub demo_fallback: bool,

    /// Per document type policy overrides
    #[serde(default)]
    pub policies: HashMap<DocumentType, PolicyOverride>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            completion_cooldown_ms: default_completion_cooldown_ms(),
            auto_advance_delay_ms: default_auto_advance_delay_ms(),
            zone: ZoneConfig::default(),
            guidance_limit: default_guidance_limit(),
            sync_queue_capacity: default_sync_queue_capacity(),
            event_channel_capacity: default_event_channel_capacity(),
            auto_create_follow_on: true,
            plan_dir: None,
            demo_fallback: true,
            policies: HashMap::new(),
        }
    }
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn completion_cooldown(&self) -> Duration {
        Duration::from_millis(self.completion_cooldown_ms)
    }

    pub fn auto_advance_delay(&self) -> Duration {
        Duration::from_millis(self.auto_advance_delay_ms)
    }

    pub fn zone_settings(&self) -> ZoneSettings {
        ZoneSettings {
            history_capacity: self.zone.history_capacity,
            mode_window: self.zone.mode_window,
            min_entries: self.zone.min_entries,
            cross_zone_distance: self.zone.cross_zone_distance,
        }
    }

    /// Built-in policy matrix with configured overrides applied.
    pub fn policy_for(&self, doc_type: DocumentType) -> ReconcilePolicy {
        let base = ReconcilePolicy::for_type(doc_type);
        match self.policies.get(&doc_type) {
            Some(overrides) => base.with_overrides(overrides),
            None => base,
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            completion_cooldown: self.completion_cooldown(),
            guidance_limit: self.guidance_limit,
            zone: self.zone_settings(),
            policies: <DocumentType as strum::IntoEnumIterator>::iter()
                .map(|doc_type| (doc_type, self.policy_for(doc_type)))
                .collect(),
        }
    }

    /// Cross-field checks not expressible as field attributes
    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.zone.mode_window > self.zone.history_capacity {
            let mut err = ValidationError::new("zone_mode_window");
            err.message = Some("zone.mode_window must not exceed zone.history_capacity".into());
            errors.add("zone", err);
        }

        if self.zone.min_entries > self.zone.history_capacity {
            let mut err = ValidationError::new("zone_min_entries");
            err.message = Some("zone.min_entries must not exceed zone.history_capacity".into());
            errors.add("zone", err);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Default value functions
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_completion_cooldown_ms() -> u64 {
    DEFAULT_COMPLETION_COOLDOWN_MS
}

fn default_auto_advance_delay_ms() -> u64 {
    DEFAULT_AUTO_ADVANCE_DELAY_MS
}

fn default_history_capacity() -> usize {
    10
}

fn default_mode_window() -> usize {
    5
}

fn default_min_entries() -> usize {
    3
}

fn default_cross_zone_distance() -> u32 {
    100
}

fn default_guidance_limit() -> usize {
    DEFAULT_GUIDANCE_LIMIT
}

fn default_sync_queue_capacity() -> usize {
    DEFAULT_SYNC_QUEUE_CAPACITY
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

fn default_true_bool() -> bool {
    true
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("stateset_warehouse={},scan_replay={}", level, level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    load_config_from(Path::new(CONFIG_DIR), &run_env)
}

/// Same as [`load_config`] with an explicit config directory and profile.
pub fn load_config_from(config_dir: &Path, run_env: &str) -> Result<AppConfig, AppConfigError> {
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let config = Config::builder()
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("completion_cooldown_ms", DEFAULT_COMPLETION_COOLDOWN_MS)?
        .set_default("auto_advance_delay_ms", DEFAULT_AUTO_ADVANCE_DELAY_MS)?
        .add_source(File::with_name(&config_dir.join("default").to_string_lossy()).required(false))
        .add_source(File::with_name(&config_dir.join(run_env).to_string_lossy()).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CellScope, SurplusPolicy};
    use assert_matches::assert_matches;
    use std::fs;

    #[test]
    fn defaults_match_reference_timings() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.completion_cooldown(), Duration::from_millis(1000));
        assert_eq!(cfg.auto_advance_delay(), Duration::from_millis(800));
        assert_eq!(cfg.zone_settings(), ZoneSettings::default());
        assert!(cfg.validate().is_ok());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn loads_layered_files_with_policy_overrides() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            r#"
log_level = "debug"
guidance_limit = 5

[policies.receiving]
surplus = "allow"
"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("staging.toml"),
            r#"
auto_advance_delay_ms = 500

[zone]
history_capacity = 8
"#,
        )
        .unwrap();

        let cfg = load_config_from(dir.path(), "staging").unwrap();
        assert_eq!(cfg.environment, "staging");
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.guidance_limit, 5);
        assert_eq!(cfg.auto_advance_delay_ms, 500);
        assert_eq!(cfg.zone.history_capacity, 8);
        assert_eq!(cfg.zone.mode_window, 5);

        let receiving = cfg.policy_for(DocumentType::Receiving);
        assert_eq!(receiving.surplus, SurplusPolicy::Allow);
        assert_eq!(
            cfg.policy_for(DocumentType::Inventory).cell_scope,
            CellScope::RequireActiveCell
        );
        assert_eq!(
            cfg.engine_settings().policy_for(DocumentType::Receiving),
            receiving
        );
    }

    #[test]
    fn rejects_invalid_log_level() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("default.toml"), "log_level = \"loud\"\n").unwrap();
        assert_matches!(
            load_config_from(dir.path(), "test"),
            Err(AppConfigError::Validation(_))
        );
    }

    #[test]
    fn rejects_window_larger_than_history() {
        let mut cfg = AppConfig::default();
        cfg.zone.mode_window = 20;
        assert!(cfg.validate_additional_constraints().is_err());
    }
}
