//! Configuration loading and typed config structures for the Prism host.
//!
//! The canonical configuration lives in `prism-config.yaml` at the project
//! root. Every section has serde defaults, so a partial or empty file is
//! valid. [`HostConfig::from_file`] also applies environment overrides:
//!
//! - `PRISM_SEED` overrides `world.seed`
//! - `PRISM_MAX_TICKS` overrides `world.max_ticks`
//! - `LOG_FORMAT` (`pretty` or `json`) overrides `logging.format`

use std::path::Path;

use prism_lens::{RuntimeLimits, TimeoutOverrides, runtime::DEFAULT_STEP_DT};
use prism_types::{BudgetBounds, CompatibilityRequirements, PLUGIN_API_VERSION};
use serde::Deserialize;

use crate::run_plan::{self, MIN_LENS_DURATION_MS};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level host configuration. Mirrors `prism-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HostConfig {
    /// World and room layout.
    #[serde(default)]
    pub world: WorldConfig,

    /// Lens runtime ceilings.
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// What a lens must satisfy to be loaded.
    #[serde(default)]
    pub compatibility: CompatibilityConfig,

    /// Run planning.
    #[serde(default)]
    pub run: RunConfig,

    /// Logging output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl HostConfig {
    /// Load configuration from a YAML file, then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if an override or value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string. No environment lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Override values from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a variable is set but unparsable.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Override values from any key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a value is set but unparsable.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(val) = lookup("PRISM_SEED") {
            self.world.seed = parse_u64("world.seed", &val)?;
        }
        if let Some(val) = lookup("PRISM_MAX_TICKS") {
            self.world.max_ticks = parse_u64("world.max_ticks", &val)?;
        }
        if let Some(val) = lookup("LOG_FORMAT") {
            self.logging.format = match val.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => {
                    return Err(ConfigError::Invalid {
                        field: "logging.format",
                        reason: format!("unknown format {other:?}"),
                    });
                }
            };
        }
        Ok(())
    }

    /// Check values serde cannot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.world.rooms == 0 {
            return Err(invalid("world.rooms", "must be at least 1"));
        }
        if self.world.clients_per_room == 0 {
            return Err(invalid("world.clients_per_room", "must be at least 1"));
        }
        if self.runtime.max_frame_ms == 0 {
            return Err(invalid("runtime.max_frame_ms", "must be positive"));
        }
        if !self.runtime.step_dt.is_finite() || self.runtime.step_dt < 0.0 {
            return Err(invalid("runtime.step_dt", "must be finite and non-negative"));
        }
        run_plan::check_lens_duration(self.run.lens_target_duration_ms).map_err(|e| {
            ConfigError::Invalid {
                field: "run.lens_target_duration_ms",
                reason: e.to_string(),
            }
        })?;
        Ok(())
    }

    /// Runtime ceilings for every lens, seeded from `world.seed`.
    pub const fn runtime_limits(&self) -> RuntimeLimits {
        RuntimeLimits {
            max_frame_ms: self.runtime.max_frame_ms,
            max_heap_mb: self.runtime.max_heap_mb,
            deterministic_seed: self.world.seed,
            dt: self.runtime.step_dt,
        }
    }

    /// Compatibility requirements for every lens.
    pub fn requirements(&self) -> CompatibilityRequirements {
        CompatibilityRequirements {
            api_version: self.compatibility.api_version.clone(),
            lens_id: None,
            required_capabilities: self.compatibility.required_capabilities.clone(),
            min_resource_budgets: self.compatibility.min_resource_budgets,
            max_resource_budgets: self.compatibility.max_resource_budgets,
        }
    }
}

/// World-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorldConfig {
    /// Human-readable host name.
    #[serde(default = "default_world_name")]
    pub name: String,

    /// Seed for run planning and lens randomness.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Real-time milliseconds per tick (0 = as fast as possible).
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Ticks each room runs per planned lens.
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u64,

    /// Rooms to open.
    #[serde(default = "default_rooms")]
    pub rooms: u32,

    /// Scripted clients seated in each room.
    #[serde(default = "default_clients_per_room")]
    pub clients_per_room: u32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            name: default_world_name(),
            seed: default_seed(),
            tick_interval_ms: default_tick_interval_ms(),
            max_ticks: default_max_ticks(),
            rooms: default_rooms(),
            clients_per_room: default_clients_per_room(),
        }
    }
}

/// Lens runtime ceilings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RuntimeConfig {
    /// Aggregate wall-clock ceiling for one frame.
    #[serde(default = "default_max_frame_ms")]
    pub max_frame_ms: u64,

    /// Largest heap budget a lens may declare.
    #[serde(default = "default_max_heap_mb")]
    pub max_heap_mb: u64,

    /// Seconds passed to each `update`.
    #[serde(default = "default_step_dt")]
    pub step_dt: f64,

    /// Per-phase timeout overrides.
    #[serde(default)]
    pub timeouts: TimeoutOverrides,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_frame_ms: default_max_frame_ms(),
            max_heap_mb: default_max_heap_mb(),
            step_dt: default_step_dt(),
            timeouts: TimeoutOverrides::default(),
        }
    }
}

/// Compatibility requirements applied to every lens.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompatibilityConfig {
    /// Exact plugin API version.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Capabilities every lens must declare.
    #[serde(default)]
    pub required_capabilities: Vec<String>,

    /// Lower bounds on declared budgets.
    #[serde(default)]
    pub min_resource_budgets: BudgetBounds,

    /// Upper bounds on declared budgets.
    #[serde(default)]
    pub max_resource_budgets: BudgetBounds,
}

impl Default for CompatibilityConfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            required_capabilities: Vec::new(),
            min_resource_budgets: BudgetBounds::default(),
            max_resource_budgets: BudgetBounds::default(),
        }
    }
}

/// Run planning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunConfig {
    /// Target duration of each planned lens (2 to 5 minutes).
    #[serde(default = "default_lens_target_duration_ms")]
    pub lens_target_duration_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            lens_target_duration_ms: default_lens_target_duration_ms(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_owned(),
    }
}

fn parse_u64(field: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|e| ConfigError::Invalid {
        field,
        reason: format!("{raw:?} is not an unsigned integer ({e})"),
    })
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

fn default_world_name() -> String {
    "Prism Nexus".to_owned()
}

const fn default_seed() -> u64 {
    42
}

const fn default_tick_interval_ms() -> u64 {
    50
}

const fn default_max_ticks() -> u64 {
    120
}

const fn default_rooms() -> u32 {
    1
}

const fn default_clients_per_room() -> u32 {
    2
}

const fn default_max_frame_ms() -> u64 {
    50
}

const fn default_max_heap_mb() -> u64 {
    64
}

const fn default_step_dt() -> f64 {
    DEFAULT_STEP_DT
}

fn default_api_version() -> String {
    PLUGIN_API_VERSION.to_owned()
}

const fn default_lens_target_duration_ms() -> u64 {
    MIN_LENS_DURATION_MS
}

fn default_log_level() -> String {
    "info".to_owned()
}
