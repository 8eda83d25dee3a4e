//! Main application configuration
//!
//! This module defines the primary configuration structures for a ranking
//! run, including TOML file loading, environment variable overrides and
//! validation.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::rating::carry_forward::CarryForwardMode;
use crate::session::{EngineKind, PeriodConfig};
use crate::utils::parse_compact_date;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub period: PeriodSettings,
    pub input: InputSettings,
    pub engine: EngineSettings,
    /// Numerical tuning for the rating engines
    pub tuning: PeriodConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// The date range being ranked
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeriodSettings {
    /// First day of the period, compact `YYYYMMDD`
    pub start: String,
    /// Last day of the period, compact `YYYYMMDD`
    pub end: String,
    /// Free-form note printed on the ranking report
    pub notes: Option<String>,
    /// Rank only teams meeting the activity requirements
    pub only_active: bool,
}

/// Input file locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputSettings {
    /// Game results file, one `YYYYMMDD,home,score,away,score` line per game
    pub games_file: PathBuf,
    /// Optional roster of team names to register before ingest
    pub roster_file: Option<PathBuf>,
    /// Optional list of teams on hiatus this period
    pub hiatus_file: Option<PathBuf>,
    /// Optional list of disbanded teams
    pub disbanded_file: Option<PathBuf>,
    /// Published snapshot history, read for carry-forward and extended on
    /// request
    pub history_file: Option<PathBuf>,
}

/// Engine selection and per-team overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Which rating engine runs the solve
    pub engine: EngineKind,
    /// How the previous period's powers feed this one
    pub carry_forward: CarryForwardMode,
    /// Starting powers forced before the solve, team name to power
    pub seed_overrides: BTreeMap<String, f64>,
    /// Anchor powers for subordinate regions, keyed by the region's top
    /// team; regions without a pin fall back to the operator prompt
    pub anchor_pins: BTreeMap<String, f64>,
    /// Per-team activity requirement overrides
    pub activity_overrides: BTreeMap<String, ActivityOverride>,
}

/// Replacement activity requirements for one team
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ActivityOverride {
    pub min_games: u32,
    pub min_opponents: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "power-rank".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for PeriodSettings {
    fn default() -> Self {
        Self {
            start: String::new(),
            end: String::new(),
            notes: None,
            only_active: true,
        }
    }
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            games_file: PathBuf::from("games.csv"),
            roster_file: None,
            hiatus_file: None,
            disbanded_file: None,
            history_file: None,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            engine: EngineKind::default(),
            carry_forward: CarryForwardMode::default(),
            seed_overrides: BTreeMap::new(),
            anchor_pins: BTreeMap::new(),
            activity_overrides: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file and validate it
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from environment variables with fallback to
    /// defaults. Validation is left to the caller so command-line
    /// overrides can complete the configuration first.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            config.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.service.log_level = log_level;
        }

        // Period settings
        if let Ok(start) = env::var("PERIOD_START") {
            config.period.start = start;
        }
        if let Ok(end) = env::var("PERIOD_END") {
            config.period.end = end;
        }
        if let Ok(notes) = env::var("PERIOD_NOTES") {
            config.period.notes = Some(notes);
        }
        if let Ok(only_active) = env::var("ONLY_ACTIVE") {
            config.period.only_active = only_active
                .parse()
                .map_err(|_| anyhow!("Invalid ONLY_ACTIVE value: {}", only_active))?;
        }

        // Input settings
        if let Ok(games) = env::var("GAMES_FILE") {
            config.input.games_file = PathBuf::from(games);
        }
        if let Ok(roster) = env::var("ROSTER_FILE") {
            config.input.roster_file = Some(PathBuf::from(roster));
        }
        if let Ok(hiatus) = env::var("HIATUS_FILE") {
            config.input.hiatus_file = Some(PathBuf::from(hiatus));
        }
        if let Ok(disbanded) = env::var("DISBANDED_FILE") {
            config.input.disbanded_file = Some(PathBuf::from(disbanded));
        }
        if let Ok(history) = env::var("HISTORY_FILE") {
            config.input.history_file = Some(PathBuf::from(history));
        }

        // Engine settings
        if let Ok(engine) = env::var("ENGINE") {
            config.engine.engine = match engine.to_lowercase().as_str() {
                "regression" => EngineKind::Regression,
                "iterative" => EngineKind::Iterative,
                _ => return Err(anyhow!("Invalid ENGINE value: {}", engine)),
            };
        }
        if let Ok(mode) = env::var("CARRY_FORWARD") {
            config.engine.carry_forward = match mode.to_lowercase().as_str() {
                "disabled" => CarryForwardMode::Disabled,
                "reseed" => CarryForwardMode::Reseed,
                "incremental" => CarryForwardMode::Incremental,
                _ => return Err(anyhow!("Invalid CARRY_FORWARD value: {}", mode)),
            };
        }

        Ok(config)
    }

    /// Period start as a real date
    pub fn period_start(&self) -> Result<chrono::NaiveDate> {
        parse_compact_date(&self.period.start).context("period start")
    }

    /// Period end as a real date
    pub fn period_end(&self) -> Result<chrono::NaiveDate> {
        parse_compact_date(&self.period.end).context("period end")
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.name.is_empty() {
        return Err(anyhow!("Service name cannot be empty"));
    }

    // Validate the period dates
    let start = config.period_start()?;
    let end = config.period_end()?;
    if start > end {
        return Err(anyhow!(
            "Period start {} is after period end {}",
            config.period.start,
            config.period.end
        ));
    }

    // Validate input files
    if config.input.games_file.as_os_str().is_empty() {
        return Err(anyhow!("Games file cannot be empty"));
    }

    // Validate engine selection
    if config.engine.carry_forward == CarryForwardMode::Incremental {
        if config.engine.engine == EngineKind::Iterative {
            return Err(anyhow!(
                "Incremental carry-forward only works with the regression engine"
            ));
        }
        if config.input.history_file.is_none() {
            return Err(anyhow!("Incremental carry-forward requires a history file"));
        }
    }
    for (name, power) in &config.engine.seed_overrides {
        if !power.is_finite() {
            return Err(anyhow!("Seed override for {} is not finite", name));
        }
    }
    for (name, power) in &config.engine.anchor_pins {
        if !power.is_finite() {
            return Err(anyhow!("Anchor pin for {} is not finite", name));
        }
    }

    config.tuning.validate()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.period.start = "20180301".to_string();
        config.period.end = "20180425".to_string();
        config
    }

    #[test]
    fn test_default_config_validates_with_period() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_period_fails() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_inverted_period_fails() {
        let mut config = valid_config();
        config.period.start = "20180501".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("after period end"));
    }

    #[test]
    fn test_invalid_log_level_fails() {
        let mut config = valid_config();
        config.service.log_level = "verbose".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_incremental_iterative_combination_rejected() {
        let mut config = valid_config();
        config.engine.engine = EngineKind::Iterative;
        config.engine.carry_forward = CarryForwardMode::Incremental;
        config.input.history_file = Some(PathBuf::from("history.json"));
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("regression engine"));
    }

    #[test]
    fn test_incremental_requires_history_file() {
        let mut config = valid_config();
        config.engine.carry_forward = CarryForwardMode::Incremental;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("history file"));
    }

    #[test]
    fn test_non_finite_override_rejected() {
        let mut config = valid_config();
        config
            .engine
            .seed_overrides
            .insert("Reds".to_string(), f64::NAN);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let raw = r#"
            [period]
            start = "20180301"
            end = "20180425"

            [engine]
            engine = "iterative"
        "#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.engine.engine, EngineKind::Iterative);
        assert_eq!(config.engine.carry_forward, CarryForwardMode::Disabled);
        assert_eq!(config.service.log_level, "info");
        assert_eq!(config.input.games_file, PathBuf::from("games.csv"));
        assert_eq!(config.tuning.regression.default_power, 700.0);
    }

    #[test]
    fn test_toml_overrides_and_maps() {
        let raw = r#"
            [service]
            log_level = "debug"

            [period]
            start = "20180301"
            end = "20180425"
            notes = "spring season"
            only_active = false

            [input]
            games_file = "season.csv"
            history_file = "history.json"

            [engine]
            carry_forward = "reseed"

            [engine.seed_overrides]
            "Reds" = 1020.0

            [engine.anchor_pins]
            "Islanders" = 650.0

            [engine.activity_overrides.Casuals]
            min_games = 2
            min_opponents = 1

            [tuning.regression]
            default_power = 650.0
        "#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.period.notes.as_deref(), Some("spring season"));
        assert!(!config.period.only_active);
        assert_eq!(config.engine.carry_forward, CarryForwardMode::Reseed);
        assert_eq!(config.engine.seed_overrides["Reds"], 1020.0);
        assert_eq!(config.engine.anchor_pins["Islanders"], 650.0);
        assert_eq!(config.engine.activity_overrides["Casuals"].min_games, 2);
        assert_eq!(config.tuning.regression.default_power, 650.0);
    }

    #[test]
    fn test_period_date_accessors() {
        let config = valid_config();
        let start = config.period_start().unwrap();
        let end = config.period_end().unwrap();
        assert_eq!((end - start).num_days(), 55);
    }
}
