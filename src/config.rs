use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DrillConfig {
    pub session: SessionConfig,
    pub readiness: ReadinessConfig,
    pub grace: GraceConfig,
    pub scoring: ScoringConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    /// Number of repeats in one session
    #[serde(default = "default_repeats")]
    pub repeats: u32,

    /// Pause between repeats in seconds
    #[serde(default = "default_pause_seconds")]
    pub pause_seconds: f64,

    /// Lower bound of the random start delay in seconds
    #[serde(default = "default_delay_min_seconds")]
    pub delay_min_seconds: f64,

    /// Upper bound (inclusive) of the random start delay in seconds
    #[serde(default = "default_delay_max_seconds")]
    pub delay_max_seconds: f64,

    /// Engine tick interval in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Active time after which a repeat is stopped automatically
    #[serde(default = "default_max_drill_duration_seconds")]
    pub max_drill_duration_seconds: f64,

    /// Arm the next repeat as soon as every device reports ready after a pause
    #[serde(default = "default_auto_advance")]
    pub auto_advance: bool,

    /// Drill mode forwarded to the targets (ipsc, idpa, cqb)
    #[serde(default = "default_mode")]
    pub mode: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReadinessConfig {
    /// How long to wait for every device to acknowledge ready
    #[serde(default = "default_readiness_timeout_seconds")]
    pub timeout_seconds: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GraceConfig {
    /// Window kept open after a stop for shots already in flight
    #[serde(default = "default_grace_duration_seconds")]
    pub duration_seconds: f64,

    /// Upper bound on waiting for the finalize step once grace has elapsed
    #[serde(default = "default_finalize_max_wait_ms")]
    pub finalize_max_wait_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScoringRuleKind {
    /// Every shot counts
    Sum,
    /// Best N shots per target, no-shoots always counted, missed targets penalised
    BestPerTarget,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScoringConfig {
    #[serde(default = "default_scoring_rule")]
    pub rule: ScoringRuleKind,

    /// Shots kept per target by the best-per-target rule
    #[serde(default = "default_best_n")]
    pub best_n: usize,

    /// Points deducted for each expected target without a hit
    #[serde(default = "default_missed_target_penalty")]
    pub missed_target_penalty: i32,

    /// Points for a single referee penalty (PE)
    #[serde(default = "default_penalty_points")]
    pub penalty_points: i32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl DrillConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("drill.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("session.repeats", default_repeats() as i64)?
            .set_default("session.pause_seconds", default_pause_seconds())?
            .set_default("session.delay_min_seconds", default_delay_min_seconds())?
            .set_default("session.delay_max_seconds", default_delay_max_seconds())?
            .set_default("session.tick_interval_ms", default_tick_interval_ms() as i64)?
            .set_default(
                "session.max_drill_duration_seconds",
                default_max_drill_duration_seconds(),
            )?
            .set_default("session.auto_advance", default_auto_advance())?
            .set_default("session.mode", default_mode())?
            .set_default(
                "readiness.timeout_seconds",
                default_readiness_timeout_seconds(),
            )?
            .set_default("grace.duration_seconds", default_grace_duration_seconds())?
            .set_default(
                "grace.finalize_max_wait_ms",
                default_finalize_max_wait_ms() as i64,
            )?
            .set_default("scoring.rule", "sum")?
            .set_default("scoring.best_n", default_best_n() as i64)?
            .set_default(
                "scoring.missed_target_penalty",
                default_missed_target_penalty() as i64,
            )?
            .set_default("scoring.penalty_points", default_penalty_points() as i64)?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // DRILL_SESSION__PAUSE_SECONDS=8 overrides session.pause_seconds
            .add_source(
                Environment::with_prefix("DRILL")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: DrillConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Render as TOML, e.g. for `--print-config`
    pub fn to_toml(&self) -> crate::error::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.repeats == 0 {
            return Err(ConfigError::Message(
                "Session repeats must be greater than 0".to_string(),
            ));
        }

        check_seconds("session.pause_seconds", self.session.pause_seconds, true)?;
        check_seconds(
            "session.delay_min_seconds",
            self.session.delay_min_seconds,
            true,
        )?;
        check_seconds(
            "session.delay_max_seconds",
            self.session.delay_max_seconds,
            true,
        )?;

        if self.session.delay_max_seconds < self.session.delay_min_seconds {
            return Err(ConfigError::Message(
                "Start delay range must satisfy 0 <= delay_min_seconds <= delay_max_seconds"
                    .to_string(),
            ));
        }

        if self.session.tick_interval_ms == 0 || self.session.tick_interval_ms as f64 > MAX_SECONDS * 1000.0 {
            return Err(ConfigError::Message(format!(
                "Tick interval must be between 1 and {} ms",
                MAX_SECONDS * 1000.0
            )));
        }

        check_seconds(
            "session.max_drill_duration_seconds",
            self.session.max_drill_duration_seconds,
            false,
        )?;
        check_seconds(
            "readiness.timeout_seconds",
            self.readiness.timeout_seconds,
            false,
        )?;
        check_seconds("grace.duration_seconds", self.grace.duration_seconds, true)?;

        if self.grace.finalize_max_wait_ms == 0 || self.grace.finalize_max_wait_ms as f64 > MAX_SECONDS * 1000.0 {
            return Err(ConfigError::Message(format!(
                "Finalize max wait must be between 1 and {} ms",
                MAX_SECONDS * 1000.0
            )));
        }

        if self.scoring.rule == ScoringRuleKind::BestPerTarget && self.scoring.best_n == 0 {
            return Err(ConfigError::Message(
                "Scoring best_n must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Longest span, in seconds, any timing option or start delay may take
pub const MAX_SECONDS: f64 = 86_400.0;

/// Reject NaN, infinite, negative and out-of-range second values before they
/// reach `Duration::from_secs_f64`
fn check_seconds(name: &str, value: f64, allow_zero: bool) -> Result<(), ConfigError> {
    let in_range = value.is_finite()
        && value <= MAX_SECONDS
        && if allow_zero { value >= 0.0 } else { value > 0.0 };

    if !in_range {
        let lower = if allow_zero { "0 <=" } else { "0 <" };
        return Err(ConfigError::Message(format!(
            "{} must satisfy {} value <= {}, got {}",
            name, lower, MAX_SECONDS, value
        )));
    }
    Ok(())
}

impl SessionConfig {
    pub fn pause(&self) -> Duration {
        Duration::from_secs_f64(self.pause_seconds)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn max_drill_duration(&self) -> Duration {
        Duration::from_secs_f64(self.max_drill_duration_seconds)
    }
}

impl ReadinessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_seconds)
    }
}

impl GraceConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_seconds)
    }

    pub fn finalize_max_wait(&self) -> Duration {
        Duration::from_millis(self.finalize_max_wait_ms)
    }
}

impl Default for DrillConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig {
                repeats: default_repeats(),
                pause_seconds: default_pause_seconds(),
                delay_min_seconds: default_delay_min_seconds(),
                delay_max_seconds: default_delay_max_seconds(),
                tick_interval_ms: default_tick_interval_ms(),
                max_drill_duration_seconds: default_max_drill_duration_seconds(),
                auto_advance: default_auto_advance(),
                mode: default_mode(),
            },
            readiness: ReadinessConfig {
                timeout_seconds: default_readiness_timeout_seconds(),
            },
            grace: GraceConfig {
                duration_seconds: default_grace_duration_seconds(),
                finalize_max_wait_ms: default_finalize_max_wait_ms(),
            },
            scoring: ScoringConfig {
                rule: default_scoring_rule(),
                best_n: default_best_n(),
                missed_target_penalty: default_missed_target_penalty(),
                penalty_points: default_penalty_points(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

// Default value functions
fn default_repeats() -> u32 {
    1
}
fn default_pause_seconds() -> f64 {
    5.0
}
fn default_delay_min_seconds() -> f64 {
    2.0
}
fn default_delay_max_seconds() -> f64 {
    6.0
}
fn default_tick_interval_ms() -> u64 {
    50
}
fn default_max_drill_duration_seconds() -> f64 {
    300.0
}
fn default_auto_advance() -> bool {
    true
}
fn default_mode() -> String {
    "ipsc".to_string()
}

fn default_readiness_timeout_seconds() -> f64 {
    10.0
}

fn default_grace_duration_seconds() -> f64 {
    3.0
}
fn default_finalize_max_wait_ms() -> u64 {
    2000
}

fn default_scoring_rule() -> ScoringRuleKind {
    ScoringRuleKind::Sum
}
fn default_best_n() -> usize {
    2
}
fn default_missed_target_penalty() -> i32 {
    10
}
fn default_penalty_points() -> i32 {
    10
}

fn default_event_bus_capacity() -> usize {
    256
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = DrillConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.session.tick_interval(), Duration::from_millis(50));
        assert_eq!(config.grace.duration(), Duration::from_secs(3));
        assert_eq!(config.readiness.timeout(), Duration::from_secs(10));
        assert_eq!(config.scoring.rule, ScoringRuleKind::Sum);
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[session]
repeats = 3
pause_seconds = 8.0

[scoring]
rule = "best_per_target"
"#
        )
        .unwrap();

        let config = DrillConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.session.repeats, 3);
        assert_eq!(config.session.pause_seconds, 8.0);
        assert_eq!(config.session.tick_interval_ms, 50);
        assert_eq!(config.scoring.rule, ScoringRuleKind::BestPerTarget);
        assert_eq!(config.scoring.best_n, 2);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = DrillConfig::load_from_file("does-not-exist.toml").unwrap();
        assert_eq!(config.session.repeats, 1);
        assert_eq!(config.grace.finalize_max_wait_ms, 2000);
    }

    #[test]
    fn test_config_validation() {
        let mut config = DrillConfig::default();

        config.session.delay_min_seconds = 6.0;
        config.session.delay_max_seconds = 2.0;
        assert!(config.validate().is_err());

        config.session.delay_max_seconds = 6.0;
        assert!(config.validate().is_ok());

        config.session.repeats = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_finite_seconds_rejected() {
        let mut config = DrillConfig::default();
        config.session.max_drill_duration_seconds = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = DrillConfig::default();
        config.readiness.timeout_seconds = f64::INFINITY;
        assert!(config.validate().is_err());

        let mut config = DrillConfig::default();
        config.grace.duration_seconds = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = DrillConfig::default();
        config.session.pause_seconds = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = DrillConfig::default();
        config.session.delay_min_seconds = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = DrillConfig::default();
        config.session.delay_max_seconds = f64::INFINITY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_seconds_rejected() {
        let mut config = DrillConfig::default();
        config.session.max_drill_duration_seconds = 1e20;
        assert!(config.validate().is_err());

        config.session.max_drill_duration_seconds = MAX_SECONDS;
        assert!(config.validate().is_ok());

        config.grace.finalize_max_wait_ms = u64::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nan_from_toml_file_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[grace]
duration_seconds = nan
"#
        )
        .unwrap();

        let config = DrillConfig::load_from_file(file.path()).unwrap();
        assert!(config.grace.duration_seconds.is_nan());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_config_renders_as_toml() {
        let rendered = DrillConfig::default().to_toml().unwrap();
        assert!(rendered.contains("[session]"));
        assert!(rendered.contains("rule = \"sum\""));

        let parsed: DrillConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.session.repeats, 1);
    }
}
