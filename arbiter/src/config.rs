//! Arbiter configuration.
//!
//! Precedence: `ARBITER_*` environment variables > TOML file > defaults.
//!
//! ```toml
//! [selection]
//! threshold_percent = 90
//! enhanced_enabled = false
//!
//! [dedup]
//! jaccard_threshold = 0.88
//! second_language = "italian"
//!
//! [breaker]
//! failure_threshold = 3
//! recovery_timeout_secs = 120
//!
//! [judge]
//! timeout_seconds = 90
//! max_concurrency = 4
//!
//! [escalation]
//! attempts_budget = 2
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dedup::{DedupConfig, StopwordLanguage};
use crate::escalation::EscalationConfig;
use crate::resilience::CircuitBreakerConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("environment variable {var}={value:?} is not valid")]
    InvalidEnv { var: String, value: String },

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Minimum pass rate, in percent, for a candidate to be acceptable.
    pub threshold_percent: f64,
    /// Consult the advisor for borderline ties.
    pub enhanced_enabled: bool,
    /// Seed for the random tie-break; entropy when unset.
    pub tie_break_seed: Option<u64>,
    pub advisor_timeout_secs: u64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            threshold_percent: 90.0,
            enhanced_enabled: false,
            tie_break_seed: None,
            advisor_timeout_secs: 60,
        }
    }
}

impl SelectionConfig {
    pub fn threshold_ratio(&self) -> f64 {
        self.threshold_percent / 100.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    /// Deadline for one judge call.
    pub timeout_seconds: u64,
    /// Concurrent judge calls per attempt.
    pub max_concurrency: usize,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 90,
            max_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Test assertions requested from the test producer per attempt.
    pub test_count: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self { test_count: 10 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterConfig {
    pub selection: SelectionConfig,
    pub dedup: DedupConfig,
    pub breaker: CircuitBreakerConfig,
    pub judge: JudgeConfig,
    pub escalation: EscalationConfig,
    pub generation: GenerationConfig,
}

impl ArbiterConfig {
    /// Defaults, overlaid with `path` (if given), overlaid with the process
    /// environment; validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env_from(|k| std::env::var(k).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `ARBITER_*` overrides read through `lookup`.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };

        env.set("ARBITER_THRESHOLD_PERCENT", &mut self.selection.threshold_percent)?;
        env.set_bool("ARBITER_ENHANCED_ENABLED", &mut self.selection.enhanced_enabled)?;
        if let Some(seed) = env.parse::<u64>("ARBITER_TIE_BREAK_SEED")? {
            self.selection.tie_break_seed = Some(seed);
        }
        env.set("ARBITER_ADVISOR_TIMEOUT_SECS", &mut self.selection.advisor_timeout_secs)?;

        env.set("ARBITER_DEDUP_LENGTH_RATIO", &mut self.dedup.length_ratio_threshold)?;
        env.set("ARBITER_DEDUP_JACCARD", &mut self.dedup.jaccard_threshold)?;
        env.set("ARBITER_DEDUP_SEQUENCE", &mut self.dedup.sequence_threshold)?;
        env.set_bool("ARBITER_DEDUP_GUARD_LITERALS", &mut self.dedup.guard_literals)?;
        if let Some(raw) = env.raw("ARBITER_DEDUP_LANGUAGE") {
            self.dedup.second_language = parse_language(&raw).ok_or(ConfigError::InvalidEnv {
                var: "ARBITER_DEDUP_LANGUAGE".to_string(),
                value: raw,
            })?;
        }

        env.set("ARBITER_BREAKER_FAILURE_THRESHOLD", &mut self.breaker.failure_threshold)?;
        env.set("ARBITER_BREAKER_RECOVERY_SECS", &mut self.breaker.recovery_timeout_secs)?;
        env.set("ARBITER_JUDGE_TIMEOUT_SECS", &mut self.judge.timeout_seconds)?;
        env.set("ARBITER_JUDGE_MAX_CONCURRENCY", &mut self.judge.max_concurrency)?;
        env.set("ARBITER_ATTEMPTS_BUDGET", &mut self.escalation.attempts_budget)?;
        env.set("ARBITER_TEST_COUNT", &mut self.generation.test_count)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = self.selection.threshold_percent;
        if !(t > 0.0 && t <= 100.0) {
            return Err(invalid("selection.threshold_percent", "must be in (0, 100]"));
        }
        for (field, value) in [
            ("dedup.length_ratio_threshold", self.dedup.length_ratio_threshold),
            ("dedup.jaccard_threshold", self.dedup.jaccard_threshold),
            ("dedup.sequence_threshold", self.dedup.sequence_threshold),
            ("dedup.jaccard_margin", self.dedup.jaccard_margin),
            ("dedup.sequence_margin", self.dedup.sequence_margin),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(field, "must be in [0, 1]"));
            }
        }
        if self.dedup.longer_preference_ratio < 0.0 {
            return Err(invalid("dedup.longer_preference_ratio", "must be non-negative"));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(invalid("breaker.failure_threshold", "must be at least 1"));
        }
        if self.judge.timeout_seconds == 0 {
            return Err(invalid("judge.timeout_seconds", "must be at least 1"));
        }
        if self.judge.max_concurrency == 0 {
            return Err(invalid("judge.max_concurrency", "must be at least 1"));
        }
        if self.selection.advisor_timeout_secs == 0 {
            return Err(invalid("selection.advisor_timeout_secs", "must be at least 1"));
        }
        if self.generation.test_count == 0 {
            return Err(invalid("generation.test_count", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

fn parse_language(raw: &str) -> Option<StopwordLanguage> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "italian" | "it" => Some(StopwordLanguage::Italian),
        "spanish" | "es" => Some(StopwordLanguage::Spanish),
        "french" | "fr" => Some(StopwordLanguage::French),
        "german" | "de" => Some(StopwordLanguage::German),
        _ => None,
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn raw(&self, var: &str) -> Option<String> {
        (self.lookup)(var).filter(|v| !v.trim().is_empty())
    }

    fn parse<T: FromStr>(&self, var: &str) -> Result<Option<T>, ConfigError> {
        match self.raw(var) {
            None => Ok(None),
            Some(value) => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::InvalidEnv {
                    var: var.to_string(),
                    value,
                }),
        }
    }

    fn set<T: FromStr>(&self, var: &str, slot: &mut T) -> Result<(), ConfigError> {
        if let Some(v) = self.parse(var)? {
            *slot = v;
        }
        Ok(())
    }

    /// Accepts 1/true/yes and 0/false/no, case-insensitive.
    fn set_bool(&self, var: &str, slot: &mut bool) -> Result<(), ConfigError> {
        let Some(value) = self.raw(var) else {
            return Ok(());
        };
        *slot = match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => {
                return Err(ConfigError::InvalidEnv {
                    var: var.to_string(),
                    value,
                })
            }
        };
        Ok(())
    }
}
