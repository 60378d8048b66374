use crate::error::ConfigurationError;
use nback_core::{Level, Rgba, WHITE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters shared by every level of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub sequence_length: usize,
    pub forced_matches: usize,
    pub stimulus_duration_ms: u64,
    pub blank_duration_ms: u64,
    pub settle_duration_ms: u64,
    pub poll_interval_ms: u64,
    pub foreground: Rgba,
    pub blank_symbol: String,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            sequence_length: 48,
            forced_matches: 8,
            stimulus_duration_ms: 500,
            blank_duration_ms: 500,
            settle_duration_ms: 3000,
            poll_interval_ms: 1,
            foreground: WHITE,
            blank_symbol: "#".to_string(),
        }
    }
}

impl ExperimentConfig {
    pub fn test_configuration(&self, level: Level) -> Result<TestConfiguration, ConfigurationError> {
        TestConfiguration::new(level, self.sequence_length, self.forced_matches)
    }

    pub fn stimulus_duration(&self) -> Duration {
        Duration::from_millis(self.stimulus_duration_ms)
    }

    pub fn blank_duration(&self) -> Duration {
        Duration::from_millis(self.blank_duration_ms)
    }

    pub fn settle_duration(&self) -> Duration {
        Duration::from_millis(self.settle_duration_ms)
    }

    /// Upper bound on a single input wait. Zero would spin without yielding.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// The level-specific contract a generated sequence must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestConfiguration {
    pub level: Level,
    pub sequence_length: usize,
    pub forced_match_count: usize,
}

impl TestConfiguration {
    pub fn new(
        level: Level,
        sequence_length: usize,
        forced_match_count: usize,
    ) -> Result<Self, ConfigurationError> {
        let config = Self {
            level,
            sequence_length,
            forced_match_count,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn lag(&self) -> usize {
        self.level.lag()
    }

    /// Positions that have a predecessor `lag` steps back, or every
    /// position for zero-back.
    pub fn available_positions(&self) -> usize {
        self.sequence_length.saturating_sub(self.lag())
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.sequence_length == 0 {
            return Err(ConfigurationError::EmptySequence);
        }
        let available = self.available_positions();
        if self.forced_match_count > available {
            return Err(ConfigurationError::TooManyForcedMatches {
                requested: self.forced_match_count,
                available,
                lag: self.lag(),
            });
        }
        Ok(())
    }
}
