//! Runtime configuration
//!
//! Defaults match the plant policy: 6 s ticks, a sort phase every 10 ticks,
//! an admissible target range of 16.0–30.0 degrees, and heating at medium
//! speed toward 22.0 degrees when a power-on omits fields. Everything here
//! can be overridden from the command line.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ClimatizarError, Result};
use crate::scheduler::types::{Mode, Speed};

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Durable store location; `None` keeps everything in memory
    pub store_path: Option<PathBuf>,
    /// Simulation step in seconds (the tick period T)
    pub tick_secs: u64,
    /// Ticks between sort phases (the effective time slice)
    pub ticks_per_sort: u64,
    /// Slices an entry may hold a contested slot before rotating out
    pub round_robin_threshold: u32,
    /// Drift (tenths of a degree) that re-engages a target-warming entry
    pub warm_promote_delta: i32,
    /// Lowest admissible target temperature (tenths of a degree)
    pub min_target_temp: i32,
    /// Highest admissible target temperature (tenths of a degree)
    pub max_target_temp: i32,
    /// Mode assumed when a power-on omits one
    pub default_mode: Mode,
    /// Speed assumed when a power-on omits one
    pub default_speed: Speed,
    /// Target assumed when a power-on omits one (tenths of a degree)
    pub default_target_temp: i32,
    /// Seconds between long-poll status samples
    pub long_poll_sample_secs: u64,
    /// Upper bound on a long-poll wait in seconds
    pub long_poll_wait_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: None,
            tick_secs: 6,
            ticks_per_sort: 10,
            round_robin_threshold: 2,
            warm_promote_delta: 10,
            min_target_temp: 160,
            max_target_temp: 300,
            default_mode: Mode::Heating,
            default_speed: Speed::Medium,
            default_target_temp: 220,
            long_poll_sample_secs: 1,
            long_poll_wait_secs: 10,
        }
    }
}

impl Config {
    /// Check internal consistency
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` when a field is zero where a positive
    /// value is required, when the target range is empty, or when the
    /// power-on default target falls outside the admissible range.
    pub fn validate(&self) -> Result<()> {
        if self.tick_secs == 0 {
            return Err(invalid("tick_secs must be positive"));
        }
        if self.ticks_per_sort == 0 {
            return Err(invalid("ticks_per_sort must be positive"));
        }
        if self.round_robin_threshold == 0 {
            return Err(invalid("round_robin_threshold must be positive"));
        }
        if self.warm_promote_delta <= 0 {
            return Err(invalid("warm_promote_delta must be positive"));
        }
        if self.min_target_temp >= self.max_target_temp {
            return Err(invalid("admissible temperature range is empty"));
        }
        if self.default_target_temp < self.min_target_temp
            || self.default_target_temp > self.max_target_temp
        {
            return Err(invalid("default target temperature is out of range"));
        }
        if self.long_poll_sample_secs == 0 {
            return Err(invalid("long_poll_sample_secs must be positive"));
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> ClimatizarError {
    ClimatizarError::InvalidParameter {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_zero_tick_rejected() {
        let cfg = Config {
            tick_secs: 0,
            ..Config::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ClimatizarError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_empty_range_rejected() {
        let cfg = Config {
            min_target_temp: 300,
            max_target_temp: 160,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_default_target_must_be_admissible() {
        let cfg = Config {
            default_target_temp: 400,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }
}
