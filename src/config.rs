//! Configuration loading for the channel simulator.

use serde::Deserialize;
use std::path::Path;

use crate::simulation::attenuation::AttenuationModel;

/// Tunables of the contention model. Every field has a default matching the
/// reference deployment, so a TOML file only needs to name what it changes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SimulationConfig {
    /// Sub-steps one outer simulation step is divided into.
    pub sub_steps_per_step: u64,
    /// Outer-step duration in milliseconds; one tick lasts
    /// `step_interval_ms / sub_steps_per_step`. A non-positive value falls
    /// back to a 2 ms tick.
    pub step_interval_ms: f64,
    /// Fixed receive-chain latency added on top of the modeled channel delay.
    pub fixed_delay_ms: f64,
    /// Maximum pending sub-packages per device before the oldest is evicted.
    pub queue_length_limit: usize,
    /// Interference/reception radius in world units.
    pub consider_range: f64,
    /// Channel-access attempts granted to one sub-package.
    pub attempt_budget: u8,
    /// Initial backoff window upper bound in ticks; doubles per lost attempt.
    pub initial_backoff_ticks: u64,
    /// Distance-drop curve applied to otherwise successful receptions.
    pub attenuation: AttenuationModel,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            sub_steps_per_step: 50,
            step_interval_ms: 100.0,
            fixed_delay_ms: 10.0,
            queue_length_limit: 10,
            consider_range: 200.0,
            attempt_budget: 4,
            initial_backoff_ticks: 50,
            attenuation: AttenuationModel::default(),
        }
    }
}

impl SimulationConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    /// * `config_path` - Path to the config.toml file
    ///
    /// # Returns
    /// * `Ok(SimulationConfig)` if the file was successfully loaded, parsed
    ///   and validated
    /// * `Err(String)` with a descriptive error message otherwise
    pub fn load(config_path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(config_path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let config: SimulationConfig =
            toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the model cannot work with.
    pub fn validate(&self) -> Result<(), String> {
        if self.sub_steps_per_step == 0 {
            return Err("sub-steps-per-step must be at least 1".to_string());
        }
        if self.queue_length_limit == 0 {
            return Err("queue-length-limit must be at least 1".to_string());
        }
        if self.attempt_budget == 0 {
            return Err("attempt-budget must be at least 1".to_string());
        }
        if self.initial_backoff_ticks == 0 {
            return Err("initial-backoff-ticks must be at least 1".to_string());
        }
        if !(self.consider_range > 0.0) {
            return Err(format!(
                "consider-range must be positive, got {}",
                self.consider_range
            ));
        }
        if !self.fixed_delay_ms.is_finite() || self.fixed_delay_ms < 0.0 {
            return Err(format!(
                "fixed-delay-ms must be finite and non-negative, got {}",
                self.fixed_delay_ms
            ));
        }
        if let AttenuationModel::Logarithmic { base } = self.attenuation {
            if base < 2 {
                return Err(format!("attenuation base must be at least 2, got {}", base));
            }
        }
        Ok(())
    }
}
