use crate::types::Tick;
use serde::{Deserialize, Serialize};

/// Engine tunables. Every field is defaulted, so a partial
/// `sim_config.json` only needs to name what it overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Change log ring size. Must span the longest delta window a
    /// client is expected to request.
    pub change_log_capacity: usize,
    /// Narration log ring size.
    pub event_log_capacity: usize,
    /// Cycle transitions kept in history.
    pub cycle_history_capacity: usize,
    /// Ticks before expiry at which the one-time cycle warning fires.
    pub cycle_warning_lead_time: Tick,
    /// Full snapshot persisted every N ticks.
    pub snapshot_interval: Tick,
    /// Distance units a fleet covers per tick before cycle modifiers.
    pub fleet_speed: f64,
    /// Targeted attack damage variance (fraction, ±).
    pub targeted_attack_variance: f64,
    /// Targeted attacks reach `range * range_multiplier` distance units.
    pub range_multiplier: f64,
    pub invasion_max_rounds: u32,
    /// Invasion per-unit damage variance (fraction, ±).
    pub invasion_variance: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            change_log_capacity:      200,
            event_log_capacity:       200,
            cycle_history_capacity:   20,
            cycle_warning_lead_time:  50,
            snapshot_interval:        30,
            fleet_speed:              10.0,
            targeted_attack_variance: 0.10,
            range_multiplier:         10.0,
            invasion_max_rounds:      10,
            invasion_variance:        0.30,
        }
    }
}

impl SimConfig {
    /// Load from `<data_dir>/sim_config.json`.
    /// In tests, use SimConfig::default().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/sim_config.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: SimConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg: SimConfig =
            serde_json::from_str(r#"{ "change_log_capacity": 500 }"#).unwrap();
        assert_eq!(cfg.change_log_capacity, 500);
        assert_eq!(cfg.event_log_capacity, 200);
        assert_eq!(cfg.invasion_max_rounds, 10);
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = SimConfig::load("/definitely/not/here").unwrap_err();
        assert!(err.to_string().contains("sim_config.json"));
    }
}
