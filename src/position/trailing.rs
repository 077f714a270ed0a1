//! Exit policy: trailing-stop percentage, arming and fixed stop-loss
//!
//! All percentages are in percent units (2.5 means 2.5%).

use serde::Deserialize;

/// How the trailing distance is chosen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingMode {
    /// Constant `fixed_pct`
    #[default]
    Fixed,
    /// Step function of current market health
    HealthStepped,
}

/// Trailing distance used from `min_health` upward
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TrailingStep {
    pub min_health: f64,
    pub pct: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrailingConfig {
    #[serde(default)]
    pub mode: TrailingMode,
    #[serde(default = "default_fixed_pct")]
    pub fixed_pct: f64,
    /// Ascending by `min_health`; health below the first step trails at 0%
    #[serde(default = "default_steps")]
    pub steps: Vec<TrailingStep>,
}

impl Default for TrailingConfig {
    fn default() -> Self {
        Self {
            mode: TrailingMode::default(),
            fixed_pct: default_fixed_pct(),
            steps: default_steps(),
        }
    }
}

fn default_fixed_pct() -> f64 {
    4.0
}

fn default_steps() -> Vec<TrailingStep> {
    vec![
        TrailingStep {
            min_health: 0.0,
            pct: 1.5,
        },
        TrailingStep {
            min_health: 1.0,
            pct: 2.5,
        },
        TrailingStep {
            min_health: 2.0,
            pct: 3.5,
        },
    ]
}

impl TrailingConfig {
    /// Trailing distance for the given health
    pub fn pct_for(&self, health: f64) -> f64 {
        match self.mode {
            TrailingMode::Fixed => self.fixed_pct,
            TrailingMode::HealthStepped => self
                .steps
                .iter()
                .rev()
                .find(|step| health >= step.min_health)
                .map(|step| step.pct)
                .unwrap_or(0.0),
        }
    }
}

/// When a fresh position starts trailing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArmingPolicy {
    /// Armed from the first reprice
    #[default]
    Immediate,
    /// Armed once price reaches entry + `activation_pct`
    OnActivation,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExitConfig {
    #[serde(default)]
    pub trailing: TrailingConfig,
    #[serde(default)]
    pub arming: ArmingPolicy,
    #[serde(default = "default_activation_pct")]
    pub activation_pct: f64,
    /// Fixed stop below entry; off when unset
    #[serde(default)]
    pub stop_loss_pct: Option<f64>,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            trailing: TrailingConfig::default(),
            arming: ArmingPolicy::default(),
            activation_pct: default_activation_pct(),
            stop_loss_pct: None,
        }
    }
}

fn default_activation_pct() -> f64 {
    1.0
}

impl ExitConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let t = &self.trailing;
        if !(0.0..100.0).contains(&t.fixed_pct) {
            anyhow::bail!("exit.trailing.fixed_pct must be within [0, 100)");
        }
        for step in &t.steps {
            if !(0.0..100.0).contains(&step.pct) || !step.min_health.is_finite() {
                anyhow::bail!("exit.trailing.steps contain an invalid step: {:?}", step);
            }
        }
        for pair in t.steps.windows(2) {
            if pair[1].min_health <= pair[0].min_health || pair[1].pct < pair[0].pct {
                anyhow::bail!("exit.trailing.steps must ascend in both min_health and pct");
            }
        }
        if self.activation_pct < 0.0 {
            anyhow::bail!("exit.activation_pct cannot be negative");
        }
        if let Some(sl) = self.stop_loss_pct {
            if !(sl > 0.0 && sl < 100.0) {
                anyhow::bail!("exit.stop_loss_pct must be within (0, 100)");
            }
        }
        Ok(())
    }

    /// Whether a position entered at `entry` should arm at `price`
    pub fn should_arm(&self, entry: f64, price: f64) -> bool {
        match self.arming {
            ArmingPolicy::Immediate => true,
            ArmingPolicy::OnActivation => price >= entry * (1.0 + self.activation_pct / 100.0),
        }
    }

    pub fn stop_loss_price(&self, entry: f64) -> Option<f64> {
        self.stop_loss_pct.map(|pct| entry * (1.0 - pct / 100.0))
    }
}

/// Stop level trailing `highest` by `pct` percent
pub fn trail_stop_price(highest: f64, pct: f64) -> f64 {
    highest * (1.0 - pct / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_mode_ignores_health() {
        let config = TrailingConfig::default();
        assert_eq!(config.pct_for(-5.0), 4.0);
        assert_eq!(config.pct_for(5.0), 4.0);
    }

    #[test]
    fn test_stepped_mode_is_monotone() {
        let config = TrailingConfig {
            mode: TrailingMode::HealthStepped,
            ..Default::default()
        };

        assert_eq!(config.pct_for(-0.1), 0.0);
        assert_eq!(config.pct_for(0.0), 1.5);
        assert_eq!(config.pct_for(1.5), 2.5);
        assert_eq!(config.pct_for(10.0), 3.5);

        let mut last = f64::MIN;
        for i in -20..40 {
            let pct = config.pct_for(i as f64 * 0.1);
            assert!(pct >= last);
            last = pct;
        }
    }

    #[test]
    fn test_trail_stop_price() {
        assert!((trail_stop_price(110.0, 2.5) - 107.25).abs() < 1e-9);
        assert_eq!(trail_stop_price(50.0, 0.0), 50.0);
    }

    #[test]
    fn test_arming_policies() {
        let mut config = ExitConfig::default();
        assert!(config.should_arm(100.0, 90.0));

        config.arming = ArmingPolicy::OnActivation;
        config.activation_pct = 2.0;
        assert!(!config.should_arm(100.0, 101.9));
        assert!(config.should_arm(100.0, 102.5));
    }

    #[test]
    fn test_validate_rejects_descending_steps() {
        let mut config = ExitConfig::default();
        assert!(config.validate().is_ok());

        config.trailing.steps.swap(0, 2);
        assert!(config.validate().is_err());

        let config = ExitConfig {
            stop_loss_pct: Some(0.0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
