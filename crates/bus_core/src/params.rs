use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Kinematics and timing of a simulated bus.
///
/// Speeds are m/s, accelerations m/s², distances metres, dwells seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimParams {
    pub min_speed: f64,
    pub max_speed: f64,
    pub accel: f64,
    pub decel: f64,
    /// Distance before a node at which the bus starts slowing down.
    pub brake_dist: f64,
    pub dwell_at_house: f64,
    pub dwell_at_school: f64,
    /// Milliseconds between ticks (50–100 recommended).
    pub tick_ms: u64,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            min_speed: 12.0,
            max_speed: 30.0,
            accel: 1.6,
            decel: 2.2,
            brake_dist: 70.0,
            dwell_at_house: 2.0,
            dwell_at_school: 35.0,
            tick_ms: 60,
        }
    }
}

impl SimParams {
    /// Speeds, rates and distances must be positive and `max_speed ≥ min_speed`.
    /// Dwells may be zero.
    pub fn validate(&self) -> CoreResult<()> {
        let positive = [
            ("min_speed", self.min_speed),
            ("max_speed", self.max_speed),
            ("accel", self.accel),
            ("decel", self.decel),
            ("brake_dist", self.brake_dist),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(CoreError::InvalidParams(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        let dwells = [
            ("dwell_at_house", self.dwell_at_house),
            ("dwell_at_school", self.dwell_at_school),
        ];
        for (name, value) in dwells {
            if !(value.is_finite() && value >= 0.0) {
                return Err(CoreError::InvalidParams(format!(
                    "{} must not be negative, got {}",
                    name, value
                )));
            }
        }
        if self.tick_ms == 0 {
            return Err(CoreError::InvalidParams("tick_ms must be positive".to_string()));
        }
        if self.max_speed < self.min_speed {
            return Err(CoreError::InvalidParams(format!(
                "max_speed ({}) must be >= min_speed ({})",
                self.max_speed, self.min_speed
            )));
        }
        Ok(())
    }
}

/// Caller-supplied overrides for a simulation start; unset fields keep defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimParamsOverride {
    pub min_speed: Option<f64>,
    pub max_speed: Option<f64>,
    pub accel: Option<f64>,
    pub decel: Option<f64>,
    pub brake_dist: Option<f64>,
    pub dwell_at_house: Option<f64>,
    pub dwell_at_school: Option<f64>,
    pub tick_ms: Option<u64>,
    /// Re-run the stop-order optimizer instead of trusting the roster order.
    pub recompute_order: Option<bool>,
}

impl SimParamsOverride {
    pub fn apply(&self, base: SimParams) -> SimParams {
        SimParams {
            min_speed: self.min_speed.unwrap_or(base.min_speed),
            max_speed: self.max_speed.unwrap_or(base.max_speed),
            accel: self.accel.unwrap_or(base.accel),
            decel: self.decel.unwrap_or(base.decel),
            brake_dist: self.brake_dist.unwrap_or(base.brake_dist),
            dwell_at_house: self.dwell_at_house.unwrap_or(base.dwell_at_house),
            dwell_at_school: self.dwell_at_school.unwrap_or(base.dwell_at_school),
            tick_ms: self.tick_ms.unwrap_or(base.tick_ms),
        }
    }

    /// Merge onto the defaults and validate the result.
    pub fn resolve(&self) -> CoreResult<SimParams> {
        let params = self.apply(SimParams::default());
        params.validate()?;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(SimParams::default().validate().is_ok());
    }

    #[test]
    fn override_replaces_only_set_fields() {
        let params = SimParamsOverride {
            max_speed: Some(15.0),
            tick_ms: Some(100),
            ..Default::default()
        }
        .resolve()
        .expect("valid");
        assert_eq!(params.max_speed, 15.0);
        assert_eq!(params.tick_ms, 100);
        assert_eq!(params.min_speed, SimParams::default().min_speed);
    }

    #[test]
    fn max_below_min_is_rejected() {
        let result = SimParamsOverride {
            min_speed: Some(10.0),
            max_speed: Some(5.0),
            ..Default::default()
        }
        .resolve();
        assert!(matches!(result, Err(CoreError::InvalidParams(_))));
    }

    #[test]
    fn non_positive_values_are_rejected() {
        let params = SimParams {
            accel: 0.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
        let params = SimParams {
            dwell_at_house: -1.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
        let params = SimParams {
            tick_ms: 0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let params: SimParams = serde_json::from_str(r#"{"max_speed": 9.5}"#).expect("valid json");
        assert_eq!(params.max_speed, 9.5);
        assert_eq!(params.dwell_at_school, 35.0);
    }
}
