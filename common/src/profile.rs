use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{error::ProfileError, types::ApplianceType};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CycleProfile {
    pub on_threshold: f64,
    pub off_threshold: f64,
    pub delay_on: u64,
    pub start_grace: u64,
    pub delay_off: u64,
    pub quiet_end: u64,
    pub min_run: u64,
    pub resume_grace: u64,
}

impl CycleProfile {
    pub fn delay_on(&self) -> Duration {
        Duration::from_secs(self.delay_on)
    }

    pub fn start_grace(&self) -> Duration {
        Duration::from_secs(self.start_grace)
    }

    pub fn stop_delay(&self) -> Duration {
        Duration::from_secs(self.delay_off.saturating_add(self.quiet_end))
    }

    pub fn resume_grace(&self) -> Duration {
        Duration::from_secs(self.resume_grace)
    }

    pub fn min_run_secs(&self) -> f64 {
        self.min_run as f64
    }
}

impl ApplianceType {
    pub fn default_profile(self) -> CycleProfile {
        match self {
            Self::Washer => CycleProfile {
                on_threshold: 15.0,
                off_threshold: 8.0,
                delay_on: 90,
                start_grace: 180,
                delay_off: 300,
                quiet_end: 120,
                min_run: 300,
                resume_grace: 180,
            },
            Self::Dryer => CycleProfile {
                on_threshold: 80.0,
                off_threshold: 25.0,
                delay_on: 60,
                start_grace: 120,
                delay_off: 180,
                quiet_end: 90,
                min_run: 240,
                resume_grace: 180,
            },
            Self::Dishwasher => CycleProfile {
                on_threshold: 20.0,
                off_threshold: 8.0,
                delay_on: 120,
                start_grace: 180,
                delay_off: 420,
                quiet_end: 180,
                min_run: 600,
                resume_grace: 240,
            },
        }
    }
}

/// Overlays `overrides` onto `defaults`.
///
/// Recognized keys replace the default value, `null` counts as absent and
/// unknown keys are ignored. Thresholds must be finite and non-negative;
/// durations must additionally be whole seconds.
pub fn merge(
    defaults: &CycleProfile,
    overrides: &Map<String, Value>,
) -> Result<CycleProfile, ProfileError> {
    Ok(CycleProfile {
        on_threshold: watts(overrides, "on_threshold", defaults.on_threshold)?,
        off_threshold: watts(overrides, "off_threshold", defaults.off_threshold)?,
        delay_on: seconds(overrides, "delay_on", defaults.delay_on)?,
        start_grace: seconds(overrides, "start_grace", defaults.start_grace)?,
        delay_off: seconds(overrides, "delay_off", defaults.delay_off)?,
        quiet_end: seconds(overrides, "quiet_end", defaults.quiet_end)?,
        min_run: seconds(overrides, "min_run", defaults.min_run)?,
        resume_grace: seconds(overrides, "resume_grace", defaults.resume_grace)?,
    })
}

fn number(overrides: &Map<String, Value>, field: &'static str) -> Result<Option<f64>, ProfileError> {
    let value = match overrides.get(field) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(number)) => number.as_f64(),
        Some(_) => None,
    };
    let value = value.ok_or(ProfileError::NotNumeric { field })?;
    if !value.is_finite() {
        return Err(ProfileError::NotFinite { field });
    }
    if value < 0.0 {
        return Err(ProfileError::Negative { field, value });
    }
    Ok(Some(value))
}

fn watts(
    overrides: &Map<String, Value>,
    field: &'static str,
    default: f64,
) -> Result<f64, ProfileError> {
    Ok(number(overrides, field)?.unwrap_or(default))
}

fn seconds(
    overrides: &Map<String, Value>,
    field: &'static str,
    default: u64,
) -> Result<u64, ProfileError> {
    match number(overrides, field)? {
        None => Ok(default),
        Some(value) if value.fract() != 0.0 => {
            Err(ProfileError::FractionalSeconds { field, value })
        }
        Some(value) => Ok(value as u64),
    }
}
