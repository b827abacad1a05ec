use chrono::{DateTime, Utc};

use crate::error::PowerParseError;

#[derive(Debug, Clone, PartialEq)]
pub struct PowerSample {
    pub value: String,
    pub unit: Option<String>,
    pub available: bool,
    pub at: DateTime<Utc>,
}

impl PowerSample {
    pub fn new(value: impl Into<String>, unit: Option<&str>, at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            unit: unit.map(str::to_string),
            available: true,
            at,
        }
    }

    pub fn unavailable(at: DateTime<Utc>) -> Self {
        Self {
            value: String::new(),
            unit: None,
            available: false,
            at,
        }
    }

    pub fn watts(&self) -> Option<f64> {
        if !self.available {
            return None;
        }
        normalize(&self.value, self.unit.as_deref()).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoorSample {
    pub is_open: bool,
    pub available: bool,
    pub at: DateTime<Utc>,
}

impl DoorSample {
    pub fn new(is_open: bool, at: DateTime<Utc>) -> Self {
        Self {
            is_open,
            available: true,
            at,
        }
    }

    pub fn unavailable(at: DateTime<Utc>) -> Self {
        Self {
            is_open: false,
            available: false,
            at,
        }
    }
}

pub fn normalize(raw: &str, unit: Option<&str>) -> Result<f64, PowerParseError> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| PowerParseError::NotNumeric(raw.to_string()))?;
    if !value.is_finite() {
        return Err(PowerParseError::NotFinite(raw.to_string()));
    }

    let scale = match unit.map(|unit| unit.trim().to_ascii_lowercase()).as_deref() {
        Some("kw") => 1_000.0,
        Some("mw") => 1_000_000.0,
        Some("gw") => 1_000_000_000.0,
        _ => 1.0,
    };

    Ok(value * scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_known_units_case_insensitively() {
        assert_eq!(normalize("1.5", Some("kW")), Ok(1_500.0));
        assert_eq!(normalize("2", Some("MW")), Ok(2_000_000.0));
        assert_eq!(normalize("0.5", Some("gw")), Ok(500_000_000.0));
    }

    #[test]
    fn unknown_or_missing_unit_is_watts() {
        assert_eq!(normalize("42", None), Ok(42.0));
        assert_eq!(normalize("42", Some("W")), Ok(42.0));
        assert_eq!(normalize(" 7.25 ", Some("VA")), Ok(7.25));
    }

    #[test]
    fn rejects_non_numeric_and_non_finite() {
        assert!(matches!(
            normalize("unavailable", None),
            Err(PowerParseError::NotNumeric(_))
        ));
        assert!(matches!(normalize("", Some("kW")), Err(PowerParseError::NotNumeric(_))));
        assert!(matches!(normalize("NaN", None), Err(PowerParseError::NotFinite(_))));
        assert!(matches!(normalize("inf", None), Err(PowerParseError::NotFinite(_))));
    }

    #[test]
    fn unavailable_sample_has_no_watts() {
        let at = DateTime::from_timestamp(0, 0).unwrap();
        let mut sample = PowerSample::new("20", None, at);
        assert_eq!(sample.watts(), Some(20.0));

        sample.available = false;
        assert_eq!(sample.watts(), None);
        assert_eq!(PowerSample::new("abc", None, at).watts(), None);
    }
}
