use chrono::{DateTime, Utc};
use cycle_common::{DoorSample, PowerSample};
use serde_json::Value;

const UNAVAILABLE_STATES: [&str; 2] = ["unknown", "unavailable"];

fn is_unavailable(text: &str) -> bool {
    UNAVAILABLE_STATES
        .iter()
        .any(|state| text.eq_ignore_ascii_case(state))
}

pub fn parse_power(
    payload: &str,
    default_unit: Option<&str>,
    at: DateTime<Utc>,
) -> Option<PowerSample> {
    let text = payload.trim();
    if is_unavailable(text) {
        return Some(PowerSample::unavailable(at));
    }

    if text.starts_with('{') {
        let Ok(Value::Object(object)) = serde_json::from_str::<Value>(text) else {
            return None;
        };
        let value = match object.get("value")? {
            Value::String(value) => value.clone(),
            Value::Number(number) => number.to_string(),
            Value::Null => return Some(PowerSample::unavailable(at)),
            _ => return None,
        };
        if is_unavailable(value.trim()) {
            return Some(PowerSample::unavailable(at));
        }
        let unit = object.get("unit").and_then(Value::as_str).or(default_unit);
        return Some(PowerSample::new(value, unit, at));
    }

    Some(PowerSample::new(text, default_unit, at))
}

pub fn parse_door(payload: &str, at: DateTime<Utc>) -> Option<DoorSample> {
    let text = payload.trim();
    if is_unavailable(text) {
        return Some(DoorSample::unavailable(at));
    }

    match text.to_ascii_lowercase().as_str() {
        "on" | "open" | "true" | "1" => Some(DoorSample::new(true, at)),
        "off" | "closed" | "false" | "0" => Some(DoorSample::new(false, at)),
        _ => None,
    }
}
