use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PowerParseError {
    #[error("power reading {0:?} is not a number")]
    NotNumeric(String),
    #[error("power reading {0:?} is not finite")]
    NotFinite(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProfileError {
    #[error("profile field '{field}' must be a number")]
    NotNumeric { field: &'static str },
    #[error("profile field '{field}' must be finite")]
    NotFinite { field: &'static str },
    #[error("profile field '{field}' must be >= 0 (got {value})")]
    Negative { field: &'static str, value: f64 },
    #[error("profile field '{field}' must be a whole number of seconds (got {value})")]
    FractionalSeconds { field: &'static str, value: f64 },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("appliance '{id}': {source}")]
    Profile {
        id: String,
        #[source]
        source: ProfileError,
    },
    #[error("duplicate appliance id '{0}'")]
    DuplicateId(String),
    #[error("appliance id must not be empty")]
    EmptyId,
    #[error("appliance '{0}' has no power sensor topic")]
    MissingPowerSensor(String),
}
