use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplianceType {
    Washer,
    Dryer,
    Dishwasher,
}

impl ApplianceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Washer => "washer",
            Self::Dryer => "dryer",
            Self::Dishwasher => "dishwasher",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplianceState {
    Idle,
    Running,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplianceStatus {
    pub id: String,
    pub name: String,
    #[serde(rename = "applianceType")]
    pub appliance_type: ApplianceType,
    pub state: ApplianceState,
    pub running: bool,
    pub label: String,
    #[serde(rename = "startedAt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "finishedAt")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(rename = "runTimeSeconds")]
    pub run_time_seconds: u64,
    #[serde(rename = "lastRuntimeSeconds")]
    pub last_runtime_seconds: Option<u64>,
    #[serde(rename = "doorOpen")]
    pub door_open: Option<bool>,
    #[serde(rename = "doorLastOpenedAt")]
    pub door_last_opened_at: Option<DateTime<Utc>>,
    #[serde(rename = "secondsSinceFinished")]
    pub seconds_since_finished: u64,
}
