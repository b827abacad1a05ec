pub mod config;
pub mod cycle;
pub mod error;
pub mod notify;
pub mod power;
pub mod profile;
pub mod timers;
pub mod topics;
pub mod types;

pub use config::{ApplianceConfig, NetworkConfig, RuntimeConfig};
pub use cycle::{CycleEngine, CycleRecord};
pub use error::{ConfigError, PowerParseError, ProfileError};
pub use notify::{ChangeNotifier, SubscriptionId};
pub use power::{normalize, DoorSample, PowerSample};
pub use profile::{merge, CycleProfile};
pub use timers::{Fired, TimerSet, TimerSlot};
pub use topics::*;
pub use types::{ApplianceState, ApplianceStatus, ApplianceType};
