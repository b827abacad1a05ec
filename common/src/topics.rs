pub const TOPIC_PREFIX: &str = "appliance_cycle";
pub const TOPIC_MONITOR_STATUS: &str = "appliance_cycle/monitor/status";
pub const TOPIC_SIMULATOR_STATUS: &str = "appliance_cycle/simulator/status";

pub fn appliance_state_topic(id: &str) -> String {
    format!("{TOPIC_PREFIX}/{id}/state")
}
