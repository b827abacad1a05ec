use std::time::Duration;

use anyhow::Context;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use tracing::{debug, info, warn};

use cycle_common::{ApplianceType, TOPIC_SIMULATOR_STATUS};

use crate::curve::WasherCurve;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(1883);

    let mut mqtt_options = MqttOptions::new("appliance-cycle-simulator", mqtt_host, mqtt_port);

    if let Ok(user) = std::env::var("MQTT_USER") {
        let pass = std::env::var("MQTT_PASS").unwrap_or_default();
        mqtt_options.set_credentials(user, pass);
    }

    let power_topic =
        std::env::var("SIM_POWER_TOPIC").unwrap_or_else(|_| "home/washer/power".to_string());
    let door_topic = std::env::var("SIM_DOOR_TOPIC")
        .ok()
        .filter(|topic| !topic.trim().is_empty());
    let interval_secs = std::env::var("SIM_INTERVAL_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(10);

    let (mqtt, mut eventloop) = AsyncClient::new(mqtt_options, 32);

    mqtt.publish(TOPIC_SIMULATOR_STATUS, QoS::AtLeastOnce, true, "online")
        .await
        .context("failed to publish simulator online status")?;

    tokio::spawn(async move {
        loop {
            if let Err(err) = eventloop.poll().await {
                warn!("simulator mqtt poll error: {err}");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    });

    let curve = WasherCurve::new(ApplianceType::Washer.default_profile());
    info!(
        "simulator started: {power_topic} every {interval_secs}s, {}s per cycle",
        curve.period_secs()
    );

    let mut elapsed: u64 = 0;
    let mut last_phase = None;
    let mut door_open = None;
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let phase = curve.phase_at(elapsed);
        if last_phase != Some(phase) {
            info!("phase: {}", phase.as_str());
            last_phase = Some(phase);
        }

        let payload = format!("{:.1}", curve.power_at(elapsed));
        debug!("{power_topic} <- {payload}");
        mqtt.publish(power_topic.as_str(), QoS::AtLeastOnce, false, payload)
            .await
            .context("failed to publish simulated power")?;

        if let Some(topic) = door_topic.as_deref() {
            let open = curve.door_open_at(elapsed);
            if door_open != Some(open) {
                let payload = if open { "open" } else { "closed" };
                mqtt.publish(topic, QoS::AtLeastOnce, true, payload)
                    .await
                    .context("failed to publish simulated door state")?;
                door_open = Some(open);
            }
        }

        elapsed = elapsed.saturating_add(interval_secs);
    }
}
