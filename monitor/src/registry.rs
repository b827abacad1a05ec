use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use cycle_common::{ApplianceConfig, ApplianceStatus, CycleEngine, CycleProfile};
use thiserror::Error;
use tokio::{
    sync::{mpsc::UnboundedSender, Mutex, Notify},
    task::JoinHandle,
};
use tracing::{error, info, warn};

use crate::payload::{parse_door, parse_power};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("appliance '{0}' is already registered")]
    AlreadyRegistered(String),
    #[error("appliance '{0}' is not registered")]
    NotRegistered(String),
}

pub struct ApplianceHandle {
    config: ApplianceConfig,
    engine: Arc<Mutex<CycleEngine>>,
    wake: Arc<Notify>,
    driver: JoinHandle<()>,
}

impl ApplianceHandle {
    pub fn config(&self) -> &ApplianceConfig {
        &self.config
    }

    pub fn engine(&self) -> Arc<Mutex<CycleEngine>> {
        self.engine.clone()
    }
}

pub struct Registry {
    instances: HashMap<String, ApplianceHandle>,
    tick_interval: Duration,
    changes: UnboundedSender<String>,
}

impl Registry {
    pub fn new(tick_interval: Duration, changes: UnboundedSender<String>) -> Self {
        Self {
            instances: HashMap::new(),
            tick_interval,
            changes,
        }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ApplianceHandle> {
        self.instances.get(id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.instances.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .instances
            .values()
            .flat_map(|handle| {
                std::iter::once(handle.config.power_sensor.clone())
                    .chain(handle.config.door_sensor.clone())
            })
            .filter(|topic| !topic.trim().is_empty())
            .collect();
        topics.sort();
        topics.dedup();
        topics
    }

    pub fn setup(
        &mut self,
        config: ApplianceConfig,
        profile: CycleProfile,
        now: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        if self.instances.contains_key(&config.id) {
            return Err(RegistryError::AlreadyRegistered(config.id));
        }

        let mut engine = CycleEngine::from_config(&config, profile);
        let changes = self.changes.clone();
        let id = config.id.clone();
        engine.subscribe(move || {
            let _ = changes.send(id.clone());
        });
        engine.start(now, self.tick_interval);

        let engine = Arc::new(Mutex::new(engine));
        let wake = Arc::new(Notify::new());
        let driver = tokio::spawn(drive(config.id.clone(), engine.clone(), wake.clone()));

        info!(
            "{}: activated as {} (door sensor: {})",
            config.id,
            config.appliance_type.as_str(),
            config.has_door_sensor()
        );
        // Publish the initial idle status.
        let _ = self.changes.send(config.id.clone());

        self.instances.insert(
            config.id.clone(),
            ApplianceHandle {
                config,
                engine,
                wake,
                driver,
            },
        );
        Ok(())
    }

    pub async fn teardown(&mut self, id: &str) -> bool {
        let Some(handle) = self.instances.remove(id) else {
            return false;
        };
        handle.driver.abort();
        handle.engine.lock().await.shutdown();
        info!("{id}: deactivated");
        true
    }

    pub async fn teardown_all(&mut self) {
        for id in self.ids() {
            self.teardown(&id).await;
        }
    }

    pub async fn update_profile(
        &mut self,
        id: &str,
        overrides: serde_json::Map<String, serde_json::Value>,
        profile: CycleProfile,
    ) -> Result<(), RegistryError> {
        let handle = self
            .instances
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotRegistered(id.to_string()))?;
        handle.config.profile = overrides;
        handle.engine.lock().await.update_profile(profile);
        handle.wake.notify_one();
        Ok(())
    }

    pub async fn status(&self, id: &str, now: DateTime<Utc>) -> Option<ApplianceStatus> {
        let handle = self.instances.get(id)?;
        let status = handle.engine.lock().await.status(now);
        Some(status)
    }

    /// Routes one MQTT payload to every instance listening on `topic` and
    /// returns how many accepted a sample. A retained door payload seeds the
    /// door flag when nothing is known yet; after a reconnect it only acts
    /// if it differs from the recorded reading.
    pub async fn dispatch(
        &self,
        topic: &str,
        payload: &str,
        retained: bool,
        at: DateTime<Utc>,
    ) -> usize {
        let mut delivered = 0;

        for (id, handle) in &self.instances {
            let config = &handle.config;
            let before = delivered;

            if config.power_sensor == topic {
                match parse_power(payload, config.power_unit.as_deref(), at) {
                    Some(sample) => {
                        let mut engine = handle.engine.lock().await;
                        guarded(id, || engine.handle_power(&sample));
                        delivered += 1;
                    }
                    None => warn!("{id}: dropping malformed power payload {payload:?}"),
                }
            }

            if config.door_sensor.as_deref() == Some(topic) {
                match parse_door(payload, at) {
                    Some(sample) => {
                        let mut engine = handle.engine.lock().await;
                        let recorded = engine.record().door_open;
                        if retained && sample.available && recorded.is_none() {
                            engine.seed_door(sample.is_open, sample.at);
                            let _ = self.changes.send(id.clone());
                        } else if !retained || recorded != Some(sample.is_open) {
                            // A retained value that disagrees with what we saw
                            // means the door moved while we were disconnected.
                            guarded(id, || engine.handle_door(&sample));
                        }
                        delivered += 1;
                    }
                    None => warn!("{id}: dropping unrecognized door payload {payload:?}"),
                }
            }

            if delivered > before {
                handle.wake.notify_one();
            }
        }

        delivered
    }
}

fn guarded(id: &str, handler: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(handler)).is_err() {
        error!("{id}: event handler panicked; event dropped");
    }
}

async fn drive(id: String, engine: Arc<Mutex<CycleEngine>>, wake: Arc<Notify>) {
    loop {
        let deadline = engine.lock().await.next_deadline();
        let Some(deadline) = deadline else {
            wake.notified().await;
            continue;
        };

        let wait = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                let mut engine = engine.lock().await;
                guarded(&id, || engine.advance(Utc::now()));
            }
            _ = wake.notified() => {}
        }
    }
}
