use std::{io::ErrorKind, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use rumqttc::{AsyncClient, Event, Incoming, LastWill, MqttOptions, QoS};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::{
    net::TcpListener,
    sync::{mpsc::UnboundedReceiver, Mutex},
};
use tracing::{debug, error, info, warn};

use cycle_common::{
    appliance_state_topic, merge, ApplianceStatus, RuntimeConfig, TOPIC_MONITOR_STATUS,
};

use crate::registry::Registry;

#[derive(Clone)]
struct AppState {
    registry: Arc<Mutex<Registry>>,
    mqtt: AsyncClient,
    store: AppStore,
}

#[derive(Clone)]
struct AppStore {
    config_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load appliance config from store: {err:#}");
        RuntimeConfig::default()
    });
    runtime.sanitize();

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.network.mqtt_host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.mqtt_port);

    let mut mqtt_options = MqttOptions::new("appliance-cycle-monitor", mqtt_host, mqtt_port);
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.network.mqtt_user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.network.mqtt_pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    mqtt_options.set_last_will(LastWill::new(
        TOPIC_MONITOR_STATUS,
        "offline",
        QoS::AtLeastOnce,
        true,
    ));

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let (changes_tx, changes_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut registry = Registry::new(
        Duration::from_secs(runtime.tick_interval_secs),
        changes_tx,
    );

    let (appliances, errors) = runtime.partition_appliances();
    for err in errors {
        error!("appliance not activated: {err}");
    }
    let now = Utc::now();
    for (config, profile) in appliances {
        if let Err(err) = registry.setup(config, profile, now) {
            error!("appliance not activated: {err}");
        }
    }
    if registry.is_empty() {
        warn!("no appliances configured in {}", store.config_path.display());
    }

    let app_state = AppState {
        registry: Arc::new(Mutex::new(registry)),
        mqtt,
        store,
    };

    app_state
        .mqtt
        .publish(TOPIC_MONITOR_STATUS, QoS::AtLeastOnce, true, "online")
        .await
        .context("failed to queue monitor status")?;
    spawn_mqtt_loop(app_state.clone(), eventloop);
    spawn_state_publish_loop(app_state.clone(), changes_rx);

    let app = Router::new()
        .route("/api/appliances", get(handle_list_appliances))
        .route("/api/appliances/{id}", get(handle_get_appliance))
        .route(
            "/api/appliances/{id}/profile",
            get(handle_get_profile).put(handle_put_profile),
        )
        .with_state(app_state.clone());

    let port = std::env::var("MONITOR_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.http_port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind monitor server at {addr}"))?;

    info!("monitor listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    app_state.registry.lock().await.teardown_all().await;
    if let Err(err) = app_state
        .mqtt
        .publish(TOPIC_MONITOR_STATUS, QoS::AtLeastOnce, true, "offline")
        .await
    {
        warn!("monitor status publish failed: {err}");
    }
    info!("monitor stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) = handle_mqtt_message(
                        &app_state,
                        message.topic,
                        message.payload.to_vec(),
                        message.retain,
                    )
                    .await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                    subscribe_topics(&app_state).await;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

async fn subscribe_topics(app_state: &AppState) {
    // Called from the event loop task; awaiting `subscribe` here could stall
    // on the request queue that same loop drains.
    let topics = app_state.registry.lock().await.topics();
    for topic in topics {
        if let Err(err) = app_state.mqtt.try_subscribe(&topic, QoS::AtMostOnce) {
            warn!("failed to subscribe to {topic}: {err}");
        }
    }
}

fn spawn_state_publish_loop(app_state: AppState, mut changes: UnboundedReceiver<String>) {
    tokio::spawn(async move {
        while let Some(id) = changes.recv().await {
            let status = {
                let registry = app_state.registry.lock().await;
                registry.status(&id, Utc::now()).await
            };
            // Torn down since the change was raised.
            let Some(status) = status else {
                continue;
            };

            match serde_json::to_vec(&status) {
                Ok(body) => {
                    if let Err(err) = app_state
                        .mqtt
                        .publish(appliance_state_topic(&id), QoS::AtLeastOnce, true, body)
                        .await
                    {
                        warn!("{id}: state publish failed: {err}");
                    }
                }
                Err(err) => warn!("{id}: state serialization failed: {err}"),
            }
        }
    });
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: String,
    payload: Vec<u8>,
    retained: bool,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let message = String::from_utf8(payload).context("non utf8 mqtt payload")?;
    let delivered = {
        let registry = app_state.registry.lock().await;
        registry
            .dispatch(&topic, &message, retained, Utc::now())
            .await
    };
    if delivered == 0 {
        debug!("no appliance accepted payload on {topic}");
    }

    Ok(())
}

async fn handle_list_appliances(State(state): State<AppState>) -> impl IntoResponse {
    let now = Utc::now();
    let registry = state.registry.lock().await;
    let mut statuses: Vec<ApplianceStatus> = Vec::with_capacity(registry.len());
    for id in registry.ids() {
        if let Some(status) = registry.status(&id, now).await {
            statuses.push(status);
        }
    }
    Json(statuses)
}

async fn handle_get_appliance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let status = state.registry.lock().await.status(&id, Utc::now()).await;
    match status {
        Some(status) => Json(status).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Unknown appliance"),
    }
}

async fn handle_get_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let engine = {
        let registry = state.registry.lock().await;
        registry.get(&id).map(|handle| handle.engine())
    };
    let Some(engine) = engine else {
        return error_response(StatusCode::NOT_FOUND, "Unknown appliance");
    };
    let profile = *engine.lock().await.profile();
    Json(profile).into_response()
}

async fn handle_put_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<Map<String, Value>>,
) -> impl IntoResponse {
    let mut registry = state.registry.lock().await;
    let Some(handle) = registry.get(&id) else {
        return error_response(StatusCode::NOT_FOUND, "Unknown appliance");
    };

    let overrides = combine_overrides(&handle.config().profile, update);
    let defaults = handle.config().appliance_type.default_profile();
    let profile = match merge(&defaults, &overrides) {
        Ok(profile) => profile,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    if let Err(err) = persist_overrides(&state.store, &id, &overrides).await {
        warn!("{id}: failed to persist profile update: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist appliance profile",
        );
    }

    if let Err(err) = registry.update_profile(&id, overrides, profile).await {
        return error_response(StatusCode::NOT_FOUND, &err.to_string());
    }

    Json(profile).into_response()
}

fn combine_overrides(existing: &Map<String, Value>, update: Map<String, Value>) -> Map<String, Value> {
    let mut combined = existing.clone();
    combined.extend(update);
    combined
}

async fn persist_overrides(
    store: &AppStore,
    id: &str,
    overrides: &Map<String, Value>,
) -> anyhow::Result<()> {
    let mut runtime = store.load_runtime_config().await?;
    let appliance = runtime
        .appliance_mut(id)
        .with_context(|| format!("appliance '{id}' missing from config file"))?;
    appliance.profile = overrides.clone();
    store.save_runtime_config(&runtime).await
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("APPLIANCE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.appliance-cycle"));

        Self {
            config_path: Arc::new(data_dir.join("appliances.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.config_path.as_ref()).await {
            Ok(raw) => serde_json::from_slice::<RuntimeConfig>(&raw)
                .with_context(|| format!("invalid config at {}", self.config_path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_runtime_config(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.config_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(runtime)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
