use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rumqttc::{AsyncClient, Event, Incoming, LastWill, MqttOptions, QoS};
use serde::Serialize;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{
        mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender},
        watch,
    },
};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use chargeu_common::{
    intent_for_topic, parse_switch, BridgeStatus, ChargerBridge, Intent, RuntimeConfig,
    TickAction, COMMAND_TOPICS, TOPIC_BRIDGE_AVAILABILITY, TOPIC_BRIDGE_STATE,
};

use crate::http::HttpTransport;

const MAX_MQTT_PAYLOAD_BYTES: usize = 64;
const TICK_INTERVAL_MS: u64 = 100;
const LINK_PROBE_TIMEOUT_MS: u64 = 1_000;

type StatusReceiver = watch::Receiver<Option<BridgeStatus>>;

#[derive(Clone)]
struct AppState {
    commands: UnboundedSender<Intent>,
    status: StatusReceiver,
}

#[derive(Clone)]
struct ConfigStore {
    path: Arc<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct QueuedCommand {
    command: String,
    page: &'static str,
}

#[derive(Debug, Serialize)]
struct PublishedState<'a> {
    #[serde(flatten)]
    status: &'a BridgeStatus,
    #[serde(rename = "publishedAt")]
    published_at: i64,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = ConfigStore::new();
    let mut runtime = store.load().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from {}: {err:#}", store.path.display());
        RuntimeConfig::default()
    });
    apply_env_overrides(&mut runtime, |key| std::env::var(key).ok());
    runtime.sanitize();
    info!(
        "bridging charger at {} (offline after {} ms of silence)",
        runtime.device.base_url, runtime.bridge.offline_timeout_ms
    );

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(None);
    let link_up = Arc::new(AtomicBool::new(false));

    spawn_link_monitor(
        runtime.device.socket_authority(),
        runtime.link_probe_interval_ms,
        link_up.clone(),
    );
    spawn_bridge_actor(runtime.clone(), link_up, command_rx, status_tx)?;

    let mut mqtt_options = MqttOptions::new(
        runtime.mqtt.client_id.clone(),
        runtime.mqtt.host.clone(),
        runtime.mqtt.port,
    );
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    mqtt_options.set_last_will(LastWill::new(
        TOPIC_BRIDGE_AVAILABILITY,
        "offline",
        QoS::AtLeastOnce,
        true,
    ));
    if !runtime.mqtt.user.is_empty() {
        mqtt_options.set_credentials(runtime.mqtt.user.clone(), runtime.mqtt.pass.clone());
    }
    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    spawn_mqtt_loop(mqtt.clone(), eventloop, command_tx.clone());
    spawn_state_publish_loop(mqtt, status_rx.clone());

    let app_state = AppState {
        commands: command_tx,
        status: status_rx,
    };
    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/amps", post(handle_set_amps))
        .route("/api/led", post(handle_set_led))
        .route("/api/ground", post(handle_set_ground))
        .route("/api/lock", post(handle_set_lock))
        .route("/api/session", post(handle_set_session))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], runtime.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind bridge server at {addr}"))?;

    info!("bridge listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn apply_env_overrides(runtime: &mut RuntimeConfig, env: impl Fn(&str) -> Option<String>) {
    if let Some(url) = env("DEVICE_URL") {
        runtime.device.base_url = url;
    }
    if let Some(host) = env("MQTT_HOST") {
        runtime.mqtt.host = host;
    }
    if let Some(port) = env("MQTT_PORT").and_then(|value| value.parse::<u16>().ok()) {
        runtime.mqtt.port = port;
    }
    if let Some(user) = env("MQTT_USER") {
        runtime.mqtt.user = user;
    }
    if let Some(pass) = env("MQTT_PASS") {
        runtime.mqtt.pass = pass;
    }
    if let Some(port) = env("BRIDGE_HTTP_PORT").and_then(|value| value.parse::<u16>().ok()) {
        runtime.http_port = port;
    }
}

/// Keeps `link_up` in step with TCP reachability of the charger.
fn spawn_link_monitor(authority: String, interval_ms: u64, link_up: Arc<AtomicBool>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
        loop {
            interval.tick().await;

            let probe = tokio::time::timeout(
                Duration::from_millis(LINK_PROBE_TIMEOUT_MS),
                TcpStream::connect(authority.as_str()),
            )
            .await;
            let reachable = matches!(probe, Ok(Ok(_)));

            if link_up.swap(reachable, Ordering::Relaxed) != reachable {
                if reachable {
                    info!("device link up ({authority})");
                } else {
                    warn!("device link down ({authority})");
                }
            }
        }
    });
}

/// Runs the bridge on its own thread: every device round trip blocks the
/// tick, so it stays off the async workers.
fn spawn_bridge_actor(
    runtime: RuntimeConfig,
    link_up: Arc<AtomicBool>,
    mut commands: UnboundedReceiver<Intent>,
    status: watch::Sender<Option<BridgeStatus>>,
) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("bridge-actor".to_string())
        .spawn(move || {
            let transport = match HttpTransport::new(&runtime.device.base_url) {
                Ok(transport) => transport,
                Err(err) => {
                    warn!("bridge actor not started: {err:#}");
                    return;
                }
            };
            let mut bridge = ChargerBridge::new(runtime.bridge, transport, monotonic_ms());
            status.send_replace(Some(bridge.status(monotonic_ms())));

            loop {
                let mut accepted = false;
                loop {
                    match commands.try_recv() {
                        Ok(intent) => {
                            if bridge.submit(intent, monotonic_ms()) {
                                accepted = true;
                            } else {
                                info!("command not queued: {intent:?}");
                            }
                        }
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Disconnected) => {
                            info!("command channel closed, stopping bridge actor");
                            return;
                        }
                    }
                }

                let action = bridge.tick(monotonic_ms(), link_up.load(Ordering::Relaxed));
                if action != TickAction::Wait {
                    debug!("tick: {action:?}");
                }

                if bridge.take_dirty() || accepted || action != TickAction::Wait {
                    status.send_replace(Some(bridge.status(monotonic_ms())));
                }

                thread::sleep(Duration::from_millis(TICK_INTERVAL_MS));
            }
        })
        .context("failed to spawn bridge actor thread")?;
    Ok(())
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    for topic in COMMAND_TOPICS {
        mqtt.subscribe(topic, QoS::AtMostOnce).await?;
    }
    Ok(())
}

fn spawn_mqtt_loop(
    mqtt: AsyncClient,
    mut eventloop: rumqttc::EventLoop,
    commands: UnboundedSender<Intent>,
) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) = handle_mqtt_message(&commands, &message.topic, &message.payload)
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                    if let Err(err) = subscribe_topics(&mqtt).await {
                        warn!("mqtt subscribe failed: {err:#}");
                    }
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

fn handle_mqtt_message(
    commands: &UnboundedSender<Intent>,
    topic: &str,
    payload: &[u8],
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let message = std::str::from_utf8(payload).context("non utf8 mqtt payload")?;
    let Some(intent) = intent_for_topic(topic, message) else {
        warn!("ignoring mqtt command on {topic}: {message:?}");
        return Ok(());
    };

    commands
        .send(intent)
        .context("bridge actor is not running")?;
    Ok(())
}

fn spawn_state_publish_loop(mqtt: AsyncClient, mut status: StatusReceiver) {
    tokio::spawn(async move {
        let mut announced_online = None;

        while status.changed().await.is_ok() {
            let snapshot = status.borrow_and_update().clone();
            let Some(snapshot) = snapshot else {
                continue;
            };

            if announced_online != Some(snapshot.online) {
                let availability = if snapshot.online { "online" } else { "offline" };
                match mqtt
                    .publish(TOPIC_BRIDGE_AVAILABILITY, QoS::AtLeastOnce, true, availability)
                    .await
                {
                    Ok(()) => announced_online = Some(snapshot.online),
                    Err(err) => warn!("availability publish failed: {err}"),
                }
            }

            match state_payload(&snapshot) {
                Ok(body) => {
                    if let Err(err) = mqtt
                        .publish(TOPIC_BRIDGE_STATE, QoS::AtLeastOnce, true, body)
                        .await
                    {
                        warn!("bridge state publish failed: {err}");
                    }
                }
                Err(err) => warn!("bridge state serialization failed: {err}"),
            }
        }
    });
}

fn state_payload(status: &BridgeStatus) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&PublishedState {
        status,
        published_at: Utc::now().timestamp(),
    })
}

async fn handle_get_status(State(state): State<AppState>) -> axum::response::Response {
    let snapshot = state.status.borrow().clone();
    match snapshot {
        Some(status) => Json(status).into_response(),
        None => error_response(StatusCode::SERVICE_UNAVAILABLE, "Bridge is starting"),
    }
}

async fn handle_set_amps(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> axum::response::Response {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Ok(amps) = value.trim().parse::<f32>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid current limit");
    };
    if !amps.is_finite() || amps < 1.0 {
        return error_response(StatusCode::BAD_REQUEST, "Current limit must be at least 1 A");
    }

    queue_command(&state, Intent::CurrentLimit(amps.trunc() as u32))
}

async fn handle_set_led(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> axum::response::Response {
    match switch_param(&params) {
        Ok(on) => queue_command(&state, Intent::Led(on)),
        Err(response) => response,
    }
}

async fn handle_set_ground(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> axum::response::Response {
    match switch_param(&params) {
        Ok(on) => queue_command(&state, Intent::GroundCheck(on)),
        Err(response) => response,
    }
}

async fn handle_set_lock(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> axum::response::Response {
    match switch_param(&params) {
        Ok(locked) => queue_command(&state, Intent::Lock(locked)),
        Err(response) => response,
    }
}

async fn handle_set_session(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> axum::response::Response {
    let active = match switch_param(&params) {
        Ok(active) => active,
        Err(response) => return response,
    };

    let locked = state
        .status
        .borrow()
        .as_ref()
        .is_some_and(|status| status.locked);
    if !locked {
        return error_response(
            StatusCode::CONFLICT,
            "Session control requires the charger to be locked",
        );
    }

    queue_command(&state, Intent::Session(active))
}

fn switch_param(params: &HashMap<String, String>) -> Result<bool, axum::response::Response> {
    let Some(value) = params.get("value") else {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Missing 'value' parameter",
        ));
    };
    parse_switch(value)
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "Expected 'on' or 'off'"))
}

fn queue_command(state: &AppState, intent: Intent) -> axum::response::Response {
    if state.commands.send(intent).is_err() {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Bridge actor is not running",
        );
    }

    (
        StatusCode::ACCEPTED,
        Json(QueuedCommand {
            command: intent.form_body(),
            page: intent.page().as_str(),
        }),
    )
        .into_response()
}

impl ConfigStore {
    fn new() -> Self {
        let path = std::env::var("CHARGEU_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.chargeu/config.json"));

        Self {
            path: Arc::new(path),
        }
    }

    async fn load(&self) -> anyhow::Result<RuntimeConfig> {
        match tokio::fs::read(self.path.as_ref()).await {
            Ok(raw) => serde_json::from_slice::<RuntimeConfig>(&raw)
                .with_context(|| format!("invalid config file {}", self.path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
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

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chargeu_common::{
        BridgeConfig, DeviceRequest, DeviceResponse, Transport, TransportError, TOPIC_CMD_AMPS,
        TOPIC_CMD_LOCK,
    };
    use pretty_assertions::assert_eq;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut runtime = RuntimeConfig::default();
        apply_env_overrides(
            &mut runtime,
            env_from(&[
                ("DEVICE_URL", "10.0.0.42"),
                ("MQTT_HOST", "broker.lan"),
                ("MQTT_PORT", "1884"),
                ("BRIDGE_HTTP_PORT", "not-a-port"),
            ]),
        );
        runtime.sanitize();

        assert_eq!(runtime.device.base_url, "http://10.0.0.42");
        assert_eq!(runtime.mqtt.host, "broker.lan");
        assert_eq!(runtime.mqtt.port, 1884);
        assert_eq!(runtime.http_port, 8080);
    }

    #[test]
    fn mqtt_commands_are_forwarded_to_the_actor() {
        let (tx, mut rx) = mpsc::unbounded_channel();

        handle_mqtt_message(&tx, TOPIC_CMD_AMPS, b"16").unwrap();
        handle_mqtt_message(&tx, TOPIC_CMD_LOCK, b"ON").unwrap();
        handle_mqtt_message(&tx, TOPIC_CMD_LOCK, b"maybe").unwrap();

        assert_eq!(rx.try_recv().unwrap(), Intent::CurrentLimit(16));
        assert_eq!(rx.try_recv().unwrap(), Intent::Lock(true));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn oversized_mqtt_payload_is_dropped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let payload = vec![b'1'; MAX_MQTT_PAYLOAD_BYTES + 1];

        handle_mqtt_message(&tx, TOPIC_CMD_AMPS, &payload).unwrap();
        assert!(rx.try_recv().is_err());
    }

    struct Unplugged;

    impl Transport for Unplugged {
        fn request(&mut self, request: &DeviceRequest) -> Result<DeviceResponse, TransportError> {
            Err(TransportError::Timeout(request.timeout_ms))
        }
    }

    #[test]
    fn published_state_carries_timestamp() {
        let bridge = ChargerBridge::new(BridgeConfig::default(), Unplugged, 0);
        let status = bridge.status(0);
        let body = state_payload(&status).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(value["statusText"], "Wait...");
        assert!(value["publishedAt"].as_i64().unwrap() > 0);
    }
}
