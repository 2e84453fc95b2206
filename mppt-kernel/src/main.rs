/**
 * MPPT KERNEL - Point d'entrée du service de télémétrie des chargeurs solaires
 *
 * RÔLE : Orchestration de tous les modules : config, MQTT, driver, HTTP, live view.
 * Bootstrap du système complet avec gestion d'erreurs et logging.
 *
 * ARCHITECTURE : frames MQTT entrantes → Fleet partagée → driver (cadence MQTT
 * complet/delta, annonce Home Assistant, live view websocket) + API REST.
 */

mod aggregate;
mod cadence;
mod clock;
mod codes;
mod config;
mod driver;
mod fields;
mod fleet;
mod hass;
mod health;
mod http;
mod hub;
mod live;
mod models;
mod mqtt;
mod publisher;
mod snapshot;
mod state;
mod tracker;
mod transport;
mod view;

use crate::clock::MonotonicClock;
use crate::config::load_config;
use crate::driver::{spawn_driver, Driver};
use crate::fleet::Fleet;
use crate::health::HealthTracker;
use crate::http::AppState;
use crate::hub::LiveHub;
use crate::state::{new_state, ForceFlag};

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mppt_kernel=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = load_config().await;
    info!(
        "[kernel] {} devices, publish every {}s (updates only: {}), HA discovery: {}",
        cfg.fleet.devices, cfg.publish.interval_secs, cfg.publish.updates_only, cfg.hass.enabled
    );

    let clock = MonotonicClock::new();
    let fleet = new_state(Fleet::new(cfg.fleet.devices, cfg.data_valid()));
    let health_tracker = HealthTracker::new();
    let force = ForceFlag::default();
    let hub = LiveHub::new(16);

    // MQTT : ingestion des frames + état de connexion
    let (mqtt_sink, eventloop) = mqtt::create_mqtt_client(&cfg.mqtt);
    mqtt::spawn_mqtt_listener(
        eventloop,
        mqtt_sink.clone(),
        cfg.mqtt.clone(),
        fleet.clone(),
        clock,
        health_tracker.clone(),
    );

    // driver : cadence MQTT, discovery, live view
    let driver = Driver::new(
        &cfg,
        mqtt_sink,
        hub.clone(),
        fleet.clone(),
        force.clone(),
        health_tracker.clone(),
        clock.now(),
    );
    spawn_driver(driver, clock, Duration::from_millis(cfg.publish.tick_ms));

    let addr: SocketAddr = cfg
        .http
        .bind
        .parse()
        .with_context(|| format!("invalid http.bind address: {}", cfg.http.bind))?;

    let app_state = AppState {
        fleet,
        cfg: Arc::new(cfg),
        clock,
        hub,
        force,
        health_tracker,
    };
    let app = http::build_router(app_state);

    let listener = TcpListener::bind(addr).await.with_context(|| format!("cannot bind {addr}"))?;
    info!("[kernel] listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("[kernel] shutdown requested");
        })
        .await?;

    Ok(())
}
