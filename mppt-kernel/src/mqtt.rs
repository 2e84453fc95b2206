/**
 * ADAPTATEUR MQTT - rumqttc côté publication et côté ingestion
 *
 * RÔLE :
 * - `MqttSink` : implémente `RetainedSink` sur un `AsyncClient` (file de
 *   requêtes non bloquante, `try_publish`)
 * - Boucle d'événements : état de connexion, réabonnement à chaque ConnAck,
 *   frames JSON reçues sur `<ingest_prefix>/<index>` → `Fleet`
 *
 * FONCTIONNEMENT :
 * - Erreur de connexion : drapeau `connected` à false, compteur de reconnexions,
 *   pause de 2s puis nouvel essai (rumqttc reconnecte au poll suivant)
 */

use crate::clock::MonotonicClock;
use crate::config::MqttConf;
use crate::fleet::Fleet;
use crate::health::HealthTracker;
use crate::models::Frame;
use crate::state::Shared;
use crate::transport::{RetainedSink, TransportError};
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Topic {0} outside ingest prefix")]
    ForeignTopic(String),
    #[error("Invalid device index in topic {0}")]
    BadIndex(String),
    #[error("Invalid frame JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct MqttSink {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
}

impl MqttSink {
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl RetainedSink for MqttSink {
    fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn publish_with(&self, topic: &str, payload: &str, retain: bool) -> Result<(), TransportError> {
        if !self.connected() {
            return Err(TransportError::NotConnected);
        }
        self.client
            .try_publish(topic, QoS::AtLeastOnce, retain, payload.as_bytes().to_vec())
            .map_err(|e| TransportError::Rejected { topic: topic.to_string(), reason: e.to_string() })
    }
}

pub fn create_mqtt_client(cfg: &MqttConf) -> (MqttSink, EventLoop) {
    let mut opts = MqttOptions::new(cfg.client_id.clone(), cfg.host.clone(), cfg.port);
    opts.set_keep_alive(Duration::from_secs(cfg.keep_alive_secs.max(5)));
    if let (Some(user), Some(pass)) = (&cfg.username, &cfg.password) {
        opts.set_credentials(user.clone(), pass.clone());
    }

    let (client, eventloop) = AsyncClient::new(opts, cfg.queue_capacity);
    let sink = MqttSink { client, connected: Arc::new(AtomicBool::new(false)) };
    (sink, eventloop)
}

/// `<prefix>/<index>` + JSON → (index, frame)
pub fn parse_ingest(prefix: &str, topic: &str, payload: &[u8]) -> Result<(usize, Frame), IngestError> {
    let suffix = topic
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
        .ok_or_else(|| IngestError::ForeignTopic(topic.to_string()))?;
    let index = suffix
        .parse::<usize>()
        .map_err(|_| IngestError::BadIndex(topic.to_string()))?;
    let frame = serde_json::from_slice::<Frame>(payload)?;
    Ok((index, frame))
}

pub fn spawn_mqtt_listener(
    mut eventloop: EventLoop,
    sink: MqttSink,
    cfg: MqttConf,
    fleet: Shared<Fleet>,
    clock: MonotonicClock,
    health: HealthTracker,
) {
    task::spawn(async move {
        let ingest_filter = format!("{}/+", cfg.ingest_prefix);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("[kernel] MQTT connecté à {}:{}", cfg.host, cfg.port);
                    sink.set_connected(true);
                    health.mark_mqtt_connected();
                    if let Err(e) = sink.client.try_subscribe(ingest_filter.as_str(), QoS::AtLeastOnce) {
                        error!("[kernel] subscribe MQTT failed: {e:?}");
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(p))) => {
                    match parse_ingest(&cfg.ingest_prefix, &p.topic, &p.payload) {
                        Ok((index, frame)) => {
                            if let Err(e) = fleet.lock().apply_frame(index, frame, clock.now()) {
                                warn!("[kernel] frame ignorée: {e}");
                            }
                        }
                        Err(IngestError::ForeignTopic(topic)) => debug!("[kernel] topic ignoré: {topic}"),
                        Err(e) => warn!("[kernel] frame invalide: {e}"),
                    }
                }
                Ok(Event::Incoming(Incoming::Disconnect)) => {
                    sink.set_connected(false);
                    health.mark_mqtt_disconnected();
                }
                Ok(_) => {}
                Err(e) => {
                    error!("[kernel] MQTT erreur: {:?}", e);
                    sink.set_connected(false);
                    health.increment_reconnects();
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}
