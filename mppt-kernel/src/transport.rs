/**
 * TRANSPORTS - Ce que le cœur voit des canaux de sortie
 *
 * RÔLE :
 * Deux traits minimalistes qui isolent l'ordonnanceur de rumqttc et d'axum :
 * - `RetainedSink` : canal publish/subscribe retenu (MQTT)
 * - `LiveSink` : canal push vers les viewers connectés (websocket)
 *
 * Les échecs sont remontés de façon synchrone, sans timeout.
 */

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport not connected")]
    NotConnected,
    #[error("Publish rejected on {topic}: {reason}")]
    Rejected { topic: String, reason: String },
    #[error("Channel closed")]
    Closed,
}

pub trait RetainedSink {
    fn connected(&self) -> bool;

    fn publish_with(&self, topic: &str, payload: &str, retain: bool) -> Result<(), TransportError>;

    /// Publication retenue
    fn publish(&self, topic: &str, payload: &str) -> Result<(), TransportError> {
        self.publish_with(topic, payload, true)
    }
}

pub trait LiveSink {
    fn viewer_count(&self) -> usize;

    fn broadcast(&self, payload: String) -> Result<(), TransportError>;
}
