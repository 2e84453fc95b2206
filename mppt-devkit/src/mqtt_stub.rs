/*!
Mock MQTT Client pour tests sans broker

Enregistre tous les messages publiés (topic, payload, retain) et permet de
simuler une déconnexion ou un refus de publication, pour tester l'ordonnanceur
sans démarrer un broker MQTT réel.
*/

use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use anyhow::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct MockMessage {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

/// Mock MQTT Client qui simule le côté publication de rumqttc::AsyncClient
#[derive(Clone)]
pub struct MockMqttClient {
    published_messages: Arc<Mutex<Vec<MockMessage>>>,
    connected: Arc<AtomicBool>,
    /// Nombre de publications acceptées avant de refuser (None = jamais de refus)
    fail_after: Arc<Mutex<Option<usize>>>,
    attempts: Arc<AtomicUsize>,
}

impl MockMqttClient {
    /// Client connecté, qui accepte toutes les publications
    pub fn new() -> Self {
        Self {
            published_messages: Arc::new(Mutex::new(Vec::new())),
            connected: Arc::new(AtomicBool::new(true)),
            fail_after: Arc::new(Mutex::new(None)),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Client qui démarre déconnecté
    pub fn disconnected() -> Self {
        let client = Self::new();
        client.set_connected(false);
        client
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Les `n` prochaines publications passent, les suivantes sont refusées
    pub fn fail_after(&self, n: usize) {
        self.attempts.store(0, Ordering::SeqCst);
        *self.fail_after.lock().unwrap() = Some(n);
    }

    /// Retire l'injection d'échec
    pub fn heal(&self) {
        *self.fail_after.lock().unwrap() = None;
    }

    /// Simule une publication. Retourne une erreur si déconnecté ou si un
    /// échec a été injecté.
    pub fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<()> {
        if !self.is_connected() {
            anyhow::bail!("mock client disconnected");
        }

        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = *self.fail_after.lock().unwrap() {
            if attempt >= limit {
                anyhow::bail!("injected publish failure on {}", topic);
            }
        }

        let message = MockMessage {
            topic: topic.to_string(),
            payload: payload.to_string(),
            retain,
        };
        log::debug!("[MOCK] Published to {}: {} bytes", message.topic, message.payload.len());
        self.published_messages.lock().unwrap().push(message);
        Ok(())
    }

    /// Récupère tous les messages publiés (pour assertions de tests)
    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.published_messages.lock().unwrap().clone()
    }

    /// Liste des topics publiés, dans l'ordre
    pub fn published_topics(&self) -> Vec<String> {
        self.published_messages
            .lock()
            .unwrap()
            .iter()
            .map(|msg| msg.topic.clone())
            .collect()
    }

    /// Trouve les messages publiés sur un topic donné
    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .unwrap()
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    /// Dernier payload publié sur un topic
    pub fn last_payload(&self, topic: &str) -> Option<String> {
        self.find_messages_by_topic(topic).pop().map(|msg| msg.payload)
    }

    /// Parse le dernier message d'un topic en JSON
    pub fn get_last_json_message<T>(&self, topic: &str) -> Result<Option<T>>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        match self.last_payload(topic) {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Messages dont le topic commence par `prefix`
    pub fn messages_with_prefix(&self, prefix: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .unwrap()
            .iter()
            .filter(|msg| msg.topic.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Reset tous les messages enregistrés
    pub fn clear(&self) {
        self.published_messages.lock().unwrap().clear();
    }
}

impl Default for MockMqttClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Hub de viewers simulé (côté push / websocket)
#[derive(Clone, Default)]
pub struct MockViewerHub {
    viewers: Arc<AtomicUsize>,
    frames: Arc<Mutex<Vec<String>>>,
    failing: Arc<AtomicBool>,
}

impl MockViewerHub {
    pub fn with_viewers(count: usize) -> Self {
        let hub = Self::default();
        hub.set_viewers(count);
        hub
    }

    pub fn set_viewers(&self, count: usize) {
        self.viewers.store(count, Ordering::SeqCst);
    }

    pub fn viewers(&self) -> usize {
        self.viewers.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Simule l'envoi d'une frame à tous les viewers
    pub fn push(&self, payload: String) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("injected broadcast failure");
        }
        self.frames.lock().unwrap().push(payload);
        Ok(())
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    /// Dernière frame décodée en JSON
    pub fn last_json(&self) -> Option<Value> {
        self.frames
            .lock()
            .unwrap()
            .last()
            .and_then(|frame| serde_json::from_str(frame).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_client_publish() {
        let client = MockMqttClient::new();
        client.publish("victron/HQ1/P", "120", true).unwrap();

        let messages = client.get_published_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, "victron/HQ1/P");
        assert_eq!(messages[0].payload, "120");
        assert!(messages[0].retain);
    }

    #[test]
    fn test_disconnected_client_rejects() {
        let client = MockMqttClient::disconnected();
        assert!(client.publish("victron/HQ1/P", "120", true).is_err());
        assert!(client.get_published_messages().is_empty());
    }

    #[test]
    fn test_fail_after_injection() {
        let client = MockMqttClient::new();
        client.fail_after(2);
        assert!(client.publish("a", "1", true).is_ok());
        assert!(client.publish("b", "2", true).is_ok());
        assert!(client.publish("c", "3", true).is_err());
        assert_eq!(client.published_topics(), vec!["a", "b"]);

        client.heal();
        assert!(client.publish("c", "3", true).is_ok());
    }

    #[test]
    fn test_viewer_hub_records_frames() {
        let hub = MockViewerHub::with_viewers(2);
        hub.push("{\"mppts\":[]}".into()).unwrap();
        assert_eq!(hub.viewers(), 2);
        assert_eq!(hub.frame_count(), 1);
        assert_eq!(hub.last_json().unwrap()["mppts"], serde_json::json!([]));

        hub.set_failing(true);
        assert!(hub.push("{}".into()).is_err());
        assert_eq!(hub.frame_count(), 1);
    }
}
