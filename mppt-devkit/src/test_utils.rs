/*!
Test Harness pour le kernel MPPT

Facilite l'écriture de tests avec:
- Setup automatique du client MQTT simulé et du hub de viewers
- Expectations sur le nombre de messages par topic
- Assertions sur les payloads (texte ou JSON)
*/

use crate::mqtt_stub::{MockMqttClient, MockViewerHub};
use serde_json::Value;
use std::collections::HashMap;
use anyhow::Result;

/// Harness de test complet: broker simulé + viewers simulés
pub struct TestHarness {
    pub mqtt_client: MockMqttClient,
    pub viewers: MockViewerHub,
    expectations: Vec<Expectation>,
}

#[derive(Debug)]
struct Expectation {
    topic: String,
    expected_count: usize,
    /// compte tous les topics qui commencent par `topic`
    prefix: bool,
}

impl TestHarness {
    /// Crée un nouveau harness: broker connecté, aucun viewer
    pub fn new() -> Self {
        env_logger::try_init().ok(); // Init logging pour tests

        Self {
            mqtt_client: MockMqttClient::new(),
            viewers: MockViewerHub::default(),
            expectations: Vec::new(),
        }
    }

    /// Ajoute une expectation: on s'attend à N messages sur un topic
    pub fn expect_messages(&mut self, topic: &str, count: usize) -> &mut Self {
        self.expectations.push(Expectation {
            topic: topic.to_string(),
            expected_count: count,
            prefix: false,
        });
        self
    }

    /// Expectation sur tous les topics sous un préfixe (`victron/HQ1/`)
    pub fn expect_messages_under(&mut self, prefix: &str, count: usize) -> &mut Self {
        self.expectations.push(Expectation {
            topic: prefix.to_string(),
            expected_count: count,
            prefix: true,
        });
        self
    }

    /// Vérifie toutes les expectations configurées
    pub fn verify_expectations(&self) -> Result<()> {
        for expectation in &self.expectations {
            let actual_count = if expectation.prefix {
                self.mqtt_client.messages_with_prefix(&expectation.topic).len()
            } else {
                self.mqtt_client.find_messages_by_topic(&expectation.topic).len()
            };

            if actual_count != expectation.expected_count {
                anyhow::bail!(
                    "Expectation failed for topic '{}': expected {} messages, got {}",
                    expectation.topic, expectation.expected_count, actual_count
                );
            }
        }

        log::info!("All {} expectations verified", self.expectations.len());
        Ok(())
    }

    /// Assert que le dernier payload d'un topic vaut `expected`
    pub fn assert_payload(&self, topic: &str, expected: &str) -> Result<()> {
        match self.mqtt_client.last_payload(topic) {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => anyhow::bail!(
                "Payload mismatch on '{}': expected {:?}, got {:?}",
                topic, expected, actual
            ),
            None => anyhow::bail!("No message published on topic: {}", topic),
        }
    }

    /// Assert qu'un champ a une valeur spécifique dans le dernier message JSON
    pub fn assert_field_equals(&self, topic: &str, field_path: &str, expected: &Value) -> Result<()> {
        if let Some(msg) = self.mqtt_client.get_last_json_message::<Value>(topic)? {
            if let Some(actual) = get_nested_field(&msg, field_path) {
                if actual == expected {
                    return Ok(());
                }
                anyhow::bail!("Field '{}' mismatch: expected {:?}, got {:?}",
                             field_path, expected, actual);
            }
        }

        anyhow::bail!("Field '{}' not found for comparison in {}", field_path, topic);
    }

    /// Stats sur les messages collectés
    pub fn get_stats(&self) -> TestStats {
        let messages = self.mqtt_client.get_published_messages();
        let mut topic_counts = HashMap::new();

        for msg in &messages {
            *topic_counts.entry(msg.topic.clone()).or_insert(0) += 1;
        }

        TestStats {
            total_messages: messages.len(),
            topic_counts,
            frames_pushed: self.viewers.frame_count(),
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Lecture d'un champ JSON par chemin pointé ("dev.ids")
pub fn get_nested_field<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for part in path.split('.') {
        match current {
            Value::Object(obj) => current = obj.get(part)?,
            Value::Array(items) => current = items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        }
    }
    Some(current)
}

#[derive(Debug)]
pub struct TestStats {
    pub total_messages: usize,
    pub topic_counts: HashMap<String, usize>,
    pub frames_pushed: usize,
}
