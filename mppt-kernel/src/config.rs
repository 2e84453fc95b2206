use crate::cadence::{CadencePolicy, MAX_INTERVAL_SECS};
use crate::hass::{HassSettings, SENSOR_COUNT};
use crate::live::LiveSettings;
use crate::publisher::{full_cycle_size, PublisherSettings};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct KernelConfig {
    pub mqtt: MqttConf,
    pub publish: PublishConf,
    pub hass: HassConf,
    pub live: LiveConf,
    pub http: HttpConf,
    pub fleet: FleetConf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub username: Option<String>,
    pub password: Option<String>,
    /// taille de la file de requêtes rumqttc
    pub queue_capacity: usize,
    /// frames JSON reçues sur `<ingest_prefix>/<index>`
    pub ingest_prefix: String,
}

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: "mppt-kernel".into(),
            keep_alive_secs: 15,
            username: None,
            password: None,
            queue_capacity: 256,
            ingest_prefix: "victron-ingest".into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PublishConf {
    pub enabled: bool,
    pub namespace: String,
    pub interval_secs: u64,
    pub updates_only: bool,
    pub include_invalid_in_aggregates: bool,
    pub tick_ms: u64,
}

impl Default for PublishConf {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: "victron".into(),
            interval_secs: 30,
            updates_only: true,
            include_invalid_in_aggregates: true,
            tick_ms: 100,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct HassConf {
    pub enabled: bool,
    pub expire: bool,
    pub retain: bool,
    pub topic: String,
    pub config_url: Option<String>,
}

impl Default for HassConf {
    fn default() -> Self {
        Self {
            enabled: false,
            expire: true,
            retain: true,
            topic: "homeassistant/".into(),
            config_url: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LiveConf {
    pub enabled: bool,
    pub check_interval_ms: u64,
    pub max_staleness_secs: u64,
    /// routes GET accessibles sans clé API
    pub allow_readonly: bool,
}

impl Default for LiveConf {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_ms: 1_000,
            max_staleness_secs: 10,
            allow_readonly: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct HttpConf {
    pub bind: String,
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { bind: "0.0.0.0:8080".into() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct FleetConf {
    pub devices: usize,
    pub data_valid_secs: u64,
}

impl Default for FleetConf {
    fn default() -> Self {
        Self { devices: 2, data_valid_secs: 10 }
    }
}

impl KernelConfig {
    pub fn parse(txt: &str) -> Result<Self, ConfigError> {
        if txt.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: KernelConfig = serde_yaml::from_str(txt)?;
        Ok(cfg.sanitized())
    }

    /// Ramène les valeurs hors bornes dans un domaine utilisable
    pub fn sanitized(mut self) -> Self {
        if self.publish.interval_secs == 0 {
            warn!("[kernel] publish.interval_secs = 0, using 1");
            self.publish.interval_secs = 1;
        }
        if self.publish.interval_secs > MAX_INTERVAL_SECS {
            warn!(
                "[kernel] publish.interval_secs = {} too large, using {}",
                self.publish.interval_secs, MAX_INTERVAL_SECS
            );
            self.publish.interval_secs = MAX_INTERVAL_SECS;
        }
        if self.fleet.devices == 0 {
            warn!("[kernel] fleet.devices = 0, using 1");
            self.fleet.devices = 1;
        }
        self.publish.tick_ms = self.publish.tick_ms.max(10);
        if self.hass.enabled && !self.hass.topic.is_empty() && !self.hass.topic.ends_with('/') {
            self.hass.topic.push('/');
        }

        // un cycle complet + l'annonce HA doivent tenir dans la file MQTT
        let needed = full_cycle_size(self.fleet.devices) + self.fleet.devices * SENSOR_COUNT;
        if self.mqtt.queue_capacity < needed {
            warn!(
                "[kernel] mqtt.queue_capacity {} too small for {} devices, using {}",
                self.mqtt.queue_capacity, self.fleet.devices, needed
            );
            self.mqtt.queue_capacity = needed;
        }
        self
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.publish.interval_secs)
    }

    pub fn cadence_policy(&self) -> CadencePolicy {
        CadencePolicy {
            interval: self.publish_interval(),
            updates_only: self.publish.updates_only,
            expiry_window: self.hass.enabled && self.hass.expire,
        }
    }

    pub fn publisher_settings(&self) -> PublisherSettings {
        PublisherSettings {
            enabled: self.publish.enabled,
            namespace: self.publish.namespace.clone(),
            include_invalid_in_aggregates: self.publish.include_invalid_in_aggregates,
        }
    }

    pub fn hass_settings(&self) -> HassSettings {
        HassSettings {
            enabled: self.hass.enabled,
            expire: self.hass.expire,
            retain: self.hass.retain,
            topic: self.hass.topic.clone(),
            namespace: self.publish.namespace.clone(),
            interval: self.publish_interval(),
            config_url: self.hass.config_url.clone(),
        }
    }

    pub fn live_settings(&self) -> LiveSettings {
        LiveSettings {
            enabled: self.live.enabled,
            check_interval: Duration::from_millis(self.live.check_interval_ms),
            max_staleness: Duration::from_secs(self.live.max_staleness_secs),
            include_invalid_in_aggregates: self.publish.include_invalid_in_aggregates,
        }
    }

    pub fn data_valid(&self) -> Duration {
        Duration::from_secs(self.fleet.data_valid_secs)
    }
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("MPPT_KERNEL_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    load_config_from(&path).await
}

/// Fichier absent ou invalide : config par défaut, avec un avertissement
pub async fn load_config_from(path: impl AsRef<Path>) -> KernelConfig {
    let path = path.as_ref();
    if !path.exists() {
        warn!("[kernel] pas de {}, usage config par défaut", path.display());
        return KernelConfig::default().sanitized();
    }

    let parsed = match fs::read_to_string(path).await {
        Ok(txt) => KernelConfig::parse(&txt),
        Err(e) => Err(ConfigError::from(e)),
    };
    parsed.unwrap_or_else(|e| {
        warn!("[kernel] config invalide: {e}");
        KernelConfig::default().sanitized()
    })
}
