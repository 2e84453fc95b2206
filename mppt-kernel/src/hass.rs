/**
 * HOME ASSISTANT DISCOVERY - Annonce des entités MQTT
 *
 * RÔLE :
 * Publie, pour chaque chargeur avec des données valides, un message de
 * configuration par capteur afin que Home Assistant crée les entités
 * automatiquement.
 *
 * FONCTIONNEMENT :
 * - Chaque appareil est annoncé dès que ses données sont valides, une fois
 *   par adresse (les frames arrivent après la connexion au broker)
 * - Tout est réannoncé à chaque passage déconnecté → connecté, et sur demande
 *   (`force_update`)
 * - Topic : `<hass.topic><sensor|binary_sensor>/dtu_victron_<serial>/<id>/config`
 * - `exp_aft` = 3 × intervalle quand l'expiration est active : c'est cette
 *   fenêtre que la cadence MQTT doit respecter avec ses cycles complets
 * - Un appareil dont une publication échoue reste à annoncer au tick suivant
 */

use crate::cadence::EXPIRY_FACTOR;
use crate::clock::Tick;
use crate::codes;
use crate::fields::Field;
use crate::fleet::Fleet;
use crate::transport::{RetainedSink, TransportError};
use crate::models::DeviceRecord;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct HassSettings {
    pub enabled: bool,
    pub expire: bool,
    pub retain: bool,
    /// préfixe de discovery, avec son `/` final
    pub topic: String,
    /// namespace des topics d'état
    pub namespace: String,
    pub interval: Duration,
    pub config_url: Option<String>,
}

impl Default for HassSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            expire: true,
            retain: true,
            topic: "homeassistant/".into(),
            namespace: "victron".into(),
            interval: Duration::from_secs(30),
            config_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SensorKind {
    Sensor,
    Binary,
}

struct SensorDef {
    kind: SensorKind,
    caption: &'static str,
    icon: Option<&'static str>,
    field: Field,
    device_class: Option<&'static str>,
    state_class: Option<&'static str>,
    unit: Option<&'static str>,
}

const fn sensor(
    caption: &'static str,
    icon: Option<&'static str>,
    field: Field,
    device_class: Option<&'static str>,
    state_class: Option<&'static str>,
    unit: Option<&'static str>,
) -> SensorDef {
    SensorDef { kind: SensorKind::Sensor, caption, icon, field, device_class, state_class, unit }
}

const SENSORS: [SensorDef; 17] = [
    SensorDef {
        kind: SensorKind::Binary,
        caption: "MPPT load output state",
        icon: Some("mdi:export"),
        field: Field::Load,
        device_class: None,
        state_class: None,
        unit: None,
    },
    sensor("MPPT serial number", Some("mdi:counter"), Field::Ser, None, None, None),
    sensor("MPPT firmware number", Some("mdi:counter"), Field::Fw, None, None, None),
    sensor("MPPT state of operation", Some("mdi:wrench"), Field::Cs, None, None, None),
    sensor("MPPT error code", Some("mdi:bell"), Field::Err, None, None, None),
    sensor("MPPT off reason", Some("mdi:wrench"), Field::Or, None, None, None),
    sensor("MPPT tracker operation mode", Some("mdi:wrench"), Field::Mppt, None, None, None),
    sensor(
        "MPPT Day sequence number (0...364)",
        Some("mdi:calendar-month-outline"),
        Field::Hsds,
        None,
        Some("total"),
        Some("d"),
    ),
    sensor("Battery voltage", None, Field::V, Some("voltage"), Some("measurement"), Some("V")),
    sensor("Battery current", None, Field::I, Some("current"), Some("measurement"), Some("A")),
    sensor("Panel voltage", None, Field::Vpv, Some("voltage"), Some("measurement"), Some("V")),
    sensor("Panel power", None, Field::Ppv, Some("power"), Some("measurement"), Some("W")),
    sensor("Panel yield total", None, Field::H19, Some("energy"), Some("total_increasing"), Some("kWh")),
    sensor("Panel yield today", None, Field::H20, Some("energy"), Some("total"), Some("kWh")),
    sensor("Panel maximum power today", None, Field::H21, Some("power"), Some("measurement"), Some("W")),
    sensor("Panel yield yesterday", None, Field::H22, Some("energy"), Some("total"), Some("kWh")),
    sensor("Panel maximum power yesterday", None, Field::H23, Some("power"), Some("measurement"), Some("W")),
];

/// Messages de discovery publiés par appareil
pub const SENSOR_COUNT: usize = SENSORS.len();

/// Identifiant d'entité dérivé du libellé : minuscules, espaces → `_`,
/// `.`, `(` et `)` retirés
pub fn sensor_id(caption: &str) -> String {
    caption
        .chars()
        .filter(|c| !matches!(c, '.' | '(' | ')'))
        .map(|c| if c == ' ' { '_' } else { c.to_ascii_lowercase() })
        .collect()
}

#[derive(Debug, Serialize)]
struct DeviceBlock {
    name: String,
    ids: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cu: Option<String>,
    mf: &'static str,
    mdl: String,
    sw: &'static str,
}

#[derive(Debug, Serialize)]
struct DiscoveryConfig<'a> {
    name: &'a str,
    stat_t: String,
    uniq_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit_of_meas: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pl_on: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pl_off: Option<&'a str>,
    dev: &'a DeviceBlock,
    #[serde(skip_serializing_if = "Option::is_none")]
    exp_aft: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dev_cla: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stat_cla: Option<&'a str>,
}

pub struct HassPublisher {
    settings: HassSettings,
    was_connected: bool,
    /// adresses déjà annoncées depuis la connexion
    announced: BTreeSet<String>,
}

impl HassPublisher {
    pub fn new(settings: HassSettings) -> Self {
        Self { settings, was_connected: false, announced: BTreeSet::new() }
    }

    pub fn force_update(&mut self) {
        self.announced.clear();
    }

    /// Annonce les appareils valides pas encore annoncés.
    /// Retourne le nombre de messages publiés.
    pub fn poll<S>(&mut self, sink: &S, fleet: &Fleet, now: Tick) -> Result<usize, TransportError>
    where
        S: RetainedSink + ?Sized,
    {
        if !sink.connected() {
            self.was_connected = false;
            return Ok(0);
        }
        if !self.was_connected {
            self.was_connected = true;
            self.announced.clear();
        }
        if !self.settings.enabled {
            return Ok(0);
        }

        let mut sent = 0;
        for record in fleet.devices() {
            if !fleet.is_data_valid(record.index, now) {
                continue;
            }
            let serial = record.topic_id();
            if self.announced.contains(&serial) {
                continue;
            }

            for (topic, payload) in self.messages(record, &serial) {
                sink.publish_with(&topic, &payload, self.settings.retain)?;
                sent += 1;
            }
            info!("[hass] announced {} ({} sensors)", serial, SENSOR_COUNT);
            self.announced.insert(serial);
        }

        if sent > 0 {
            debug!("[hass] published {} discovery configs", sent);
        }
        Ok(sent)
    }

    fn messages(&self, record: &DeviceRecord, serial: &str) -> Vec<(String, String)> {
        let dev = DeviceBlock {
            name: format!("Victron({})", serial),
            ids: serial.to_string(),
            cu: self.settings.config_url.clone(),
            mf: env!("CARGO_PKG_NAME"),
            mdl: codes::pid_name(record.frame.pid),
            sw: env!("CARGO_PKG_VERSION"),
        };

        let mut messages = Vec::with_capacity(SENSOR_COUNT);
        for def in &SENSORS {
            let id = sensor_id(def.caption);
            let component = match def.kind {
                SensorKind::Sensor => "sensor",
                SensorKind::Binary => "binary_sensor",
            };
            let binary = def.kind == SensorKind::Binary;

            let config = DiscoveryConfig {
                name: def.caption,
                stat_t: format!("{}/{}/{}", self.settings.namespace, serial, def.field),
                uniq_id: format!("{}_{}", serial, id),
                icon: def.icon,
                unit_of_meas: def.unit,
                pl_on: binary.then_some("ON"),
                pl_off: binary.then_some("OFF"),
                dev: &dev,
                exp_aft: (!binary && self.settings.expire)
                    .then(|| self.settings.interval.as_secs() * EXPIRY_FACTOR as u64),
                dev_cla: def.device_class,
                stat_cla: def.state_class,
            };

            match serde_json::to_string(&config) {
                Ok(payload) => messages.push((
                    format!("{}{}/dtu_victron_{}/{}/config", self.settings.topic, component, serial, id),
                    payload,
                )),
                Err(e) => tracing::warn!("[hass] cannot serialize {}: {}", id, e),
            }
        }
        messages
    }
}
