/**
 * PUBLICATION MQTT DE LA FLOTTE - Cycle complet / delta
 *
 * RÔLE :
 * Orchestration d'un cycle : cadence → détection de changement → émission →
 * totaux → validation des snapshots → nouvelles échéances.
 *
 * FONCTIONNEMENT :
 * - Désactivé : rien. Pas dû : rien. Broker déconnecté : rien, nouvel essai au tick suivant
 * - Par appareil (ordre d'index) : un message par champ à publier sur
 *   `<namespace>/<serial>/<champ>`
 * - Appareil valide dont l'adresse a changé depuis son dernier jeu complet
 *   (serial reçu après le démarrage) : jeu complet pour lui, même en delta
 * - Puis les totaux sur `<namespace>/<nom>_total`, à chaque cycle
 * - Tout ou rien : si une publication échoue, aucun snapshot n'est validé et
 *   les échéances ne bougent pas (les messages retenus déjà partis sont des
 *   doublons sans effet)
 */

use crate::aggregate::FleetTotals;
use crate::cadence::{Cadence, CadencePolicy, PublishMode};
use crate::clock::Tick;
use crate::fleet::Fleet;
use crate::snapshot::SnapshotStore;
use crate::tracker::{self, ChangeSet};
use crate::transport::{RetainedSink, TransportError};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct PublisherSettings {
    pub enabled: bool,
    pub namespace: String,
    pub include_invalid_in_aggregates: bool,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: "victron".into(),
            include_invalid_in_aggregates: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// publication désactivée
    Skipped,
    /// aucune échéance atteinte
    Idle,
    /// broker non connecté, aucun effet de bord
    Offline,
    Published { mode: PublishMode, messages: usize },
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Publish failed after {sent} messages")]
    Transport {
        sent: usize,
        #[source]
        source: TransportError,
    },
}

/// Messages d'un cycle, calculés avant toute émission
#[derive(Debug, Default)]
struct CyclePlan {
    messages: Vec<(String, String)>,
    changes: Vec<(ChangeSet, String)>,
    totals: FleetTotals,
}

pub struct FleetPublisher {
    settings: PublisherSettings,
    cadence: Cadence,
    snapshots: SnapshotStore,
    cycles: u64,
}

impl FleetPublisher {
    pub fn new(settings: PublisherSettings, policy: CadencePolicy, devices: usize, now: Tick) -> Self {
        Self {
            settings,
            cadence: Cadence::new(policy, now),
            snapshots: SnapshotStore::new(devices),
            cycles: 0,
        }
    }

    pub fn cadence(&self) -> &Cadence {
        &self.cadence
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Nombre de cycles validés depuis le démarrage
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn force_update(&mut self, now: Tick) {
        info!("[publisher] full refresh requested");
        self.cadence.force_update(now);
    }

    pub fn run_cycle<S>(&mut self, sink: &S, fleet: &Fleet, now: Tick) -> Result<CycleOutcome, CycleError>
    where
        S: RetainedSink + ?Sized,
    {
        if !self.settings.enabled {
            return Ok(CycleOutcome::Skipped);
        }
        if !self.cadence.is_due(now) {
            return Ok(CycleOutcome::Idle);
        }
        if !sink.connected() {
            debug!("[publisher] broker offline, cycle postponed");
            return Ok(CycleOutcome::Offline);
        }

        let mode = self.cadence.mode();
        let plan = self.plan(fleet, now, mode);

        for (sent, (topic, payload)) in plan.messages.iter().enumerate() {
            if let Err(source) = sink.publish(topic, payload) {
                warn!("[publisher] publish on {} failed: {}", topic, source);
                return Err(CycleError::Transport { sent, source });
            }
        }

        for (change, topic_id) in &plan.changes {
            self.snapshots.commit(change, topic_id);
        }
        self.cadence.reschedule(now, mode);
        self.cycles += 1;

        debug!(
            "[publisher] {:?} cycle: {} messages, {} devices in totals",
            mode,
            plan.messages.len(),
            plan.totals.count()
        );
        Ok(CycleOutcome::Published { mode, messages: plan.messages.len() })
    }

    fn plan(&self, fleet: &Fleet, now: Tick, mode: PublishMode) -> CyclePlan {
        let full = mode == PublishMode::Full;
        let namespace = &self.settings.namespace;
        let mut plan = CyclePlan::default();

        for record in fleet.devices() {
            let valid = fleet.is_data_valid(record.index, now);
            if valid || self.settings.include_invalid_in_aggregates {
                plan.totals.add(&record.frame);
            }

            let topic_id = record.topic_id();
            let moved = valid && self.snapshots.topic(record.index) != Some(topic_id.as_str());
            if moved && !full {
                debug!("[publisher] device {} now addressed as {}, full set", record.index, topic_id);
            }

            let change = match self.snapshots.entry(record.index) {
                Some(published) => tracker::diff(record.index, &record.frame, published, full || moved, valid),
                None => tracker::diff(record.index, &record.frame, &crate::snapshot::baseline(), full || moved, valid),
            };

            for (field, value) in &change.fields {
                plan.messages
                    .push((format!("{}/{}/{}", namespace, topic_id, field), field.render(value)));
            }
            plan.changes.push((change, topic_id));
        }

        for (name, payload) in plan.totals.entries() {
            plan.messages.push((format!("{}/{}", namespace, name), payload));
        }
        plan
    }
}

/// Nombre de messages d'un cycle complet (dimensionne la file MQTT)
pub fn full_cycle_size(devices: usize) -> usize {
    devices * crate::fields::TRACKED_FIELDS.len() + FleetTotals::default().entries().len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{Field, FieldValue, TRACKED_FIELDS};
    use crate::models::Frame;
    use mppt_devkit::MockMqttClient;
    use std::time::Duration;

    fn secs(s: u32) -> Tick {
        Tick(s * 1_000)
    }

    fn policy(updates_only: bool, expiry_window: bool) -> CadencePolicy {
        CadencePolicy { interval: Duration::from_secs(30), updates_only, expiry_window }
    }

    fn fleet_with(frames: &[(&str, i32)], at: Tick) -> Fleet {
        let mut fleet = Fleet::new(frames.len(), Duration::from_secs(3_600));
        for (index, (serial, power)) in frames.iter().enumerate() {
            let frame = Frame { ser: serial.to_string(), p: *power, ppv: power + 10, e: 95.0, ..Frame::default() };
            fleet.apply_frame(index, frame, at).unwrap();
        }
        fleet
    }

    fn publisher(policy: CadencePolicy, devices: usize, now: Tick) -> FleetPublisher {
        FleetPublisher::new(PublisherSettings::default(), policy, devices, now)
    }

    #[test]
    fn test_two_devices_full_every_interval() {
        let client = MockMqttClient::new();
        let mut fleet = fleet_with(&[("HQ1", 100), ("HQ2", 50)], secs(0));
        let mut publisher = publisher(policy(false, false), 2, secs(0));

        let outcome = publisher.run_cycle(&client, &fleet, secs(0)).unwrap();
        assert_eq!(outcome, CycleOutcome::Published { mode: PublishMode::Full, messages: full_cycle_size(2) });
        assert_eq!(client.last_payload("victron/P_total").as_deref(), Some("150"));
        assert_eq!(client.last_payload("victron/HQ1/P").as_deref(), Some("100"));
        assert_eq!(publisher.cadence().next_full(), Some(secs(30)));
        assert_eq!(publisher.cadence().next_updates_only(), secs(30));

        // t=10 : rien
        assert_eq!(publisher.run_cycle(&client, &fleet, secs(10)).unwrap(), CycleOutcome::Idle);

        // t=30 : puissance de l'appareil 0 modifiée, cycle complet
        client.clear();
        let frame = Frame { p: 120, ..fleet.devices()[0].frame.clone() };
        fleet.apply_frame(0, frame, secs(29)).unwrap();
        let outcome = publisher.run_cycle(&client, &fleet, secs(30)).unwrap();
        assert!(matches!(outcome, CycleOutcome::Published { mode: PublishMode::Full, .. }));
        assert_eq!(client.last_payload("victron/HQ1/P").as_deref(), Some("120"));
        // champs inchangés réémis
        assert_eq!(client.last_payload("victron/HQ2/P").as_deref(), Some("50"));
        assert_eq!(client.last_payload("victron/P_total").as_deref(), Some("170"));
    }

    #[test]
    fn test_full_commit_matches_current_values() {
        let client = MockMqttClient::new();
        let fleet = fleet_with(&[("HQ1", 100)], secs(0));
        let mut publisher = publisher(policy(true, true), 1, secs(0));
        publisher.run_cycle(&client, &fleet, secs(0)).unwrap();

        let entry = publisher.snapshots().entry(0).unwrap();
        for field in TRACKED_FIELDS {
            assert_eq!(entry[&field], field.value(&fleet.devices()[0].frame));
        }
        assert_eq!(publisher.cadence().next_full(), Some(secs(89)));
        assert_eq!(publisher.cadence().next_updates_only(), secs(30));
    }

    #[test]
    fn test_delta_cycle_emits_and_commits_only_dirty() {
        let client = MockMqttClient::new();
        let mut fleet = fleet_with(&[("HQ1", 100), ("HQ2", 50)], secs(0));
        let mut publisher = publisher(policy(true, true), 2, secs(0));
        publisher.run_cycle(&client, &fleet, secs(0)).unwrap();
        client.clear();

        let frame = Frame { p: 75, ..fleet.devices()[1].frame.clone() };
        fleet.apply_frame(1, frame, secs(20)).unwrap();

        let outcome = publisher.run_cycle(&client, &fleet, secs(30)).unwrap();
        assert_eq!(outcome, CycleOutcome::Published { mode: PublishMode::Delta, messages: 1 + 7 });

        let device_topics: Vec<String> = client
            .published_topics()
            .into_iter()
            .filter(|t| !t.ends_with("_total"))
            .collect();
        assert_eq!(device_topics, vec!["victron/HQ2/P"]);
        assert_eq!(publisher.snapshots().entry(1).unwrap()[&Field::P], FieldValue::Int(75));
        assert_eq!(publisher.snapshots().entry(0).unwrap()[&Field::P], FieldValue::Int(100));
    }

    #[test]
    fn test_identical_full_cycles_are_idempotent() {
        let client = MockMqttClient::new();
        let fleet = fleet_with(&[("HQ1", 100)], secs(0));
        let mut publisher = publisher(policy(false, false), 1, secs(0));

        publisher.run_cycle(&client, &fleet, secs(0)).unwrap();
        let first = client.get_published_messages();
        client.clear();
        publisher.run_cycle(&client, &fleet, secs(30)).unwrap();
        assert_eq!(client.get_published_messages(), first);
    }

    #[test]
    fn test_offline_has_no_side_effects() {
        let client = MockMqttClient::disconnected();
        let fleet = fleet_with(&[("HQ1", 100)], secs(0));
        let mut publisher = publisher(policy(true, true), 1, secs(0));

        assert_eq!(publisher.run_cycle(&client, &fleet, secs(0)).unwrap(), CycleOutcome::Offline);
        assert_eq!(publisher.cadence().next_full(), Some(secs(0)));
        assert_eq!(publisher.cycles(), 0);

        client.set_connected(true);
        let outcome = publisher.run_cycle(&client, &fleet, secs(1)).unwrap();
        assert!(matches!(outcome, CycleOutcome::Published { mode: PublishMode::Full, .. }));
    }

    #[test]
    fn test_failed_publish_commits_nothing() {
        let client = MockMqttClient::new();
        let fleet = fleet_with(&[("HQ1", 100)], secs(0));
        let mut publisher = publisher(policy(true, true), 1, secs(0));

        client.fail_after(5);
        let err = publisher.run_cycle(&client, &fleet, secs(0)).unwrap_err();
        assert!(matches!(err, CycleError::Transport { sent: 5, .. }));
        assert_eq!(publisher.snapshots().entry(0).unwrap()[&Field::P], FieldValue::Int(0));
        assert_eq!(publisher.cadence().next_full(), Some(secs(0)));

        // nouvel essai complet au tick suivant
        client.heal();
        let outcome = publisher.run_cycle(&client, &fleet, secs(1)).unwrap();
        assert!(matches!(outcome, CycleOutcome::Published { mode: PublishMode::Full, .. }));
    }

    #[test]
    fn test_force_update_next_tick_full() {
        let client = MockMqttClient::new();
        let fleet = fleet_with(&[("HQ1", 100)], secs(0));
        let mut publisher = publisher(policy(true, false), 1, secs(0));
        publisher.run_cycle(&client, &fleet, secs(0)).unwrap();
        assert_eq!(publisher.run_cycle(&client, &fleet, secs(5)).unwrap(), CycleOutcome::Idle);

        publisher.force_update(secs(6));
        client.clear();
        let outcome = publisher.run_cycle(&client, &fleet, secs(6)).unwrap();
        assert_eq!(outcome, CycleOutcome::Published { mode: PublishMode::Full, messages: full_cycle_size(1) });
    }

    #[test]
    fn test_invalid_device_aggregates_and_topic_fallback() {
        let client = MockMqttClient::new();
        // appareil 1 jamais reçu
        let mut fleet = Fleet::new(2, Duration::from_secs(10));
        let frame = Frame { ser: "HQ1".into(), p: 100, e: 90.0, ..Frame::default() };
        fleet.apply_frame(0, frame, secs(0)).unwrap();

        let mut publisher = publisher(policy(true, true), 2, secs(0));
        publisher.run_cycle(&client, &fleet, secs(0)).unwrap();
        assert_eq!(client.last_payload("victron/device1/P").as_deref(), Some("0"));
        // inclus dans la moyenne par défaut
        assert_eq!(client.last_payload("victron/E_total").as_deref(), Some("45.00"));

        let mut settings = PublisherSettings::default();
        settings.include_invalid_in_aggregates = false;
        let mut strict = FleetPublisher::new(settings, policy(true, true), 2, secs(0));
        client.clear();
        strict.run_cycle(&client, &fleet, secs(0)).unwrap();
        assert_eq!(client.last_payload("victron/E_total").as_deref(), Some("90.00"));
    }

    #[test]
    fn test_serial_after_startup_gets_full_set() {
        let client = MockMqttClient::new();
        let mut fleet = Fleet::new(1, Duration::from_secs(10));
        let mut publisher = publisher(policy(true, false), 1, secs(0));

        // démarrage : aucune frame, jeu complet sous l'adresse de repli
        publisher.run_cycle(&client, &fleet, secs(0)).unwrap();
        assert_eq!(client.last_payload("victron/device0/ERR").as_deref(), Some("No error"));
        assert_eq!(publisher.cadence().next_full(), None);

        let frame = Frame { ser: "HQ1".into(), p: 100, ..Frame::default() };
        fleet.apply_frame(0, frame.clone(), secs(25)).unwrap();
        client.clear();
        let outcome = publisher.run_cycle(&client, &fleet, secs(30)).unwrap();
        assert_eq!(outcome, CycleOutcome::Published { mode: PublishMode::Delta, messages: full_cycle_size(1) });
        for field in TRACKED_FIELDS {
            assert_eq!(client.find_messages_by_topic(&format!("victron/HQ1/{}", field)).len(), 1);
        }
        assert_eq!(client.last_payload("victron/HQ1/ERR").as_deref(), Some("No error"));
        assert_eq!(publisher.snapshots().topic(0), Some("HQ1"));

        // ensuite : delta normal
        fleet.apply_frame(0, frame, secs(55)).unwrap();
        client.clear();
        let outcome = publisher.run_cycle(&client, &fleet, secs(60)).unwrap();
        assert_eq!(outcome, CycleOutcome::Published { mode: PublishMode::Delta, messages: 7 });
    }

    #[test]
    fn test_disabled_publisher_skips() {
        let client = MockMqttClient::new();
        let fleet = fleet_with(&[("HQ1", 100)], secs(0));
        let settings = PublisherSettings { enabled: false, ..PublisherSettings::default() };
        let mut publisher = FleetPublisher::new(settings, policy(true, true), 1, secs(0));

        assert_eq!(publisher.run_cycle(&client, &fleet, secs(0)).unwrap(), CycleOutcome::Skipped);
        assert!(client.get_published_messages().is_empty());
    }
}
