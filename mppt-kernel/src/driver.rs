/**
 * DRIVER - Tick unique de l'ordonnanceur
 *
 * RÔLE :
 * Une seule tâche appelle, dans l'ordre et sans suspension, la publication
 * MQTT de la flotte, l'annonce Home Assistant et la porte du live view.
 *
 * FONCTIONNEMENT :
 * - La flotte reste verrouillée pendant tout le tick (lecture cohérente)
 * - Une demande de rafraîchissement (HTTP) est consommée en début de tick
 * - Les échecs sont journalisés puis retentés aux ticks suivants, rien n'est fatal
 */

use crate::clock::{MonotonicClock, Tick};
use crate::config::KernelConfig;
use crate::fleet::Fleet;
use crate::hass::HassPublisher;
use crate::health::HealthTracker;
use crate::live::{GateOutcome, LiveViewGate};
use crate::publisher::{CycleOutcome, FleetPublisher};
use crate::state::{ForceFlag, Shared};
use crate::transport::{LiveSink, RetainedSink};
use std::time::Duration;
use tokio::task;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Résultat d'un tick ; None = étape en échec (déjà journalisée)
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub cycle: Option<CycleOutcome>,
    pub announced: Option<usize>,
    pub live: Option<GateOutcome>,
}

pub struct Driver<R, L> {
    sink: R,
    live: L,
    fleet: Shared<Fleet>,
    publisher: FleetPublisher,
    hass: HassPublisher,
    gate: LiveViewGate,
    force: ForceFlag,
    health: HealthTracker,
}

impl<R, L> Driver<R, L>
where
    R: RetainedSink,
    L: LiveSink,
{
    pub fn new(
        cfg: &KernelConfig,
        sink: R,
        live: L,
        fleet: Shared<Fleet>,
        force: ForceFlag,
        health: HealthTracker,
        now: Tick,
    ) -> Self {
        let devices = fleet.lock().len();
        Self {
            sink,
            live,
            fleet,
            publisher: FleetPublisher::new(cfg.publisher_settings(), cfg.cadence_policy(), devices, now),
            hass: HassPublisher::new(cfg.hass_settings()),
            gate: LiveViewGate::new(cfg.live_settings()),
            force,
            health,
        }
    }

    pub fn publisher(&self) -> &FleetPublisher {
        &self.publisher
    }

    pub fn run_once(&mut self, now: Tick) -> TickReport {
        if self.force.take() {
            self.publisher.force_update(now);
            self.hass.force_update();
        }

        let fleet = self.fleet.lock();

        let cycle = match self.publisher.run_cycle(&self.sink, &fleet, now) {
            Ok(outcome) => {
                if matches!(outcome, CycleOutcome::Published { .. }) {
                    self.health.record_cycle();
                }
                Some(outcome)
            }
            Err(e) => {
                warn!("[driver] publish cycle aborted: {}", e);
                self.health.record_cycle_failure();
                None
            }
        };

        let announced = match self.hass.poll(&self.sink, &fleet, now) {
            Ok(count) => Some(count),
            Err(e) => {
                warn!("[driver] discovery publish failed: {}", e);
                None
            }
        };

        let live = match self.gate.poll(&self.live, &fleet, now) {
            Ok(outcome) => {
                if matches!(outcome, GateOutcome::Broadcast { .. }) {
                    self.health.record_broadcast();
                }
                Some(outcome)
            }
            Err(e) => {
                warn!("[driver] {}", e);
                None
            }
        };

        TickReport { cycle, announced, live }
    }
}

pub fn spawn_driver<R, L>(mut driver: Driver<R, L>, clock: MonotonicClock, period: Duration)
where
    R: RetainedSink + Send + 'static,
    L: LiveSink + Send + 'static,
{
    task::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("[driver] running every {:?}", period);

        loop {
            ticker.tick().await;
            driver.run_once(clock.now());
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cadence::PublishMode;
    use crate::models::Frame;
    use crate::state::new_state;
    use mppt_devkit::{FrameBuilder, MockMqttClient, MockViewerHub, TestHarness};

    fn secs(s: u32) -> Tick {
        Tick(s * 1_000)
    }

    fn config(hass: bool) -> KernelConfig {
        let mut cfg = KernelConfig::default();
        cfg.hass.enabled = hass;
        cfg.fleet.data_valid_secs = 3_600;
        cfg
    }

    fn frame(serial: &str, power: i64) -> Frame {
        let payload = FrameBuilder::mppt(serial).power(power).to_payload();
        serde_json::from_str(&payload).unwrap()
    }

    fn driver(
        cfg: &KernelConfig,
        harness: &TestHarness,
    ) -> (Driver<MockMqttClient, MockViewerHub>, Shared<Fleet>, ForceFlag) {
        let fleet = new_state(Fleet::new(cfg.fleet.devices, cfg.data_valid()));
        {
            let mut guard = fleet.lock();
            guard.apply_frame(0, frame("HQ1", 100), secs(0)).unwrap();
            guard.apply_frame(1, frame("HQ2", 50), secs(0)).unwrap();
        }
        let force = ForceFlag::default();
        let driver = Driver::new(
            cfg,
            harness.mqtt_client.clone(),
            harness.viewers.clone(),
            fleet.clone(),
            force.clone(),
            HealthTracker::new(),
            secs(0),
        );
        (driver, fleet, force)
    }

    #[test]
    fn test_first_tick_full_cycle_and_discovery() {
        let mut harness = TestHarness::new();
        harness.viewers.set_viewers(1);
        let cfg = config(true);
        let (mut driver, _fleet, _force) = driver(&cfg, &harness);

        let report = driver.run_once(secs(0));
        assert!(matches!(report.cycle, Some(CycleOutcome::Published { mode: PublishMode::Full, .. })));
        assert_eq!(report.announced, Some(2 * crate::hass::SENSOR_COUNT));
        assert_eq!(report.live, Some(GateOutcome::Broadcast { heartbeat: false }));

        harness
            .expect_messages_under("victron/HQ1/", 20)
            .expect_messages_under("victron/HQ2/", 20)
            .expect_messages_under("homeassistant/sensor/dtu_victron_HQ1/", 16)
            .expect_messages("victron/P_total", 1);
        harness.verify_expectations().unwrap();
        harness.assert_payload("victron/P_total", "150").unwrap();
        harness
            .assert_field_equals(
                "homeassistant/sensor/dtu_victron_HQ2/panel_power/config",
                "dev.ids",
                &serde_json::Value::from("HQ2"),
            )
            .unwrap();

        let stats = harness.get_stats();
        assert_eq!(stats.frames_pushed, 1);
    }

    #[test]
    fn test_delta_between_full_refreshes() {
        let harness = TestHarness::new();
        let cfg = config(true);
        let (mut driver, fleet, _force) = driver(&cfg, &harness);
        driver.run_once(secs(0));
        assert_eq!(driver.publisher().cadence().next_full(), Some(secs(89)));

        harness.mqtt_client.clear();
        fleet.lock().apply_frame(0, frame("HQ1", 130), secs(10)).unwrap();
        let report = driver.run_once(secs(30));
        assert_eq!(report.cycle, Some(CycleOutcome::Published { mode: PublishMode::Delta, messages: 8 }));
        assert_eq!(harness.mqtt_client.last_payload("victron/HQ1/P").as_deref(), Some("130"));
        assert!(harness.mqtt_client.find_messages_by_topic("victron/HQ2/P").is_empty());
        // aucun viewer : aucune diffusion
        assert_eq!(report.live, Some(GateOutcome::NoViewers));
    }

    #[test]
    fn test_force_flag_triggers_full_and_reannounce() {
        let harness = TestHarness::new();
        let cfg = config(true);
        let (mut driver, _fleet, force) = driver(&cfg, &harness);
        driver.run_once(secs(0));
        assert_eq!(driver.run_once(secs(5)).cycle, Some(CycleOutcome::Idle));

        force.raise();
        let report = driver.run_once(secs(6));
        assert!(matches!(report.cycle, Some(CycleOutcome::Published { mode: PublishMode::Full, .. })));
        assert_eq!(report.announced, Some(2 * crate::hass::SENSOR_COUNT));
    }

    #[test]
    fn test_frames_after_connect_are_announced_and_published() {
        let harness = TestHarness::new();
        let mut cfg = KernelConfig::default();
        cfg.hass.enabled = true;
        let fleet = new_state(Fleet::new(cfg.fleet.devices, cfg.data_valid()));
        let mut driver = Driver::new(
            &cfg,
            harness.mqtt_client.clone(),
            harness.viewers.clone(),
            fleet.clone(),
            ForceFlag::default(),
            HealthTracker::new(),
            secs(0),
        );

        // premier tick : broker connecté, aucune frame encore reçue
        let report = driver.run_once(Tick(0));
        assert!(matches!(report.cycle, Some(CycleOutcome::Published { mode: PublishMode::Full, .. })));
        assert_eq!(report.announced, Some(0));

        let mut announced = 0;
        for step in 1..=300u32 {
            let now = Tick(step * 100);
            if step % 50 == 5 {
                let mut guard = fleet.lock();
                guard.apply_frame(0, frame("HQ1", 100), now).unwrap();
                guard.apply_frame(1, frame("HQ2", 50), now).unwrap();
            }
            announced += driver.run_once(now).announced.unwrap_or(0);
        }

        assert_eq!(announced, 2 * crate::hass::SENSOR_COUNT);
        assert_eq!(harness.mqtt_client.last_payload("victron/HQ1/ERR").as_deref(), Some("No error"));
        assert_eq!(harness.mqtt_client.last_payload("victron/HQ2/LOAD").as_deref(), Some("OFF"));
        assert_eq!(harness.mqtt_client.last_payload("victron/HQ1/P").as_deref(), Some("100"));
    }

    #[test]
    fn test_broker_outage_is_retried() {
        let harness = TestHarness::new();
        let cfg = config(false);
        let (mut driver, _fleet, _force) = driver(&cfg, &harness);

        harness.mqtt_client.set_connected(false);
        assert_eq!(driver.run_once(secs(0)).cycle, Some(CycleOutcome::Offline));

        harness.mqtt_client.set_connected(true);
        harness.mqtt_client.fail_after(3);
        assert_eq!(driver.run_once(secs(1)).cycle, None);

        harness.mqtt_client.heal();
        let report = driver.run_once(secs(2));
        assert!(matches!(report.cycle, Some(CycleOutcome::Published { mode: PublishMode::Full, .. })));
        assert_eq!(driver.publisher().cycles(), 1);
    }
}
