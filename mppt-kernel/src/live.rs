/**
 * LIVE VIEW - Porte de diffusion vers les viewers websocket
 *
 * RÔLE :
 * Décide quand pousser la vue consolidée de la flotte aux viewers connectés,
 * indépendamment de la cadence MQTT.
 *
 * FONCTIONNEMENT :
 * - Aucun viewer : aucun travail, aucun changement d'état
 * - Au plus une vérification par `check_interval` (1s)
 * - Diffusion si un appareil a reçu une nouvelle frame depuis la dernière
 *   diffusion, ou si la dernière diffusion date de plus de `max_staleness` (10s)
 * - Le cache (horodatages par appareil, dernière diffusion) n'avance que sur
 *   succès : un échec est retenté à la vérification suivante
 */

use crate::clock::Tick;
use crate::fleet::Fleet;
use crate::transport::{LiveSink, TransportError};
use crate::view::LiveView;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LiveViewError {
    #[error("Live view serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Live view broadcast failed: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiveSettings {
    pub enabled: bool,
    pub check_interval: Duration,
    pub max_staleness: Duration,
    pub include_invalid_in_aggregates: bool,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval: Duration::from_millis(1_000),
            max_staleness: Duration::from_secs(10),
            include_invalid_in_aggregates: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Disabled,
    NoViewers,
    Throttled,
    Unchanged,
    Broadcast { heartbeat: bool },
}

pub struct LiveViewGate {
    settings: LiveSettings,
    last_check: Option<Tick>,
    last_broadcast: Option<Tick>,
    seen: Vec<Option<Tick>>,
    broadcasts: u64,
}

impl LiveViewGate {
    pub fn new(settings: LiveSettings) -> Self {
        Self {
            settings,
            last_check: None,
            last_broadcast: None,
            seen: Vec::new(),
            broadcasts: 0,
        }
    }

    pub fn broadcasts(&self) -> u64 {
        self.broadcasts
    }

    pub fn last_broadcast(&self) -> Option<Tick> {
        self.last_broadcast
    }

    pub fn poll<L>(&mut self, sink: &L, fleet: &Fleet, now: Tick) -> Result<GateOutcome, LiveViewError>
    where
        L: LiveSink + ?Sized,
    {
        if !self.settings.enabled {
            return Ok(GateOutcome::Disabled);
        }
        if sink.viewer_count() == 0 {
            return Ok(GateOutcome::NoViewers);
        }
        if let Some(last) = self.last_check {
            if now.since(last) < self.settings.check_interval {
                return Ok(GateOutcome::Throttled);
            }
        }
        self.last_check = Some(now);

        let changed = fleet.devices().iter().any(|record| {
            record.last_update.is_some() && record.last_update != self.seen.get(record.index).copied().flatten()
        });
        let heartbeat = match self.last_broadcast {
            None => true,
            Some(last) => now.since(last) > self.settings.max_staleness,
        };

        if !changed && !heartbeat {
            return Ok(GateOutcome::Unchanged);
        }

        let view = LiveView::build(fleet, now, self.settings.include_invalid_in_aggregates);
        let payload = serde_json::to_string(&view)?;
        sink.broadcast(payload)?;

        self.seen = fleet.devices().iter().map(|record| record.last_update).collect();
        self.last_broadcast = Some(now);
        self.broadcasts += 1;

        debug!("[live] broadcast to {} viewers (heartbeat: {})", sink.viewer_count(), !changed);
        Ok(GateOutcome::Broadcast { heartbeat: !changed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Frame;
    use mppt_devkit::MockViewerHub;

    fn fleet() -> Fleet {
        let mut fleet = Fleet::new(2, Duration::from_secs(10));
        fleet.apply_frame(0, Frame { ser: "HQ1".into(), ..Frame::default() }, Tick(0)).unwrap();
        fleet
    }

    fn touch(fleet: &mut Fleet, index: usize, at: u32) {
        let frame = fleet.devices()[index].frame.clone();
        fleet.apply_frame(index, frame, Tick(at)).unwrap();
    }

    #[test]
    fn test_no_viewers_no_work() {
        let hub = MockViewerHub::with_viewers(0);
        let mut gate = LiveViewGate::new(LiveSettings::default());
        let fleet = fleet();

        for t in (0..30_000).step_by(500) {
            assert_eq!(gate.poll(&hub, &fleet, Tick(t)).unwrap(), GateOutcome::NoViewers);
        }
        assert_eq!(hub.frame_count(), 0);
        assert_eq!(gate.last_broadcast(), None);
    }

    #[test]
    fn test_change_then_throttle_then_heartbeat() {
        let hub = MockViewerHub::with_viewers(1);
        let mut gate = LiveViewGate::new(LiveSettings::default());
        let mut fleet = fleet();

        assert_eq!(gate.poll(&hub, &fleet, Tick(100)).unwrap(), GateOutcome::Broadcast { heartbeat: false });
        assert_eq!(gate.poll(&hub, &fleet, Tick(600)).unwrap(), GateOutcome::Throttled);
        assert_eq!(gate.poll(&hub, &fleet, Tick(1_100)).unwrap(), GateOutcome::Unchanged);

        // nouvelle frame : diffusée à la vérification suivante
        touch(&mut fleet, 1, 1_500);
        assert_eq!(gate.poll(&hub, &fleet, Tick(1_800)).unwrap(), GateOutcome::Throttled);
        assert_eq!(gate.poll(&hub, &fleet, Tick(2_100)).unwrap(), GateOutcome::Broadcast { heartbeat: false });

        // rien ne bouge : heartbeat après 10s
        assert_eq!(gate.poll(&hub, &fleet, Tick(12_100)).unwrap(), GateOutcome::Unchanged);
        assert_eq!(gate.poll(&hub, &fleet, Tick(13_100)).unwrap(), GateOutcome::Broadcast { heartbeat: true });
        assert_eq!(hub.frame_count(), 3);

        let last = hub.last_json().unwrap();
        assert_eq!(last["mppts"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_failure_leaves_cache_untouched() {
        let hub = MockViewerHub::with_viewers(2);
        let mut gate = LiveViewGate::new(LiveSettings::default());
        let fleet = fleet();

        hub.set_failing(true);
        assert!(matches!(gate.poll(&hub, &fleet, Tick(0)), Err(LiveViewError::Transport(_))));
        assert_eq!(gate.last_broadcast(), None);

        // throttle toujours appliqué au nouvel essai
        hub.set_failing(false);
        assert_eq!(gate.poll(&hub, &fleet, Tick(500)).unwrap(), GateOutcome::Throttled);
        assert_eq!(gate.poll(&hub, &fleet, Tick(1_000)).unwrap(), GateOutcome::Broadcast { heartbeat: false });
        assert_eq!(gate.broadcasts(), 1);
    }

    #[test]
    fn test_disabled_gate() {
        let hub = MockViewerHub::with_viewers(1);
        let settings = LiveSettings { enabled: false, ..LiveSettings::default() };
        let mut gate = LiveViewGate::new(settings);
        assert_eq!(gate.poll(&hub, &fleet(), Tick(0)).unwrap(), GateOutcome::Disabled);
        assert_eq!(hub.frame_count(), 0);
    }
}
