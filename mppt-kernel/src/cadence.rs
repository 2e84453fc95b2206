/**
 * CADENCE DE PUBLICATION - Deux échéances, deux modes
 *
 * RÔLE :
 * Décide à chaque tick si un cycle MQTT doit tourner et s'il est complet
 * (tous les champs) ou delta (champs modifiés uniquement).
 *
 * FONCTIONNEMENT :
 * - `next_updates_only` : toujours fini, repoussé de `interval` après chaque cycle
 * - `next_full` : None = plus de cycle complet forcé
 * - Cycle dû si l'une des deux échéances est atteinte
 * - Complet si `next_full <= next_updates_only`, ou si le mode delta est désactivé
 * - Après un cycle complet, avec delta + consommateur à expiration (HA) :
 *   prochain complet à `3 × interval - 1s`, avant que les entités n'expirent
 */

use crate::clock::Tick;
use std::time::Duration;

/// Multiple de l'intervalle annoncé comme délai d'expiration aux consommateurs
pub const EXPIRY_FACTOR: u32 = 3;

/// Intervalle maximal : `EXPIRY_FACTOR × interval` doit rester comparable
/// par différence signée de `Tick` (< 2^31 ms)
pub const MAX_INTERVAL_SECS: u64 = i32::MAX as u64 / 1_000 / EXPIRY_FACTOR as u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishMode {
    Full,
    Delta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CadencePolicy {
    pub interval: Duration,
    /// publication delta entre deux cycles complets
    pub updates_only: bool,
    /// un consommateur annonce une expiration (HA discovery + expire)
    pub expiry_window: bool,
}

impl CadencePolicy {
    /// Délai maximal entre deux cycles complets quand l'expiration est active
    pub fn full_refresh_period(&self) -> Duration {
        self.interval
            .checked_mul(EXPIRY_FACTOR)
            .unwrap_or(Duration::MAX)
            .saturating_sub(Duration::from_secs(1))
    }
}

#[derive(Debug, Clone)]
pub struct Cadence {
    policy: CadencePolicy,
    next_full: Option<Tick>,
    next_updates_only: Tick,
}

impl Cadence {
    /// Les deux échéances sont dues immédiatement : le premier cycle est complet
    pub fn new(policy: CadencePolicy, now: Tick) -> Self {
        Self { policy, next_full: Some(now), next_updates_only: now }
    }

    pub fn next_full(&self) -> Option<Tick> {
        self.next_full
    }

    pub fn next_updates_only(&self) -> Tick {
        self.next_updates_only
    }

    pub fn is_due(&self, now: Tick) -> bool {
        now.has_reached(self.next_updates_only)
            || self.next_full.map_or(false, |deadline| now.has_reached(deadline))
    }

    pub fn mode(&self) -> PublishMode {
        let full_first = self
            .next_full
            .map_or(false, |full| full.is_at_or_before(self.next_updates_only));

        if full_first || !self.policy.updates_only {
            PublishMode::Full
        } else {
            PublishMode::Delta
        }
    }

    /// Recalcule les échéances après un cycle validé
    pub fn reschedule(&mut self, now: Tick, mode: PublishMode) {
        self.next_updates_only = now.after(self.policy.interval);

        if mode == PublishMode::Full {
            self.next_full = match (self.policy.updates_only, self.policy.expiry_window) {
                (true, true) => Some(now.after(self.policy.full_refresh_period())),
                (true, false) => None,
                // sans delta chaque cycle est complet
                (false, _) => Some(now.after(self.policy.interval)),
            };
        }
    }

    /// Le prochain tick lance un cycle complet, quel que soit l'état des timers
    pub fn force_update(&mut self, now: Tick) {
        let due = if self.next_updates_only.is_at_or_before(now) {
            self.next_updates_only
        } else {
            now
        };
        self.next_full = Some(due);
    }
}
