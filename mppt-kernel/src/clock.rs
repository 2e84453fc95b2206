/**
 * HORLOGE MONOTONE - Compteur millisecondes 32 bits à rebouclage
 *
 * RÔLE :
 * Fournit l'instant `Tick` utilisé par tout l'ordonnancement (échéances MQTT,
 * throttle du live view, âge des frames).
 *
 * FONCTIONNEMENT :
 * - Tick = millisecondes depuis le démarrage, tronquées sur 32 bits (reboucle ~49 jours)
 * - Toute comparaison passe par une différence signée (`now - deadline >= 0`),
 *   jamais par `now >= deadline` qui casse au rebouclage
 */

use std::time::{Duration, Instant};

/// Instant monotone en millisecondes, arithmétique modulo 2^32
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Tick(pub u32);

impl Tick {
    /// `self + d`, modulo 2^32 ; `d` plafonné à 2^31 - 1 ms pour rester
    /// dans le futur au sens de `has_reached`
    pub fn after(self, d: Duration) -> Tick {
        let millis = d.as_millis().min(i32::MAX as u128) as u32;
        Tick(self.0.wrapping_add(millis))
    }

    /// Différence signée `self - other` en millisecondes
    pub fn signed_diff(self, other: Tick) -> i32 {
        self.0.wrapping_sub(other.0) as i32
    }

    /// Vrai si l'échéance `deadline` est atteinte ou dépassée
    pub fn has_reached(self, deadline: Tick) -> bool {
        self.signed_diff(deadline) >= 0
    }

    /// Vrai si `self` tombe au plus tard à `other`
    pub fn is_at_or_before(self, other: Tick) -> bool {
        other.signed_diff(self) >= 0
    }

    /// Temps écoulé depuis `earlier`, modulo 2^32 (`now - last` non signé)
    pub fn since(self, earlier: Tick) -> Duration {
        Duration::from_millis(self.0.wrapping_sub(earlier.0) as u64)
    }
}

/// Source de `Tick` basée sur `Instant`
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }

    pub fn now(&self) -> Tick {
        // troncature volontaire sur 32 bits
        Tick(self.origin.elapsed().as_millis() as u32)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
