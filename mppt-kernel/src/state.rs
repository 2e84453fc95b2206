use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Demande de rafraîchissement complet, levée par l'API HTTP et consommée
/// par le driver au tick suivant
#[derive(Debug, Clone, Default)]
pub struct ForceFlag(Arc<AtomicBool>);

impl ForceFlag {
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Retourne true une seule fois par demande
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}
