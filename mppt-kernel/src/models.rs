use crate::clock::Tick;
use serde::{Deserialize, Serialize};

/// Dernière frame VE.Direct décodée d'un chargeur MPPT.
///
/// Les clés JSON sont les labels du protocole texte (`PID`, `SER`, `V`...).
/// Tout champ absent garde sa valeur par défaut (zéro / vide).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "UPPERCASE")]
pub struct Frame {
    pub pid: u32,
    pub ser: String,
    pub fw: String,
    pub load: bool,
    pub cs: u8,
    pub err: u8,
    pub or: u32,
    pub mppt: u8,
    pub hsds: u16,
    /// tension batterie (V)
    pub v: f64,
    /// courant batterie (A)
    pub i: f64,
    /// puissance de sortie (W)
    pub p: i32,
    pub vpv: f64,
    pub ppv: i32,
    pub ipv: f64,
    /// rendement (%)
    pub e: f64,
    /// rendement total (kWh)
    pub h19: f64,
    pub h20: f64,
    /// puissance max du jour (W)
    pub h21: i32,
    pub h22: f64,
    pub h23: i32,
}

/// Un appareil de la flotte tel que vu par l'ordonnanceur (lecture seule)
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub index: usize,
    pub frame: Frame,
    /// Instant de la dernière frame reçue, None si jamais reçue
    pub last_update: Option<Tick>,
}

impl DeviceRecord {
    pub fn new(index: usize) -> Self {
        Self { index, frame: Frame::default(), last_update: None }
    }

    /// Identifiant utilisé dans les topics: le numéro de série, ou
    /// `device<index>` tant qu'aucune frame n'a fourni de série
    pub fn topic_id(&self) -> String {
        if self.frame.ser.is_empty() {
            format!("device{}", self.index)
        } else {
            self.frame.ser.clone()
        }
    }
}
