use crate::clock::Tick;
use crate::models::{DeviceRecord, Frame};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("Device index {index} out of range (fleet size {size})")]
    UnknownDevice { index: usize, size: usize },
}

/// Flotte de taille fixe. Seul le côté acquisition (ingestion MQTT) écrit ici,
/// l'ordonnanceur ne fait que lire.
#[derive(Debug, Clone)]
pub struct Fleet {
    devices: Vec<DeviceRecord>,
    data_valid: Duration,
}

impl Fleet {
    pub fn new(size: usize, data_valid: Duration) -> Self {
        Self {
            devices: (0..size).map(DeviceRecord::new).collect(),
            data_valid,
        }
    }

    pub fn devices(&self) -> &[DeviceRecord] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Remplace la frame d'un appareil et avance son horodatage
    pub fn apply_frame(&mut self, index: usize, frame: Frame, now: Tick) -> Result<(), FleetError> {
        let size = self.devices.len();
        let record = self
            .devices
            .get_mut(index)
            .ok_or(FleetError::UnknownDevice { index, size })?;
        record.frame = frame;
        record.last_update = Some(now);
        Ok(())
    }

    /// Données valides = frame reçue il y a moins de `data_valid`
    pub fn is_data_valid(&self, index: usize, now: Tick) -> bool {
        self.devices
            .get(index)
            .and_then(|record| record.last_update)
            .map(|last| now.since(last) < self.data_valid)
            .unwrap_or(false)
    }
}
