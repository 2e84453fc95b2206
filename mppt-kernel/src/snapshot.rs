//! Dernières valeurs publiées sur le canal retenu, par appareil.

use crate::fields::{Field, FieldValue, TRACKED_FIELDS};
use crate::models::Frame;
use crate::tracker::ChangeSet;
use std::collections::BTreeMap;

pub type Snapshot = BTreeMap<Field, FieldValue>;

/// Valeurs d'une frame vierge : l'état de départ de chaque entrée
pub fn baseline() -> Snapshot {
    capture(&Frame::default())
}

/// Tous les champs suivis d'une frame
pub fn capture(frame: &Frame) -> Snapshot {
    TRACKED_FIELDS
        .iter()
        .map(|field| (*field, field.value(frame)))
        .collect()
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    entries: Vec<Snapshot>,
    /// adresse sous laquelle le dernier jeu complet a été publié
    topics: Vec<Option<String>>,
}

impl SnapshotStore {
    pub fn new(devices: usize) -> Self {
        Self {
            entries: (0..devices).map(|_| baseline()).collect(),
            topics: vec![None; devices],
        }
    }

    pub fn entry(&self, index: usize) -> Option<&Snapshot> {
        self.entries.get(index)
    }

    pub fn topic(&self, index: usize) -> Option<&str> {
        self.topics.get(index).and_then(|t| t.as_deref())
    }

    /// Applique un ensemble de changements émis avec succès sous `topic`.
    /// Mode complet : l'entrée est remplacée d'un bloc et l'adresse retenue.
    /// Mode delta : seuls les champs émis sont écrasés.
    pub fn commit(&mut self, change: &ChangeSet, topic: &str) {
        if change.index >= self.entries.len() {
            self.entries.resize_with(change.index + 1, baseline);
            self.topics.resize(change.index + 1, None);
        }
        let entry = &mut self.entries[change.index];

        if change.full {
            *entry = change.fields.iter().cloned().collect();
            self.topics[change.index] = Some(topic.to_string());
        } else {
            for (field, value) in &change.fields {
                entry.insert(*field, value.clone());
            }
        }
    }
}
