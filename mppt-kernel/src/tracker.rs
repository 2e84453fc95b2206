/**
 * DÉTECTION DE CHANGEMENT - Quels champs publier pour un appareil
 *
 * FONCTIONNEMENT :
 * - Mode complet : tous les champs suivis, sans condition
 * - Mode delta : uniquement les champs dont la valeur diffère de la dernière
 *   valeur publiée (égalité stricte)
 * - Appareil sans données valides : aucun champ en delta, valeurs courantes
 *   (défauts si jamais initialisé) en complet
 *
 * Le résultat (`ChangeSet`) sert à la fois à émettre et, une fois l'émission
 * réussie, à mettre à jour le `SnapshotStore`.
 */

use crate::fields::{Field, FieldValue, TRACKED_FIELDS};
use crate::models::Frame;
use crate::snapshot::Snapshot;

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    pub index: usize,
    pub full: bool,
    /// Champs à émettre, dans l'ordre de publication
    pub fields: Vec<(Field, FieldValue)>,
}

pub fn diff(index: usize, frame: &Frame, published: &Snapshot, full: bool, data_valid: bool) -> ChangeSet {
    let fields = if full {
        TRACKED_FIELDS.iter().map(|f| (*f, f.value(frame))).collect()
    } else if !data_valid {
        Vec::new()
    } else {
        TRACKED_FIELDS
            .iter()
            .map(|f| (*f, f.value(frame)))
            .filter(|(f, value)| published.get(f) != Some(value))
            .collect()
    };

    ChangeSet { index, full, fields }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{baseline, capture};

    fn frame() -> Frame {
        Frame { ser: "HQ1".into(), p: 100, v: 13.2, ..Frame::default() }
    }

    #[test]
    fn test_full_mode_emits_everything() {
        let current = frame();
        let change = diff(0, &current, &capture(&current), true, true);
        assert_eq!(change.fields.len(), TRACKED_FIELDS.len());
        assert!(change.full);
    }

    #[test]
    fn test_delta_mode_emits_only_changes() {
        let mut current = frame();
        let published = capture(&current);
        current.p = 120;
        current.v = 13.21;

        let change = diff(0, &current, &published, false, true);
        let names: Vec<&str> = change.fields.iter().map(|(f, _)| f.name()).collect();
        assert_eq!(names, vec!["V", "P"]);
        assert_eq!(change.fields[1].1, FieldValue::Int(120));
    }

    #[test]
    fn test_delta_mode_nothing_changed() {
        let current = frame();
        assert!(diff(0, &current, &capture(&current), false, true).fields.is_empty());
    }

    #[test]
    fn test_invalid_device() {
        let never_seen = Frame::default();
        let stale = frame();

        // delta : rien, même si les valeurs diffèrent
        assert!(diff(1, &stale, &baseline(), false, false).fields.is_empty());

        // complet : valeurs par défaut publiées
        let change = diff(1, &never_seen, &baseline(), true, false);
        assert_eq!(change.fields.len(), TRACKED_FIELDS.len());
        assert!(change.fields.contains(&(Field::Ser, FieldValue::Text(String::new()))));
        assert!(change.fields.contains(&(Field::P, FieldValue::Int(0))));
    }
}
