/**
 * CATALOGUE DES CHAMPS - Ce que l'ordonnanceur suit et publie
 *
 * RÔLE :
 * Liste ordonnée des champs VE.Direct suivis sur MQTT, extraction d'une
 * valeur typée depuis une `Frame` et rendu texte du payload.
 *
 * FONCTIONNEMENT :
 * - `FieldValue` compare en égalité stricte (pas d'epsilon) : c'est la base
 *   de la détection de changement
 * - `render()` produit le payload publié : codes traduits (PID, CS, ERR, OR,
 *   MPPT), LOAD en ON/OFF, flottants à 2 décimales
 * - IPV n'est pas suivi (il n'existe que dans le live view)
 */

use crate::codes;
use crate::models::Frame;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Pid,
    Ser,
    Fw,
    Load,
    Cs,
    Err,
    Or,
    Mppt,
    Hsds,
    V,
    I,
    P,
    Vpv,
    Ppv,
    H19,
    H20,
    H21,
    H22,
    H23,
    E,
}

/// Ordre de publication sur le canal retenu
pub const TRACKED_FIELDS: [Field; 20] = [
    Field::Pid,
    Field::Ser,
    Field::Fw,
    Field::Load,
    Field::Cs,
    Field::Err,
    Field::Or,
    Field::Mppt,
    Field::Hsds,
    Field::V,
    Field::I,
    Field::P,
    Field::Vpv,
    Field::Ppv,
    Field::H19,
    Field::H20,
    Field::H21,
    Field::H22,
    Field::H23,
    Field::E,
];

impl Field {
    /// Label VE.Direct, utilisé comme dernier segment du topic
    pub fn name(self) -> &'static str {
        match self {
            Field::Pid => "PID",
            Field::Ser => "SER",
            Field::Fw => "FW",
            Field::Load => "LOAD",
            Field::Cs => "CS",
            Field::Err => "ERR",
            Field::Or => "OR",
            Field::Mppt => "MPPT",
            Field::Hsds => "HSDS",
            Field::V => "V",
            Field::I => "I",
            Field::P => "P",
            Field::Vpv => "VPV",
            Field::Ppv => "PPV",
            Field::H19 => "H19",
            Field::H20 => "H20",
            Field::H21 => "H21",
            Field::H22 => "H22",
            Field::H23 => "H23",
            Field::E => "E",
        }
    }

    /// Valeur brute du champ dans la frame
    pub fn value(self, frame: &Frame) -> FieldValue {
        match self {
            Field::Pid => FieldValue::Int(frame.pid as i64),
            Field::Ser => FieldValue::Text(frame.ser.clone()),
            Field::Fw => FieldValue::Text(frame.fw.clone()),
            Field::Load => FieldValue::Flag(frame.load),
            Field::Cs => FieldValue::Int(frame.cs as i64),
            Field::Err => FieldValue::Int(frame.err as i64),
            Field::Or => FieldValue::Int(frame.or as i64),
            Field::Mppt => FieldValue::Int(frame.mppt as i64),
            Field::Hsds => FieldValue::Int(frame.hsds as i64),
            Field::V => FieldValue::Float(frame.v),
            Field::I => FieldValue::Float(frame.i),
            Field::P => FieldValue::Int(frame.p as i64),
            Field::Vpv => FieldValue::Float(frame.vpv),
            Field::Ppv => FieldValue::Int(frame.ppv as i64),
            Field::H19 => FieldValue::Float(frame.h19),
            Field::H20 => FieldValue::Float(frame.h20),
            Field::H21 => FieldValue::Int(frame.h21 as i64),
            Field::H22 => FieldValue::Float(frame.h22),
            Field::H23 => FieldValue::Int(frame.h23 as i64),
            Field::E => FieldValue::Float(frame.e),
        }
    }

    /// Payload texte tel que publié
    pub fn render(self, value: &FieldValue) -> String {
        match (self, value) {
            (Field::Pid, FieldValue::Int(v)) => codes::pid_name(*v as u32),
            (Field::Cs, FieldValue::Int(v)) => codes::cs_name(*v as u8),
            (Field::Err, FieldValue::Int(v)) => codes::err_name(*v as u8),
            (Field::Or, FieldValue::Int(v)) => codes::or_name(*v as u32),
            (Field::Mppt, FieldValue::Int(v)) => codes::mppt_name(*v as u8),
            _ => value.to_string(),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Valeur typée d'un champ
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
    Flag(bool),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{:.2}", v),
            FieldValue::Text(v) => f.write_str(v),
            FieldValue::Flag(true) => f.write_str("ON"),
            FieldValue::Flag(false) => f.write_str("OFF"),
        }
    }
}
