/*!
Constructeurs de frames VE.Direct au format JSON d'ingestion

Les frames utilisent les labels du protocole texte VE.Direct comme clés
(`PID`, `SER`, `V`, `PPV`, `H19`...), exactement ce que le kernel attend sur
`<ingest_prefix>/<index>`.
*/

use serde_json::{Map, Value};

/// Builder fluide pour une frame de chargeur MPPT
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    fields: Map<String, Value>,
}

impl FrameBuilder {
    /// Frame plausible d'un SmartSolar 100|30 en charge bulk
    pub fn mppt<S: Into<String>>(serial: S) -> Self {
        let serial: String = serial.into();
        let mut builder = Self { fields: Map::new() };
        builder
            .set("PID", 0xA057)
            .set("SER", serial)
            .set("FW", "159")
            .set("LOAD", false)
            .set("CS", 3)
            .set("ERR", 0)
            .set("OR", 0)
            .set("MPPT", 2)
            .set("HSDS", 12)
            .set("V", 13.2)
            .set("I", 7.5)
            .set("P", 100)
            .set("VPV", 38.4)
            .set("PPV", 104)
            .set("IPV", 2.71)
            .set("E", 96.2)
            .set("H19", 1234.5)
            .set("H20", 1.23)
            .set("H21", 340)
            .set("H22", 2.5)
            .set("H23", 410);
        builder
    }

    /// Frame vide (uniquement ce qui est ajouté ensuite)
    pub fn empty() -> Self {
        Self { fields: Map::new() }
    }

    pub fn set<V: Into<Value>>(&mut self, label: &str, value: V) -> &mut Self {
        self.fields.insert(label.to_string(), value.into());
        self
    }

    pub fn with<V: Into<Value>>(mut self, label: &str, value: V) -> Self {
        self.set(label, value);
        self
    }

    pub fn power(self, watts: i64) -> Self {
        self.with("P", watts)
    }

    pub fn panel_power(self, watts: i64) -> Self {
        self.with("PPV", watts)
    }

    pub fn efficiency(self, percent: f64) -> Self {
        self.with("E", percent)
    }

    pub fn build(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Payload sérialisé, prêt à être injecté comme message MQTT
    pub fn to_payload(&self) -> String {
        self.build().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mppt_frame_defaults() {
        let frame = FrameBuilder::mppt("HQ2212ABCDE").build();
        assert_eq!(frame["SER"], "HQ2212ABCDE");
        assert_eq!(frame["P"], 100);
        assert_eq!(frame["LOAD"], false);
    }

    #[test]
    fn test_overrides() {
        let frame = FrameBuilder::mppt("HQ1").power(120).panel_power(130).efficiency(92.5).build();
        assert_eq!(frame["P"], 120);
        assert_eq!(frame["PPV"], 130);
        assert_eq!(frame["E"], 92.5);

        let empty = FrameBuilder::empty().with("V", 12.9).build();
        assert_eq!(empty.as_object().unwrap().len(), 1);
    }
}
