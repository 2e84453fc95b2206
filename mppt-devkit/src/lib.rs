/*!
# MPPT DevKit - Doubles de test pour le kernel

Bibliothèque facilitant les tests du kernel sans infrastructure:
- Client MQTT simulé (connexion et échecs pilotables)
- Hub de viewers websocket simulé
- Constructeurs de frames VE.Direct JSON
- Harness d'assertions
*/

pub mod mqtt_stub;
pub mod frames;
pub mod test_utils;

pub use mqtt_stub::{MockMessage, MockMqttClient, MockViewerHub};
pub use frames::FrameBuilder;
pub use test_utils::TestHarness;
