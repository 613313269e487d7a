/*!
Builders de payloads conformes à ce qu'envoient les robots et le dashboard web.
*/

use bytes::Bytes;
use serde_json::Value;

/// Helper pour créer des payloads de test
pub struct PayloadBuilder;

impl PayloadBuilder {
    /// Fausse frame JPEG (marqueurs SOI/EOI) dont le contenu dépend de `tag`
    pub fn jpeg_frame(tag: u8) -> Bytes {
        let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
        data.extend(std::iter::repeat(tag).take(16));
        data.extend_from_slice(&[0xFF, 0xD9]);
        Bytes::from(data)
    }

    /// Commande client → robot, ex: {"command":"STOP"}
    pub fn command(name: &str) -> String {
        serde_json::json!({ "command": name }).to_string()
    }

    /// Ack robot → clients
    pub fn ack(name: &str, ok: bool) -> String {
        serde_json::json!({ "ack": name, "ok": ok }).to_string()
    }

    pub fn telemetry(battery: u8, temperature_c: f32) -> String {
        serde_json::json!({ "battery": battery, "temperature_c": temperature_c }).to_string()
    }

    /// Corps de POST /api/robots/register
    pub fn register(uuid: &str, robot_type: &str) -> Value {
        serde_json::json!({ "uuid": uuid, "type": robot_type })
    }
}
