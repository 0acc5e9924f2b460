use crate::protocol::Message;

/// JSON Schema (draft-07) describing every message on the wire. Shipped to
/// the script side so both ends agree on the closed set of kinds.
pub fn protocol_schema() -> serde_json::Value {
    let schema = schemars::schema_for!(Message);
    serde_json::to_value(&schema).unwrap_or_else(|e| {
        log::error!("Failed to serialize protocol schema: {}", e);
        serde_json::Value::Null
    })
}

pub fn protocol_schema_json() -> String {
    serde_json::to_string_pretty(&protocol_schema()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use codepane_core::{Appearance, Mode};

    fn compiled() -> jsonschema::JSONSchema {
        jsonschema::JSONSchema::compile(&protocol_schema()).expect("schema compiles")
    }

    #[test]
    fn encoded_messages_validate() {
        let schema = compiled();
        let messages = [
            Message::LoadComplete,
            Message::ContentChanged {
                text: "{\"a\":1}".into(),
            },
            Message::PullContentResponse {
                id: None,
                text: "x".into(),
            },
            Message::PushMode { mode: Mode::Xml },
            Message::PushAppearance {
                appearance: Appearance::Light,
            },
            Message::PullContentRequest { id: 3 },
        ];
        for message in messages {
            let wire = codec::encode(&message).unwrap();
            let value: serde_json::Value = serde_json::from_str(&wire).unwrap();
            assert!(schema.is_valid(&value), "{} should validate", wire);
        }
    }

    #[test]
    fn unknown_kinds_and_modes_do_not_validate() {
        let schema = compiled();
        assert!(!schema.is_valid(&serde_json::json!({"kind": "selectAll"})));
        assert!(!schema.is_valid(&serde_json::json!({"kind": "pushMode", "mode": "yaml"})));
        assert!(!schema.is_valid(&serde_json::json!({"kind": "contentChanged"})));
    }

    #[test]
    fn schema_json_is_pretty_printed() {
        let json = protocol_schema_json();
        assert!(json.contains("\"kind\""));
        assert!(json.contains('\n'));
    }
}
