use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// Acknowledgement payload: a boolean `ok` plus whatever else the
/// server sent, serialized back as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckPayload {
    pub ok: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AckPayload {
    /// Interpret the arguments of an acknowledgement packet.
    ///
    /// The first argument must be an object with a boolean `ok`.
    pub fn from_args(args: Vec<Value>) -> Result<Self, CoreError> {
        let Some(first) = args.into_iter().next() else {
            return Err(CoreError::MalformedAck {
                message: "acknowledgement carried no arguments".into(),
            });
        };
        if !first.get("ok").is_some_and(Value::is_boolean) {
            return Err(CoreError::MalformedAck {
                message: format!("expected an object with a boolean 'ok', got {first}"),
            });
        }
        serde_json::from_value(first).map_err(|e| CoreError::MalformedAck {
            message: e.to_string(),
        })
    }

    /// Server-supplied message (`msg`, or `message`).
    pub fn message(&self) -> Option<&str> {
        self.extra
            .get("msg")
            .or_else(|| self.extra.get("message"))
            .and_then(Value::as_str)
    }

    pub fn to_value(&self) -> Value {
        let mut object = self.extra.clone();
        object.insert("ok".into(), Value::Bool(self.ok));
        Value::Object(object)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_ok_and_extra_fields() {
        let ack = AckPayload::from_args(vec![json!({"ok": true, "monitorID": 4, "msg": "Added"})])
            .unwrap();
        assert!(ack.ok);
        assert_eq!(ack.message(), Some("Added"));
        assert_eq!(
            ack.to_value(),
            json!({"ok": true, "monitorID": 4, "msg": "Added"})
        );
    }

    #[test]
    fn missing_or_non_boolean_ok_is_malformed() {
        for args in [
            vec![],
            vec![json!("ok")],
            vec![json!({"msg": "hi"})],
            vec![json!({"ok": "yes"})],
        ] {
            assert!(
                matches!(AckPayload::from_args(args.clone()), Err(CoreError::MalformedAck { .. })),
                "{args:?} should be malformed"
            );
        }
    }
}
