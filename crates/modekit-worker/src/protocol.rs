//! JSON envelope exchanged between the host and the worker.

use crate::config::WorkerConfig;
use modekit_editor::Delta;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Host to worker.
///
/// The three shapes are told apart by their leading key (`init`, `command`,
/// `event`), so the enum is untagged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostMessage {
    Init {
        init: bool,
        #[serde(default)]
        tlns: BTreeMap<String, String>,
        module: String,
        classname: String,
    },
    /// A call carries its callback id as the last element of `args`.
    Command {
        command: String,
        #[serde(default)]
        args: Vec<Value>,
    },
    Event {
        event: String,
        data: EventData,
    },
}

/// Event payloads are wrapped one level deep: `{"data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    #[serde(default)]
    pub data: Value,
}

impl HostMessage {
    pub fn init(config: &WorkerConfig) -> Self {
        HostMessage::Init {
            init: true,
            tlns: config.tlns.clone(),
            module: config.module.clone(),
            classname: config.classname.clone(),
        }
    }

    pub fn command(command: impl Into<String>, args: Vec<Value>) -> Self {
        HostMessage::Command {
            command: command.into(),
            args,
        }
    }

    pub fn call(command: impl Into<String>, mut args: Vec<Value>, id: u64) -> Self {
        args.push(Value::from(id));
        Self::command(command, args)
    }

    pub fn event(event: impl Into<String>, data: Value) -> Self {
        HostMessage::Event {
            event: event.into(),
            data: EventData { data },
        }
    }

    pub fn change(delta: &Delta) -> Result<Self, serde_json::Error> {
        Ok(Self::event("change", serde_json::to_value(delta)?))
    }
}

/// Worker to host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerMessage {
    /// Diagnostic text for the host log.
    Log {
        #[serde(default)]
        data: Value,
    },
    /// A named event for host-side subscribers.
    Event {
        name: String,
        #[serde(default)]
        data: Value,
    },
    /// Response to a command sent with a callback id.
    Call {
        id: u64,
        #[serde(default)]
        data: Value,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use modekit_editor::{DeltaAction, Range};
    use serde_json::json;

    #[test]
    fn test_init_wire_shape() {
        let mut config = WorkerConfig::default();
        config.tlns.insert("coffee".into(), "/srv/coffee".into());
        let value = serde_json::to_value(HostMessage::init(&config)).unwrap();
        assert_eq!(
            value,
            json!({
                "init": true,
                "tlns": {"coffee": "/srv/coffee"},
                "module": "coffee",
                "classname": "BracketLinter",
            })
        );
    }

    #[test]
    fn test_call_appends_callback_id_to_args() {
        let plain = serde_json::to_value(HostMessage::command("setValue", vec![json!("x")])).unwrap();
        assert_eq!(plain, json!({"command": "setValue", "args": ["x"]}));
        let call = serde_json::to_value(HostMessage::call("foo", vec![json!("a")], 7)).unwrap();
        assert_eq!(call, json!({"command": "foo", "args": ["a", 7]}));
    }

    #[test]
    fn test_change_event_nests_delta() {
        let delta = Delta {
            action: DeltaAction::Insert,
            range: Range::new(0, 1, 0, 2),
            lines: vec!["x".into()],
        };
        let value = serde_json::to_value(HostMessage::change(&delta).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "event": "change",
                "data": {"data": {
                    "action": "insert",
                    "range": {"start": {"row": 0, "column": 1}, "end": {"row": 0, "column": 2}},
                    "lines": ["x"],
                }},
            })
        );
    }

    #[test]
    fn test_host_messages_parse_by_shape() {
        let init: HostMessage =
            serde_json::from_str(r#"{"init":true,"module":"m","classname":"C"}"#).unwrap();
        assert!(matches!(init, HostMessage::Init { .. }));
        let command: HostMessage = serde_json::from_str(r#"{"command":"ping"}"#).unwrap();
        assert_eq!(command, HostMessage::command("ping", vec![]));
        let event: HostMessage =
            serde_json::from_str(r#"{"event":"change","data":{"data":1}}"#).unwrap();
        assert_eq!(event, HostMessage::event("change", json!(1)));
    }

    #[test]
    fn test_worker_messages_are_tagged_by_type() {
        let call: WorkerMessage = serde_json::from_str(r#"{"type":"call","id":1,"data":"x"}"#).unwrap();
        assert_eq!(call, WorkerMessage::Call { id: 1, data: json!("x") });
        let event: WorkerMessage = serde_json::from_str(r#"{"type":"event","name":"ok"}"#).unwrap();
        assert_eq!(event, WorkerMessage::Event { name: "ok".into(), data: Value::Null });
        assert!(serde_json::from_str::<WorkerMessage>(r#"{"type":"bogus"}"#).is_err());
    }
}
