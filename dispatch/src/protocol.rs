//! Wire messages.
//!
//! Every message is one JSON object per line: `{"type": ..., "payload": ...}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::{ConfigError, ExecutionConfig};

/// Errors produced while decoding a client line.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unknown message type '{0}'")]
    UnknownType(String),

    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: &'static str, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

/// A message sent by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    SetConfig(ExecutionConfig),
    Subscribe(String),
    Unsubscribe(String),
    ProcessFiles { event: String, files: Vec<String> },
}

impl ClientMessage {
    pub fn decode(line: &str) -> Result<ClientMessage, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(line)?;
        match envelope.kind.as_str() {
            "SET_CONFIG" => Ok(ClientMessage::SetConfig(ExecutionConfig::from_payload(&envelope.payload)?)),
            "SUB" => Ok(ClientMessage::Subscribe(event_name("SUB", &envelope.payload)?)),
            "UNSUB" => Ok(ClientMessage::Unsubscribe(event_name("UNSUB", &envelope.payload)?)),
            "PROCESS_FILES" => {
                let (event, files) = process_files(&envelope.payload)?;
                Ok(ClientMessage::ProcessFiles { event, files })
            }
            _ => Err(ProtocolError::UnknownType(envelope.kind)),
        }
    }

    /// Encodes the message as one line, including the trailing newline.
    pub fn encode(&self) -> String {
        let value = match self {
            ClientMessage::SetConfig(config) => json!({"type": "SET_CONFIG", "payload": config}),
            ClientMessage::Subscribe(event) => json!({"type": "SUB", "payload": event}),
            ClientMessage::Unsubscribe(event) => json!({"type": "UNSUB", "payload": event}),
            ClientMessage::ProcessFiles { event, files } => {
                json!({"type": "PROCESS_FILES", "payload": {"event": event, "files": files}})
            }
        };
        format!("{value}\n")
    }
}

/// Accepts either a bare string or `{"event_name": "..."}`.
fn event_name(kind: &'static str, payload: &Value) -> Result<String, ProtocolError> {
    let name = match payload {
        Value::String(name) => Some(name.as_str()),
        Value::Object(object) => object.get("event_name").and_then(Value::as_str),
        _ => None,
    };
    match name {
        Some(name) if !name.trim().is_empty() => Ok(name.to_string()),
        _ => Err(ProtocolError::InvalidPayload {
            kind,
            reason: "expected a non-empty event name".into(),
        }),
    }
}

fn process_files(payload: &Value) -> Result<(String, Vec<String>), ProtocolError> {
    let invalid = |reason: &str| ProtocolError::InvalidPayload {
        kind: "PROCESS_FILES",
        reason: reason.to_string(),
    };

    let event = payload
        .get("event")
        .and_then(Value::as_str)
        .filter(|event| !event.trim().is_empty())
        .ok_or_else(|| invalid("expected a non-empty 'event'"))?;
    let files = payload
        .get("files")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("expected a 'files' list"))?;
    if files.is_empty() {
        return Err(invalid("'files' must not be empty"));
    }

    let mut names = Vec::with_capacity(files.len());
    for file in files {
        let name = file.as_str().ok_or_else(|| invalid("file names must be strings"))?;
        if !is_plain_file_name(name) {
            return Err(invalid(&format!("'{name}' is not a plain file name")));
        }
        names.push(name.to_string());
    }
    Ok((event.to_string(), names))
}

/// Only bare names inside the text directory may be requested.
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// A message sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    Welcome { server_info: String, client_id: String },
    AckConfig(ConfigAck),
    AckSub(String),
    AckUnsub(String),
    StartProcessing { event: String, files: Vec<String> },
    ProcessingComplete(BatchReport),
    Error { message: String },
    ServerExit,
}

impl ServerMessage {
    pub fn decode(line: &str) -> Result<ServerMessage, ProtocolError> {
        Ok(serde_json::from_str(line)?)
    }

    /// Encodes the message as one line, including the trailing newline.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    pub fn error(message: impl Into<String>) -> ServerMessage {
        ServerMessage::Error { message: message.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Success,
    Error,
}

/// Payload of `ACK_CONFIG`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigAck {
    pub status: AckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ExecutionConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ConfigAck {
    pub fn accepted(config: ExecutionConfig) -> ConfigAck {
        ConfigAck {
            status: AckStatus::Success,
            config: Some(config),
            message: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> ConfigAck {
        ConfigAck {
            status: AckStatus::Error,
            config: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Success,
    Failure,
}

/// Payload of `PROCESSING_COMPLETE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub event: String,
    pub status: BatchStatus,
    #[serde(default)]
    pub results: Vec<FileResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
}

impl BatchReport {
    pub fn completed(event: impl Into<String>, results: Vec<FileResult>, duration_seconds: f64) -> BatchReport {
        BatchReport {
            event: event.into(),
            status: BatchStatus::Success,
            results,
            message: None,
            duration_seconds: Some(duration_seconds),
        }
    }

    /// A successful report with no results, sent without running a batch.
    pub fn empty(event: impl Into<String>, message: impl Into<String>) -> BatchReport {
        BatchReport {
            event: event.into(),
            status: BatchStatus::Success,
            results: Vec::new(),
            message: Some(message.into()),
            duration_seconds: None,
        }
    }

    pub fn failed(event: impl Into<String>, message: impl Into<String>) -> BatchReport {
        BatchReport {
            event: event.into(),
            status: BatchStatus::Failure,
            results: Vec::new(),
            message: Some(message.into()),
            duration_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Success,
    Error,
}

/// What the extractor found in one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    /// Category name to the values found, e.g. `"emails"`.
    #[serde(flatten)]
    pub categories: BTreeMap<String, Vec<String>>,
    pub word_count: u64,
}

/// The outcome of processing one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileResult {
    /// OS pid of the process that handled the file.
    pub pid_server: u32,
    pub filename: String,
    #[serde(default)]
    pub data: Extraction,
    pub status: FileStatus,
    #[serde(default)]
    pub error: Option<String>,
}

impl FileResult {
    pub fn success(pid_server: u32, filename: impl Into<String>, data: Extraction) -> FileResult {
        FileResult {
            pid_server,
            filename: filename.into(),
            data,
            status: FileStatus::Success,
            error: None,
        }
    }

    pub fn error(pid_server: u32, filename: impl Into<String>, error: impl Into<String>) -> FileResult {
        FileResult {
            pid_server,
            filename: filename.into(),
            data: Extraction::default(),
            status: FileStatus::Error,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == FileStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroUsize;

    #[test]
    fn decodes_subscriptions_in_both_shapes() {
        assert_eq!(
            ClientMessage::decode(r#"{"type":"SUB","payload":"news"}"#).unwrap(),
            ClientMessage::Subscribe("news".into())
        );
        assert_eq!(
            ClientMessage::decode(r#"{"type":"UNSUB","payload":{"event_name":"news"}}"#).unwrap(),
            ClientMessage::Unsubscribe("news".into())
        );
        assert!(matches!(
            ClientMessage::decode(r#"{"type":"SUB","payload":42}"#),
            Err(ProtocolError::InvalidPayload { kind: "SUB", .. })
        ));
    }

    #[test]
    fn sorts_out_protocol_errors() {
        assert!(matches!(ClientMessage::decode("{not json"), Err(ProtocolError::Malformed(_))));
        assert!(matches!(
            ClientMessage::decode(r#"{"type":"PING","payload":null}"#),
            Err(ProtocolError::UnknownType(kind)) if kind == "PING"
        ));
        assert!(matches!(
            ClientMessage::decode(r#"{"type":"SET_CONFIG","payload":{"mode":"threads","count":0}}"#),
            Err(ProtocolError::InvalidConfig(ConfigError::Count))
        ));
    }

    #[test]
    fn process_files_only_takes_plain_names() {
        let message = ClientMessage::decode(
            r#"{"type":"PROCESS_FILES","payload":{"event":"news","files":["a.txt","b.txt"]}}"#,
        )
        .unwrap();
        assert_eq!(
            message,
            ClientMessage::ProcessFiles {
                event: "news".into(),
                files: vec!["a.txt".into(), "b.txt".into()]
            }
        );

        for files in [r#"[]"#, r#"["../etc/passwd"]"#, r#"["dir/a.txt"]"#, r#"[3]"#] {
            let line = format!(r#"{{"type":"PROCESS_FILES","payload":{{"event":"news","files":{files}}}}}"#);
            assert!(matches!(
                ClientMessage::decode(&line),
                Err(ProtocolError::InvalidPayload { kind: "PROCESS_FILES", .. })
            ));
        }
    }

    #[test]
    fn client_messages_survive_the_wire() {
        let messages = [
            ClientMessage::SetConfig(ExecutionConfig::processes(NonZeroUsize::new(4).unwrap())),
            ClientMessage::Subscribe("news".into()),
            ClientMessage::ProcessFiles { event: "news".into(), files: vec!["a.txt".into()] },
        ];
        for message in messages {
            let line = message.encode();
            assert!(line.ends_with('\n'));
            assert_eq!(ClientMessage::decode(line.trim_end()).unwrap(), message);
        }
    }

    #[test]
    fn server_messages_use_type_and_payload() {
        let value = serde_json::to_value(ServerMessage::AckSub("news".into())).unwrap();
        assert_eq!(value, json!({"type": "ACK_SUB", "payload": "news"}));

        let value = serde_json::to_value(ServerMessage::ProcessingComplete(BatchReport::empty(
            "news",
            "No files to process.",
        )))
        .unwrap();
        assert_eq!(
            value,
            json!({
                "type": "PROCESSING_COMPLETE",
                "payload": {"event": "news", "status": "success", "results": [], "message": "No files to process."}
            })
        );

        assert_eq!(
            ServerMessage::decode(r#"{"type":"SERVER_EXIT","payload":null}"#).unwrap(),
            ServerMessage::ServerExit
        );
    }

    #[test]
    fn file_result_flattens_categories() {
        let mut data = Extraction { word_count: 3, ..Default::default() };
        data.categories.insert("emails".into(), vec!["a@b.io".into()]);
        let result = FileResult::success(7, "a.txt", data);

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({
                "pid_server": 7,
                "filename": "a.txt",
                "data": {"emails": ["a@b.io"], "word_count": 3},
                "status": "success",
                "error": null
            })
        );
        assert_eq!(serde_json::from_value::<FileResult>(value).unwrap(), result);
    }
}
