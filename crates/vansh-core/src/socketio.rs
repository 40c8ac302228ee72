//! Socket.IO v4 framing over Engine.IO v4 WebSocket transport.
//!
//! Only the subset a push subscriber needs: the handshake, heartbeats,
//! named events on the default namespace, and outbound binary events with
//! a single attachment (`audio_chunk`).
//!
//! ```text
//! 0{"sid":..,"pingInterval":25000,"pingTimeout":20000}   engine open
//! 2 / 3                                                 ping / pong
//! 40                                                    socket connect
//! 42["progress_update",{...}]                           event
//! 451-["audio_chunk",{"_placeholder":true,"num":0}]     binary event + 1 frame
//! ```

use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::event::ClientMessage;

#[derive(Error, Debug)]
pub enum WireError {
    #[error("empty packet")]
    Empty,
    #[error("unknown engine.io packet type '{0}'")]
    UnknownEnginePacket(char),
    #[error("unknown socket.io packet type '{0}'")]
    UnknownSocketPacket(char),
    #[error("malformed event: {0}")]
    MalformedEvent(String),
    #[error("invalid JSON in packet: {0}")]
    Json(#[from] serde_json::Error),
}

/// Handshake parameters sent by the server in the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    Open(OpenInfo),
    Close,
    Ping,
    Pong,
    /// Payload is a Socket.IO packet.
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(text: &str) -> Result<Self, WireError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(WireError::Empty)?;
        let rest = chars.as_str();
        Ok(match kind {
            '0' => Self::Open(serde_json::from_str(rest)?),
            '1' => Self::Close,
            '2' => Self::Ping,
            '3' => Self::Pong,
            '4' => Self::Message(rest.to_string()),
            '5' => Self::Upgrade,
            '6' => Self::Noop,
            other => return Err(WireError::UnknownEnginePacket(other)),
        })
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Open(_) => "0".to_string(),
            Self::Close => "1".to_string(),
            Self::Ping => "2".to_string(),
            Self::Pong => "3".to_string(),
            Self::Message(body) => format!("4{body}"),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }
}

/// Socket.IO packet carried inside an Engine.IO message.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, payload: Value },
    Ack { id: u64, data: Value },
    ConnectError(Value),
    /// An event followed by `attachments` binary frames.
    BinaryEvent {
        name: String,
        payload: Value,
        attachments: usize,
    },
}

impl SocketPacket {
    /// Decode the body of an Engine.IO `message` packet.
    pub fn decode(body: &str) -> Result<Self, WireError> {
        let mut chars = body.chars();
        let kind = chars.next().ok_or(WireError::Empty)?;
        let mut rest = chars.as_str();

        let mut attachments = 0;
        if kind == '5' || kind == '6' {
            let (count, tail) = rest
                .split_once('-')
                .ok_or_else(|| WireError::MalformedEvent(body.to_string()))?;
            attachments = count
                .parse()
                .map_err(|_| WireError::MalformedEvent(body.to_string()))?;
            rest = tail;
        }

        // Namespace other than "/" is `/name,`.
        if rest.starts_with('/') {
            rest = rest.split_once(',').map_or("", |(_, tail)| tail);
        }

        let digits = rest.chars().take_while(char::is_ascii_digit).count();
        let ack_id = rest[..digits].parse::<u64>().ok();
        let json_part = &rest[digits..];
        let data: Option<Value> = if json_part.is_empty() {
            None
        } else {
            Some(serde_json::from_str(json_part)?)
        };

        match kind {
            '0' => Ok(Self::Connect(data)),
            '1' => Ok(Self::Disconnect),
            '2' => {
                let (name, payload) = split_event(data, body)?;
                Ok(Self::Event { name, payload })
            }
            '3' | '6' => Ok(Self::Ack {
                id: ack_id.ok_or_else(|| WireError::MalformedEvent(body.to_string()))?,
                data: data.unwrap_or(Value::Null),
            }),
            '4' => Ok(Self::ConnectError(data.unwrap_or(Value::Null))),
            '5' => {
                let (name, payload) = split_event(data, body)?;
                Ok(Self::BinaryEvent {
                    name,
                    payload,
                    attachments,
                })
            }
            other => Err(WireError::UnknownSocketPacket(other)),
        }
    }
}

fn split_event(data: Option<Value>, raw: &str) -> Result<(String, Value), WireError> {
    let Some(Value::Array(mut items)) = data else {
        return Err(WireError::MalformedEvent(raw.to_string()));
    };
    if items.is_empty() {
        return Err(WireError::MalformedEvent(raw.to_string()));
    }
    let name = match items.remove(0) {
        Value::String(name) => name,
        _ => return Err(WireError::MalformedEvent(raw.to_string())),
    };
    let payload = if items.is_empty() {
        Value::Null
    } else {
        items.remove(0)
    };
    Ok((name, payload))
}

/// One WebSocket frame to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// Engine.IO message that opens the default namespace, optionally with
/// an auth payload.
pub fn connect_frame(auth: Option<&Value>) -> String {
    match auth {
        Some(auth) => EnginePacket::Message(format!("0{auth}")).encode(),
        None => EnginePacket::Message("0".into()).encode(),
    }
}

/// Text frame for a named event; `ack` asks the server to acknowledge it.
pub fn event_frame(name: &str, payload: &Value, ack: Option<u64>) -> String {
    let body = json!([name, payload]);
    let ack = ack.map(|id| id.to_string()).unwrap_or_default();
    EnginePacket::Message(format!("2{ack}{body}")).encode()
}

/// Frames for a client message: one text frame, plus the attachment for
/// binary messages.
pub fn encode_client(message: &ClientMessage, ack: Option<u64>) -> Vec<Frame> {
    match message {
        ClientMessage::AudioChunk(bytes) => {
            let body = json!([message.event_name(), {"_placeholder": true, "num": 0}]);
            let ack = ack.map(|id| id.to_string()).unwrap_or_default();
            vec![
                Frame::Text(EnginePacket::Message(format!("51-{ack}{body}")).encode()),
                Frame::Binary(bytes.clone()),
            ]
        }
        other => {
            let payload = other.json_payload().unwrap_or(Value::Null);
            vec![Frame::Text(event_frame(other.event_name(), &payload, ack))]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_engine_open() {
        let p = EnginePacket::decode(r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":5000,"maxPayload":1000000}"#)
            .unwrap();
        assert_eq!(
            p,
            EnginePacket::Open(OpenInfo {
                sid: "abc".into(),
                ping_interval: 25000,
                ping_timeout: 5000,
            })
        );
    }

    #[test]
    fn ping_pong_and_errors() {
        assert_eq!(EnginePacket::decode("2").unwrap(), EnginePacket::Ping);
        assert_eq!(EnginePacket::Pong.encode(), "3");
        assert!(matches!(EnginePacket::decode(""), Err(WireError::Empty)));
        assert!(matches!(
            EnginePacket::decode("9"),
            Err(WireError::UnknownEnginePacket('9'))
        ));
    }

    #[test]
    fn decodes_progress_event() {
        let raw = r#"2["progress_update",{"project_id":"p1","stage":"writing","progress":10}]"#;
        match SocketPacket::decode(raw).unwrap() {
            SocketPacket::Event { name, payload } => {
                assert_eq!(name, "progress_update");
                assert_eq!(payload["stage"], "writing");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decodes_connect_with_sid_and_namespace() {
        assert_eq!(
            SocketPacket::decode(r#"0{"sid":"x"}"#).unwrap(),
            SocketPacket::Connect(Some(json!({"sid": "x"})))
        );
        assert_eq!(
            SocketPacket::decode(r#"2/admin,["joined",{}]"#).unwrap(),
            SocketPacket::Event {
                name: "joined".into(),
                payload: json!({}),
            }
        );
        assert_eq!(
            SocketPacket::decode(r#"4{"message":"Not authorized"}"#).unwrap(),
            SocketPacket::ConnectError(json!({"message": "Not authorized"}))
        );
    }

    #[test]
    fn binary_event_header() {
        let raw = r#"51-["audio_chunk",{"_placeholder":true,"num":0}]"#;
        match SocketPacket::decode(raw).unwrap() {
            SocketPacket::BinaryEvent {
                name, attachments, ..
            } => {
                assert_eq!(name, "audio_chunk");
                assert_eq!(attachments, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn event_without_array_is_malformed() {
        assert!(matches!(
            SocketPacket::decode(r#"2{"stage":"x"}"#),
            Err(WireError::MalformedEvent(_))
        ));
        assert!(matches!(
            SocketPacket::decode("2[not json"),
            Err(WireError::Json(_))
        ));
    }

    #[test]
    fn encodes_client_messages() {
        let join = encode_client(
            &ClientMessage::JoinProject {
                project_id: "p1".into(),
            },
            None,
        );
        assert_eq!(
            join,
            vec![Frame::Text(r#"42["join_project",{"project_id":"p1"}]"#.into())]
        );

        let chunk = encode_client(&ClientMessage::AudioChunk(vec![1, 2, 3]), None);
        assert_eq!(chunk.len(), 2);
        assert_eq!(
            chunk[0],
            Frame::Text(r#"451-["audio_chunk",{"_placeholder":true,"num":0}]"#.into())
        );
        assert_eq!(chunk[1], Frame::Binary(vec![1, 2, 3]));
        assert_eq!(connect_frame(None), "40");
        assert_eq!(
            connect_frame(Some(&json!({"token": "t"}))),
            r#"40{"token":"t"}"#
        );
    }

    #[test]
    fn ack_ids_round_trip() {
        let frames = encode_client(
            &ClientMessage::StartTranscription {
                project_id: "p1".into(),
            },
            Some(7),
        );
        assert_eq!(
            frames,
            vec![Frame::Text(
                r#"427["start_transcription",{"project_id":"p1"}]"#.into()
            )]
        );
        assert_eq!(
            SocketPacket::decode(r#"37[{"status":"started"}]"#).unwrap(),
            SocketPacket::Ack {
                id: 7,
                data: json!([{"status": "started"}]),
            }
        );
    }
}
