//! # Control Message Wire Schema
//!
//! One JSON document per WebSocket text frame. Every message carries
//! `version` (literal "2"), `id` (the session identifier), `type`, `seq`
//! (the sender's running sequence number) and a type-specific `parameters`
//! object. Client messages additionally carry `serverseq` (the last server
//! seq the client saw) and `position` (a stream-relative `PT<seconds>S`
//! duration); server messages carry `clientseq` (the last client seq the
//! server accepted).
//!
//! Parsing distinguishes a malformed document from a syntactically valid one
//! whose `type` tag is simply outside the recognized client set, so an
//! unknown tag can be dropped without tearing the session down.

use crate::protocol::media::MediaDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol version stamped on every message.
pub const PROTOCOL_VERSION: &str = "2";

/// Message tags a client may send. Anything else is `UnknownType`.
const CLIENT_MESSAGE_TYPES: [&str; 7] = [
    "open",
    "close",
    "discarded",
    "error",
    "paused",
    "ping",
    "resumed",
];

/// Why an inbound text frame could not be decoded.
///
/// Both variants are recoverable: the frame is dropped and the session
/// continues.
#[derive(Debug)]
pub enum DecodeError {
    /// The frame is not a valid JSON document of the expected shape
    Malformed(String),
    /// Valid JSON, but the `type` tag is not a recognized client message
    UnknownType(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Malformed(detail) => write!(f, "malformed message: {}", detail),
            DecodeError::UnknownType(tag) => write!(f, "unknown message type \"{}\"", tag),
        }
    }
}

/// A decoded client message: common envelope plus the typed body.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientMessage {
    pub version: String,
    pub id: String,
    pub seq: u64,
    /// Client's view of the last server seq it received
    #[serde(default)]
    pub serverseq: u64,
    /// Stream-relative timestamp, e.g. "PT12.4S"
    #[serde(default)]
    pub position: String,
    #[serde(flatten)]
    pub body: ClientMessageBody,
}

/// Type-specific part of a client message (`type` + `parameters`).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "parameters", rename_all = "lowercase")]
pub enum ClientMessageBody {
    Open(OpenParameters),
    Close(CloseParameters),
    Discarded(DiscardedParameters),
    Error(ClientErrorParameters),
    Paused(EmptyParameters),
    Ping(PingParameters),
    Resumed(EmptyParameters),
}

impl ClientMessageBody {
    /// Wire tag, for logging.
    pub fn message_type(&self) -> &'static str {
        match self {
            ClientMessageBody::Open(_) => "open",
            ClientMessageBody::Close(_) => "close",
            ClientMessageBody::Discarded(_) => "discarded",
            ClientMessageBody::Error(_) => "error",
            ClientMessageBody::Paused(_) => "paused",
            ClientMessageBody::Ping(_) => "ping",
            ClientMessageBody::Resumed(_) => "resumed",
        }
    }
}

/// `parameters` of an `open` message: the stream the client wants to start.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenParameters {
    #[serde(default)]
    pub organization_id: String,
    pub conversation_id: String,
    #[serde(default)]
    pub participant: Option<Participant>,
    /// Media parameter sets the client offers, in preference order
    #[serde(default)]
    pub media: Vec<MediaDescriptor>,
}

/// Call participant details, logged when a stream opens.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(default)]
    pub id: String,
    /// Calling party number
    #[serde(default)]
    pub ani: String,
    #[serde(default)]
    pub ani_name: String,
    /// Dialed number
    #[serde(default)]
    pub dnis: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloseParameters {
    pub reason: CloseReason,
}

/// Why the client is closing the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloseReason {
    End,
    Error,
    Disconnect,
    Reconnect,
}

/// `parameters` of a `discarded` message: a span of audio the client dropped.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscardedParameters {
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub discarded: String,
}

/// `parameters` of a client-reported `error` message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientErrorParameters {
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub retry_after: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PingParameters {
    /// Round-trip time measured by the client, if it has one
    #[serde(default)]
    pub rtt: Option<String>,
}

/// Empty `parameters` object (`{}` on the wire).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmptyParameters {}

/// A server message ready for serialization. Sequence fields are stamped by
/// the session before the message is built.
#[derive(Debug, Clone, Serialize)]
pub struct ServerMessage {
    pub version: &'static str,
    pub id: String,
    pub seq: u64,
    /// Last client seq the server accepted
    pub clientseq: u64,
    #[serde(flatten)]
    pub body: ServerMessageBody,
}

/// Type-specific part of a server message (`type` + `parameters`).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "parameters", rename_all = "lowercase")]
pub enum ServerMessageBody {
    Opened(OpenedParameters),
    Disconnect(DisconnectParameters),
    Closed(EmptyParameters),
    Pause(EmptyParameters),
    Pong(EmptyParameters),
}

impl ServerMessageBody {
    /// Wire tag, for logging.
    pub fn message_type(&self) -> &'static str {
        match self {
            ServerMessageBody::Opened(_) => "opened",
            ServerMessageBody::Disconnect(_) => "disconnect",
            ServerMessageBody::Closed(_) => "closed",
            ServerMessageBody::Pause(_) => "pause",
            ServerMessageBody::Pong(_) => "pong",
        }
    }
}

/// `parameters` of an `opened` message: echoes the accepted descriptor.
#[derive(Debug, Clone, Serialize)]
pub struct OpenedParameters {
    pub media: Vec<MediaDescriptor>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DisconnectParameters {
    pub reason: DisconnectReason,
    pub info: String,
}

/// Why the server is terminating the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisconnectReason {
    Completed,
    Unauthorized,
    Error,
}

/// Parse an inbound text frame into a typed client message.
///
/// The `type` tag is checked against the recognized client set before the
/// full decode so an unrecognized tag is reported as `UnknownType` rather
/// than a generic deserialization failure.
pub fn parse_client_message(text: &str) -> Result<ClientMessage, DecodeError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|err| DecodeError::Malformed(err.to_string()))?;

    if let Some(tag) = value.get("type").and_then(|tag| tag.as_str()) {
        if !CLIENT_MESSAGE_TYPES.contains(&tag) {
            return Err(DecodeError::UnknownType(tag.to_string()));
        }
    }

    serde_json::from_value(value).map_err(|err| DecodeError::Malformed(err.to_string()))
}
