//! Wire types for the debug adapter protocol spoken by Condor.
//!
//! Every frame on the wire is one [`ProtocolMessage`]: a request from the front end, a
//! response to one of those requests, or an event raised by the adapter. Argument and body
//! payloads live in [`requests`], [`types`] and [`events`] and use the protocol's camelCase
//! field names.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod events;
pub mod requests;
pub mod types;

pub use events::*;
pub use requests::*;
pub use types::*;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProtocolMessage {
    Request(Request),
    Response(Response),
    Event(Event),
}

impl ProtocolMessage {
    pub fn seq(&self) -> i64 {
        match self {
            ProtocolMessage::Request(r) => r.seq,
            ProtocolMessage::Response(r) => r.seq,
            ProtocolMessage::Event(e) => e.seq,
        }
    }

    /// Overwrite the sequence number; the writer stamps outbound frames just before sending.
    pub fn set_seq(&mut self, seq: i64) {
        match self {
            ProtocolMessage::Request(r) => r.seq = seq,
            ProtocolMessage::Response(r) => r.seq = seq,
            ProtocolMessage::Event(e) => e.seq = seq,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Request {
    pub seq: i64,
    pub command: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub arguments: Value,
}

impl Request {
    /// Decode the arguments into a typed struct. Missing arguments decode as an empty object.
    pub fn parse_arguments<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        match &self.arguments {
            Value::Null => serde_json::from_value(Value::Object(Default::default())),
            other => T::deserialize(other),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Response {
    pub seq: i64,
    pub request_seq: i64,
    pub success: bool,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Response {
    pub fn success(request: &Request, body: Option<Value>) -> Self {
        Self {
            seq: 0,
            request_seq: request.seq,
            success: true,
            command: request.command.clone(),
            message: None,
            body,
        }
    }

    /// Failed response carrying a structured error message in `body.error`.
    pub fn error(request: &Request, error: Message) -> Self {
        let message = error.format.clone();
        Self {
            seq: 0,
            request_seq: request.seq,
            success: false,
            command: request.command.clone(),
            message: Some(message),
            body: Some(serde_json::json!({ "error": error })),
        }
    }

    /// Failed response with only a short reason, e.g. `"cancelled"`.
    pub fn failure(request: &Request, reason: impl Into<String>) -> Self {
        Self {
            seq: 0,
            request_seq: request.seq,
            success: false,
            command: request.command.clone(),
            message: Some(reason.into()),
            body: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Event {
    pub seq: i64,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Event {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            seq: 0,
            event: event.into(),
            body: None,
        }
    }

    /// Build an event from any serializable body. Serialization of the protocol's own body
    /// types cannot fail; anything else degrades to an event without a body.
    pub fn with_body<T: Serialize>(event: impl Into<String>, body: &T) -> Self {
        Self {
            seq: 0,
            event: event.into(),
            body: serde_json::to_value(body).ok(),
        }
    }
}
