//! Messages of the `graphql-transport-ws` protocol.
//!
//! Spec URL: <https://github.com/enisdenjo/graphql-ws/blob/master/PROTOCOL.md>

use displaydoc::Display;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::graphql;
use crate::json_ext::Object;
use crate::json_ext::Value;

/// The WebSocket subprotocol name of the graphql-ws protocol.
pub const GRAPHQL_TRANSPORT_WS_PROTOCOL: &str = "graphql-transport-ws";

/// WebSocket messages sent from the client.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// A new connection
    ConnectionInit {
        /// Optional init payload from the client
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// The start of an operation
    Subscribe {
        /// Message ID
        id: String,
        /// The map form of the GraphQL request
        payload: Object,
    },
    /// The end of an operation
    Complete {
        /// Message ID
        id: String,
    },
    /// Useful for detecting failed connections, displaying latency metrics or
    /// other types of network probing.
    Ping {
        /// Additional details about the ping.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// The response to the Ping message.
    Pong {
        /// Additional details about the pong.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
}

/// WebSocket messages sent from the server.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionAck {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Next {
        id: String,
        payload: graphql::Response,
    },
    /// Operation execution errors, sent instead of any `next` message.
    Error {
        id: String,
        payload: Vec<graphql::Error>,
    },
    Complete {
        id: String,
    },
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
}

/// Why the server closes a connection. The message is the close reason.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
pub enum WebSocketError {
    /// Invalid message received
    InvalidMessage,
    /// Unauthorized
    Unauthorized,
    /// Connection initialisation timeout
    ConnectionInitTimeout,
    /// Subscriber for {0} already exists
    SubscriberAlreadyExists(String),
    /// Too many initialisation requests
    TooManyInitialisationRequests,
}

impl WebSocketError {
    /// The close code sent with the close frame.
    pub fn close_code(&self) -> u16 {
        match self {
            WebSocketError::InvalidMessage => 4400,
            WebSocketError::Unauthorized => 4401,
            WebSocketError::ConnectionInitTimeout => 4408,
            WebSocketError::SubscriberAlreadyExists(_) => 4409,
            WebSocketError::TooManyInitialisationRequests => 4429,
        }
    }
}
