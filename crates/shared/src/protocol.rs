//! Wire protocol between the chess client and the match server.
//!
//! Every frame is a JSON object whose `type` field selects the variant.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Messages sent by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Assigns the client its id and the code to resume with after a drop.
    ConnectedId {
        id: String,
        #[serde(
            rename = "reconnect-code",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        reconnect_code: Option<String>,
    },
    /// An opponent was found; the match starts from `fen`.
    Matched { fen: String },
    /// The opponent moved.
    ReceiveMove { fen: String },
    /// The server accepted our pending move.
    AcceptMove { fen: String },
    /// A resume succeeded; carries the next reconnect code.
    Reconnected {
        #[serde(
            rename = "reconnect-code",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        reconnect_code: Option<String>,
    },
    /// Full board state.
    Board { fen: String },
    OpponentDisconnected,
    /// Any `type` this client does not know about.
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// The registry key for this message, `None` for unknown types.
    pub fn kind(&self) -> Option<MessageKind> {
        match self {
            ServerMessage::ConnectedId { .. } => Some(MessageKind::ConnectedId),
            ServerMessage::Matched { .. } => Some(MessageKind::Matched),
            ServerMessage::ReceiveMove { .. } => Some(MessageKind::ReceiveMove),
            ServerMessage::AcceptMove { .. } => Some(MessageKind::AcceptMove),
            ServerMessage::Reconnected { .. } => Some(MessageKind::Reconnected),
            ServerMessage::Board { .. } => Some(MessageKind::Board),
            ServerMessage::OpponentDisconnected => Some(MessageKind::OpponentDisconnected),
            ServerMessage::Unknown => None,
        }
    }
}

/// The `type` tag of a known [`ServerMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    ConnectedId,
    Matched,
    ReceiveMove,
    AcceptMove,
    Reconnected,
    Board,
    OpponentDisconnected,
}

impl MessageKind {
    pub const ALL: [MessageKind; 7] = [
        MessageKind::ConnectedId,
        MessageKind::Matched,
        MessageKind::ReceiveMove,
        MessageKind::AcceptMove,
        MessageKind::Reconnected,
        MessageKind::Board,
        MessageKind::OpponentDisconnected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::ConnectedId => "connected-id",
            MessageKind::Matched => "matched",
            MessageKind::ReceiveMove => "receive-move",
            MessageKind::AcceptMove => "accept-move",
            MessageKind::Reconnected => "reconnected",
            MessageKind::Board => "board",
            MessageKind::OpponentDisconnected => "opponent-disconnected",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown message type: {}", s))
    }
}

/// Messages sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Join the match hosted by `host` using its invite `code`.
    ConnectAttendee { host: String, code: String },
    SendMove { from: String, to: String },
    /// Resume a match after the socket dropped.
    Reconnect {
        id: String,
        #[serde(
            rename = "reconnect-code",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        reconnect_code: Option<String>,
    },
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
