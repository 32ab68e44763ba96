use serde::{Deserialize, Serialize};

use crate::session::Side;

/// Unique identifier for one live client connection. Assigned by the
/// socket layer at upgrade time and invalidated at disconnect; a
/// reconnecting client gets a fresh one.
pub type ConnectionId = String;

/// Longest chat message the server will relay or retain.
pub const CHAT_MESSAGE_MAX_LEN: usize = 500;

/// A matchmade player. The `id` is always the server-assigned connection
/// id; anything a client claims about its own identity is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: ConnectionId,
    pub username: String,
    pub pic: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUser {
    pub username: String,
    pub pic: String,
}

/// A chat line, global or per-game. `time` is an opaque client-side
/// timestamp relayed as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub user: ChatUser,
    pub message: String,
    pub time: String,
}

impl ChatMessage {
    /// Clamp the message body to `CHAT_MESSAGE_MAX_LEN` characters.
    pub fn clamped(mut self) -> Self {
        if self.message.chars().count() > CHAT_MESSAGE_MAX_LEN {
            self.message = self.message.chars().take(CHAT_MESSAGE_MAX_LEN).collect();
        }
        self
    }
}

/// Move payload as submitted by clients: coordinates plus an optional
/// promotion piece. Legality is the position engine's concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<String>,
}

/// Inbound protocol events (client to server).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    FindGame { username: String, pic: String },
    GameRequested,
    Move(Move),
    Resign,
    Flagged,
    GameChat(ChatMessage),
    GlobalChat(ChatMessage),
    Leave,

    // Offer negotiation is a pure relay: the server forwards these to
    // the opponent and keeps no state about pending offers.
    RequestDraw,
    RequestTakeback,
    RequestRematch,
    AcceptDraw,
    AcceptTakeback,
    AcceptRematch,
    DeclineDraw,
    DeclineTakeback,
    DeclineRematch,
}

/// Outbound protocol events (server to client).
///
/// `GameRecieved` keeps the original wire spelling; renaming it would
/// break existing clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    FindGamePending,
    FindGameCancelled,
    GameFound { opponent: Player, side: Side },
    GameRecieved { opponent: Player, side: Side },
    NoGameFound,
    UpdateBoard { position: String, turn: Side },
    OpponentResigned,
    OpponentFlagged,
    OpponentSentChat(ChatMessage),
    GlobalChat(ChatMessage),

    OpponentRequestedDraw,
    OpponentRequestedTakeback,
    OpponentRequestedRematch,
    OpponentAcceptedDraw,
    OpponentAcceptedTakeback,
    OpponentAcceptedRematch,
    OpponentDeclinedDraw,
    OpponentDeclinedTakeback,
    OpponentDeclinedRematch,
}
