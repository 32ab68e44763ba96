use thiserror::Error;

/// Session-scoped errors. Every session operation is total: it either
/// mutates and succeeds or returns one of these without touching state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// The connection has no live session. Covers stale, duplicate and
    /// out-of-order events arriving after a session already ended.
    #[error("no active session for this connection")]
    NoActiveSession,

    #[error("not this player's turn")]
    NotYourTurn,

    #[error("game already decided")]
    GameOver,

    #[error("move rejected: {0}")]
    IllegalMove(#[from] EngineError),
}

/// Verdicts from the position engine seam
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("malformed square: {square}")]
    MalformedSquare { square: String },

    #[error("invalid promotion piece: {piece}")]
    InvalidPromotion { piece: String },

    #[error("rejected by engine: {details}")]
    Rejected { details: String },
}

/// Network/WebSocket errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("message deserialization failed: {details}")]
    DeserializationFailed { details: String },
}

/// Result type aliases for convenience
pub type SessionResult<T> = Result<T, SessionError>;
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn rejected(details: impl Into<String>) -> Self {
        Self::Rejected {
            details: details.into(),
        }
    }
}
