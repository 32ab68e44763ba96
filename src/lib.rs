// Blitz Server Library - Core Module Organization
//
// Session-coordination core for anonymous real-time chess pairing:
// matchmaking queue, live-game registry, turn/clock state machine and
// the WebSocket event dispatcher on top of them.

// Pure domain leaves
pub mod clock;
pub mod engine;
pub mod session;

// Coordination layer
pub mod lobby;

// Server implementation
pub mod events;
pub mod socket;

// Error taxonomy
pub mod errors;

// Re-export common types for convenient access
pub use crate::clock::Clock;
pub use crate::engine::{CoordinateEngine, MoveVerdict, PositionEngine, PositionState};
pub use crate::errors::{EngineError, NetworkError, SessionError};
pub use crate::events::{ChatMessage, ClientEvent, ConnectionId, Move, Player, ServerEvent};
pub use crate::lobby::{next_sweep_delay, Lobby, QueueOutcome};
pub use crate::session::{EndedBy, Outcome, Session, Side, Winner};
pub use crate::socket::SocketService;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
