use crate::errors::{EngineError, EngineResult};
use crate::events::Move;

/// Opaque board state owned by the position engine. The coordination
/// layer stores and forwards it but never interprets the contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionState(String);

impl PositionState {
    pub fn new(raw: impl Into<String>) -> Self {
        PositionState(raw.into())
    }

    pub fn raw(&self) -> &str {
        &self.0
    }
}

/// Game-ending verdicts an engine can attach to a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Checkmate,
    Stalemate,
}

/// Result of a legal move: the successor position plus an optional
/// terminal verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveVerdict {
    pub position: PositionState,
    pub terminal: Option<Terminal>,
}

/// Move-legality and board-serialization service. The session layer
/// delegates every legality question here and treats the answer as
/// authoritative.
pub trait PositionEngine: Send + Sync {
    fn starting_position(&self) -> PositionState;

    fn apply_move(&self, position: &PositionState, mv: &Move) -> EngineResult<MoveVerdict>;

    /// Serialized form of the position, suitable for `update-board`.
    fn current_position(&self, position: &PositionState) -> String;
}

/// Structural engine standing in at the legality seam: it checks that
/// squares and promotion pieces are well-formed and accumulates the
/// accepted move list as the opaque position. It does not model piece
/// movement and never reports a terminal verdict; deployments wanting
/// real rule enforcement plug a full engine into `PositionEngine`.
pub struct CoordinateEngine;

impl CoordinateEngine {
    fn check_square(square: &str) -> EngineResult<()> {
        let bytes = square.as_bytes();
        let well_formed = bytes.len() == 2
            && (b'a'..=b'h').contains(&bytes[0])
            && (b'1'..=b'8').contains(&bytes[1]);
        if well_formed {
            Ok(())
        } else {
            Err(EngineError::MalformedSquare {
                square: square.to_string(),
            })
        }
    }
}

impl PositionEngine for CoordinateEngine {
    fn starting_position(&self) -> PositionState {
        PositionState::new("")
    }

    fn apply_move(&self, position: &PositionState, mv: &Move) -> EngineResult<MoveVerdict> {
        Self::check_square(&mv.from)?;
        Self::check_square(&mv.to)?;
        if mv.from == mv.to {
            return Err(EngineError::rejected(format!("null move on {}", mv.from)));
        }
        if let Some(piece) = &mv.promotion {
            if !matches!(piece.as_str(), "q" | "r" | "b" | "n") {
                return Err(EngineError::InvalidPromotion {
                    piece: piece.clone(),
                });
            }
        }

        let mut raw = position.raw().to_string();
        if !raw.is_empty() {
            raw.push(' ');
        }
        raw.push_str(&mv.from);
        raw.push_str(&mv.to);
        if let Some(piece) = &mv.promotion {
            raw.push_str(piece);
        }

        Ok(MoveVerdict {
            position: PositionState::new(raw),
            terminal: None,
        })
    }

    fn current_position(&self, position: &PositionState) -> String {
        position.raw().to_string()
    }
}
