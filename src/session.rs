use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::engine::{PositionEngine, PositionState, Terminal};
use crate::errors::{SessionError, SessionResult};
use crate::events::{ConnectionId, Move, Player};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    White,
    Black,
    Draw,
}

impl From<Side> for Winner {
    fn from(side: Side) -> Self {
        match side {
            Side::White => Winner::White,
            Side::Black => Winner::Black,
        }
    }
}

/// How a decided session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndedBy {
    Checkmate,
    Stalemate,
    Resignation,
    Timeout,
    Disconnect,
}

/// Terminal classification of a session. `Pending` until a terminal
/// event fires; after that the session is immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pending,
    Decided { by: EndedBy, winner: Winner },
}

/// The live state of one in-progress two-player game: both player
/// identities, the clock pair, whose turn it is and the engine-owned
/// position. Constructed directly into the active state; white moves
/// first and both clocks stay stopped until the first legal move lands.
pub struct Session {
    white: Player,
    black: Player,
    white_clock: Clock,
    black_clock: Clock,
    turn: Side,
    position: PositionState,
    outcome: Outcome,
}

impl Session {
    pub fn new(white: Player, black: Player, engine: &dyn PositionEngine) -> Self {
        Session {
            white,
            black,
            white_clock: Clock::new(),
            black_clock: Clock::new(),
            turn: Side::White,
            position: engine.starting_position(),
            outcome: Outcome::Pending,
        }
    }

    pub fn turn(&self) -> Side {
        self.turn
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn player(&self, side: Side) -> &Player {
        match side {
            Side::White => &self.white,
            Side::Black => &self.black,
        }
    }

    pub fn clock(&self, side: Side) -> &Clock {
        match side {
            Side::White => &self.white_clock,
            Side::Black => &self.black_clock,
        }
    }

    fn clock_mut(&mut self, side: Side) -> &mut Clock {
        match side {
            Side::White => &mut self.white_clock,
            Side::Black => &mut self.black_clock,
        }
    }

    pub fn white_id(&self) -> &str {
        &self.white.id
    }

    pub fn black_id(&self) -> &str {
        &self.black.id
    }

    /// Which side the given connection plays.
    pub fn side_of(&self, id: &str) -> SessionResult<Side> {
        if id == self.white.id {
            Ok(Side::White)
        } else if id == self.black.id {
            Ok(Side::Black)
        } else {
            Err(SessionError::NoActiveSession)
        }
    }

    pub fn other_id(&self, id: &str) -> SessionResult<ConnectionId> {
        let side = self.side_of(id)?;
        Ok(self.player(side.other()).id.clone())
    }

    /// Pure lookup for `game-requested`: the caller's opponent and its
    /// own assigned side. Idempotent.
    pub fn opponent_info(&self, id: &str) -> SessionResult<(Player, Side)> {
        let side = self.side_of(id)?;
        Ok((self.player(side.other()).clone(), side))
    }

    /// Apply a move for the given connection. Legal only when it is that
    /// side's turn and the outcome is still pending; rejection leaves
    /// turn, position and both clocks untouched. On success the turn
    /// flips, the mover's clock stops and the opponent's starts. Returns
    /// the serialized position and the new turn.
    pub fn apply_move(
        &mut self,
        engine: &dyn PositionEngine,
        id: &str,
        mv: &Move,
    ) -> SessionResult<(String, Side)> {
        let side = self.side_of(id)?;
        if self.outcome != Outcome::Pending {
            return Err(SessionError::GameOver);
        }
        if side != self.turn {
            return Err(SessionError::NotYourTurn);
        }

        let verdict = engine
            .apply_move(&self.position, mv)
            .map_err(SessionError::IllegalMove)?;

        self.position = verdict.position;
        self.clock_mut(side).stop();
        self.turn = side.other();
        self.clock_mut(side.other()).start();

        match verdict.terminal {
            Some(Terminal::Checkmate) => self.decide(EndedBy::Checkmate, side.into()),
            Some(Terminal::Stalemate) => self.decide(EndedBy::Stalemate, Winner::Draw),
            None => {}
        }

        Ok((engine.current_position(&self.position), self.turn))
    }

    /// Resign on behalf of the given connection; the other side wins.
    /// Returns whether this call decided the session (false when it was
    /// already decided, which is a safe no-op).
    pub fn resign(&mut self, id: &str) -> SessionResult<bool> {
        let side = self.side_of(id)?;
        if self.outcome != Outcome::Pending {
            return Ok(false);
        }
        self.decide(EndedBy::Resignation, side.other().into());
        Ok(true)
    }

    /// The caller asserts its own clock expired. The expiry claim is
    /// trusted as reported (see the protocol trust boundary); the other
    /// side wins.
    pub fn flag_timeout(&mut self, id: &str) -> SessionResult<bool> {
        let side = self.side_of(id)?;
        if self.outcome != Outcome::Pending {
            return Ok(false);
        }
        self.decide(EndedBy::Timeout, side.other().into());
        Ok(true)
    }

    /// A mid-game disconnect scores like a resignation for the player
    /// who stayed.
    pub fn handle_disconnect(&mut self, id: &str) -> SessionResult<bool> {
        let side = self.side_of(id)?;
        if self.outcome != Outcome::Pending {
            return Ok(false);
        }
        self.decide(EndedBy::Disconnect, side.other().into());
        Ok(true)
    }

    fn decide(&mut self, by: EndedBy, winner: Winner) {
        self.white_clock.stop();
        self.black_clock.stop();
        self.outcome = Outcome::Decided { by, winner };
    }
}
