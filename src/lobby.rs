use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;

use crate::engine::PositionEngine;
use crate::events::{ChatMessage, ConnectionId, Player};
use crate::session::Session;

/// Most recent global chat lines kept; the oldest is evicted first.
pub const GLOBAL_CHAT_CAPACITY: usize = 20;

/// Hour (UTC) of the daily registry sweep.
pub const SWEEP_HOUR_UTC: u64 = 2;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Result of a `find-game` toggle.
pub enum QueueOutcome {
    /// Queued, waiting for an opponent.
    Pending,
    /// The identity was already queued and has been removed.
    Cancelled,
    /// The queue yielded a pair; the earlier entry plays white.
    Paired {
        white_id: ConnectionId,
        black_id: ConnectionId,
        session: Arc<Mutex<Session>>,
    },
}

struct LobbyState {
    queue: VecDeque<Player>,
    games: HashMap<ConnectionId, Arc<Mutex<Session>>>,
    chats: VecDeque<ChatMessage>,
}

/// Matchmaking queue, live-game registry and global chat buffer. All
/// three live under one mutex so queue and registry mutations are
/// single-writer; session locks are only ever taken after this lock is
/// released (lock order: lobby before session).
pub struct Lobby {
    engine: Arc<dyn PositionEngine>,
    inner: Mutex<LobbyState>,
}

impl Lobby {
    pub fn new(engine: Arc<dyn PositionEngine>) -> Self {
        Lobby {
            engine,
            inner: Mutex::new(LobbyState {
                queue: VecDeque::new(),
                games: HashMap::new(),
                chats: VecDeque::new(),
            }),
        }
    }

    /// Toggle the player in the matchmaking queue. Re-sending while
    /// queued cancels; otherwise the player is appended and, as soon as
    /// two are waiting, the two earliest entries are paired (FIFO) and
    /// registered under both connection ids. An identity with a live
    /// session is refused without touching the queue: re-pairing it
    /// would overwrite its registry entry and strand the new opponent
    /// when the first game retires.
    pub async fn enqueue_or_cancel(&self, player: Player) -> QueueOutcome {
        let mut inner = self.inner.lock().await;

        if inner.games.contains_key(&player.id) {
            log::warn!("refusing find-game from in-game identity {}", player.id);
            return QueueOutcome::Cancelled;
        }

        if inner.queue.iter().any(|queued| queued.id == player.id) {
            inner.queue.retain(|queued| queued.id != player.id);
            return QueueOutcome::Cancelled;
        }

        inner.queue.push_back(player);
        if inner.queue.len() >= 2 {
            if let (Some(white), Some(black)) = (inner.queue.pop_front(), inner.queue.pop_front())
            {
                let white_id = white.id.clone();
                let black_id = black.id.clone();
                let session = Arc::new(Mutex::new(Session::new(
                    white,
                    black,
                    self.engine.as_ref(),
                )));
                inner.games.insert(white_id.clone(), session.clone());
                inner.games.insert(black_id.clone(), session.clone());
                log::info!("paired {} (white) vs {} (black)", white_id, black_id);
                return QueueOutcome::Paired {
                    white_id,
                    black_id,
                    session,
                };
            }
        }

        QueueOutcome::Pending
    }

    /// Drop the identity from the queue if it is waiting. Idempotent;
    /// used on disconnect-while-queued.
    pub async fn remove_from_queue(&self, id: &str) {
        let mut inner = self.inner.lock().await;
        inner.queue.retain(|queued| queued.id != id);
    }

    pub async fn lookup_session(&self, id: &str) -> Option<Arc<Mutex<Session>>> {
        let inner = self.inner.lock().await;
        inner.games.get(id).cloned()
    }

    /// Remove both registry entries of an ended session. Returns false
    /// when the session was already retired, so racing terminal handlers
    /// (disconnect vs. resign) collapse to one notification.
    pub async fn retire_session(&self, first_id: &str, second_id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let removed_first = inner.games.remove(first_id).is_some();
        let removed_second = inner.games.remove(second_id).is_some();
        removed_first || removed_second
    }

    /// Append to the bounded global chat buffer, clamping the message
    /// body. Returns the stored copy for echoing.
    pub async fn post_global_chat(&self, chat: ChatMessage) -> ChatMessage {
        let chat = chat.clamped();
        let mut inner = self.inner.lock().await;
        while inner.chats.len() >= GLOBAL_CHAT_CAPACITY {
            inner.chats.pop_front();
        }
        inner.chats.push_back(chat.clone());
        chat
    }

    pub async fn global_chats(&self) -> Vec<ChatMessage> {
        let inner = self.inner.lock().await;
        inner.chats.iter().cloned().collect()
    }

    /// Daily leak-prevention sweep: unconditionally drop every registry
    /// entry. This is a blunt safety net on top of per-session
    /// retirement and will cut off any game still in progress at that
    /// instant. Returns the number of entries cleared.
    pub async fn clear_all_sessions(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let cleared = inner.games.len();
        inner.games.clear();
        cleared
    }

    pub async fn queue_len(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.queue.len()
    }

    pub async fn session_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.games.len()
    }
}

/// Time until the next `SWEEP_HOUR_UTC` boundary, computed from epoch
/// seconds so the sweep needs no calendar dependency.
pub fn next_sweep_delay(now: SystemTime) -> Duration {
    let secs = now
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let midnight = secs - secs % SECS_PER_DAY;
    let mut target = midnight + SWEEP_HOUR_UTC * 3600;
    if target <= secs {
        target += SECS_PER_DAY;
    }
    Duration::from_secs(target - secs)
}
