use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::engine::PositionEngine;
use crate::errors::{NetworkError, SessionError};
use crate::events::{ClientEvent, ConnectionId, ServerEvent};
use crate::lobby::{Lobby, QueueOutcome};
use crate::session::{Outcome, Session, Side};

/// Connection-event dispatcher: translates each inbound protocol event
/// into one lobby or session call and fans the outbound notifications
/// back out. This is the only layer that knows about live connections;
/// the lobby and sessions never touch the transport.
#[derive(Clone)]
pub struct SocketService {
    lobby: Arc<Lobby>,
    engine: Arc<dyn PositionEngine>,
    broadcaster: broadcast::Sender<(ConnectionId, ServerEvent)>,
}

impl SocketService {
    pub fn new(lobby: Arc<Lobby>, engine: Arc<dyn PositionEngine>) -> Self {
        let (broadcaster, _) = broadcast::channel(1000);
        SocketService {
            lobby,
            engine,
            broadcaster,
        }
    }

    /// Outbound channel carrying `(target connection, event)` pairs;
    /// each connection task forwards only its own id.
    pub fn broadcaster(&self) -> broadcast::Sender<(ConnectionId, ServerEvent)> {
        self.broadcaster.clone()
    }

    /// Fire-and-forget delivery; a send with no live receiver only means
    /// the target already disconnected.
    fn send(&self, id: &str, event: ServerEvent) {
        let _ = self.broadcaster.send((id.to_string(), event));
    }

    /// Handle a new WebSocket connection for its whole lifetime.
    pub async fn handle_connection(&self, socket: WebSocket) {
        let connection_id: ConnectionId = Uuid::new_v4().to_string();
        log::info!("websocket connected: {}", connection_id);

        let (mut sender, mut receiver) = socket.split();

        // Task to forward events addressed to this connection.
        let mut updates = self.broadcaster.subscribe();
        let id_for_updates = connection_id.clone();
        let mut update_task = tokio::spawn(async move {
            while let Ok((target, event)) = updates.recv().await {
                if target != id_for_updates {
                    continue;
                }
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break; // Client disconnected
                        }
                    }
                    Err(e) => {
                        log::error!("failed to serialize outbound event: {}", e);
                    }
                }
            }
        });

        // Task to dispatch incoming events.
        let service = self.clone();
        let id_for_messages = connection_id.clone();
        let mut message_task = tokio::spawn(async move {
            while let Some(Ok(message)) = receiver.next().await {
                match message {
                    Message::Text(text) => {
                        match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => service.handle_event(&id_for_messages, event).await,
                            Err(e) => {
                                let err = NetworkError::DeserializationFailed {
                                    details: e.to_string(),
                                };
                                log::warn!(
                                    "dropping malformed event from {}: {}",
                                    id_for_messages,
                                    err
                                );
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {
                        // Ignore pings and binary frames.
                    }
                }
            }
        });

        // Whichever task ends first means the connection is done.
        tokio::select! {
            _ = &mut update_task => {
                message_task.abort();
            }
            _ = &mut message_task => {
                update_task.abort();
            }
        }

        self.handle_disconnect(&connection_id).await;
        log::info!("websocket disconnected: {}", connection_id);
    }

    /// Dispatch one inbound event. Failures are terminal to this event
    /// only; they never tear down the dispatcher or unrelated sessions.
    pub async fn handle_event(&self, id: &str, event: ClientEvent) {
        match event {
            ClientEvent::FindGame { username, pic } => {
                let player = crate::events::Player {
                    id: id.to_string(),
                    username,
                    pic,
                };
                match self.lobby.enqueue_or_cancel(player).await {
                    QueueOutcome::Pending => self.send(id, ServerEvent::FindGamePending),
                    QueueOutcome::Cancelled => self.send(id, ServerEvent::FindGameCancelled),
                    QueueOutcome::Paired {
                        white_id,
                        black_id,
                        session,
                    } => {
                        let session = session.lock().await;
                        self.send(
                            &white_id,
                            ServerEvent::GameFound {
                                opponent: session.player(Side::Black).clone(),
                                side: Side::White,
                            },
                        );
                        self.send(
                            &black_id,
                            ServerEvent::GameFound {
                                opponent: session.player(Side::White).clone(),
                                side: Side::Black,
                            },
                        );
                    }
                }
            }

            ClientEvent::GameRequested => match self.lobby.lookup_session(id).await {
                Some(session) => {
                    let session = session.lock().await;
                    match session.opponent_info(id) {
                        Ok((opponent, side)) => {
                            self.send(id, ServerEvent::GameRecieved { opponent, side })
                        }
                        Err(_) => self.send(id, ServerEvent::NoGameFound),
                    }
                }
                None => self.send(id, ServerEvent::NoGameFound),
            },

            ClientEvent::Move(mv) => {
                let Some(session) = self.lobby.lookup_session(id).await else {
                    self.send(id, ServerEvent::NoGameFound);
                    return;
                };
                let mut session = session.lock().await;
                match session.apply_move(self.engine.as_ref(), id, &mv) {
                    Ok((position, turn)) => {
                        let white_id = session.white_id().to_string();
                        let black_id = session.black_id().to_string();
                        let decided = session.outcome() != Outcome::Pending;
                        drop(session);

                        let update = ServerEvent::UpdateBoard { position, turn };
                        self.send(&white_id, update.clone());
                        self.send(&black_id, update);

                        if decided {
                            self.lobby.retire_session(&white_id, &black_id).await;
                        }
                    }
                    Err(SessionError::NoActiveSession) => {
                        self.send(id, ServerEvent::NoGameFound)
                    }
                    Err(e) => {
                        // Rejected move: no turn flip, no clock change, no
                        // broadcast; the mover's client reverts locally.
                        log::debug!("move from {} rejected: {}", id, e);
                    }
                }
            }

            ClientEvent::Resign | ClientEvent::Leave => {
                self.finish_game(id, |session, id| session.resign(id), ServerEvent::OpponentResigned)
                    .await;
            }

            ClientEvent::Flagged => {
                self.finish_game(
                    id,
                    |session, id| session.flag_timeout(id),
                    ServerEvent::OpponentFlagged,
                )
                .await;
            }

            ClientEvent::GameChat(chat) => {
                self.relay(id, ServerEvent::OpponentSentChat(chat.clamped()))
                    .await;
            }

            ClientEvent::GlobalChat(chat) => {
                let stored = self.lobby.post_global_chat(chat).await;
                self.send(id, ServerEvent::GlobalChat(stored));
            }

            ClientEvent::RequestDraw => self.relay(id, ServerEvent::OpponentRequestedDraw).await,
            ClientEvent::RequestTakeback => {
                self.relay(id, ServerEvent::OpponentRequestedTakeback).await
            }
            ClientEvent::RequestRematch => {
                self.relay(id, ServerEvent::OpponentRequestedRematch).await
            }
            ClientEvent::AcceptDraw => self.relay(id, ServerEvent::OpponentAcceptedDraw).await,
            ClientEvent::AcceptTakeback => {
                self.relay(id, ServerEvent::OpponentAcceptedTakeback).await
            }
            ClientEvent::AcceptRematch => {
                self.relay(id, ServerEvent::OpponentAcceptedRematch).await
            }
            ClientEvent::DeclineDraw => self.relay(id, ServerEvent::OpponentDeclinedDraw).await,
            ClientEvent::DeclineTakeback => {
                self.relay(id, ServerEvent::OpponentDeclinedTakeback).await
            }
            ClientEvent::DeclineRematch => {
                self.relay(id, ServerEvent::OpponentDeclinedRematch).await
            }
        }
    }

    /// Transport-level disconnect: a mid-game drop scores like a
    /// resignation and notifies the opponent; a queued player is
    /// removed; anything else is a no-op. The decided-now guard keeps a
    /// leave that raced the disconnect from double-firing the
    /// opponent's notification.
    pub async fn handle_disconnect(&self, id: &str) {
        if let Some(session) = self.lobby.lookup_session(id).await {
            let (decided_now, white_id, black_id, other_id) = {
                let mut session = session.lock().await;
                match (session.handle_disconnect(id), session.other_id(id)) {
                    (Ok(decided), Ok(other)) => (
                        decided,
                        session.white_id().to_string(),
                        session.black_id().to_string(),
                        other,
                    ),
                    _ => return,
                }
            };

            if decided_now {
                self.send(&other_id, ServerEvent::OpponentResigned);
            }
            self.lobby.retire_session(&white_id, &black_id).await;
            return;
        }

        self.lobby.remove_from_queue(id).await;
    }

    /// Shared path for resign/leave/flag: run the terminal session
    /// operation and, only if this call decided the game, notify both
    /// participants and retire the registry entries.
    async fn finish_game<F>(&self, id: &str, op: F, notice: ServerEvent)
    where
        F: FnOnce(&mut Session, &str) -> Result<bool, SessionError>,
    {
        let Some(session) = self.lobby.lookup_session(id).await else {
            self.send(id, ServerEvent::NoGameFound);
            return;
        };

        let (decided_now, white_id, black_id) = {
            let mut session = session.lock().await;
            match op(&mut *session, id) {
                Ok(decided) => (
                    decided,
                    session.white_id().to_string(),
                    session.black_id().to_string(),
                ),
                Err(_) => {
                    drop(session);
                    self.send(id, ServerEvent::NoGameFound);
                    return;
                }
            }
        };

        if decided_now {
            self.send(&white_id, notice.clone());
            self.send(&black_id, notice);
            self.lobby.retire_session(&white_id, &black_id).await;
        }
    }

    /// Forward an event to the caller's opponent only (the sender keeps
    /// its own local copy).
    async fn relay(&self, id: &str, event: ServerEvent) {
        let Some(session) = self.lobby.lookup_session(id).await else {
            self.send(id, ServerEvent::NoGameFound);
            return;
        };

        let other_id = {
            let session = session.lock().await;
            session.other_id(id)
        };
        match other_id {
            Ok(other_id) => self.send(&other_id, event),
            Err(_) => self.send(id, ServerEvent::NoGameFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CoordinateEngine;
    use crate::events::{ChatMessage, ChatUser, Move};
    use tokio::sync::broadcast::error::TryRecvError;

    fn service() -> SocketService {
        let engine: Arc<dyn PositionEngine> = Arc::new(CoordinateEngine);
        let lobby = Arc::new(Lobby::new(engine.clone()));
        SocketService::new(lobby, engine)
    }

    fn find_game(name: &str) -> ClientEvent {
        ClientEvent::FindGame {
            username: name.to_string(),
            pic: "default.png".to_string(),
        }
    }

    fn mv(from: &str, to: &str) -> ClientEvent {
        ClientEvent::Move(Move {
            from: from.to_string(),
            to: to.to_string(),
            promotion: None,
        })
    }

    fn chat(text: &str) -> ChatMessage {
        ChatMessage {
            user: ChatUser {
                username: "anna".to_string(),
                pic: "p.png".to_string(),
            },
            message: text.to_string(),
            time: "now".to_string(),
        }
    }

    fn drain(
        rx: &mut broadcast::Receiver<(ConnectionId, ServerEvent)>,
    ) -> Vec<(ConnectionId, ServerEvent)> {
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(pair) => events.push(pair),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                Err(TryRecvError::Lagged(_)) => continue,
            }
        }
        events
    }

    async fn paired_service() -> (SocketService, broadcast::Receiver<(ConnectionId, ServerEvent)>)
    {
        let service = service();
        let mut rx = service.broadcaster().subscribe();
        service.handle_event("a", find_game("anna")).await;
        service.handle_event("b", find_game("ben")).await;
        drain(&mut rx);
        (service, rx)
    }

    #[tokio::test]
    async fn test_pairing_notifies_both_with_mirrored_payloads() {
        let service = service();
        let mut rx = service.broadcaster().subscribe();

        service.handle_event("a", find_game("anna")).await;
        assert_eq!(
            drain(&mut rx),
            vec![("a".to_string(), ServerEvent::FindGamePending)]
        );

        service.handle_event("b", find_game("ben")).await;
        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        match &events[0] {
            (id, ServerEvent::GameFound { opponent, side }) => {
                assert_eq!(id, "a");
                assert_eq!(opponent.username, "ben");
                assert_eq!(*side, Side::White);
            }
            other => panic!("unexpected event {other:?}"),
        }
        match &events[1] {
            (id, ServerEvent::GameFound { opponent, side }) => {
                assert_eq!(id, "b");
                assert_eq!(opponent.username, "anna");
                assert_eq!(*side, Side::Black);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_queue_toggle_emits_pending_then_cancelled() {
        let service = service();
        let mut rx = service.broadcaster().subscribe();

        service.handle_event("a", find_game("anna")).await;
        service.handle_event("a", find_game("anna")).await;
        assert_eq!(
            drain(&mut rx),
            vec![
                ("a".to_string(), ServerEvent::FindGamePending),
                ("a".to_string(), ServerEvent::FindGameCancelled),
            ]
        );
    }

    #[tokio::test]
    async fn test_game_requested_returns_opponent_and_side() {
        let (service, mut rx) = paired_service().await;

        service.handle_event("b", ClientEvent::GameRequested).await;
        let events = drain(&mut rx);
        match &events[..] {
            [(id, ServerEvent::GameRecieved { opponent, side })] => {
                assert_eq!(id, "b");
                assert_eq!(opponent.username, "anna");
                assert_eq!(*side, Side::Black);
            }
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_legal_move_broadcasts_to_both_and_illegal_is_silent() {
        let (service, mut rx) = paired_service().await;

        service.handle_event("a", mv("e2", "e4")).await;
        let update = ServerEvent::UpdateBoard {
            position: "e2e4".to_string(),
            turn: Side::Black,
        };
        assert_eq!(
            drain(&mut rx),
            vec![
                ("a".to_string(), update.clone()),
                ("b".to_string(), update),
            ]
        );

        // Out of turn: no update-board is emitted at all.
        service.handle_event("a", mv("d2", "d4")).await;
        assert!(drain(&mut rx).is_empty());

        // Malformed move from the side to move: same silence.
        service.handle_event("b", mv("z9", "e5")).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_resign_notifies_both_and_retires_session() {
        let (service, mut rx) = paired_service().await;

        service.handle_event("a", ClientEvent::Resign).await;
        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                ("a".to_string(), ServerEvent::OpponentResigned),
                ("b".to_string(), ServerEvent::OpponentResigned),
            ]
        );

        // The registry entries are gone: a stale move gets no-game-found.
        service.handle_event("a", mv("e2", "e4")).await;
        assert_eq!(
            drain(&mut rx),
            vec![("a".to_string(), ServerEvent::NoGameFound)]
        );
    }

    #[tokio::test]
    async fn test_flag_then_resign_fires_single_notice() {
        let (service, mut rx) = paired_service().await;

        service.handle_event("a", ClientEvent::Flagged).await;
        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                ("a".to_string(), ServerEvent::OpponentFlagged),
                ("b".to_string(), ServerEvent::OpponentFlagged),
            ]
        );

        // The session is already retired; the stale resign is answered
        // with no-game-found and nothing reaches the opponent.
        service.handle_event("a", ClientEvent::Resign).await;
        assert_eq!(
            drain(&mut rx),
            vec![("a".to_string(), ServerEvent::NoGameFound)]
        );
    }

    #[tokio::test]
    async fn test_disconnect_midgame_notifies_opponent_and_stales_identity() {
        let (service, mut rx) = paired_service().await;

        service.handle_disconnect("a").await;
        assert_eq!(
            drain(&mut rx),
            vec![("b".to_string(), ServerEvent::OpponentResigned)]
        );

        service.handle_event("a", mv("e2", "e4")).await;
        assert_eq!(
            drain(&mut rx),
            vec![("a".to_string(), ServerEvent::NoGameFound)]
        );
    }

    #[tokio::test]
    async fn test_disconnect_after_leave_does_not_double_notify() {
        let (service, mut rx) = paired_service().await;

        service.handle_event("a", ClientEvent::Leave).await;
        drain(&mut rx);

        service.handle_disconnect("a").await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_while_queued_removes_entry() {
        let service = service();
        let mut rx = service.broadcaster().subscribe();

        service.handle_event("a", find_game("anna")).await;
        drain(&mut rx);
        service.handle_disconnect("a").await;
        assert!(drain(&mut rx).is_empty());

        // "a" left the queue, so "b" waits instead of pairing.
        service.handle_event("b", find_game("ben")).await;
        assert_eq!(
            drain(&mut rx),
            vec![("b".to_string(), ServerEvent::FindGamePending)]
        );
    }

    #[tokio::test]
    async fn test_game_chat_reaches_opponent_only() {
        let (service, mut rx) = paired_service().await;

        service
            .handle_event("a", ClientEvent::GameChat(chat("good luck")))
            .await;
        let events = drain(&mut rx);
        match &events[..] {
            [(id, ServerEvent::OpponentSentChat(relayed))] => {
                assert_eq!(id, "b");
                assert_eq!(relayed.message, "good luck");
            }
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_global_chat_is_stored_and_echoed() {
        let (service, mut rx) = paired_service().await;

        service
            .handle_event("a", ClientEvent::GlobalChat(chat("hello all")))
            .await;
        let events = drain(&mut rx);
        match &events[..] {
            [(id, ServerEvent::GlobalChat(echoed))] => {
                assert_eq!(id, "a");
                assert_eq!(echoed.message, "hello all");
            }
            other => panic!("unexpected events {other:?}"),
        }
        assert_eq!(service.lobby.global_chats().await.len(), 1);
    }

    #[tokio::test]
    async fn test_offer_events_relay_to_opponent_only() {
        let (service, mut rx) = paired_service().await;

        service.handle_event("a", ClientEvent::RequestDraw).await;
        service.handle_event("b", ClientEvent::DeclineDraw).await;
        assert_eq!(
            drain(&mut rx),
            vec![
                ("b".to_string(), ServerEvent::OpponentRequestedDraw),
                ("a".to_string(), ServerEvent::OpponentDeclinedDraw),
            ]
        );
    }

    #[tokio::test]
    async fn test_game_scoped_events_without_session_get_no_game_found() {
        let service = service();
        let mut rx = service.broadcaster().subscribe();

        for event in [
            ClientEvent::GameRequested,
            mv("e2", "e4"),
            ClientEvent::Resign,
            ClientEvent::Flagged,
            ClientEvent::GameChat(chat("anyone?")),
            ClientEvent::Leave,
            ClientEvent::RequestRematch,
        ] {
            service.handle_event("ghost", event).await;
        }

        let events = drain(&mut rx);
        assert_eq!(events.len(), 7);
        assert!(events
            .iter()
            .all(|(id, event)| id == "ghost" && *event == ServerEvent::NoGameFound));
    }
}
