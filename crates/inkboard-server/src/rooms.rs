//! Per-board rooms: membership, the replay log and the fan-out channel.

use dashmap::DashMap;
use inkboard_core::protocol::{BoardAction, BoardEvent, ClientId, ServerMessage};
use std::collections::VecDeque;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Every this many logged events, the publisher is asked for a snapshot.
pub const SNAPSHOT_INTERVAL: usize = 100;
pub const CHANNEL_CAPACITY: usize = 256;

/// A message fanned out to a room, tagged with the client that caused it
/// so the sender's own connection can skip it.
pub type Broadcast = (ClientId, ServerMessage);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("client {0} is already in this room")]
    DuplicateClient(ClientId),
    #[error("not in a room")]
    NotJoined,
}

struct Room {
    tx: broadcast::Sender<Broadcast>,
    /// Members in join order.
    members: Vec<ClientId>,
    /// Latest base64 snapshot saved by a client.
    snapshot: Option<String>,
    /// Events the snapshot does not cover, with their sequence numbers.
    /// Never truncated; only a save shortens it.
    history: VecDeque<(u64, BoardEvent)>,
    last_seq: u64,
}

impl Room {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            members: Vec::new(),
            snapshot: None,
            history: VecDeque::new(),
            last_seq: 0,
        }
    }

    fn send(&self, from: &str, msg: ServerMessage) {
        // No receivers is fine: the sender may be alone in the room.
        let _ = self.tx.send((from.to_string(), msg));
    }
}

/// What a joining client needs: the replay and its subscription.
pub struct Joined {
    pub ready: ServerMessage,
    pub rx: broadcast::Receiver<Broadcast>,
}

/// All active rooms, keyed by board id.
#[derive(Default)]
pub struct Rooms {
    rooms: DashMap<String, Room>,
}

impl Rooms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn members(&self, board: &str) -> Vec<ClientId> {
        self.rooms
            .get(board)
            .map(|room| room.members.clone())
            .unwrap_or_default()
    }

    /// Add `client` to `board`, creating the room on first use, and tell
    /// the existing members.
    pub fn join(&self, board: &str, client: &str) -> Result<Joined, RoomError> {
        let mut room = self.rooms.entry(board.to_string()).or_insert_with(Room::new);
        if room.members.iter().any(|m| m == client) {
            return Err(RoomError::DuplicateClient(client.to_string()));
        }
        room.members.push(client.to_string());
        room.send(
            client,
            ServerMessage::PeerJoined {
                client_id: client.to_string(),
            },
        );
        // Subscribe after the announcement so the joiner does not see it.
        let rx = room.tx.subscribe();
        let ready = ServerMessage::Ready {
            board: board.to_string(),
            clients: room.members.clone(),
            snapshot: room.snapshot.clone(),
            history: room.history.iter().map(|(_, event)| event.clone()).collect(),
            seq: room.last_seq,
        };
        Ok(Joined { ready, rx })
    }

    /// Remove `client` from `board`. Empty rooms are dropped along with
    /// their snapshot.
    pub fn leave(&self, board: &str, client: &str) {
        let empty = match self.rooms.get_mut(board) {
            Some(mut room) => {
                room.members.retain(|m| m != client);
                room.send(
                    client,
                    ServerMessage::PeerLeft {
                        client_id: client.to_string(),
                    },
                );
                room.members.is_empty()
            }
            None => return,
        };
        if empty {
            self.rooms.remove_if(board, |_, room| room.members.is_empty());
            debug!("room {board} closed");
        }
    }

    /// Log `action` and fan it out to the rest of the room. Returns true
    /// when the log has grown enough that the publisher should be asked
    /// for a snapshot.
    pub fn publish(&self, board: &str, by: &str, action: BoardAction) -> Result<bool, RoomError> {
        let mut room = self.rooms.get_mut(board).ok_or(RoomError::NotJoined)?;
        let event = BoardEvent {
            by: by.to_string(),
            action,
        };
        room.last_seq += 1;
        let seq = room.last_seq;
        room.history.push_back((seq, event.clone()));
        room.send(by, ServerMessage::Action { event, seq });
        let wants_snapshot = room.history.len() % SNAPSHOT_INTERVAL == 0;
        if wants_snapshot {
            debug!("room {board} has {} unsaved events", room.history.len());
        }
        Ok(wants_snapshot)
    }

    /// Replace the room's snapshot. `seen` is the last sequence number the
    /// saver had applied; the saver's own events are in the snapshot too.
    /// Everything else stays in the log.
    pub fn save(&self, board: &str, by: &str, data: String, seen: u64) -> Result<(), RoomError> {
        let mut room = self.rooms.get_mut(board).ok_or(RoomError::NotJoined)?;
        if seen > room.last_seq {
            warn!("{by} saved {board} claiming seq {seen} of {}", room.last_seq);
        }
        let seen = seen.min(room.last_seq);
        room.snapshot = Some(data);
        let before = room.history.len();
        room.history.retain(|(seq, event)| *seq > seen && event.by != by);
        debug!("{by} saved {board}; {} of {before} events kept", room.history.len());
        Ok(())
    }
}
