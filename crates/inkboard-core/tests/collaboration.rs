//! Two sessions editing the same board through an in-memory relay.

use inkboard_core::surface::NullFactory;
use inkboard_core::transport::TransportResult;
use inkboard_core::{
    BoardEvent, BoardItem, ClientMessage, ConnectionState, EngineConfig, IdMode, Rect, ServerMessage, Session,
    Stroke, Transport, TransportEvent,
};
use std::cell::RefCell;
use std::rc::Rc;

/// Relays every action to all other connected clients, like the server.
#[derive(Default)]
struct Room {
    history: Vec<(u64, BoardEvent)>,
    last_seq: u64,
    snapshot: Option<String>,
    members: Vec<(String, Rc<RefCell<Vec<TransportEvent>>>)>,
}

struct LoopbackTransport {
    room: Rc<RefCell<Room>>,
    inbox: Rc<RefCell<Vec<TransportEvent>>>,
    client_id: Option<String>,
}

impl LoopbackTransport {
    fn new(room: &Rc<RefCell<Room>>) -> Self {
        Self {
            room: room.clone(),
            inbox: Rc::new(RefCell::new(vec![TransportEvent::Connected])),
            client_id: None,
        }
    }
}

impl Transport for LoopbackTransport {
    fn send(&mut self, message: &ClientMessage) -> TransportResult<()> {
        let mut room = self.room.borrow_mut();
        match message.clone() {
            ClientMessage::Join { board, client_id } => {
                room.members.push((client_id.clone(), self.inbox.clone()));
                let clients = room.members.iter().map(|(id, _)| id.clone()).collect();
                self.inbox.borrow_mut().push(TransportEvent::Message(ServerMessage::Ready {
                    board,
                    clients,
                    snapshot: room.snapshot.clone(),
                    history: room.history.iter().map(|(_, e)| e.clone()).collect(),
                    seq: room.last_seq,
                }));
                self.client_id = Some(client_id);
            }
            ClientMessage::Leave => {}
            ClientMessage::Action { action } => {
                let by = self.client_id.clone().unwrap_or_default();
                let event = BoardEvent { by: by.clone(), action };
                room.last_seq += 1;
                let seq = room.last_seq;
                room.history.push((seq, event.clone()));
                for (id, inbox) in &room.members {
                    if *id != by {
                        inbox.borrow_mut().push(TransportEvent::Message(ServerMessage::Action {
                            event: event.clone(),
                            seq,
                        }));
                    }
                }
            }
            ClientMessage::Save { data, seen } => {
                let saver = self.client_id.clone().unwrap_or_default();
                room.snapshot = Some(data);
                room.history.retain(|(seq, e)| *seq > seen && e.by != saver);
            }
        }
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        std::mem::take(&mut *self.inbox.borrow_mut())
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::Connected
    }
}

fn client(id: &str) -> Session<NullFactory> {
    Session::with_client_id(id, NullFactory, EngineConfig::default())
}

fn rect(id: u64, x: f32) -> BoardItem {
    let mut item = BoardItem::rectangle(Rect::new(x, 0.0, x + 10.0, 10.0), Stroke::default(), true);
    item.id = id;
    item
}

fn items_of(s: &Session<NullFactory>) -> Vec<BoardItem> {
    inkboard_core::codec::decode(&s.snapshot(), IdMode::Preserve)
}

#[test]
fn edits_and_undo_propagate_between_sessions() {
    let room = Rc::new(RefCell::new(Room::default()));
    let mut alice = client("alice");
    let mut bob = client("bob");
    let mut ta = LoopbackTransport::new(&room);
    let mut tb = LoopbackTransport::new(&room);

    alice.join(&mut ta, "board").unwrap();
    bob.join(&mut tb, "board").unwrap();
    alice.poll_transport(&mut ta);
    bob.poll_transport(&mut tb);
    assert_eq!(bob.peers(), &["alice".to_string()]);

    alice.add_items(vec![rect(1, 0.0)]);
    alice.move_items(&[1], 5.0, -3.0);
    alice.flush(&mut ta);
    bob.poll_transport(&mut tb);
    assert_eq!(bob.board().get(1).unwrap().rect, Rect::new(5.0, -3.0, 15.0, 7.0));
    assert!(!bob.can_undo(), "remote edits stay out of local history");

    bob.set_color(&[1], 0xFF0000FF);
    bob.flush(&mut tb);
    alice.poll_transport(&mut ta);
    assert_eq!(alice.board().get(1).unwrap().stroke().unwrap().color, 0xFF0000FF);

    alice.undo();
    alice.flush(&mut ta);
    bob.poll_transport(&mut tb);
    assert_eq!(bob.board().get(1).unwrap().rect, Rect::new(0.0, 0.0, 10.0, 10.0));
    assert_eq!(items_of(&alice), items_of(&bob));
}

#[test]
fn own_events_in_history_are_not_reapplied() {
    let room = Rc::new(RefCell::new(Room::default()));
    let mut alice = client("alice");
    let mut ta = LoopbackTransport::new(&room);
    alice.join(&mut ta, "board").unwrap();
    alice.poll_transport(&mut ta);
    alice.add_items(vec![rect(1, 0.0)]);
    alice.move_items(&[1], 10.0, 0.0);
    alice.flush(&mut ta);

    // Reconnect as the same client: the replayed history is our own.
    let mut rejoined = client("alice");
    rejoined.add_items(vec![rect(1, 10.0)]);
    let mut tr = LoopbackTransport::new(&room);
    rejoined.join(&mut tr, "board").unwrap();
    rejoined.poll_transport(&mut tr);
    assert_eq!(rejoined.board().get(1).unwrap().rect, Rect::new(10.0, 0.0, 20.0, 10.0));
}

#[test]
fn late_joiner_receives_snapshot_and_tail() {
    let room = Rc::new(RefCell::new(Room::default()));
    let mut alice = client("alice");
    let mut ta = LoopbackTransport::new(&room);
    alice.join(&mut ta, "board").unwrap();
    alice.poll_transport(&mut ta);

    alice.add_items(vec![rect(1, 0.0), rect(2, 50.0)]);
    alice.flush(&mut ta);
    alice.publish_snapshot(&mut ta).unwrap();
    alice.remove_items(&[2]);
    alice.flush(&mut ta);
    assert_eq!(room.borrow().history.len(), 1);
    assert!(room.borrow().snapshot.is_some());

    let mut carol = client("carol");
    let mut tc = LoopbackTransport::new(&room);
    carol.join(&mut tc, "board").unwrap();
    carol.poll_transport(&mut tc);
    assert_eq!(carol.board().len(), 1);
    assert_eq!(items_of(&carol), items_of(&alice));
}

#[test]
fn snapshot_keeps_peer_events_the_saver_had_not_received() {
    let room = Rc::new(RefCell::new(Room::default()));
    let mut alice = client("alice");
    let mut bob = client("bob");
    let mut ta = LoopbackTransport::new(&room);
    let mut tb = LoopbackTransport::new(&room);
    alice.join(&mut ta, "board").unwrap();
    bob.join(&mut tb, "board").unwrap();
    alice.poll_transport(&mut ta);
    bob.poll_transport(&mut tb);

    alice.add_items(vec![rect(1, 0.0)]);
    alice.flush(&mut ta);
    bob.poll_transport(&mut tb);

    // Bob's edit is relayed but Alice has not polled it yet.
    bob.add_items(vec![rect(2, 50.0)]);
    bob.flush(&mut tb);
    alice.move_items(&[1], 5.0, 0.0);
    alice.publish_snapshot(&mut ta).unwrap();
    assert_eq!(room.borrow().history.len(), 1);
    assert_eq!(room.borrow().history[0].1.by, "bob");

    let mut carol = client("carol");
    let mut tc = LoopbackTransport::new(&room);
    carol.join(&mut tc, "board").unwrap();
    carol.poll_transport(&mut tc);
    alice.poll_transport(&mut ta);
    assert_eq!(carol.board().len(), 2);
    assert_eq!(carol.board().get(1).unwrap().rect, Rect::new(5.0, 0.0, 15.0, 10.0));
    assert_eq!(items_of(&carol), items_of(&alice));
}
