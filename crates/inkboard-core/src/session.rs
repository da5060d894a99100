//! The engine a frontend drives.
//!
//! A [`Session`] owns one board and everything around it: undo history,
//! camera, selection, the outbox of actions for peers and the autosave
//! state. Local edits go through [`BoardCommand`]s on the history stack;
//! peers' edits go through [`reconcile`](crate::reconcile) and bypass it.

use crate::actions::{BoardCommand, Effects};
use crate::board::Board;
use crate::camera::Camera;
use crate::chunks::{Chunk, RebuildStatus};
use crate::codec::{self, DecodeReport, IdMode};
use crate::config::EngineConfig;
use crate::geometry::{Point, PressurePoint, Rect};
use crate::history::ActionStack;
use crate::items::{BoardItem, ItemId, ItemKind, PathItem, Stroke};
use crate::protocol::{BoardEvent, ClientId, ClientMessage, ServerMessage, decode_blob, encode_blob};
use crate::reconcile::{self, BatchOutcome};
use crate::storage::{AutoSave, SaveDebouncer, Storage, StorageResult};
use crate::surface::SurfaceFactory;
use crate::transport::{ConnectionState, Outbox, Transport, TransportEvent, TransportResult};
use kurbo::{Size, Vec2};
use std::time::Duration;
use uuid::Uuid;

/// One client's view of a board.
pub struct Session<F: SurfaceFactory> {
    client_id: ClientId,
    board_id: Option<String>,
    board: Board<F>,
    history: ActionStack<BoardCommand>,
    pub camera: Camera,
    viewport: Size,
    selection: Vec<ItemId>,
    selection_bounds: Option<Rect>,
    outbox: Outbox,
    saves: SaveDebouncer,
    connection: ConnectionState,
    peers: Vec<ClientId>,
    /// Last room sequence number applied to the board.
    seen_seq: u64,
    config: EngineConfig,
}

impl<F: SurfaceFactory> std::fmt::Debug for Session<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("client_id", &self.client_id)
            .field("board_id", &self.board_id)
            .field("board", &self.board)
            .field("selection", &self.selection)
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

impl<F: SurfaceFactory> Session<F> {
    /// A session with a random client id.
    pub fn new(factory: F, config: EngineConfig) -> Self {
        Self::with_client_id(Uuid::new_v4().to_string(), factory, config)
    }

    pub fn with_client_id(client_id: impl Into<ClientId>, factory: F, config: EngineConfig) -> Self {
        Self {
            client_id: client_id.into(),
            board_id: None,
            board: Board::new(factory, &config),
            history: ActionStack::new(config.history_capacity),
            camera: Camera::new(),
            viewport: Size::new(1280.0, 720.0),
            selection: Vec::new(),
            selection_bounds: None,
            outbox: Outbox::default(),
            saves: SaveDebouncer::new(Duration::from_millis(config.save_debounce_ms)),
            connection: ConnectionState::Disconnected,
            peers: Vec::new(),
            seen_seq: 0,
            config,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn board_id(&self) -> Option<&str> {
        self.board_id.as_deref()
    }

    pub fn board(&self) -> &Board<F> {
        &self.board
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn history(&self) -> &ActionStack<BoardCommand> {
        &self.history
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn saves(&self) -> &SaveDebouncer {
        &self.saves
    }

    pub fn saves_mut(&mut self) -> &mut SaveDebouncer {
        &mut self.saves
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    /// Other clients in the room.
    pub fn peers(&self) -> &[ClientId] {
        &self.peers
    }

    // --- History ---

    /// Run a command and record it. Commands that would change nothing are
    /// dropped. Returns whether the command was recorded.
    pub fn execute(&mut self, command: BoardCommand) -> bool {
        self.push(command, true)
    }

    /// Record a command whose mutation was already applied to the board,
    /// e.g. at the end of a live drag. Only peers and autosave are told.
    pub fn record(&mut self, command: BoardCommand) -> bool {
        self.push(command, false)
    }

    fn push(&mut self, command: BoardCommand, execute: bool) -> bool {
        if command.is_empty() {
            return false;
        }
        let mut cx = Effects {
            board: &mut self.board,
            outbox: &mut self.outbox,
            saves: &mut self.saves,
        };
        self.history.push(command, &mut cx, execute);
        self.refresh_selection();
        true
    }

    pub fn undo(&mut self) -> bool {
        let mut cx = Effects {
            board: &mut self.board,
            outbox: &mut self.outbox,
            saves: &mut self.saves,
        };
        let done = self.history.undo(&mut cx);
        if done {
            self.refresh_selection();
        }
        done
    }

    pub fn redo(&mut self) -> bool {
        let mut cx = Effects {
            board: &mut self.board,
            outbox: &mut self.outbox,
            saves: &mut self.saves,
        };
        let done = self.history.redo(&mut cx);
        if done {
            self.refresh_selection();
        }
        done
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // --- Editing ---

    /// Turn a raw stroke into a path item. Returns its id, or `None` for an
    /// empty stroke.
    pub fn draw_stroke(&mut self, points: Vec<PressurePoint>, stroke: Stroke) -> Option<ItemId> {
        let (path, rect) = PathItem::from_stroke(points, stroke, self.config.simplify_tolerance)?;
        let item = BoardItem::new(rect, ItemKind::Path(path));
        let id = item.id;
        self.execute(BoardCommand::Add { items: vec![item] }).then_some(id)
    }

    /// Add items, skipping any the board cannot hold.
    pub fn add_items(&mut self, mut items: Vec<BoardItem>) -> Vec<ItemId> {
        items.retain(|item| self.board.accepts(item));
        let ids = items.iter().map(|item| item.id).collect();
        self.execute(BoardCommand::Add { items });
        ids
    }

    pub fn remove_items(&mut self, ids: &[ItemId]) -> bool {
        let command = BoardCommand::remove(&self.board, ids);
        self.execute(command)
    }

    pub fn delete_selected(&mut self) -> bool {
        let ids = std::mem::take(&mut self.selection);
        self.remove_items(&ids)
    }

    pub fn move_items(&mut self, ids: &[ItemId], dx: f32, dy: f32) -> bool {
        if !(dx.is_finite() && dy.is_finite()) {
            return false;
        }
        let ids: Vec<ItemId> = ids.iter().copied().filter(|id| self.board.contains(*id)).collect();
        self.execute(BoardCommand::Move { ids, dx, dy })
    }

    pub fn move_selection(&mut self, dx: f32, dy: f32) -> bool {
        let ids = self.selection.clone();
        self.move_items(&ids, dx, dy)
    }

    /// Set absolute rects.
    pub fn resize_items(&mut self, rects: Vec<(ItemId, Rect)>) -> bool {
        let rects = rects.into_iter().filter(|(_, r)| r.is_finite()).collect();
        let command = BoardCommand::scale(&self.board, rects);
        self.execute(command)
    }

    pub fn reorder(&mut self, ids: &[ItemId], step: i16) -> bool {
        let command = BoardCommand::order(&self.board, ids, step);
        self.execute(command)
    }

    pub fn set_locked(&mut self, ids: &[ItemId], locked: bool) -> bool {
        let command = BoardCommand::lock(&self.board, ids, locked);
        self.execute(command)
    }

    pub fn set_label(&mut self, ids: &[ItemId], label: Option<String>) -> bool {
        let command = BoardCommand::label(&self.board, ids, label);
        self.execute(command)
    }

    pub fn set_color(&mut self, ids: &[ItemId], color: u32) -> bool {
        let command = BoardCommand::color(&self.board, ids, color);
        self.execute(command)
    }

    pub fn set_weight(&mut self, ids: &[ItemId], weight: f32) -> bool {
        let command = BoardCommand::weight(&self.board, ids, weight);
        self.execute(command)
    }

    /// Returns false unless `id` is a text item.
    pub fn set_text(&mut self, id: ItemId, text: impl Into<String>) -> bool {
        match BoardCommand::text(&self.board, id, text) {
            Some(command) => self.execute(command),
            None => false,
        }
    }

    // --- Selection ---

    pub fn selection(&self) -> &[ItemId] {
        &self.selection
    }

    pub fn selection_bounds(&self) -> Option<Rect> {
        self.selection_bounds
    }

    pub fn is_selected(&self, id: ItemId) -> bool {
        self.selection.contains(&id)
    }

    /// Select every unlocked item touching `region`.
    pub fn select_in_rect(&mut self, region: &Rect) -> &[ItemId] {
        self.selection = self
            .board
            .get_items_within_rect(&region.normalized())
            .into_iter()
            .filter(|item| !item.locked)
            .map(|item| item.id)
            .collect();
        self.refresh_selection();
        &self.selection
    }

    /// Select the front-most unlocked item under a board point.
    pub fn select_at(&mut self, point: Point) -> Option<ItemId> {
        let tolerance = self.config.hit_tolerance / self.camera.zoom as f32;
        let hit = self
            .board
            .items_at_point(point, tolerance)
            .into_iter()
            .find(|id| self.board.get(*id).is_some_and(|item| !item.locked));
        self.selection = hit.into_iter().collect();
        self.refresh_selection();
        hit
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
        self.selection_bounds = None;
    }

    /// Drop ids that no longer exist and recompute the selection bounds.
    pub fn refresh_selection(&mut self) {
        let board = &self.board;
        self.selection.retain(|id| board.contains(*id));
        self.selection_bounds = self
            .selection
            .iter()
            .filter_map(|id| board.get(*id).map(BoardItem::bounds))
            .reduce(|acc, b| acc.union(&b));
    }

    // --- Clipboard ---

    /// Encode the selected items.
    pub fn copy_selection(&self) -> Vec<u8> {
        self.board.serialize(Some(&self.selection))
    }

    /// Insert copies of encoded items with fresh ids, shifted by `offset`,
    /// and select them.
    pub fn paste(&mut self, data: &[u8], offset: (f32, f32)) -> Vec<ItemId> {
        let mut items = codec::decode(data, IdMode::Regenerate);
        for item in &mut items {
            item.translate(offset.0, offset.1);
        }
        let ids = self.add_items(items);
        self.selection = ids.clone();
        self.refresh_selection();
        ids
    }

    // --- Collaboration ---

    /// Ask the relay to put us in a board's room.
    pub fn join(&mut self, transport: &mut impl Transport, board_id: impl Into<String>) -> TransportResult<()> {
        let board = board_id.into();
        transport.send(&ClientMessage::Join {
            board: board.clone(),
            client_id: self.client_id.clone(),
        })?;
        self.board_id = Some(board);
        self.seen_seq = 0;
        Ok(())
    }

    pub fn leave(&mut self, transport: &mut impl Transport) {
        if let Err(e) = transport.send(&ClientMessage::Leave) {
            log::warn!("failed to send leave: {e}");
        }
        self.peers.clear();
        self.seen_seq = 0;
    }

    /// Last room sequence number this session has applied.
    pub fn seen_seq(&self) -> u64 {
        self.seen_seq
    }

    /// Room joined. Replaces the board with the room's snapshot, if any,
    /// then replays the room's history.
    pub fn on_connection_ready(
        &mut self,
        clients: Vec<ClientId>,
        snapshot: Option<&[u8]>,
        history: &[BoardEvent],
    ) -> BatchOutcome {
        self.peers = clients.into_iter().filter(|c| *c != self.client_id).collect();
        if let Some(data) = snapshot {
            self.load(data);
        }
        let outcome = reconcile::apply_batch(&mut self.board, &self.client_id, history);
        if outcome.applied > 0 {
            self.saves.mark_dirty();
        }
        if outcome.needs_selection_refresh() {
            self.refresh_selection();
        }
        outcome
    }

    /// A live event from the room. Returns whether it was applied.
    pub fn on_board_action(&mut self, event: &BoardEvent) -> bool {
        if !reconcile::apply_event(&mut self.board, &self.client_id, event) {
            return false;
        }
        self.saves.mark_dirty();
        if !event.action.is_add() {
            self.refresh_selection();
        }
        true
    }

    pub fn handle_server_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Ready {
                board,
                clients,
                snapshot,
                history,
                seq,
            } => {
                let snapshot = snapshot.and_then(|data| match decode_blob(&data) {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        log::warn!("ignoring undecodable snapshot for {board}: {e}");
                        None
                    }
                });
                log::info!("joined {board} with {} peers, {} events", clients.len(), history.len());
                self.board_id = Some(board);
                self.on_connection_ready(clients, snapshot.as_deref(), &history);
                self.seen_seq = seq;
            }
            ServerMessage::PeerJoined { client_id } => {
                if client_id != self.client_id && !self.peers.contains(&client_id) {
                    self.peers.push(client_id);
                }
            }
            ServerMessage::PeerLeft { client_id } => {
                self.peers.retain(|c| *c != client_id);
            }
            ServerMessage::Action { event, seq } => {
                self.on_board_action(&event);
                self.seen_seq = self.seen_seq.max(seq);
            }
            ServerMessage::SaveRequested => {
                log::debug!("snapshot requested; answered from poll_transport");
            }
            ServerMessage::Error { message } => {
                log::warn!("server error: {message}");
            }
        }
    }

    /// Handle everything the transport received since the last poll.
    pub fn poll_transport(&mut self, transport: &mut impl Transport) {
        for event in transport.poll_events() {
            match event {
                TransportEvent::Connected => self.connection = ConnectionState::Connected,
                TransportEvent::Disconnected => {
                    self.connection = ConnectionState::Disconnected;
                    self.peers.clear();
                }
                TransportEvent::Error { message } => {
                    log::error!("connection error: {message}");
                    self.connection = ConnectionState::Error;
                }
                TransportEvent::Message(ServerMessage::SaveRequested) => {
                    if let Err(e) = self.publish_snapshot(transport) {
                        log::warn!("failed to answer snapshot request: {e}");
                    }
                }
                TransportEvent::Message(message) => self.handle_server_message(message),
            }
        }
    }

    /// Send queued actions. Failed or offline sends are logged and dropped;
    /// the board keeps working locally. Returns how many were sent.
    pub fn flush(&mut self, transport: &mut impl Transport) -> usize {
        let pending = self.outbox.drain();
        if pending.is_empty() {
            return 0;
        }
        if !transport.is_connected() {
            log::debug!("offline, dropping {} actions", pending.len());
            return 0;
        }
        let mut sent = 0;
        for action in pending {
            match transport.send(&ClientMessage::Action { action }) {
                Ok(()) => sent += 1,
                Err(e) => {
                    log::warn!("failed to send action: {e}");
                    self.connection = ConnectionState::Error;
                }
            }
        }
        sent
    }

    /// Store the whole board on the relay for late joiners. Pending actions
    /// go out first so the relay can tell which logged events the snapshot
    /// already covers.
    pub fn publish_snapshot(&mut self, transport: &mut impl Transport) -> TransportResult<()> {
        self.flush(transport);
        transport.send(&ClientMessage::Save {
            data: encode_blob(&self.snapshot()),
            seen: self.seen_seq,
        })
    }

    // --- View ---

    pub fn viewport(&self) -> Size {
        self.viewport
    }

    pub fn set_viewport(&mut self, size: Size) {
        self.viewport = size;
    }

    pub fn pan(&mut self, delta: Vec2) {
        self.camera.pan(delta);
    }

    pub fn zoom_at(&mut self, screen_point: kurbo::Point, factor: f64) -> bool {
        self.camera.zoom_at(screen_point, factor)
    }

    pub fn screen_to_board(&self, screen_point: kurbo::Point) -> Point {
        self.camera.screen_to_world(screen_point).into()
    }

    /// Board region currently on screen.
    pub fn visible_rect(&self) -> Rect {
        self.camera.visible_rect(self.viewport)
    }

    pub fn visible_chunks(&self) -> Vec<&Chunk<F::Surface>> {
        self.board.chunks().visible_chunks(&self.visible_rect())
    }

    pub fn fit_to_content(&mut self) {
        if let Some(bounds) = self.board.content_bounds() {
            self.camera.fit_to_bounds(&bounds, self.viewport, 40.0);
        }
    }

    /// Per-frame work: follow the camera's resolution and advance any
    /// pending rebuild.
    pub fn tick(&mut self) -> RebuildStatus {
        self.board.set_scale(self.camera.raster_scale());
        self.board.tick()
    }

    // --- Persistence ---

    /// Replace the board with a blob. Clears history and selection.
    pub fn load(&mut self, data: &[u8]) -> DecodeReport {
        let report = self.board.load_contents(data);
        self.history.clear();
        self.clear_selection();
        self.saves.mark_saved();
        report
    }

    /// Encode the whole board.
    pub fn snapshot(&self) -> Vec<u8> {
        self.board.serialize(None)
    }

    /// Save through `autosave` if the board is dirty and the debounce
    /// interval has passed.
    pub async fn autosave<S: Storage>(&mut self, autosave: &AutoSave<S>) -> StorageResult<bool> {
        let board = &self.board;
        autosave.maybe_save(&mut self.saves, || board.serialize(None)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::BoardAction;
    use crate::storage::{MemoryStorage, block_on};
    use crate::surface::NullFactory;
    use crate::transport::TransportError;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeTransport {
        sent: Vec<ClientMessage>,
        inbox: Vec<TransportEvent>,
        state: ConnectionState,
    }

    impl Transport for FakeTransport {
        fn send(&mut self, message: &ClientMessage) -> TransportResult<()> {
            if self.state != ConnectionState::Connected {
                return Err(TransportError::NotConnected);
            }
            self.sent.push(message.clone());
            Ok(())
        }

        fn poll_events(&mut self) -> Vec<TransportEvent> {
            std::mem::take(&mut self.inbox)
        }

        fn state(&self) -> ConnectionState {
            self.state
        }
    }

    fn session(id: &str) -> Session<NullFactory> {
        let config = EngineConfig {
            save_debounce_ms: 0,
            ..EngineConfig::default()
        };
        Session::with_client_id(id, NullFactory, config)
    }

    fn rect(id: ItemId, x: f32) -> BoardItem {
        let mut item = BoardItem::rectangle(Rect::new(x, 0.0, x + 10.0, 10.0), Stroke::default(), true);
        item.id = id;
        item
    }

    #[test]
    fn test_draw_stroke_undo_redo() {
        let mut s = session("me");
        let id = s
            .draw_stroke(
                vec![
                    PressurePoint::new(0.0, 0.0),
                    PressurePoint::new(10.0, 10.0),
                    PressurePoint::new(20.0, 0.0),
                ],
                Stroke::default(),
            )
            .unwrap();
        assert!(s.board().contains(id));
        assert!(s.undo());
        assert!(!s.board().contains(id));
        assert!(s.redo());
        assert!(s.board().contains(id));
        assert!(s.draw_stroke(Vec::new(), Stroke::default()).is_none());
    }

    #[test]
    fn test_empty_commands_not_recorded() {
        let mut s = session("me");
        assert!(!s.move_items(&[42], 1.0, 1.0));
        assert!(!s.set_color(&[42], 0));
        assert!(!s.can_undo());
        assert!(s.outbox().is_empty());
    }

    #[test]
    fn test_record_does_not_mutate() {
        let mut s = session("me");
        s.add_items(vec![rect(1, 0.0)]);
        s.record(BoardCommand::Move {
            ids: vec![1],
            dx: 5.0,
            dy: 0.0,
        });
        assert_eq!(s.board().get(1).unwrap().rect, Rect::new(0.0, 0.0, 10.0, 10.0));
        assert_eq!(s.outbox().len(), 2);
    }

    #[test]
    fn test_selection_excludes_locked_and_tracks_removal() {
        let mut s = session("me");
        s.add_items(vec![rect(1, 0.0), rect(2, 20.0), rect(3, 500.0)]);
        s.set_locked(&[2], true);
        assert_eq!(s.select_in_rect(&Rect::new(-5.0, -5.0, 40.0, 40.0)), &[1]);
        assert_eq!(s.selection_bounds(), Some(Rect::new(0.0, 0.0, 10.0, 10.0)));

        s.on_board_action(&BoardEvent {
            by: "peer".into(),
            action: BoardAction::Remove { ids: vec![1] },
        });
        assert!(s.selection().is_empty());
        assert_eq!(s.selection_bounds(), None);
    }

    #[test]
    fn test_select_at_picks_front_most() {
        let mut s = session("me");
        s.add_items(vec![rect(1, 0.0).with_z_index(1), rect(2, 5.0).with_z_index(2)]);
        assert_eq!(s.select_at(Point::new(7.0, 5.0)), Some(2));
        assert_eq!(s.select_at(Point::new(300.0, 300.0)), None);
        assert!(s.selection().is_empty());
    }

    #[test]
    fn test_copy_paste_regenerates_ids() {
        let mut s = session("me");
        s.add_items(vec![rect(1, 0.0)]);
        s.select_in_rect(&Rect::new(0.0, 0.0, 10.0, 10.0));
        let clip = s.copy_selection();
        let pasted = s.paste(&clip, (20.0, 20.0));
        assert_eq!(pasted.len(), 1);
        assert_ne!(pasted[0], 1);
        assert_eq!(s.board().get(pasted[0]).unwrap().rect, Rect::new(20.0, 20.0, 30.0, 30.0));
        assert_eq!(s.selection(), pasted.as_slice());
        assert!(s.undo());
        assert_eq!(s.board().len(), 1);
    }

    #[test]
    fn test_flush_drops_when_offline() {
        let mut s = session("me");
        let mut t = FakeTransport::default();
        s.add_items(vec![rect(1, 0.0)]);
        assert_eq!(s.flush(&mut t), 0);
        assert!(s.outbox().is_empty());
        assert!(s.board().contains(1));

        t.state = ConnectionState::Connected;
        s.move_items(&[1], 1.0, 0.0);
        assert_eq!(s.flush(&mut t), 1);
        assert!(matches!(
            &t.sent[0],
            ClientMessage::Action {
                action: BoardAction::Move { .. }
            }
        ));
    }

    #[test]
    fn test_ready_loads_snapshot_then_history() {
        let mut source = session("a");
        source.add_items(vec![rect(1, 0.0)]);
        let snapshot = encode_blob(&source.snapshot());

        let mut s = session("me");
        s.add_items(vec![rect(9, 0.0)]);
        let mut t = FakeTransport {
            state: ConnectionState::Connected,
            ..Default::default()
        };
        t.inbox = vec![
            TransportEvent::Connected,
            TransportEvent::Message(ServerMessage::Ready {
                board: "b".into(),
                clients: vec!["me".into(), "a".into()],
                snapshot: Some(snapshot),
                history: vec![BoardEvent {
                    by: "a".into(),
                    action: BoardAction::Move {
                        ids: vec![1],
                        dx: 0.0,
                        dy: 5.0,
                    },
                }],
                seq: 4,
            }),
            TransportEvent::Message(ServerMessage::PeerJoined { client_id: "b".into() }),
        ];
        s.poll_transport(&mut t);
        assert_eq!(s.connection_state(), ConnectionState::Connected);
        assert_eq!(s.board_id(), Some("b"));
        assert_eq!(s.peers(), &["a".to_string(), "b".to_string()]);
        assert!(!s.board().contains(9));
        assert_eq!(s.board().get(1).unwrap().rect, Rect::new(0.0, 5.0, 10.0, 15.0));
        assert!(!s.can_undo());
        assert_eq!(s.seen_seq(), 4);
    }

    #[test]
    fn test_snapshot_request_flushes_then_saves_with_seen_seq() {
        let mut s = session("me");
        let mut t = FakeTransport {
            state: ConnectionState::Connected,
            ..Default::default()
        };
        t.inbox = vec![
            TransportEvent::Message(ServerMessage::Action {
                event: BoardEvent {
                    by: "a".into(),
                    action: BoardAction::Add {
                        items: vec![rect(1, 0.0)],
                    },
                },
                seq: 9,
            }),
            TransportEvent::Message(ServerMessage::SaveRequested),
        ];
        s.add_items(vec![rect(2, 50.0)]);
        s.poll_transport(&mut t);

        assert_eq!(t.sent.len(), 2);
        assert!(matches!(&t.sent[0], ClientMessage::Action { .. }));
        let ClientMessage::Save { data, seen } = &t.sent[1] else {
            panic!("expected save, got {:?}", t.sent[1]);
        };
        assert_eq!(*seen, 9);
        let items = codec::decode(&decode_blob(data).unwrap(), IdMode::Preserve);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_transport_error_surfaces_state() {
        let mut s = session("me");
        let mut t = FakeTransport::default();
        t.inbox.push(TransportEvent::Error { message: "boom".into() });
        s.poll_transport(&mut t);
        assert_eq!(s.connection_state(), ConnectionState::Error);
        assert!(s.add_items(vec![rect(1, 0.0)]).contains(&1));
    }

    #[test]
    fn test_tick_follows_camera_zoom() {
        let mut s = session("me");
        s.add_items(vec![rect(1, 0.0)]);
        s.zoom_at(kurbo::Point::ZERO, 1.5);
        assert_eq!(s.tick(), RebuildStatus::Swapped);
        assert_eq!(s.board().chunks().scale(), 2.0);
        assert_eq!(s.tick(), RebuildStatus::Idle);
    }

    #[test]
    fn test_autosave_after_edit() {
        let mut s = session("me");
        let auto = AutoSave::new(Arc::new(MemoryStorage::new()), "board");
        assert!(!block_on(s.autosave(&auto)).unwrap());
        s.add_items(vec![rect(1, 0.0)]);
        assert!(block_on(s.autosave(&auto)).unwrap());
        let saved = block_on(auto.storage().load("board")).unwrap();
        assert_eq!(saved, s.snapshot());
    }
}
