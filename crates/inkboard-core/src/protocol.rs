//! Wire types shared by clients and the relay server.
//!
//! Board mutations travel as [`BoardAction`]s, serialized as
//! `{"type": <kind>, "data": {...}}` where `kind` is the numeric
//! [`ActionKind`]. Everything else is wrapped in the tagged
//! [`ClientMessage`] / [`ServerMessage`] envelopes.

use crate::geometry::Rect;
use crate::items::{BoardItem, ItemId, MAX_ITEM_ID};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

/// Stable identifier of a connected client.
pub type ClientId = String;

/// Errors while reading wire messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Unknown action kind {0}")]
    UnknownKind(u8),
    #[error("Invalid {kind:?} payload: {source}")]
    InvalidPayload {
        kind: ActionKind,
        #[source]
        source: serde_json::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Numeric action tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ActionKind {
    Add = 0,
    Remove = 1,
    Move = 2,
    Scale = 3,
    Order = 4,
    LockState = 5,
    Label = 6,
    Color = 7,
    Weight = 8,
    Text = 9,
}

impl TryFrom<u8> for ActionKind {
    type Error = ProtocolError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Ok(match tag {
            0 => ActionKind::Add,
            1 => ActionKind::Remove,
            2 => ActionKind::Move,
            3 => ActionKind::Scale,
            4 => ActionKind::Order,
            5 => ActionKind::LockState,
            6 => ActionKind::Label,
            7 => ActionKind::Color,
            8 => ActionKind::Weight,
            9 => ActionKind::Text,
            other => return Err(ProtocolError::UnknownKind(other)),
        })
    }
}

/// A board mutation as broadcast to peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAction", into = "RawAction")]
pub enum BoardAction {
    Add { items: Vec<BoardItem> },
    Remove { ids: Vec<ItemId> },
    Move { ids: Vec<ItemId>, dx: f32, dy: f32 },
    /// Absolute rects after the resize.
    Scale { rects: Vec<(ItemId, Rect)> },
    /// Relative z-index step.
    Order { ids: Vec<ItemId>, step: i16 },
    LockState { ids: Vec<ItemId>, locked: bool },
    Label { ids: Vec<ItemId>, label: Option<String> },
    Color { ids: Vec<ItemId>, color: u32 },
    Weight { ids: Vec<ItemId>, weight: f32 },
    Text { id: ItemId, text: String },
}

impl BoardAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            BoardAction::Add { .. } => ActionKind::Add,
            BoardAction::Remove { .. } => ActionKind::Remove,
            BoardAction::Move { .. } => ActionKind::Move,
            BoardAction::Scale { .. } => ActionKind::Scale,
            BoardAction::Order { .. } => ActionKind::Order,
            BoardAction::LockState { .. } => ActionKind::LockState,
            BoardAction::Label { .. } => ActionKind::Label,
            BoardAction::Color { .. } => ActionKind::Color,
            BoardAction::Weight { .. } => ActionKind::Weight,
            BoardAction::Text { .. } => ActionKind::Text,
        }
    }

    pub fn is_add(&self) -> bool {
        matches!(self, BoardAction::Add { .. })
    }
}

/// The untyped `{type, data}` shape of an action on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAction {
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub data: Value,
}

#[derive(Deserialize)]
struct IdsData {
    ids: Vec<ItemId>,
}

#[derive(Deserialize)]
struct AddData {
    items: Vec<Value>,
}

#[derive(Deserialize)]
struct MoveData {
    ids: Vec<ItemId>,
    dx: f32,
    dy: f32,
}

#[derive(Deserialize)]
struct ScaleEntry {
    id: ItemId,
    rect: Rect,
}

#[derive(Deserialize)]
struct ScaleData {
    items: Vec<ScaleEntry>,
}

#[derive(Deserialize)]
struct OrderData {
    ids: Vec<ItemId>,
    step: i16,
}

#[derive(Deserialize)]
struct LockData {
    ids: Vec<ItemId>,
    locked: bool,
}

#[derive(Deserialize)]
struct LabelData {
    ids: Vec<ItemId>,
    #[serde(default)]
    label: Option<String>,
}

#[derive(Deserialize)]
struct ColorData {
    ids: Vec<ItemId>,
    color: u32,
}

#[derive(Deserialize)]
struct WeightData {
    ids: Vec<ItemId>,
    weight: f32,
}

#[derive(Deserialize)]
struct TextData {
    id: ItemId,
    text: String,
}

fn payload<T: serde::de::DeserializeOwned>(kind: ActionKind, data: Value) -> ProtocolResult<T> {
    serde_json::from_value(data).map_err(|source| ProtocolError::InvalidPayload { kind, source })
}

/// Parse the items of an Add payload, dropping any that do not match
/// their declared type or could not be stored.
fn parse_items(raw: Vec<Value>) -> Vec<BoardItem> {
    raw.into_iter()
        .filter_map(|value| match serde_json::from_value::<BoardItem>(value) {
            Ok(item) if item.id > MAX_ITEM_ID => {
                log::warn!("dropping remote item {}: id exceeds {MAX_ITEM_ID}", item.id);
                None
            }
            Ok(item) if item.rect.is_finite() => Some(item),
            Ok(item) => {
                log::warn!("dropping remote item {} with non-finite bounds", item.id);
                None
            }
            Err(e) => {
                log::warn!("dropping malformed remote item: {e}");
                None
            }
        })
        .collect()
}

impl TryFrom<RawAction> for BoardAction {
    type Error = ProtocolError;

    fn try_from(raw: RawAction) -> Result<Self, Self::Error> {
        let kind = ActionKind::try_from(raw.kind)?;
        let data = raw.data;
        Ok(match kind {
            ActionKind::Add => {
                let AddData { items } = payload(kind, data)?;
                BoardAction::Add {
                    items: parse_items(items),
                }
            }
            ActionKind::Remove => {
                let IdsData { ids } = payload(kind, data)?;
                BoardAction::Remove { ids }
            }
            ActionKind::Move => {
                let MoveData { ids, dx, dy } = payload(kind, data)?;
                BoardAction::Move { ids, dx, dy }
            }
            ActionKind::Scale => {
                let ScaleData { items } = payload(kind, data)?;
                BoardAction::Scale {
                    rects: items.into_iter().map(|e| (e.id, e.rect)).collect(),
                }
            }
            ActionKind::Order => {
                let OrderData { ids, step } = payload(kind, data)?;
                BoardAction::Order { ids, step }
            }
            ActionKind::LockState => {
                let LockData { ids, locked } = payload(kind, data)?;
                BoardAction::LockState { ids, locked }
            }
            ActionKind::Label => {
                let LabelData { ids, label } = payload(kind, data)?;
                BoardAction::Label { ids, label }
            }
            ActionKind::Color => {
                let ColorData { ids, color } = payload(kind, data)?;
                BoardAction::Color { ids, color }
            }
            ActionKind::Weight => {
                let WeightData { ids, weight } = payload(kind, data)?;
                BoardAction::Weight { ids, weight }
            }
            ActionKind::Text => {
                let TextData { id, text } = payload(kind, data)?;
                BoardAction::Text { id, text }
            }
        })
    }
}

impl From<BoardAction> for RawAction {
    fn from(action: BoardAction) -> Self {
        let kind = action.kind() as u8;
        let data = match action {
            BoardAction::Add { items } => json!({ "items": items }),
            BoardAction::Remove { ids } => json!({ "ids": ids }),
            BoardAction::Move { ids, dx, dy } => json!({ "ids": ids, "dx": dx, "dy": dy }),
            BoardAction::Scale { rects } => {
                let items: Vec<Value> = rects
                    .into_iter()
                    .map(|(id, rect)| json!({ "id": id, "rect": rect }))
                    .collect();
                json!({ "items": items })
            }
            BoardAction::Order { ids, step } => json!({ "ids": ids, "step": step }),
            BoardAction::LockState { ids, locked } => json!({ "ids": ids, "locked": locked }),
            BoardAction::Label { ids, label } => json!({ "ids": ids, "label": label }),
            BoardAction::Color { ids, color } => json!({ "ids": ids, "color": color }),
            BoardAction::Weight { ids, weight } => json!({ "ids": ids, "weight": weight }),
            BoardAction::Text { id, text } => json!({ "id": id, "text": text }),
        };
        RawAction { kind, data }
    }
}

/// An action together with the client that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardEvent {
    pub by: ClientId,
    pub action: BoardAction,
}

/// Messages sent to the relay server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a board's room.
    Join { board: String, client_id: ClientId },
    /// Leave the current room.
    Leave,
    /// Broadcast a mutation to the room.
    Action { action: BoardAction },
    /// Store a full snapshot (base64 blob) for late joiners. `seen` is the
    /// last room sequence number applied before the snapshot was taken.
    Save {
        data: String,
        #[serde(default)]
        seen: u64,
    },
}

/// Messages received from the relay server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Room joined; replays the room's state.
    Ready {
        board: String,
        clients: Vec<ClientId>,
        /// Latest saved snapshot (base64 blob), if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        snapshot: Option<String>,
        /// Events since the snapshot, oldest first.
        #[serde(default)]
        history: Vec<BoardEvent>,
        /// Sequence number of the last event in the room so far.
        #[serde(default)]
        seq: u64,
    },
    PeerJoined { client_id: ClientId },
    PeerLeft { client_id: ClientId },
    Action {
        event: BoardEvent,
        #[serde(default)]
        seq: u64,
    },
    /// The room's log is growing; answer with a `Save`.
    SaveRequested,
    Error { message: String },
}

pub fn encode_blob(data: &[u8]) -> String {
    STANDARD.encode(data)
}

pub fn decode_blob(data: &str) -> ProtocolResult<Vec<u8>> {
    Ok(STANDARD.decode(data)?)
}
