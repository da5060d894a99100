//! Inkboard Core Library
//!
//! Board engine for the Inkboard collaborative whiteboard: items, the
//! chunked spatial index and its tile rendering, the binary board format,
//! undo/redo, and reconciliation of peers' actions.

pub mod actions;
pub mod board;
pub mod camera;
pub mod chunks;
pub mod codec;
pub mod config;
pub mod geometry;
pub mod history;
pub mod items;
pub mod protocol;
pub mod quadtree;
pub mod reconcile;
pub mod session;
pub mod storage;
pub mod surface;
pub mod transport;

pub use actions::{BoardCommand, Effects};
pub use board::{Board, ItemTable};
pub use camera::Camera;
pub use chunks::{Chunk, ChunkManager, RebuildStatus, TileKey};
pub use codec::{CodecError, DecodeReport, IdMode};
pub use config::{ConfigError, EngineConfig};
pub use geometry::{Point, PressurePoint, Rect};
pub use history::{Action, ActionStack};
pub use items::{BoardItem, ItemId, ItemKind, ItemType, Stroke};
pub use protocol::{BoardAction, BoardEvent, ClientId, ClientMessage, ServerMessage};
pub use quadtree::QuadTree;
pub use reconcile::BatchOutcome;
pub use session::Session;
pub use storage::{AutoSave, FileStorage, MemoryStorage, Storage, StorageError};
pub use surface::{Paint, Surface, SurfaceFactory};
pub use transport::{ConnectionState, NativeWebSocket, Transport, TransportError, TransportEvent};
