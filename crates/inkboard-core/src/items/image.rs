//! Image item.

use serde::{Deserialize, Serialize};

/// A raster image placed on the board.
///
/// `src` names the bitmap (a URL or a content key); decoding it is up to the
/// surface that draws the item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageItem {
    pub src: String,
}
