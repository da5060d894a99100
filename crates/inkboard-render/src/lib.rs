//! Inkboard Render Library
//!
//! CPU implementation of the core surface traits. Every chunk gets an
//! RGBA tile; tiles can be composed into a view and exported as PNG.

mod export;
mod images;
mod raster;

use thiserror::Error;

pub use export::{PngRenderResult, compose_region, encode_png, render_board_png};
pub use images::ImageStore;
pub use raster::{DEFAULT_MAX_TILE_SIDE, RasterFactory, RasterSurface};

/// Renderer errors.
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image decode failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("PNG encoding failed: {0}")]
    Png(#[from] png::EncodingError),
    #[error("Nothing to render")]
    Empty,
}

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RendererError>;
