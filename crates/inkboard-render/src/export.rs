//! Composing chunk tiles into a single image and PNG export.

use crate::raster::{RasterFactory, rgba};
use crate::{RenderResult, RendererError};
use image::{Rgba, RgbaImage};
use inkboard_core::board::Board;
use inkboard_core::geometry::Rect;

/// Largest exported image side in pixels.
const MAX_EXPORT_SIDE: f64 = 16384.0;

/// Result of PNG rendering.
#[derive(Debug)]
pub struct PngRenderResult {
    pub png_data: Vec<u8>,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
}

/// Encode RGBA pixels as PNG.
pub fn encode_png(image: &RgbaImage) -> RenderResult<Vec<u8>> {
    let (width, height) = image.dimensions();
    let mut png_data = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut png_data, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(image.as_raw())?;
        writer.finish()?;
    }
    Ok(png_data)
}

/// Copy the live chunks under `region` into one image at the chunks'
/// resolution. Area without chunks shows the board background.
pub fn compose_region(board: &Board<RasterFactory>, region: &Rect) -> RenderResult<RgbaImage> {
    let region = region.normalized();
    let chunks = board.chunks().visible_chunks(&region);
    let scale = chunks
        .first()
        .map_or_else(|| board.chunks().scale(), |chunk| chunk.surface().scale());
    let width = (region.w() as f64 * scale).ceil().min(MAX_EXPORT_SIDE);
    let height = (region.h() as f64 * scale).ceil().min(MAX_EXPORT_SIDE);
    if !(width >= 1.0 && height >= 1.0) {
        return Err(RendererError::Empty);
    }
    let (width, height) = (width as u32, height as u32);

    let mut out = RgbaImage::from_pixel(width, height, Rgba(rgba(board.chunks().layout().background)));
    for chunk in chunks {
        let bounds = chunk.bounds();
        let surface = chunk.surface();
        let tile = surface.pixels();
        let to_out = |v: f32, origin: f32| (v - origin) as f64 * scale;
        let x0 = to_out(bounds.x.max(region.x), region.x).floor().max(0.0) as u32;
        let y0 = to_out(bounds.y.max(region.y), region.y).floor().max(0.0) as u32;
        let x1 = (to_out(bounds.x2.min(region.x2), region.x).ceil() as u32).min(width);
        let y1 = (to_out(bounds.y2.min(region.y2), region.y).ceil() as u32).min(height);
        for oy in y0..y1 {
            let by = region.y as f64 + (oy as f64 + 0.5) / scale;
            if by < bounds.y as f64 || by >= bounds.y2 as f64 {
                continue;
            }
            let sy = ((by - bounds.y as f64) * surface.scale()) as u32;
            for ox in x0..x1 {
                let bx = region.x as f64 + (ox as f64 + 0.5) / scale;
                if bx < bounds.x as f64 || bx >= bounds.x2 as f64 {
                    continue;
                }
                let sx = ((bx - bounds.x as f64) * surface.scale()) as u32;
                if sx < tile.width() && sy < tile.height() {
                    out.put_pixel(ox, oy, *tile.get_pixel(sx, sy));
                }
            }
        }
    }
    Ok(out)
}

/// Render `region`, or all content when `None`, to PNG.
pub fn render_board_png(board: &Board<RasterFactory>, region: Option<Rect>) -> RenderResult<PngRenderResult> {
    let region = region.or_else(|| board.content_bounds()).ok_or(RendererError::Empty)?;
    let image = compose_region(board, &region)?;
    let (width, height) = image.dimensions();
    let png_data = encode_png(&image)?;
    log::info!("rendered {width}x{height} PNG ({} bytes)", png_data.len());
    Ok(PngRenderResult {
        png_data,
        width,
        height,
    })
}
