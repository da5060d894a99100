//! Render a saved board to PNG.
//!
//! ```text
//! inkboard-render <board.ink> <out.png> [scale]
//! ```
//!
//! `INKBOARD_CONFIG` may point at an engine config JSON file.

use inkboard_core::board::Board;
use inkboard_core::chunks::RebuildStatus;
use inkboard_core::config::EngineConfig;
use inkboard_render::{RasterFactory, render_board_png};
use std::process::ExitCode;

fn run(input: &str, output: &str, scale: f64) -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::var("INKBOARD_CONFIG") {
        Ok(path) => EngineConfig::load(&path)?,
        Err(_) => EngineConfig::default(),
    };
    let mut board = Board::new(RasterFactory::new(), &config);
    board.set_scale(scale);
    while let RebuildStatus::Running { .. } = board.tick() {}

    let data = std::fs::read(input)?;
    let report = board.load_contents(&data);
    if !report.skipped.is_empty() {
        log::warn!("{} records could not be decoded", report.skipped.len());
    }
    if report.truncated {
        log::warn!("{input} ends mid-record");
    }

    let result = render_board_png(&board, None)?;
    std::fs::write(output, &result.png_data)?;
    log::info!(
        "wrote {output}: {} items, {}x{}",
        board.len(),
        result.width,
        result.height
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let (input, output) = match (args.get(1), args.get(2)) {
        (Some(input), Some(output)) => (input, output),
        _ => {
            eprintln!("usage: inkboard-render <board.ink> <out.png> [scale]");
            return ExitCode::from(2);
        }
    };
    let scale = match args.get(3).map(|s| s.parse::<f64>()) {
        None => 1.0,
        Some(Ok(scale)) if scale.is_finite() && scale > 0.0 => scale,
        Some(_) => {
            eprintln!("scale must be a positive number");
            return ExitCode::from(2);
        }
    };

    match run(input, output, scale) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("render failed: {e}");
            ExitCode::FAILURE
        }
    }
}
