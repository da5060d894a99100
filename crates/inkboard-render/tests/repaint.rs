//! Damage repaint must leave tiles bit-identical to a full redraw.

use inkboard_core::board::Board;
use inkboard_core::chunks::TileKey;
use inkboard_core::config::EngineConfig;
use inkboard_core::geometry::{PressurePoint, Rect};
use inkboard_core::items::{BoardItem, Stroke};
use inkboard_render::RasterFactory;

fn board() -> Board<RasterFactory> {
    let config = EngineConfig {
        tile_size: 200.0,
        ..EngineConfig::default()
    };
    Board::new(RasterFactory::new(), &config)
}

fn tile(board: &Board<RasterFactory>, x: i32, y: i32) -> Vec<u8> {
    board
        .chunks()
        .chunk(TileKey::new(x, y))
        .map(|chunk| chunk.surface().pixels().as_raw().clone())
        .unwrap_or_default()
}

fn populate(board: &mut Board<RasterFactory>) {
    let mut under = BoardItem::rectangle(Rect::new(20.0, 20.0, 120.0, 90.0), Stroke::new(0x3366CCFF, 4.0), true);
    under.id = 1;
    let mut over = BoardItem::ellipse(Rect::new(60.0, 50.0, 170.0, 150.0), Stroke::new(0xCC000080, 3.0), false)
        .with_z_index(2);
    over.id = 2;
    let mut stroke = BoardItem::path(
        vec![
            PressurePoint::new(10.0, 180.0),
            PressurePoint::with_pressure(90.0, 120.0, 0.4),
            PressurePoint::with_pressure(190.0, 170.0, 0.9),
        ],
        Stroke::new(0x008800FF, 6.0),
    )
    .unwrap();
    stroke.id = 3;
    let mut note = BoardItem::text(Rect::new(130.0, 10.0, 195.0, 40.0), "hi\nthere", 9.0, Stroke::default());
    note.id = 4;
    // Added out of paint order so the occlusion repaint path runs too.
    board.add_items(vec![over, under, stroke, note]);
}

#[test]
fn repaint_is_idempotent() {
    let mut b = board();
    populate(&mut b);
    let before = tile(&b, 0, 0);
    assert!(!before.is_empty());

    for region in [
        Rect::new(0.0, 0.0, 200.0, 200.0),
        Rect::new(55.0, 45.0, 100.0, 100.0),
        Rect::new(-50.0, 100.0, 75.0, 260.0),
        Rect::new(133.3, 17.7, 150.1, 33.9),
    ] {
        b.repaint(&region);
        assert_eq!(tile(&b, 0, 0), before, "repainting {region:?} changed pixels");
    }
}

#[test]
fn incremental_drawing_matches_full_rebuild() {
    let mut b = board();
    populate(&mut b);
    let incremental = tile(&b, 0, 0);
    b.rebuild();
    assert_eq!(tile(&b, 0, 0), incremental);
}

#[test]
fn move_there_and_back_restores_pixels() {
    let mut b = board();
    populate(&mut b);
    let before = tile(&b, 0, 0);

    b.move_items(&[1], 300.0, 0.0);
    assert_ne!(tile(&b, 0, 0), before);
    assert!(b.chunks().chunk(TileKey::new(1, 0)).is_some());

    b.move_items(&[1], -300.0, 0.0);
    assert_eq!(tile(&b, 0, 0), before);
}

#[test]
fn remove_then_re_add_restores_pixels() {
    let mut b = board();
    populate(&mut b);
    let before = tile(&b, 0, 0);
    let removed = b.remove_by_ids(&[2]);
    assert_ne!(tile(&b, 0, 0), before);
    b.add_items(removed);
    assert_eq!(tile(&b, 0, 0), before);
}
