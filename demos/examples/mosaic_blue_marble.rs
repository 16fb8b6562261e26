// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Blue Marble pyramid.
//!
//! Cut eight 21600×21600 sources into a pyramid of 960×960 tiles, list the levels, and
//! run a few queries including an adjusted one.
//!
//! Run:
//! - `cargo run -p understory_mosaic_demos --example mosaic_blue_marble`
//! - `RUST_LOG=understory_mosaic=debug cargo run -p understory_mosaic_demos --example mosaic_blue_marble`

use tracing_subscriber::EnvFilter;
use understory_mosaic::{MosaicBuilder, PayloadRef, Region, Subsampling, Tile, TileSize};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let side = 21_600;
    let mut sources = Vec::new();
    for (y, band) in [(0, "N"), (side, "S")] {
        for (x, column) in [(0, "A"), (side, "B"), (2 * side, "C"), (3 * side, "D")] {
            let name = format!("world.topo.bathy.200412.3x21600x21600.{band}{column}.png");
            sources.push(Tile::native(PayloadRef::new(name), Region::from_xywh(x, y, side, side))?);
        }
    }

    let manager = MosaicBuilder::new()
        .with_tile_size(TileSize::square(960)?)
        .create_tile_manager(&sources)?;
    println!("{manager:?}");
    for s in manager.subsamplings() {
        println!("  level {s}: {} tiles", manager.count_at(s));
    }

    // Europe-ish window at full resolution.
    let roi = Region::from_xywh(41_000, 5_000, 3_000, 2_000);
    let selection = manager.get_tiles(roi, Subsampling::ONE, false)?;
    println!("{} tiles at full resolution for {roi}:", selection.len());
    for tile in &selection.tiles {
        println!("  {tile}");
    }

    // 12×10 is not a level; the coarsest level within it is 9.
    let requested = Subsampling::new(12, 10)?;
    let selection = manager.get_tiles(manager.domain().unwrap_or(roi), requested, true)?;
    println!(
        "requested {requested}, served {} ({} tiles, adjusted: {})",
        selection.subsampling,
        selection.len(),
        selection.is_adjusted()
    );

    match manager.get_tiles(roi, requested, false) {
        Ok(_) => println!("unexpected exact match"),
        Err(err) => println!("without adjustment: {err}"),
    }
    Ok(())
}
