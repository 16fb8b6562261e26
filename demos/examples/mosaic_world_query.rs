// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! World-space queries.
//!
//! Georeference a pyramid to a longitude/latitude envelope and query it with a
//! rectangle in degrees.
//!
//! Run:
//! - `cargo run -p understory_mosaic_demos --example mosaic_world_query`

use kurbo::Rect;
use tracing_subscriber::EnvFilter;
use understory_mosaic::{MosaicBuilder, PayloadRef, Region, Subsampling, Tile, TileSize};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let source = Tile::native(PayloadRef::new("earth.tif"), Region::from_xywh(0, 0, 7_200, 3_600))?;
    let manager = MosaicBuilder::new()
        .with_tile_size(TileSize::square(600)?)
        .with_envelope(Rect::new(-180.0, -90.0, 180.0, 90.0))
        .create_tile_manager(&[source])?;

    println!("world bounds: {:?}", manager.world_bounds());
    println!("grid to world: {:?}", manager.grid_to_world());

    // Roughly the Mediterranean.
    let window = Rect::new(-6.0, 30.0, 36.0, 46.0);
    for factor in [1, 2, 4] {
        let s = Subsampling::uniform(factor)?;
        let selection = manager.get_tiles_in_world(window, s, true)?;
        println!("{window:?} at {}: {} tiles", selection.subsampling, selection.len());
        for tile in &selection.tiles {
            println!("  {tile}");
        }
    }
    Ok(())
}
