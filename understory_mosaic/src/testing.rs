// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared fixtures for unit tests.

use crate::builder::MosaicBuilder;
use crate::manager::TileManager;
use crate::tile::{PayloadRef, Tile};
use crate::types::{Region, Subsampling, TileSize};

/// Side of one Blue Marble source tile.
pub(crate) const SOURCE_SIZE: i64 = 21_600;

/// Uniform subsampling shorthand.
pub(crate) fn s(v: u32) -> Subsampling {
    Subsampling::uniform(v).unwrap()
}

/// The eight 21600×21600 Blue Marble sources, four columns by two rows.
pub(crate) fn blue_marble_sources() -> Vec<Tile> {
    let mut out = Vec::new();
    for (y, band) in [0, SOURCE_SIZE].into_iter().zip(["N", "S"]) {
        for (x, column) in (0..4).map(|c| c * SOURCE_SIZE).zip(["A", "B", "C", "D"]) {
            let name = format!("world.topo.bathy.200412.3x21600x21600.{band}{column}.png");
            let region = Region::from_xywh(x, y, SOURCE_SIZE, SOURCE_SIZE);
            out.push(Tile::native(PayloadRef::new(name), region).unwrap());
        }
    }
    out
}

/// Pyramid of the Blue Marble sources with 960×960 tiles.
pub(crate) fn blue_marble() -> TileManager {
    MosaicBuilder::new()
        .with_tile_size(TileSize::square(960).unwrap())
        .create_tile_manager(&blue_marble_sources())
        .unwrap()
}
