// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pyramid cache and snapshots.
//!
//! Build through a [`PyramidCache`], reuse the cached pyramid, then save it as JSON and
//! restore it.
//!
//! Run:
//! - `cargo run -p understory_mosaic_demos --example mosaic_cache_snapshot`

use std::num::NonZeroUsize;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use understory_mosaic::{
    MosaicBuilder, MosaicConfig, PayloadRef, PyramidCache, Region, Tile, TileManager,
    TileManagerSnapshot,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config: MosaicConfig = serde_json::from_str(
        r#"{ "tile_size": [256, 256], "layout": "constant_tile_size" }"#,
    )?;
    let builder = MosaicBuilder::from_config(config)?;
    let sources = [
        Tile::native(PayloadRef::new("left.png"), Region::from_xywh(0, 0, 2_048, 2_048))?,
        Tile::native(PayloadRef::new("right.png"), Region::from_xywh(2_048, 0, 2_048, 2_048))?,
    ];

    let capacity = NonZeroUsize::new(4).ok_or("zero capacity")?;
    let mut cache = PyramidCache::new(capacity);
    let first = cache.get_or_build(&builder, &sources)?;
    let second = cache.get_or_build(&builder, &sources)?;
    println!("cached: {cache:?}, shared: {}", Arc::ptr_eq(&first, &second));

    let json = serde_json::to_string_pretty(&first.snapshot())?;
    println!("snapshot is {} bytes", json.len());
    let snapshot: TileManagerSnapshot = serde_json::from_str(&json)?;
    let restored = TileManager::from_snapshot(snapshot)?;
    println!("restored {} tiles, equal: {}", restored.len(), restored == *first);
    Ok(())
}
