// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_mosaic --heading-base-level=0

//! Understory Mosaic: a resolution-aware tile index for large raster mosaics.
//!
//! A mosaic starts as a handful of large source tiles covering a rectangular pixel
//! domain. The [`MosaicBuilder`] cuts that domain into a pyramid of smaller tiles at a
//! series of subsampling factors, and the resulting [`TileManager`] answers
//! "which tiles cover this region at this resolution" for the lifetime of the mosaic.
//!
//! - [`compute_subsamplings`] picks the factors so every level tiles the domain on a grid
//!   nested in the finer levels.
//! - [`GridTree`] indexes all levels in one tree; subtrees nest under the coarser tile
//!   that contains them and synthetic separator nodes keep factors that do not divide
//!   each other (9 and 15, say) on separate ranks.
//! - [`TileManager::get_tiles`] adjusts an unavailable subsampling to the nearest level
//!   and reports the choice.
//!
//! The crate never touches pixels. A [`Tile`] is a footprint, a subsampling and an opaque
//! [`PayloadRef`]; decoding is left to the caller.
//!
//! # Example
//!
//! ```rust
//! use understory_mosaic::{MosaicBuilder, PayloadRef, Region, Subsampling, Tile, TileSize};
//!
//! // Eight 21600×21600 sources in a 4×2 grid.
//! let mut sources = Vec::new();
//! for row in 0..2 {
//!     for column in 0..4 {
//!         let region = Region::from_xywh(column * 21_600, row * 21_600, 21_600, 21_600);
//!         let name = format!("source_{column}_{row}.png");
//!         sources.push(Tile::native(PayloadRef::new(name), region).unwrap());
//!     }
//! }
//!
//! let manager = MosaicBuilder::new()
//!     .with_tile_size(TileSize::square(960).unwrap())
//!     .create_tile_manager(&sources)
//!     .unwrap();
//! assert_eq!(manager.len(), 4733);
//!
//! // No level at (100, 120): the coarsest level not exceeding it is used instead.
//! let domain = manager.domain().unwrap();
//! let requested = Subsampling::new(100, 120).unwrap();
//! let selection = manager.get_tiles(domain, requested, true).unwrap();
//! assert_eq!(selection.subsampling, Subsampling::uniform(90).unwrap());
//! assert_eq!(selection.tiles.len(), 1);
//! ```
//!
//! Built pyramids can be kept in a caller-owned [`PyramidCache`] and saved as a
//! [`TileManagerSnapshot`] with any serde format.
//!
//! Logging goes through [`tracing`]; the crate never installs a subscriber.

pub mod builder;
pub mod cache;
pub mod error;
pub mod manager;
pub mod naming;
pub mod node;
pub mod snapshot;
pub mod subsampling;
pub mod tile;
pub mod types;
pub mod world;

#[cfg(test)]
mod testing;

pub use builder::{MosaicBuilder, MosaicConfig, MosaicPlan};
pub use cache::{PyramidCache, PyramidKey};
pub use error::{MosaicError, Result};
pub use manager::{TileManager, TileSelection};
pub use naming::{FilenameFormatter, LevelLayout, TileNaming};
pub use node::{GridTree, Node, NodeId, NodeKind};
pub use snapshot::{SNAPSHOT_VERSION, TileManagerSnapshot};
pub use subsampling::{
    TileLayout, compute_subsamplings, compute_subsamplings_for, divisors, suggested_tile_size,
    validate_subsamplings,
};
pub use tile::{PayloadRef, Tile};
pub use types::{Region, Subsampling, TileSize};
