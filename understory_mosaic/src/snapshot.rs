// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Serializable form of a [`TileManager`].
//!
//! A snapshot lists the tiles, not the tree: restoring rebuilds the tree, which gives a
//! manager equal to the captured one without running the mosaic builder again. The wire
//! format is up to the caller; anything serde supports works.

use kurbo::Affine;
use serde::{Deserialize, Serialize};

use crate::error::{MosaicError, Result};
use crate::manager::TileManager;
use crate::tile::Tile;
use crate::types::{Region, TileSize};

/// Format version written by [`TileManager::snapshot`].
pub const SNAPSHOT_VERSION: u32 = 1;

/// Everything needed to restore a [`TileManager`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileManagerSnapshot {
    /// Format version.
    pub version: u32,
    /// Mosaic domain in absolute pixels.
    pub domain: Option<Region>,
    /// Nominal tile size.
    pub tile_size: Option<TileSize>,
    /// Pixel-to-world coefficients, as [`Affine::as_coeffs`] gives them.
    #[serde(default)]
    pub grid_to_world: Option<[f64; 6]>,
    /// Tiles, finest level first then row-major.
    pub tiles: Vec<Tile>,
}

impl TileManager {
    /// Capture the indexed tiles and mosaic metadata.
    pub fn snapshot(&self) -> TileManagerSnapshot {
        TileManagerSnapshot {
            version: SNAPSHOT_VERSION,
            domain: self.domain(),
            tile_size: self.tile_size(),
            grid_to_world: self.grid_to_world().map(|a| a.as_coeffs()),
            tiles: self.tiles().into_iter().cloned().collect(),
        }
    }

    /// Rebuild a manager from a snapshot.
    pub fn from_snapshot(snapshot: TileManagerSnapshot) -> Result<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(MosaicError::UnsupportedSnapshotVersion(snapshot.version));
        }
        let mut manager = Self::new(snapshot.tiles);
        if let Some(domain) = snapshot.domain {
            manager = manager.with_domain(domain);
        }
        if let Some(tile_size) = snapshot.tile_size {
            manager = manager.with_tile_size(tile_size);
        }
        if let Some(coeffs) = snapshot.grid_to_world {
            manager.set_grid_to_world(Affine::new(coeffs))?;
        }
        tracing::debug!(tiles = manager.len(), "restored mosaic from snapshot");
        Ok(manager)
    }
}
