// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error type shared by the builder, the tiles and the manager.

use thiserror::Error;

use crate::types::{Region, Subsampling};

/// Errors reported by mosaic construction and queries.
///
/// Removing a tile that is not indexed is not an error; [`TileManager::remove`] returns
/// `false` instead.
///
/// [`TileManager::remove`]: crate::TileManager::remove
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MosaicError {
    /// The mosaic domain has no area.
    #[error("domain must have a positive size, got {width}x{height}")]
    InvalidDomain {
        /// Requested width.
        width: i64,
        /// Requested height.
        height: i64,
    },

    /// A tile size is zero or does not fit in 16 bits.
    #[error("tile size must be within 1..=65535, got {width}x{height}")]
    InvalidTileSize {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// A subsampling factor is zero or does not fit in 16 bits.
    #[error("subsampling factors must be within 1..=65535, got ({x},{y})")]
    InvalidSubsampling {
        /// Requested horizontal factor.
        x: u32,
        /// Requested vertical factor.
        y: u32,
    },

    /// An explicit subsampling sequence is empty or not strictly ascending.
    #[error("malformed subsampling sequence: {0}")]
    MalformedSubsamplings(&'static str),

    /// A tile is wider or taller than a 16-bit size can describe.
    #[error("tile {axis} of {value} pixels exceeds the 65535 pixel limit")]
    TileTooLarge {
        /// `"width"` or `"height"`.
        axis: &'static str,
        /// Offending size.
        value: i64,
    },

    /// A tile was given an empty region.
    #[error("tile region {0} is empty")]
    EmptyTileRegion(Region),

    /// A query rectangle is empty or inverted.
    #[error("region of interest {0} is empty or inverted")]
    InvalidRegion(Region),

    /// No tiles exist at the requested subsampling and adjustment was not allowed.
    #[error("no tiles at subsampling {requested}")]
    NoMatchingResolution {
        /// The subsampling the caller asked for.
        requested: Subsampling,
    },

    /// A snapshot was written by an incompatible version.
    #[error("unsupported snapshot version {0}")]
    UnsupportedSnapshotVersion(u32),

    /// The pixel-to-world transform cannot be inverted.
    #[error("grid-to-world transform is not invertible")]
    SingularTransform,
}

/// Result alias used throughout the crate.
pub type Result<T, E = MosaicError> = core::result::Result<T, E>;
