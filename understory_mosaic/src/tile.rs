// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tiles: a footprint, a subsampling and an opaque payload reference.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MosaicError, Result};
use crate::types::{Region, Subsampling, div_ceil, div_floor};

/// Opaque reference to the pixels of a tile.
///
/// The index never opens or interprets it. `input` is usually a file path or URL and
/// `image_index` selects an image inside that input.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PayloadRef {
    input: String,
    #[serde(default)]
    image_index: u16,
}

impl PayloadRef {
    /// Reference the first image of `input`.
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            image_index: 0,
        }
    }

    /// Select another image inside the same input.
    #[must_use]
    pub fn with_image_index(mut self, image_index: u16) -> Self {
        self.image_index = image_index;
        self
    }

    /// The input identifier.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// The image index inside the input.
    pub fn image_index(&self) -> u16 {
        self.image_index
    }
}

impl fmt::Display for PayloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.image_index == 0 {
            f.write_str(&self.input)
        } else {
            write!(f, "{}#{}", self.input, self.image_index)
        }
    }
}

/// An immutable spatial unit of a mosaic.
///
/// The region is kept in the tile's own pixel space, i.e. already divided by the
/// subsampling. [`Tile::absolute_region`] maps it back to the full-resolution space in
/// which tiles of different subsamplings are compared.
///
/// Local width and height are limited to 65535 pixels.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "TileRepr", into = "TileRepr")]
pub struct Tile {
    payload: PayloadRef,
    x: i64,
    y: i64,
    width: u16,
    height: u16,
    subsampling: Subsampling,
}

impl Tile {
    /// Create a tile covering `region` (in its own pixel space) at `subsampling`.
    ///
    /// Fails with [`MosaicError::EmptyTileRegion`] for an empty region and with
    /// [`MosaicError::TileTooLarge`] when either side exceeds 65535 pixels.
    pub fn new(payload: PayloadRef, region: Region, subsampling: Subsampling) -> Result<Self> {
        if region.is_empty() {
            return Err(MosaicError::EmptyTileRegion(region));
        }
        let width = checked_extent("width", region.width())?;
        let height = checked_extent("height", region.height())?;
        Ok(Self {
            payload,
            x: region.min_x,
            y: region.min_y,
            width,
            height,
            subsampling,
        })
    }

    /// Source tile at native resolution.
    pub fn native(payload: PayloadRef, region: Region) -> Result<Self> {
        Self::new(payload, region, Subsampling::ONE)
    }

    /// The payload reference.
    pub fn payload(&self) -> &PayloadRef {
        &self.payload
    }

    /// The subsampling of the tile pixels relative to the full-resolution domain.
    pub fn subsampling(&self) -> Subsampling {
        self.subsampling
    }

    /// Region in the tile's own (subsampled) pixel space.
    pub fn region(&self) -> Region {
        Region::from_xywh(
            self.x,
            self.y,
            i64::from(self.width),
            i64::from(self.height),
        )
    }

    /// Region in full-resolution pixel space.
    pub fn absolute_region(&self) -> Region {
        self.region().scale(self.subsampling)
    }

    /// Local width in pixels.
    pub fn width(&self) -> u32 {
        u32::from(self.width)
    }

    /// Local height in pixels.
    pub fn height(&self) -> u32 {
        u32::from(self.height)
    }

    /// Whether this tile is finer than `subsampling` on at least one axis.
    pub fn is_finer_than(&self, subsampling: Subsampling) -> bool {
        self.subsampling.x() < subsampling.x() || self.subsampling.y() < subsampling.y()
    }

    /// Largest multiple of this tile's subsampling that does not exceed `requested`.
    ///
    /// Returns `requested` unchanged when it is already a multiple, and `None` when the
    /// tile is coarser than the request on some axis.
    pub fn subsampling_floor(&self, requested: Subsampling) -> Option<Subsampling> {
        let dx = requested.x() % self.subsampling.x();
        let dy = requested.y() % self.subsampling.y();
        if dx == 0 && dy == 0 {
            return Some(requested);
        }
        Subsampling::new(requested.x() - dx, requested.y() - dy).ok()
    }

    /// Convert a full-resolution rectangle into this tile's pixel space, rounding outward.
    pub fn relative_region(&self, absolute: &Region) -> Region {
        let sx = i64::from(self.subsampling.x());
        let sy = i64::from(self.subsampling.y());
        Region::new(
            div_floor(absolute.min_x, sx),
            div_floor(absolute.min_y, sy),
            div_ceil(absolute.max_x, sx),
            div_ceil(absolute.max_y, sy),
        )
    }

    /// Number of this tile's pixels that a read of `to_read` (absolute space) at
    /// `subsampling` would not use.
    ///
    /// Callers use it as a cost hint when several tiles could serve the same request.
    pub fn unwanted_pixels(&self, to_read: &Region, subsampling: Subsampling) -> u64 {
        let used = self.absolute_region().intersect(to_read).area();
        let used = used / i128::from(subsampling.footprint());
        let own = i128::from(self.width) * i128::from(self.height);
        u64::try_from((own - used).max(0)).unwrap_or(u64::MAX)
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} subsampling {}",
            self.payload,
            self.region(),
            self.subsampling
        )
    }
}

fn checked_extent(axis: &'static str, value: i64) -> Result<u16> {
    u16::try_from(value).map_err(|_| MosaicError::TileTooLarge { axis, value })
}

/// Serialized form of a tile; deserialization goes through [`Tile::new`].
#[derive(Serialize, Deserialize)]
struct TileRepr {
    payload: PayloadRef,
    region: Region,
    subsampling: Subsampling,
}

impl TryFrom<TileRepr> for Tile {
    type Error = MosaicError;

    fn try_from(repr: TileRepr) -> Result<Self> {
        Self::new(repr.payload, repr.region, repr.subsampling)
    }
}

impl From<Tile> for TileRepr {
    fn from(tile: Tile) -> Self {
        Self {
            region: tile.region(),
            subsampling: tile.subsampling,
            payload: tile.payload,
        }
    }
}
