// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Primitive geometry types: pixel regions, subsampling factors and tile sizes.

use core::cmp::Ordering;
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MosaicError, Result};

/// Largest value accepted for a tile dimension or a subsampling factor.
pub const MAX_EXTENT: u32 = u16::MAX as u32;

/// Half-open axis-aligned pixel rectangle: `[min_x, max_x) × [min_y, max_y)`.
///
/// A region with `max <= min` on either axis is empty. Unlike the closed boxes used for
/// hit testing, two regions that only share an edge do not intersect.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    /// Minimum x (left, inclusive)
    pub min_x: i64,
    /// Minimum y (top, inclusive)
    pub min_y: i64,
    /// Maximum x (right, exclusive)
    pub max_x: i64,
    /// Maximum y (bottom, exclusive)
    pub max_y: i64,
}

impl Region {
    /// Create a new region from min/max corners.
    pub const fn new(min_x: i64, min_y: i64, max_x: i64, max_y: i64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Create a region from origin and size.
    pub const fn from_xywh(x: i64, y: i64, w: i64, h: i64) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x.saturating_add(w),
            max_y: y.saturating_add(h),
        }
    }

    /// Width, which is negative for inverted regions.
    pub const fn width(&self) -> i64 {
        self.max_x - self.min_x
    }

    /// Height, which is negative for inverted regions.
    pub const fn height(&self) -> i64 {
        self.max_y - self.min_y
    }

    /// Return true if the region has no area.
    pub const fn is_empty(&self) -> bool {
        self.max_x <= self.min_x || self.max_y <= self.min_y
    }

    /// Area in pixels, widened to avoid overflow. Empty regions have zero area.
    pub fn area(&self) -> i128 {
        if self.is_empty() {
            return 0;
        }
        i128::from(self.width()) * i128::from(self.height())
    }

    /// The intersection of two regions. May be empty.
    pub fn intersect(&self, other: &Self) -> Self {
        Self {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        }
    }

    /// Whether the two regions share a positive area.
    pub fn intersects(&self, other: &Self) -> bool {
        !self.intersect(other).is_empty()
    }

    /// Whether `other` lies entirely inside this region. Empty regions are never contained.
    pub fn contains(&self, other: &Self) -> bool {
        !other.is_empty()
            && self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && other.max_x <= self.max_x
            && other.max_y <= self.max_y
    }

    /// Smallest region enclosing both.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Multiply every coordinate by the subsampling factors (subsampled → absolute space).
    pub fn scale(&self, s: Subsampling) -> Self {
        let sx = i64::from(s.x);
        let sy = i64::from(s.y);
        Self {
            min_x: self.min_x.saturating_mul(sx),
            min_y: self.min_y.saturating_mul(sy),
            max_x: self.max_x.saturating_mul(sx),
            max_y: self.max_y.saturating_mul(sy),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{}) {}x{}",
            self.min_x,
            self.min_y,
            self.width(),
            self.height()
        )
    }
}

/// Union of an iterator of regions, or `None` when it yields nothing.
pub(crate) fn union_all(mut it: impl Iterator<Item = Region>) -> Option<Region> {
    let first = it.next()?;
    Some(it.fold(first, |acc, r| acc.union(&r)))
}

/// Per-axis subsampling (downsampling) factor. Factor 1 is the native resolution.
///
/// Factors are always in `1..=65535`.
///
/// The total order goes from finest to coarsest: by pixel footprint `x * y`, then by `y`,
/// then by `x`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "[u32; 2]", into = "[u32; 2]")]
pub struct Subsampling {
    x: u16,
    y: u16,
}

impl Subsampling {
    /// Native resolution.
    pub const ONE: Self = Self { x: 1, y: 1 };

    /// Coarsest representable factor. Every subsampling is within it.
    pub const MAX: Self = Self {
        x: u16::MAX,
        y: u16::MAX,
    };

    /// Create a subsampling pair, rejecting zero or out-of-range factors.
    pub fn new(x: u32, y: u32) -> Result<Self> {
        match (u16::try_from(x), u16::try_from(y)) {
            (Ok(sx), Ok(sy)) if sx > 0 && sy > 0 => Ok(Self { x: sx, y: sy }),
            _ => Err(MosaicError::InvalidSubsampling { x, y }),
        }
    }

    /// Same factor on both axes.
    pub fn uniform(s: u32) -> Result<Self> {
        Self::new(s, s)
    }

    /// Horizontal factor.
    pub const fn x(&self) -> u32 {
        self.x as u32
    }

    /// Vertical factor.
    pub const fn y(&self) -> u32 {
        self.y as u32
    }

    /// Number of source pixels folded into one subsampled pixel.
    pub const fn footprint(&self) -> u64 {
        self.x as u64 * self.y as u64
    }

    /// Whether each factor of `self` divides the matching factor of `other`.
    pub const fn divides(&self, other: &Self) -> bool {
        other.x % self.x == 0 && other.y % self.y == 0
    }

    /// Whether the two factors nest, one dividing the other.
    pub const fn is_compatible(&self, other: &Self) -> bool {
        self.divides(other) || other.divides(self)
    }

    /// Whether neither axis exceeds the matching axis of `other`.
    pub const fn is_within(&self, other: &Self) -> bool {
        self.x <= other.x && self.y <= other.y
    }

    /// Per-axis maximum.
    pub fn max_each(&self, other: &Self) -> Self {
        Self {
            x: self.x.max(other.x),
            y: self.y.max(other.y),
        }
    }
}

impl Default for Subsampling {
    fn default() -> Self {
        Self::ONE
    }
}

impl Ord for Subsampling {
    fn cmp(&self, other: &Self) -> Ordering {
        self.footprint()
            .cmp(&other.footprint())
            .then(self.y.cmp(&other.y))
            .then(self.x.cmp(&other.x))
    }
}

impl PartialOrd for Subsampling {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl TryFrom<[u32; 2]> for Subsampling {
    type Error = MosaicError;

    fn try_from([x, y]: [u32; 2]) -> Result<Self> {
        Self::new(x, y)
    }
}

impl From<Subsampling> for [u32; 2] {
    fn from(s: Subsampling) -> Self {
        [s.x(), s.y()]
    }
}

impl fmt::Display for Subsampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

/// Size in pixels of the tiles produced by the mosaic builder.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "[u32; 2]", into = "[u32; 2]")]
pub struct TileSize {
    width: u16,
    height: u16,
}

impl TileSize {
    /// Create a tile size, rejecting zero or dimensions above 65535.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        match (u16::try_from(width), u16::try_from(height)) {
            (Ok(w), Ok(h)) if w > 0 && h > 0 => Ok(Self {
                width: w,
                height: h,
            }),
            _ => Err(MosaicError::InvalidTileSize { width, height }),
        }
    }

    /// Square tile size.
    pub fn square(size: u32) -> Result<Self> {
        Self::new(size, size)
    }

    /// Width in pixels.
    pub const fn width(&self) -> u32 {
        self.width as u32
    }

    /// Height in pixels.
    pub const fn height(&self) -> u32 {
        self.height as u32
    }
}

impl TryFrom<[u32; 2]> for TileSize {
    type Error = MosaicError;

    fn try_from([w, h]: [u32; 2]) -> Result<Self> {
        Self::new(w, h)
    }
}

impl From<TileSize> for [u32; 2] {
    fn from(s: TileSize) -> Self {
        [s.width(), s.height()]
    }
}

/// Floor division for possibly negative numerators.
#[inline]
pub(crate) fn div_floor(a: i64, b: i64) -> i64 {
    debug_assert!(b > 0, "divisor must be positive");
    a.div_euclid(b)
}

/// Ceiling division for possibly negative numerators.
#[inline]
pub(crate) fn div_ceil(a: i64, b: i64) -> i64 {
    debug_assert!(b > 0, "divisor must be positive");
    -(-a).div_euclid(b)
}
