// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Choosing tile sizes and the subsampling factors of a pyramid.
//!
//! For the default [`TileLayout::ConstantTileSize`] every level uses tiles of the same
//! pixel size, so coarser levels have fewer tiles. The usable factors are the divisors of
//! the domain/tile ratio on each axis, which guarantees that every level tiles the domain
//! on the same grid as the finer levels it nests over:
//!
//! ```rust
//! use understory_mosaic::{Region, TileSize, compute_subsamplings};
//!
//! let domain = Region::from_xywh(0, 0, 86_400, 43_200);
//! let factors = compute_subsamplings(domain, TileSize::square(960).unwrap()).unwrap();
//! let xs: Vec<u32> = factors.iter().map(|s| s.x()).collect();
//! assert_eq!(xs, [1, 3, 5, 9, 15, 45, 90]);
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{MosaicError, Result};
use crate::types::{MAX_EXTENT, Region, Subsampling, TileSize};

/// Preferred tile size when none is configured.
pub const DEFAULT_TILE_SIZE: u32 = 512;

/// Smallest tile produced by the constant-area layout.
pub const MIN_TILE_SIZE: u32 = 64;

/// How tile sizes evolve across pyramid levels.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileLayout {
    /// Every level uses the configured tile size; coarser levels have fewer tiles.
    #[default]
    ConstantTileSize,
    /// Every level covers the same absolute footprint per tile; coarser levels have
    /// smaller tiles.
    ConstantArea,
}

/// Ascending divisors of `n`. Empty for zero.
pub fn divisors(n: u32) -> Vec<u32> {
    let mut low = Vec::new();
    let mut high = Vec::new();
    let mut i = 1_u32;
    while u64::from(i) * u64::from(i) <= u64::from(n) {
        if n % i == 0 {
            low.push(i);
            if i != n / i {
                high.push(n / i);
            }
        }
        i += 1;
    }
    low.extend(high.into_iter().rev());
    low
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// `extent / tile` rounded half up, never below one.
fn round_ratio(extent: i64, tile: i64) -> u32 {
    let r = (extent + tile / 2) / tile;
    u32::try_from(r.max(1)).unwrap_or(u32::MAX)
}

pub(crate) fn check_domain(domain: &Region) -> Result<()> {
    if domain.is_empty() {
        return Err(MosaicError::InvalidDomain {
            width: domain.width(),
            height: domain.height(),
        });
    }
    Ok(())
}

/// Subsampling factors for a domain tiled with `tile_size` tiles, finest first.
///
/// Candidates are the divisors of the rounded domain/tile ratio on either axis. A
/// candidate is kept when, on each axis, it divides that axis' ratio or the axis already
/// collapsed to a single tile, and at least one axis still holds a full tile. Factor 1
/// is always present. The result only depends on the inputs.
pub fn compute_subsamplings(domain: Region, tile_size: TileSize) -> Result<Vec<Subsampling>> {
    compute_subsamplings_for(TileLayout::ConstantTileSize, domain, tile_size)
}

/// Like [`compute_subsamplings`], for an explicit [`TileLayout`].
pub fn compute_subsamplings_for(
    layout: TileLayout,
    domain: Region,
    tile_size: TileSize,
) -> Result<Vec<Subsampling>> {
    check_domain(&domain)?;
    let tw = i64::from(tile_size.width());
    let th = i64::from(tile_size.height());
    let factors: Vec<u32> = match layout {
        TileLayout::ConstantTileSize => {
            let (w, h) = (domain.width(), domain.height());
            let nx = round_ratio(w, tw);
            let ny = round_ratio(h, th);
            let candidates: BTreeSet<u32> = divisors(nx).into_iter().chain(divisors(ny)).collect();
            let fits = |s: u32, extent: i64, tile: i64, ratio: u32| {
                ratio % s == 0 || extent / i64::from(s) <= tile
            };
            candidates
                .into_iter()
                .filter(|&s| {
                    let full = w / i64::from(s) >= tw || h / i64::from(s) >= th;
                    s == 1 || (fits(s, w, tw, nx) && fits(s, h, th, ny) && full)
                })
                .collect()
        }
        TileLayout::ConstantArea => divisors(gcd(tile_size.width(), tile_size.height()))
            .into_iter()
            .filter(|&s| {
                s == 1
                    || (tile_size.width() / s >= MIN_TILE_SIZE
                        && tile_size.height() / s >= MIN_TILE_SIZE)
            })
            .collect(),
    };
    factors
        .into_iter()
        .take_while(|&s| s <= MAX_EXTENT)
        .map(Subsampling::uniform)
        .collect()
}

/// Check an explicit subsampling sequence: non-empty and strictly ascending.
pub fn validate_subsamplings(subsamplings: &[Subsampling]) -> Result<()> {
    if subsamplings.is_empty() {
        return Err(MosaicError::MalformedSubsamplings("sequence is empty"));
    }
    if subsamplings.windows(2).any(|w| w[0] >= w[1]) {
        return Err(MosaicError::MalformedSubsamplings(
            "sequence is not strictly ascending",
        ));
    }
    Ok(())
}

/// Tile size in `[min, max]` that divides `image_size` and whose tile count has the most
/// divisors, i.e. offers the most pyramid levels. Ties go to the size closest to
/// `preferred`.
///
/// Images not larger than `min` use a single tile. When no size in the range divides the
/// image, `preferred` is returned.
pub fn suggested_tile_size(image_size: u32, preferred: u32, min: u32, max: u32) -> Result<u32> {
    if min <= 1 || min > max || !(min..=max).contains(&preferred) {
        return Err(MosaicError::InvalidTileSize {
            width: preferred,
            height: preferred,
        });
    }
    if image_size <= min {
        return Ok(image_size.max(1));
    }
    let mut best = preferred;
    let mut best_count = 0;
    for size in min..=max {
        if image_size % size != 0 {
            continue;
        }
        let count = divisors(image_size / size).len();
        let closer = size.abs_diff(preferred) < best.abs_diff(preferred);
        if count > best_count || (count == best_count && closer) {
            best = size;
            best_count = count;
        }
    }
    Ok(best)
}

/// Default tile size for a domain: [`suggested_tile_size`] around [`DEFAULT_TILE_SIZE`].
pub fn default_tile_size(domain: &Region) -> Result<TileSize> {
    check_domain(domain)?;
    let lo = DEFAULT_TILE_SIZE - DEFAULT_TILE_SIZE / 4;
    let hi = DEFAULT_TILE_SIZE + DEFAULT_TILE_SIZE / 4;
    let clamp = |v: i64| u32::try_from(v).unwrap_or(u32::MAX);
    let width = suggested_tile_size(clamp(domain.width()), DEFAULT_TILE_SIZE, lo, hi)?;
    let height = if domain.height() == domain.width() {
        width
    } else {
        suggested_tile_size(clamp(domain.height()), DEFAULT_TILE_SIZE, lo, hi)?
    };
    TileSize::new(width, height)
}
