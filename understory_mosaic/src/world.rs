// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Mapping between absolute pixel space and world coordinates.
//!
//! A mosaic may carry a grid-to-world [`Affine`] that maps absolute pixel coordinates to
//! some world space (typically map units). Pixel rows grow downward, so a north-up
//! envelope flips the y axis.

use kurbo::{Affine, Point, Rect};

use crate::error::{MosaicError, Result};
use crate::types::Region;

/// Affine mapping the corners of `domain` onto `envelope`, north up.
///
/// The top-left pixel corner of the domain lands on the envelope's `(x0, y1)` corner and
/// the bottom-right one on `(x1, y0)`.
pub fn envelope_transform(domain: &Region, envelope: Rect) -> Result<Affine> {
    if domain.is_empty() {
        return Err(MosaicError::InvalidDomain {
            width: domain.width(),
            height: domain.height(),
        });
    }
    let sx = envelope.width() / domain.width() as f64;
    let sy = -envelope.height() / domain.height() as f64;
    let tx = envelope.x0 - domain.min_x as f64 * sx;
    let ty = envelope.y1 - domain.min_y as f64 * sy;
    let affine = Affine::new([sx, 0.0, 0.0, sy, tx, ty]);
    check_invertible(affine)?;
    Ok(affine)
}

/// Reject transforms that cannot be inverted or are not finite.
pub(crate) fn check_invertible(affine: Affine) -> Result<()> {
    let det = affine.determinant();
    if !det.is_finite() || det == 0.0 || affine.as_coeffs().iter().any(|c| !c.is_finite()) {
        return Err(MosaicError::SingularTransform);
    }
    Ok(())
}

/// Axis-aligned bounding box of a rectangle after transformation.
pub fn transform_rect_bbox(affine: Affine, rect: Rect) -> Rect {
    let p0 = affine * Point::new(rect.x0, rect.y0);
    let p1 = affine * Point::new(rect.x1, rect.y0);
    let p2 = affine * Point::new(rect.x0, rect.y1);
    let p3 = affine * Point::new(rect.x1, rect.y1);
    Rect::new(
        p0.x.min(p1.x).min(p2.x).min(p3.x),
        p0.y.min(p1.y).min(p2.y).min(p3.y),
        p0.x.max(p1.x).max(p2.x).max(p3.x),
        p0.y.max(p1.y).max(p2.y).max(p3.y),
    )
}

/// A pixel region as a kurbo rectangle.
pub fn region_to_rect(region: &Region) -> Rect {
    Rect::new(
        region.min_x as f64,
        region.min_y as f64,
        region.max_x as f64,
        region.max_y as f64,
    )
}

/// Pixel region covering a world rectangle, rounded outward.
pub fn world_to_region(grid_to_world: Affine, world: Rect) -> Result<Region> {
    check_invertible(grid_to_world)?;
    let pixels = transform_rect_bbox(grid_to_world.inverse(), world.abs());
    Ok(Region::new(
        to_pixel(pixels.x0.floor()),
        to_pixel(pixels.y0.floor()),
        to_pixel(pixels.x1.ceil()),
        to_pixel(pixels.y1.ceil()),
    ))
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "saturating float to integer conversion of already rounded values"
)]
fn to_pixel(v: f64) -> i64 {
    v as i64
}
