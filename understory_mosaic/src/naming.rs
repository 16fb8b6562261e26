// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Payload references for generated tiles.

use serde::{Deserialize, Serialize};

use crate::tile::PayloadRef;
use crate::types::Subsampling;

/// Shape of one pyramid level, handed to [`TileNaming`] for every generated tile.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LevelLayout {
    /// Level index, 0 being the native resolution.
    pub level: usize,
    /// Number of levels in the pyramid.
    pub levels: usize,
    /// Subsampling of this level.
    pub subsampling: Subsampling,
    /// Number of tile columns in this level's grid.
    pub columns: u32,
    /// Number of tile rows in this level's grid.
    pub rows: u32,
}

/// Strategy producing a unique payload reference per generated tile.
///
/// Implementations must be deterministic: the same level layout and grid position always
/// give the same reference, otherwise two builds of one pyramid would not compare equal.
pub trait TileNaming {
    /// Reference for the tile at `column`, `row` of `layout`.
    fn payload(&self, layout: &LevelLayout, column: u32, row: u32) -> PayloadRef;

    /// Identity of the strategy for [`PyramidCache`] keys.
    ///
    /// Two strategies returning the same id must name every tile alike. `None`, the
    /// default, means the strategy cannot be told apart from others and pyramids built
    /// with it are never cached.
    ///
    /// [`PyramidCache`]: crate::PyramidCache
    fn cache_id(&self) -> Option<String> {
        None
    }
}

impl<F> TileNaming for F
where
    F: Fn(&LevelLayout, u32, u32) -> PayloadRef,
{
    fn payload(&self, layout: &LevelLayout, column: u32, row: u32) -> PayloadRef {
        self(layout, column, row)
    }
}

/// Default naming: `"{prefix}L{level}_{column}_{row}.{extension}"`.
///
/// Each field is zero-padded to the number of digits of the largest value it can take,
/// so names sort in grid order.
///
/// ```rust
/// use understory_mosaic::{FilenameFormatter, LevelLayout, Subsampling, TileNaming};
///
/// let layout = LevelLayout {
///     level: 2,
///     levels: 7,
///     subsampling: Subsampling::uniform(5).unwrap(),
///     columns: 18,
///     rows: 9,
/// };
/// let name = FilenameFormatter::default().payload(&layout, 3, 4);
/// assert_eq!(name.input(), "tile_L2_03_4.png");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilenameFormatter {
    prefix: String,
    extension: String,
}

impl FilenameFormatter {
    /// Formatter with a custom prefix (may include a directory) and extension.
    pub fn new(prefix: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            extension: extension.into(),
        }
    }

    /// Prefix put in front of every name.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Extension, without the dot.
    pub fn extension(&self) -> &str {
        &self.extension
    }
}

impl Default for FilenameFormatter {
    fn default() -> Self {
        Self::new("tile_", "png")
    }
}

/// Decimal digits needed to print every index below `count`.
fn field_width(count: u64) -> usize {
    let mut max = count.saturating_sub(1);
    let mut width = 1;
    while max >= 10 {
        max /= 10;
        width += 1;
    }
    width
}

impl TileNaming for FilenameFormatter {
    fn payload(&self, layout: &LevelLayout, column: u32, row: u32) -> PayloadRef {
        let wl = field_width(layout.levels as u64);
        let wc = field_width(u64::from(layout.columns));
        let wr = field_width(u64::from(layout.rows));
        let mut name = format!(
            "{}L{:0wl$}_{:0wc$}_{:0wr$}",
            self.prefix, layout.level, column, row
        );
        if !self.extension.is_empty() {
            name.push('.');
            name.push_str(&self.extension);
        }
        PayloadRef::new(name)
    }

    fn cache_id(&self) -> Option<String> {
        Some(format!(
            "FilenameFormatter({:?}, {:?})",
            self.prefix, self.extension
        ))
    }
}
