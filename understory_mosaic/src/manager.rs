// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Resolution-aware queries over a built pyramid.

use std::collections::BTreeMap;
use std::fmt;

use kurbo::{Affine, Rect};

use crate::error::{MosaicError, Result};
use crate::node::{GridTree, tile_order};
use crate::tile::Tile;
use crate::types::{Region, Subsampling, TileSize, union_all};
use crate::world::{check_invertible, region_to_rect, transform_rect_bbox, world_to_region};

/// Tiles answering one [`TileManager::get_tiles`] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileSelection<'a> {
    /// Subsampling the caller asked for.
    pub requested: Subsampling,
    /// Subsampling of every returned tile. Differs from `requested` after adjustment.
    pub subsampling: Subsampling,
    /// Tiles intersecting the region of interest, in row-major order.
    pub tiles: Vec<&'a Tile>,
}

impl TileSelection<'_> {
    /// Whether the selection used a different subsampling than requested.
    pub fn is_adjusted(&self) -> bool {
        self.requested != self.subsampling
    }

    /// Number of tiles.
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Whether no tile was selected.
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

/// Query engine over a [`GridTree`].
///
/// Reads only need `&self`, so a manager can be shared between threads. [`remove`] needs
/// `&mut self`; wrap the manager in a lock if removals race with reads.
///
/// [`remove`]: TileManager::remove
#[derive(Clone)]
pub struct TileManager {
    tree: GridTree,
    domain: Option<Region>,
    tile_size: Option<TileSize>,
    levels: BTreeMap<Subsampling, usize>,
    grid_to_world: Option<Affine>,
}

impl TileManager {
    /// Index `tiles` directly, without running the mosaic builder.
    ///
    /// The domain is the union of the tiles' absolute regions and the tile size the most
    /// common local tile size.
    pub fn new(tiles: impl IntoIterator<Item = Tile>) -> Self {
        let tiles: Vec<Tile> = tiles.into_iter().collect();
        let domain = union_all(tiles.iter().map(Tile::absolute_region));
        let tile_size = dominant_tile_size(&tiles);
        let mut levels = BTreeMap::new();
        for tile in &tiles {
            *levels.entry(tile.subsampling()).or_default() += 1;
        }
        let tree = GridTree::build(tiles);
        tracing::debug!(
            tiles = tree.len(),
            levels = levels.len(),
            depth = tree.depth(),
            "indexed tiles"
        );
        Self {
            tree,
            domain,
            tile_size,
            levels,
            grid_to_world: None,
        }
    }

    /// Replace the cached domain, e.g. when sparse sources leave parts of it uncovered.
    pub(crate) fn with_domain(mut self, domain: Region) -> Self {
        self.domain = Some(domain);
        self
    }

    pub(crate) fn with_tile_size(mut self, tile_size: TileSize) -> Self {
        self.tile_size = Some(tile_size);
        self
    }

    /// Tiles intersecting `roi` at `subsampling`.
    ///
    /// When no tile has exactly the requested subsampling and `allow_adjustment` is set,
    /// the coarsest available subsampling that does not exceed the request on either axis
    /// is used, or the finest available one when every level is coarser. The choice is
    /// reported in [`TileSelection::subsampling`].
    ///
    /// An empty or inverted `roi` is an error; a valid `roi` outside the domain, or an
    /// empty manager, gives an empty selection.
    ///
    /// The selection covers the part of `roi` that the chosen level tiles. Pyramids from
    /// [`MosaicBuilder`](crate::MosaicBuilder) leave the last absolute pixels of a level
    /// untiled when the domain is not a multiple of its factor, so a `roi` confined to
    /// that remainder selects nothing at that level.
    pub fn get_tiles(
        &self,
        roi: Region,
        subsampling: Subsampling,
        allow_adjustment: bool,
    ) -> Result<TileSelection<'_>> {
        if roi.is_empty() {
            return Err(MosaicError::InvalidRegion(roi));
        }
        let Some(chosen) = self.resolve(subsampling, allow_adjustment)? else {
            return Ok(TileSelection {
                requested: subsampling,
                subsampling,
                tiles: Vec::new(),
            });
        };
        let mut tiles = self.tree.select(&roi, chosen);
        tiles.sort_by(|a, b| tile_order(a, b));
        tracing::trace!(
            %roi,
            requested = %subsampling,
            chosen = %chosen,
            tiles = tiles.len(),
            "selected tiles"
        );
        Ok(TileSelection {
            requested: subsampling,
            subsampling: chosen,
            tiles,
        })
    }

    /// Subsampling a request resolves to, `None` for an empty manager.
    pub fn resolve(
        &self,
        requested: Subsampling,
        allow_adjustment: bool,
    ) -> Result<Option<Subsampling>> {
        if self.levels.is_empty() {
            return Ok(None);
        }
        if self.levels.contains_key(&requested) {
            return Ok(Some(requested));
        }
        if !allow_adjustment {
            return Err(MosaicError::NoMatchingResolution { requested });
        }
        let finer = self
            .levels
            .keys()
            .filter(|s| s.is_within(&requested))
            .max()
            .copied();
        Ok(finer.or_else(|| self.levels.keys().next().copied()))
    }

    /// Whether some tile usable at `subsampling` (not coarser on either axis) intersects
    /// `region`.
    pub fn intersects(&self, region: &Region, subsampling: Subsampling) -> bool {
        self.tree.any_intersecting(region, subsampling)
    }

    /// All tiles intersecting `region`, whatever their subsampling.
    pub fn intersecting(&self, region: &Region) -> Vec<&Tile> {
        let mut tiles = self.tree.intersecting(region);
        tiles.sort_by(|a, b| tile_order(a, b));
        tiles
    }

    /// All tiles lying entirely inside `region`, whatever their subsampling.
    pub fn contained_in(&self, region: &Region) -> Vec<&Tile> {
        let mut tiles = self.tree.contained_in(region);
        tiles.sort_by(|a, b| tile_order(a, b));
        tiles
    }

    /// Every tile, finest level first then row-major.
    pub fn tiles(&self) -> Vec<&Tile> {
        let mut tiles: Vec<&Tile> = self.tree.leaves().collect();
        tiles.sort_by(|a, b| tile_order(a, b));
        tiles
    }

    /// Available subsamplings, finest first.
    pub fn subsamplings(&self) -> Vec<Subsampling> {
        self.levels.keys().copied().collect()
    }

    /// Number of tiles at `subsampling`.
    pub fn count_at(&self, subsampling: Subsampling) -> usize {
        self.levels.get(&subsampling).copied().unwrap_or(0)
    }

    /// Domain covered by the mosaic, in absolute pixels.
    pub fn domain(&self) -> Option<Region> {
        self.domain
    }

    /// Nominal tile size.
    pub fn tile_size(&self) -> Option<TileSize> {
        self.tile_size
    }

    /// Number of tiles.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Whether the manager holds no tiles.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// The underlying tree.
    pub fn tree(&self) -> &GridTree {
        &self.tree
    }

    /// Remove `tile`. Returns `false` when it is not indexed.
    ///
    /// A subsampling whose last tile goes away is no longer offered by
    /// [`get_tiles`](Self::get_tiles).
    pub fn remove(&mut self, tile: &Tile) -> bool {
        if !self.tree.remove(tile) {
            return false;
        }
        let s = tile.subsampling();
        if let Some(count) = self.levels.get_mut(&s) {
            *count -= 1;
            if *count == 0 {
                self.levels.remove(&s);
                tracing::debug!(subsampling = %s, "last tile of level removed");
            }
        }
        true
    }

    /// Attach a pixel-to-world transform. Fails when it cannot be inverted.
    pub fn set_grid_to_world(&mut self, grid_to_world: Affine) -> Result<()> {
        check_invertible(grid_to_world)?;
        self.grid_to_world = Some(grid_to_world);
        Ok(())
    }

    /// The pixel-to-world transform, if any.
    pub fn grid_to_world(&self) -> Option<Affine> {
        self.grid_to_world
    }

    /// Domain in world coordinates. Without a transform, world and pixel space coincide.
    pub fn world_bounds(&self) -> Option<Rect> {
        let rect = region_to_rect(&self.domain?);
        Some(match self.grid_to_world {
            Some(affine) => transform_rect_bbox(affine, rect),
            None => rect,
        })
    }

    /// [`get_tiles`](Self::get_tiles) for a rectangle in world coordinates.
    pub fn get_tiles_in_world(
        &self,
        world: Rect,
        subsampling: Subsampling,
        allow_adjustment: bool,
    ) -> Result<TileSelection<'_>> {
        let roi = world_to_region(self.grid_to_world.unwrap_or(Affine::IDENTITY), world)?;
        self.get_tiles(roi, subsampling, allow_adjustment)
    }
}

impl fmt::Debug for TileManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileManager")
            .field("domain", &self.domain)
            .field("tile_size", &self.tile_size)
            .field("levels", &self.levels)
            .field("tree", &self.tree)
            .finish_non_exhaustive()
    }
}

/// Managers are equal when they index the same tiles.
impl PartialEq for TileManager {
    fn eq(&self, other: &Self) -> bool {
        self.tree == other.tree
    }
}

impl Eq for TileManager {}

fn dominant_tile_size(tiles: &[Tile]) -> Option<TileSize> {
    let mut counts: BTreeMap<(u32, u32), usize> = BTreeMap::new();
    for tile in tiles {
        *counts.entry((tile.width(), tile.height())).or_default() += 1;
    }
    let mut best: Option<((u32, u32), usize)> = None;
    for (size, count) in counts {
        if best.is_none_or(|(_, c)| count > c) {
            best = Some((size, count));
        }
    }
    best.and_then(|((w, h), _)| TileSize::new(w, h).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{blue_marble, s};
    use proptest::prelude::*;

    fn full(m: &TileManager) -> Region {
        m.domain().unwrap()
    }

    #[test]
    fn blue_marble_level_counts() {
        let m = blue_marble();
        assert_eq!(full(&m), Region::from_xywh(0, 0, 86_400, 43_200));
        let counts: Vec<(u32, usize)> = m
            .subsamplings()
            .into_iter()
            .map(|f| {
                let sel = m.get_tiles(full(&m), f, false).unwrap();
                (f.x(), sel.len())
            })
            .collect();
        assert_eq!(
            counts,
            [
                (1, 4050),
                (3, 450),
                (5, 162),
                (9, 50),
                (15, 18),
                (45, 2),
                (90, 1)
            ]
        );
        assert_eq!(counts.iter().map(|(_, n)| n).sum::<usize>(), 4733);
        assert_eq!(m.len(), 4733);
        assert_eq!(m.count_at(s(9)), 50);
        assert_eq!(m.tile_size(), TileSize::square(960).ok());
    }

    #[test]
    fn every_level_partitions_the_domain() {
        let m = blue_marble();
        let domain = full(&m);
        for f in m.subsamplings() {
            let tiles = m.get_tiles(domain, f, false).unwrap().tiles;
            let area: i128 = tiles.iter().map(|t| t.absolute_region().area()).sum();
            assert_eq!(area, domain.area(), "level {f} covers the domain");
            let union = union_all(tiles.iter().map(|t| t.absolute_region()));
            assert_eq!(union, Some(domain), "level {f} stays inside the domain");
            for tile in &tiles {
                let overlapping = m.get_tiles(tile.absolute_region(), f, false).unwrap();
                assert_eq!(overlapping.tiles, [*tile], "{tile} overlaps a sibling");
            }
        }
    }

    #[test]
    fn adjustment_picks_coarsest_level_within_request() {
        let m = blue_marble();
        let req = Subsampling::new(100, 120).unwrap();
        let adjusted = m.get_tiles(full(&m), req, true).unwrap();
        assert_eq!(adjusted.subsampling, s(90));
        assert!(adjusted.is_adjusted());
        let exact = m.get_tiles(full(&m), s(90), false).unwrap();
        assert_eq!(adjusted.tiles, exact.tiles);
        assert_eq!(adjusted.len(), 1);

        let between = m.get_tiles(full(&m), Subsampling::new(12, 10).unwrap(), true);
        assert_eq!(between.unwrap().subsampling, s(9));
        let anisotropic = m.resolve(Subsampling::new(50, 4).unwrap(), true).unwrap();
        assert_eq!(anisotropic, Some(s(3)));
    }

    #[test]
    fn adjustment_falls_back_to_finest_level() {
        let coarse = TileManager::new(
            blue_marble()
                .tiles()
                .into_iter()
                .filter(|t| t.subsampling().x() >= 9)
                .cloned(),
        );
        let sel = coarse.get_tiles(full(&coarse), s(2), true).unwrap();
        assert_eq!(sel.subsampling, s(9));
        assert_eq!(sel.len(), 50);
    }

    #[test]
    fn exact_match_is_required_without_adjustment() {
        let m = blue_marble();
        let err = m.get_tiles(full(&m), s(2), false).unwrap_err();
        assert_eq!(err, MosaicError::NoMatchingResolution { requested: s(2) });
    }

    #[test]
    fn region_errors_and_empty_results() {
        let m = blue_marble();
        let inverted = Region::new(10, 10, 0, 20);
        assert_eq!(
            m.get_tiles(inverted, s(1), true).unwrap_err(),
            MosaicError::InvalidRegion(inverted)
        );
        let outside = Region::from_xywh(100_000, 0, 500, 500);
        assert!(m.get_tiles(outside, s(1), false).unwrap().is_empty());

        let empty = TileManager::new(Vec::new());
        let sel = empty.get_tiles(Region::from_xywh(0, 0, 1, 1), s(3), false).unwrap();
        assert!(sel.is_empty());
        assert_eq!(empty.domain(), None);
        assert_eq!(empty.tile_size(), None);
    }

    #[test]
    fn small_roi_selects_covering_tiles() {
        let m = blue_marble();
        // Straddles the corner of four native tiles.
        let roi = Region::from_xywh(950, 950, 20, 20);
        let sel = m.get_tiles(roi, s(1), false).unwrap();
        assert_eq!(sel.len(), 4);
        let at_90 = m.get_tiles(roi, s(90), false).unwrap();
        assert_eq!(at_90.len(), 1);
    }

    #[test]
    fn generic_queries_span_levels() {
        let m = blue_marble();
        let roi = Region::from_xywh(0, 0, 960, 960);
        // One tile per level intersects the top-left native tile.
        assert_eq!(m.intersecting(&roi).len(), 7);
        assert_eq!(m.contained_in(&roi).len(), 1);
        assert!(m.intersects(&roi, s(3)));
        assert!(!m.intersects(&Region::from_xywh(-10, -10, 5, 5), s(1)));
    }

    #[test]
    fn removal_updates_queries_and_levels() {
        let mut m = blue_marble();
        let top = m.get_tiles(full(&m), s(90), false).unwrap().tiles[0].clone();
        assert!(m.remove(&top));
        assert!(!m.remove(&top));
        assert_eq!(m.len(), 4732);
        assert!(!m.subsamplings().contains(&s(90)));
        assert!(m.get_tiles(full(&m), s(90), false).is_err());
        assert_eq!(m.get_tiles(full(&m), s(90), true).unwrap().subsampling, s(45));
        assert!(m.contained_in(&full(&m)).iter().all(|t| **t != top));

        let native = m.get_tiles(Region::from_xywh(0, 0, 1, 1), s(1), false).unwrap().tiles[0].clone();
        assert!(m.remove(&native));
        assert!(m.get_tiles(Region::from_xywh(0, 0, 1, 1), s(1), false).unwrap().is_empty());
        assert_eq!(m.count_at(s(1)), 4049);
    }

    #[test]
    fn world_queries_go_through_the_transform() {
        let mut m = blue_marble();
        let affine = crate::world::envelope_transform(
            &full(&m),
            Rect::new(-180.0, -90.0, 180.0, 90.0),
        )
        .unwrap();
        m.set_grid_to_world(affine).unwrap();
        let bounds = m.world_bounds().unwrap();
        assert!((bounds.x0 + 180.0).abs() < 1e-9 && (bounds.y1 - 90.0).abs() < 1e-9);
        // One degree square around the origin: pixels 43080..43320 by 21480..21720,
        // which straddles a column boundary at 43200 but no row boundary.
        let sel = m
            .get_tiles_in_world(Rect::new(-0.5, -0.5, 0.5, 0.5), s(1), false)
            .unwrap();
        assert_eq!(sel.len(), 2);
        assert_eq!(
            m.set_grid_to_world(Affine::scale(0.0)).unwrap_err(),
            MosaicError::SingularTransform
        );
        assert_eq!(m.grid_to_world(), Some(affine));
    }

    #[test]
    fn managers_are_shared_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TileManager>();

        let m = blue_marble();
        let domain = full(&m);
        let counts: Vec<usize> = std::thread::scope(|scope| {
            let handles: Vec<_> = m
                .subsamplings()
                .into_iter()
                .map(|f| {
                    let m = &m;
                    scope.spawn(move || m.get_tiles(domain, f, false).unwrap().len())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(counts.iter().sum::<usize>(), 4733);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn larger_rois_select_supersets(
            x in 0_i64..80_000, y in 0_i64..40_000,
            w in 1_i64..5_000, h in 1_i64..5_000,
            grow in 0_i64..5_000,
            level in 0_usize..7,
        ) {
            let m = blue_marble_shared();
            let f = m.subsamplings()[level];
            let small = Region::from_xywh(x, y, w, h);
            let big = Region::new(x - grow, y - grow, x + w + grow, y + h + grow);
            let a = m.get_tiles(small, f, false).unwrap().tiles;
            let b = m.get_tiles(big, f, false).unwrap().tiles;
            prop_assert!(a.iter().all(|t| b.contains(t)));
            let ca = m.contained_in(&small);
            let cb = m.contained_in(&big);
            prop_assert!(ca.iter().all(|t| cb.contains(t)));
            let ia = m.intersecting(&small);
            let ib = m.intersecting(&big);
            prop_assert!(ia.iter().all(|t| ib.contains(t)));
            // Tiles of one level never overlap.
            for (i, t) in b.iter().enumerate() {
                for u in &b[i + 1..] {
                    prop_assert!(!t.absolute_region().intersects(&u.absolute_region()));
                }
            }
        }

        #[test]
        fn equivalent_requests_select_the_same_tiles(
            sx in 1_u32..200, sy in 1_u32..200,
        ) {
            let m = blue_marble_shared();
            let req = Subsampling::new(sx, sy).unwrap();
            let roi = Region::from_xywh(10_000, 5_000, 30_000, 20_000);
            let adjusted = m.get_tiles(roi, req, true).unwrap();
            let exact = m.get_tiles(roi, adjusted.subsampling, false).unwrap();
            prop_assert_eq!(adjusted.tiles, exact.tiles);
        }
    }

    fn blue_marble_shared() -> &'static TileManager {
        static MANAGER: std::sync::OnceLock<TileManager> = std::sync::OnceLock::new();
        MANAGER.get_or_init(blue_marble)
    }
}
