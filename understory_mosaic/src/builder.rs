// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Mosaic builder: from a few large sources to a pyramid of tiles.
//!
//! For every subsampling factor the domain, divided by the factor, is cut into a grid of
//! output tiles (the last row and column may be narrower). Cells that no source covers
//! are skipped, so sparse sources give sparse pyramids.
//!
//! The subsampled extent of a level is the domain size divided by the factor, rounded
//! down. When the domain is not a multiple of a factor, the last few absolute pixels on
//! that axis have no tile at that level.

use kurbo::Rect;
use serde::{Deserialize, Serialize};

use crate::error::{MosaicError, Result};
use crate::manager::TileManager;
use crate::naming::{FilenameFormatter, LevelLayout, TileNaming};
use crate::node::GridTree;
use crate::subsampling::{
    TileLayout, check_domain, compute_subsamplings_for, default_tile_size, validate_subsamplings,
};
use crate::tile::Tile;
use crate::types::{Region, Subsampling, TileSize, div_floor, union_all};
use crate::world::envelope_transform;

/// Serializable builder settings. Unset fields are derived from the sources.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MosaicConfig {
    /// Domain in absolute pixels. Defaults to the union of the sources.
    pub domain: Option<Region>,
    /// Output tile size. Defaults to a size suggested from the domain.
    pub tile_size: Option<TileSize>,
    /// Explicit subsampling sequence, finest first. Computed when unset.
    pub subsamplings: Option<Vec<Subsampling>>,
    /// How tile sizes evolve across levels.
    pub layout: TileLayout,
}

impl MosaicConfig {
    /// Check the explicit settings.
    pub fn validate(&self) -> Result<()> {
        if let Some(domain) = self.domain {
            check_domain(&domain)?;
        }
        if let Some(subsamplings) = &self.subsamplings {
            validate_subsamplings(subsamplings)?;
        }
        Ok(())
    }
}

/// Fully resolved pyramid geometry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MosaicPlan {
    /// Domain in absolute pixels.
    pub domain: Region,
    /// Output tile size.
    pub tile_size: TileSize,
    /// Subsampling of each level, finest first.
    pub subsamplings: Vec<Subsampling>,
}

/// Builds a [`TileManager`] holding a pyramid of generated tiles.
///
/// A level with factor `s` spans `domain.width() / s` by `domain.height() / s` subsampled
/// pixels, rounded down; see the [module docs](crate::builder) for the uncovered remainder.
///
/// ```rust
/// use understory_mosaic::{MosaicBuilder, PayloadRef, Region, Subsampling, Tile, TileSize};
///
/// let source = Tile::native(PayloadRef::new("world.tif"), Region::from_xywh(0, 0, 4000, 2000)).unwrap();
/// let manager = MosaicBuilder::new()
///     .with_tile_size(TileSize::square(500).unwrap())
///     .create_tile_manager(&[source])
///     .unwrap();
/// let coarse = manager.get_tiles(Region::from_xywh(0, 0, 4000, 2000), Subsampling::uniform(4).unwrap(), false).unwrap();
/// assert_eq!(coarse.len(), 2);
/// ```
#[derive(Clone, Debug)]
pub struct MosaicBuilder<N = FilenameFormatter> {
    config: MosaicConfig,
    naming: N,
    envelope: Option<Rect>,
}

impl MosaicBuilder {
    /// Builder with default settings and [`FilenameFormatter`] naming.
    pub fn new() -> Self {
        Self {
            config: MosaicConfig::default(),
            naming: FilenameFormatter::default(),
            envelope: None,
        }
    }

    /// Builder from a deserialized configuration, validated eagerly.
    pub fn from_config(config: MosaicConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new()
        })
    }
}

impl Default for MosaicBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: TileNaming> MosaicBuilder<N> {
    /// Use another naming strategy for generated tiles.
    pub fn with_naming<M: TileNaming>(self, naming: M) -> MosaicBuilder<M> {
        MosaicBuilder {
            config: self.config,
            naming,
            envelope: self.envelope,
        }
    }

    /// Set the domain explicitly.
    pub fn with_domain(mut self, domain: Region) -> Result<Self> {
        check_domain(&domain)?;
        self.config.domain = Some(domain);
        Ok(self)
    }

    /// Set the output tile size.
    #[must_use]
    pub fn with_tile_size(mut self, tile_size: TileSize) -> Self {
        self.config.tile_size = Some(tile_size);
        self
    }

    /// Use an explicit subsampling sequence instead of computing one.
    pub fn with_subsamplings(mut self, subsamplings: Vec<Subsampling>) -> Result<Self> {
        validate_subsamplings(&subsamplings)?;
        self.config.subsamplings = Some(subsamplings);
        Ok(self)
    }

    /// Set the tile layout.
    #[must_use]
    pub fn with_layout(mut self, layout: TileLayout) -> Self {
        self.config.layout = layout;
        self
    }

    /// Map the domain onto `envelope` in world coordinates, north up.
    #[must_use]
    pub fn with_envelope(mut self, envelope: Rect) -> Self {
        self.envelope = Some(envelope);
        self
    }

    /// Current settings.
    pub fn config(&self) -> &MosaicConfig {
        &self.config
    }

    /// The naming strategy.
    pub fn naming(&self) -> &N {
        &self.naming
    }

    /// Resolve domain, tile size and subsamplings for `sources`.
    pub fn plan(&self, sources: &[Tile]) -> Result<MosaicPlan> {
        self.plan_for(union_all(sources.iter().map(Tile::absolute_region)))
    }

    fn plan_for(&self, fallback_domain: Option<Region>) -> Result<MosaicPlan> {
        let domain = self
            .config
            .domain
            .or(fallback_domain)
            .ok_or(MosaicError::InvalidDomain {
                width: 0,
                height: 0,
            })?;
        check_domain(&domain)?;
        let tile_size = match self.config.tile_size {
            Some(t) => t,
            None => default_tile_size(&domain)?,
        };
        let subsamplings = match &self.config.subsamplings {
            Some(s) => s.clone(),
            None => compute_subsamplings_for(self.config.layout, domain, tile_size)?,
        };
        Ok(MosaicPlan {
            domain,
            tile_size,
            subsamplings,
        })
    }

    /// Generate the pyramid covering `sources` and index it.
    ///
    /// A cell is kept when a source not coarser than the cell's subsampling on either
    /// axis intersects it, so coarse sources only feed levels at least as coarse.
    pub fn create_tile_manager(&self, sources: &[Tile]) -> Result<TileManager> {
        let plan = self.plan(sources)?;
        let index = GridTree::build(sources.iter().cloned());
        self.build(&plan, |absolute, s| index.any_intersecting(absolute, s))
    }

    /// Generate a new pyramid from an existing mosaic, e.g. with another tile size.
    ///
    /// A cell is kept when `input` has tiles usable at the cell's subsampling there.
    pub fn retile(&self, input: &TileManager) -> Result<TileManager> {
        let plan = self.plan_for(input.domain())?;
        self.build(&plan, |absolute, s| input.intersects(absolute, s))
    }

    fn build(
        &self,
        plan: &MosaicPlan,
        covered: impl Fn(&Region, Subsampling) -> bool,
    ) -> Result<TileManager> {
        let levels = plan.subsamplings.len();
        let mut tiles = Vec::new();
        for (level, &s) in plan.subsamplings.iter().enumerate() {
            let before = tiles.len();
            let shape = self.level_tiles(plan, level, s, &covered, &mut tiles)?;
            tracing::debug!(
                level,
                levels,
                subsampling = %s,
                columns = shape.0,
                rows = shape.1,
                tiles = tiles.len() - before,
                "generated level"
            );
        }
        tracing::info!(
            domain = %plan.domain,
            tiles = tiles.len(),
            levels,
            "built mosaic"
        );
        let mut manager = TileManager::new(tiles)
            .with_domain(plan.domain)
            .with_tile_size(plan.tile_size);
        if let Some(envelope) = self.envelope {
            manager.set_grid_to_world(envelope_transform(&plan.domain, envelope)?)?;
        }
        Ok(manager)
    }

    /// Append the tiles of one level; returns its column and row counts.
    fn level_tiles(
        &self,
        plan: &MosaicPlan,
        level: usize,
        s: Subsampling,
        covered: &impl Fn(&Region, Subsampling) -> bool,
        out: &mut Vec<Tile>,
    ) -> Result<(u32, u32)> {
        let (sx, sy) = (i64::from(s.x()), i64::from(s.y()));
        let domain = plan.domain;
        let bounds = Region::from_xywh(
            div_floor(domain.min_x, sx),
            div_floor(domain.min_y, sy),
            domain.width() / sx,
            domain.height() / sy,
        );
        if bounds.is_empty() {
            return Ok((0, 0));
        }
        let (tw, th) = (
            i64::from(plan.tile_size.width()),
            i64::from(plan.tile_size.height()),
        );
        let (cw, ch) = match self.config.layout {
            TileLayout::ConstantTileSize => (tw.min(bounds.width()), th.min(bounds.height())),
            TileLayout::ConstantArea => ((tw / sx).max(1), (th / sy).max(1)),
        };
        let columns = count(bounds.width(), cw);
        let rows = count(bounds.height(), ch);
        let layout = LevelLayout {
            level,
            levels: plan.subsamplings.len(),
            subsampling: s,
            columns,
            rows,
        };
        for row in 0..rows {
            for column in 0..columns {
                let cell = Region::from_xywh(
                    bounds.min_x + i64::from(column) * cw,
                    bounds.min_y + i64::from(row) * ch,
                    cw,
                    ch,
                );
                if !covered(&cell.scale(s), s) {
                    continue;
                }
                let payload = self.naming.payload(&layout, column, row);
                out.push(Tile::new(payload, cell.intersect(&bounds), s)?);
            }
        }
        Ok((columns, rows))
    }
}

/// Number of `step`-sized cells needed to cover `extent`.
fn count(extent: i64, step: i64) -> u32 {
    u32::try_from(extent.div_euclid(step) + i64::from(extent.rem_euclid(step) != 0))
        .unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{blue_marble, blue_marble_sources, s};
    use crate::tile::PayloadRef;

    fn source(name: &str, x: i64, y: i64, w: i64, h: i64) -> Tile {
        Tile::native(PayloadRef::new(name), Region::from_xywh(x, y, w, h)).unwrap()
    }

    #[test]
    fn blue_marble_plan() {
        let builder = MosaicBuilder::new().with_tile_size(TileSize::square(960).unwrap());
        let plan = builder.plan(&blue_marble_sources()).unwrap();
        assert_eq!(plan.domain, Region::from_xywh(0, 0, 86_400, 43_200));
        let factors: Vec<u32> = plan.subsamplings.iter().map(|f| f.x()).collect();
        assert_eq!(factors, [1, 3, 5, 9, 15, 45, 90]);
    }

    #[test]
    fn generated_tiles_are_named_by_position() {
        let m = blue_marble();
        let top = m.get_tiles(m.domain().unwrap(), s(90), false).unwrap();
        assert_eq!(top.tiles[0].payload().input(), "tile_L6_0_0.png");
        assert_eq!(top.tiles[0].region(), Region::from_xywh(0, 0, 960, 480));
        let native = m.get_tiles(Region::from_xywh(85_000, 42_000, 1, 1), s(1), false);
        let native = native.unwrap();
        assert_eq!(native.tiles[0].payload().input(), "tile_L0_88_43.png");
    }

    #[test]
    fn two_builds_are_equal() {
        let sources = blue_marble_sources();
        let builder = MosaicBuilder::new().with_tile_size(TileSize::square(960).unwrap());
        let a = builder.create_tile_manager(&sources).unwrap();
        let mut reversed = sources.clone();
        reversed.reverse();
        let b = builder.create_tile_manager(&reversed).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.tiles(), b.tiles());
    }

    #[test]
    fn uncovered_cells_are_skipped() {
        // Two opposite corners of a 4x4 grid of 100px tiles.
        let sources = [source("nw", 0, 0, 100, 100), source("se", 300, 300, 100, 100)];
        let m = MosaicBuilder::new()
            .with_domain(Region::from_xywh(0, 0, 400, 400))
            .unwrap()
            .with_tile_size(TileSize::square(100).unwrap())
            .create_tile_manager(&sources)
            .unwrap();
        assert_eq!(m.domain(), Some(Region::from_xywh(0, 0, 400, 400)));
        assert_eq!(m.count_at(s(1)), 2);
        assert_eq!(m.count_at(s(2)), 2);
        assert_eq!(m.count_at(s(4)), 1);
        let middle = m.get_tiles(Region::from_xywh(150, 150, 10, 10), s(1), false);
        assert!(middle.unwrap().is_empty());
    }

    #[test]
    fn remainder_tiles_are_clipped() {
        let sources = [source("a", 0, 0, 250, 120)];
        let m = MosaicBuilder::new()
            .with_tile_size(TileSize::square(100).unwrap())
            .with_subsamplings(vec![s(1)])
            .unwrap()
            .create_tile_manager(&sources)
            .unwrap();
        let widths: Vec<(u32, u32)> = m.tiles().iter().map(|t| (t.width(), t.height())).collect();
        assert_eq!(
            widths,
            [(100, 100), (100, 100), (50, 100), (100, 20), (100, 20), (50, 20)]
        );
    }

    #[test]
    fn configuration_errors_are_eager() {
        assert!(matches!(
            MosaicBuilder::new().with_domain(Region::from_xywh(0, 0, 0, 5)),
            Err(MosaicError::InvalidDomain { .. })
        ));
        assert!(matches!(
            MosaicBuilder::new().with_subsamplings(vec![s(3), s(1)]),
            Err(MosaicError::MalformedSubsamplings(_))
        ));
        let empty = MosaicBuilder::new().create_tile_manager(&[]);
        assert!(matches!(empty, Err(MosaicError::InvalidDomain { .. })));
        let config = MosaicConfig {
            subsamplings: Some(Vec::new()),
            ..MosaicConfig::default()
        };
        assert!(MosaicBuilder::from_config(config).is_err());
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: MosaicConfig = serde_json::from_str(
            r#"{ "tile_size": [960, 960], "subsamplings": [[1, 1], [3, 3]] }"#,
        )
        .unwrap();
        assert_eq!(config.layout, TileLayout::ConstantTileSize);
        assert_eq!(config.domain, None);
        let builder = MosaicBuilder::from_config(config).unwrap();
        let m = builder.create_tile_manager(&blue_marble_sources()).unwrap();
        assert_eq!(m.subsamplings(), [s(1), s(3)]);
        assert_eq!(m.len(), 4050 + 450);

        let bad = serde_json::from_str::<MosaicConfig>(r#"{ "subsamplings": [[0, 1]] }"#);
        assert!(bad.is_err());
    }

    #[test]
    fn default_tile_size_is_suggested() {
        let plan = MosaicBuilder::new().plan(&blue_marble_sources()).unwrap();
        assert_eq!(plan.tile_size, TileSize::square(480).unwrap());
        let explicit = MosaicBuilder::new()
            .with_domain(Region::from_xywh(0, 0, 86_400, 43_200))
            .unwrap()
            .plan(&[source("a", 0, 0, 100, 100)])
            .unwrap();
        assert_eq!(explicit.tile_size, TileSize::square(480).unwrap());
    }

    #[test]
    fn levels_truncate_the_domain_remainder() {
        let sources = [source("a", 0, 0, 1000, 1000)];
        let m = MosaicBuilder::new()
            .with_tile_size(TileSize::square(300).unwrap())
            .create_tile_manager(&sources)
            .unwrap();
        assert_eq!(m.subsamplings(), [s(1), s(3)]);
        // 1000 / 3 = 333 subsampled pixels, so absolute column 999 is only at level 1.
        let edge = Region::from_xywh(999, 0, 1, 10);
        assert_eq!(m.get_tiles(edge, s(1), false).unwrap().len(), 1);
        assert!(m.get_tiles(edge, s(3), false).unwrap().is_empty());
        let coarse = m.get_tiles(m.domain().unwrap(), s(3), false).unwrap().tiles;
        let union = union_all(coarse.iter().map(|t| t.absolute_region()));
        assert_eq!(union, Some(Region::from_xywh(0, 0, 999, 999)));
    }

    #[test]
    fn coarse_sources_only_feed_coarse_levels() {
        let region = Region::from_xywh(0, 0, 100, 100);
        let coarse = Tile::new(PayloadRef::new("overview.png"), region, s(4)).unwrap();
        let builder = MosaicBuilder::new().with_tile_size(TileSize::square(100).unwrap());
        assert_eq!(
            builder.plan(&[coarse.clone()]).unwrap().subsamplings,
            [s(1), s(2), s(4)]
        );
        let m = builder.create_tile_manager(&[coarse.clone()]).unwrap();
        assert_eq!(m.subsamplings(), [s(4)]);
        assert_eq!(m.count_at(s(4)), 1);

        let native = source("detail", 0, 0, 100, 100);
        let m = builder.create_tile_manager(&[coarse, native]).unwrap();
        assert_eq!(m.count_at(s(1)), 1);
        assert_eq!(m.count_at(s(2)), 1);
        assert_eq!(m.count_at(s(4)), 1);
    }

    #[test]
    fn constant_area_layout_shrinks_tiles() {
        let sources = [source("a", 0, 0, 1024, 1024)];
        let m = MosaicBuilder::new()
            .with_tile_size(TileSize::square(512).unwrap())
            .with_layout(TileLayout::ConstantArea)
            .create_tile_manager(&sources)
            .unwrap();
        assert_eq!(m.subsamplings(), [s(1), s(2), s(4), s(8)]);
        for f in m.subsamplings() {
            assert_eq!(m.count_at(f), 4, "level {f}");
        }
        let coarse = m.get_tiles(Region::from_xywh(0, 0, 1, 1), s(8), false).unwrap();
        assert_eq!(coarse.tiles[0].width(), 64);
        assert_eq!(coarse.tiles[0].absolute_region(), Region::from_xywh(0, 0, 512, 512));
    }

    #[test]
    fn custom_naming_and_envelope() {
        let sources = [source("a", 0, 0, 200, 100)];
        let m = MosaicBuilder::new()
            .with_tile_size(TileSize::square(100).unwrap())
            .with_envelope(Rect::new(0.0, 0.0, 2.0, 1.0))
            .with_naming(|l: &LevelLayout, c: u32, r: u32| {
                PayloadRef::new(format!("z{}/{c}/{r}", l.level))
            })
            .create_tile_manager(&sources)
            .unwrap();
        let names: Vec<&str> = m.tiles().iter().map(|t| t.payload().input()).collect();
        assert_eq!(names, ["z0/0/0", "z0/1/0", "z1/0/0"]);
        let bounds = m.world_bounds().unwrap();
        assert!((bounds.width() - 2.0).abs() < 1e-12 && (bounds.height() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn retile_follows_the_input_coverage() {
        let sources = [source("nw", 0, 0, 100, 100), source("se", 300, 300, 100, 100)];
        let first = MosaicBuilder::new()
            .with_domain(Region::from_xywh(0, 0, 400, 400))
            .unwrap()
            .with_tile_size(TileSize::square(100).unwrap())
            .create_tile_manager(&sources)
            .unwrap();
        let second = MosaicBuilder::new()
            .with_tile_size(TileSize::square(50).unwrap())
            .retile(&first)
            .unwrap();
        assert_eq!(second.domain(), first.domain());
        assert_eq!(second.count_at(s(1)), 8);
        assert!(second.subsamplings().contains(&s(8)));
    }
}
