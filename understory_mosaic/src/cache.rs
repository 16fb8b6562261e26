// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Caller-owned cache of built pyramids.
//!
//! Building a pyramid is the expensive step; serving queries is cheap. A
//! [`PyramidCache`] keeps the most recently used pyramids behind [`Arc`]s so repeated
//! requests for the same sources, geometry and naming share one [`TileManager`].
//! Eviction is least recently used with a fixed number of entries. There is no global
//! instance: whoever needs a cache owns one.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

use crate::builder::{MosaicBuilder, MosaicPlan};
use crate::error::Result;
use crate::manager::TileManager;
use crate::naming::TileNaming;
use crate::node::tile_order;
use crate::subsampling::TileLayout;
use crate::tile::Tile;
use crate::types::{Region, Subsampling, TileSize};

/// Identity of a pyramid: its sources, the geometry it was generated for and the naming
/// of its tiles.
///
/// Sources are compared by value, so a change to the pixels behind an unchanged payload
/// reference goes unnoticed. Invalidate the entry when that happens.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PyramidKey {
    /// Domain in absolute pixels.
    pub domain: Region,
    /// Output tile size.
    pub tile_size: TileSize,
    /// Subsampling sequence, finest first.
    pub subsamplings: Vec<Subsampling>,
    /// Tile layout across levels.
    pub layout: TileLayout,
    /// Naming identity, from [`TileNaming::cache_id`].
    pub naming: Option<String>,
    /// Source tiles in canonical order.
    pub sources: Vec<Tile>,
}

impl PyramidKey {
    /// Key of a resolved plan built from `sources` with the given layout and naming.
    pub fn new(
        plan: MosaicPlan,
        layout: TileLayout,
        naming: Option<String>,
        sources: &[Tile],
    ) -> Self {
        let mut sources = sources.to_vec();
        sources.sort_by(tile_order);
        Self {
            domain: plan.domain,
            tile_size: plan.tile_size,
            subsamplings: plan.subsamplings,
            layout,
            naming,
            sources,
        }
    }

    /// Key the builder would produce for `sources`.
    pub fn for_build<N: TileNaming>(builder: &MosaicBuilder<N>, sources: &[Tile]) -> Result<Self> {
        Ok(Self::new(
            builder.plan(sources)?,
            builder.config().layout,
            builder.naming().cache_id(),
            sources,
        ))
    }

    /// Whether pyramids under this key may be shared.
    pub fn is_cacheable(&self) -> bool {
        self.naming.is_some()
    }
}

/// LRU cache of built pyramids.
pub struct PyramidCache {
    entries: LruCache<PyramidKey, Arc<TileManager>>,
}

impl PyramidCache {
    /// Cache holding at most `capacity` pyramids.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Cached pyramid for `key`, marking it as recently used.
    pub fn get(&mut self, key: &PyramidKey) -> Option<Arc<TileManager>> {
        self.entries.get(key).map(Arc::clone)
    }

    /// Insert a pyramid, evicting the least recently used one when full.
    pub fn insert(&mut self, key: PyramidKey, manager: Arc<TileManager>) {
        if let Some((evicted, _)) = self.entries.push(key.clone(), manager)
            && evicted != key
        {
            tracing::debug!(
                domain = %evicted.domain,
                levels = evicted.subsamplings.len(),
                "evicted pyramid"
            );
        }
    }

    /// The cached pyramid for what `builder` would make of `sources`, built on a miss.
    ///
    /// Builders whose naming has no [`cache_id`](TileNaming::cache_id) always build a
    /// fresh pyramid and leave the cache untouched.
    pub fn get_or_build<N: TileNaming>(
        &mut self,
        builder: &MosaicBuilder<N>,
        sources: &[Tile],
    ) -> Result<Arc<TileManager>> {
        let key = PyramidKey::for_build(builder, sources)?;
        if !key.is_cacheable() {
            tracing::debug!(domain = %key.domain, "naming has no cache id, pyramid not cached");
            return builder.create_tile_manager(sources).map(Arc::new);
        }
        if let Some(hit) = self.get(&key) {
            tracing::trace!(domain = %key.domain, "pyramid cache hit");
            return Ok(hit);
        }
        let manager = Arc::new(builder.create_tile_manager(sources)?);
        self.insert(key, Arc::clone(&manager));
        Ok(manager)
    }

    /// Drop the entry for `key`. Returns whether there was one.
    pub fn invalidate(&mut self, key: &PyramidKey) -> bool {
        self.entries.pop(key).is_some()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cached pyramids.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of cached pyramids.
    pub fn capacity(&self) -> NonZeroUsize {
        self.entries.cap()
    }
}

impl fmt::Debug for PyramidCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PyramidCache")
            .field("len", &self.entries.len())
            .field("capacity", &self.entries.cap())
            .finish_non_exhaustive()
    }
}
