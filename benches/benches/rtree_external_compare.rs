// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![cfg(feature = "compare_rstar")]

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use understory_mosaic::{MosaicBuilder, PayloadRef, Region, Subsampling, Tile, TileManager, TileSize};

use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{AABB, RTree};

type Entry = GeomWithData<Rectangle<[i64; 2]>, usize>;

fn gen_manager(tile: u32) -> TileManager {
    let mut sources = Vec::new();
    for y in 0..2 {
        for x in 0..4 {
            let region = Region::from_xywh(x * 21_600, y * 21_600, 21_600, 21_600);
            let payload = PayloadRef::new(format!("source_{x}_{y}.png"));
            sources.push(Tile::native(payload, region).unwrap());
        }
    }
    MosaicBuilder::new()
        .with_tile_size(TileSize::square(tile).unwrap())
        .create_tile_manager(&sources)
        .unwrap()
}

// One flat R-tree per level, which is what the grid tree replaces.
fn to_rstar_levels(manager: &TileManager) -> Vec<(Subsampling, Vec<Entry>)> {
    let tiles = manager.tiles();
    manager
        .subsamplings()
        .into_iter()
        .map(|s| {
            let entries = tiles
                .iter()
                .enumerate()
                .filter(|(_, t)| t.subsampling() == s)
                .map(|(i, t)| {
                    let r = t.absolute_region();
                    let rect = Rectangle::from_corners([r.min_x, r.min_y], [r.max_x - 1, r.max_y - 1]);
                    GeomWithData::new(rect, i)
                })
                .collect();
            (s, entries)
        })
        .collect()
}

fn bench_rtree_external_compare(c: &mut Criterion) {
    let mut group = c.benchmark_group("rtree_external_compare");
    for &tile in &[960u32, 480] {
        let manager = gen_manager(tile);
        let levels = to_rstar_levels(&manager);
        let roi = Region::from_xywh(30_000, 10_000, 12_000, 12_000);
        let s = Subsampling::ONE;
        group.throughput(Throughput::Elements(manager.len() as u64));

        group.bench_function(format!("understory_query_t{tile}"), |b| {
            b.iter(|| black_box(manager.get_tiles(roi, s, false).unwrap().len()));
        });

        let trees: Vec<(Subsampling, RTree<Entry>)> = levels
            .iter()
            .map(|(s, e)| (*s, RTree::bulk_load(e.clone())))
            .collect();
        group.bench_function(format!("rstar_query_t{tile}"), |b| {
            b.iter(|| {
                let aabb = AABB::from_corners([roi.min_x, roi.min_y], [roi.max_x - 1, roi.max_y - 1]);
                let hits = trees
                    .iter()
                    .find(|(level, _)| *level == s)
                    .map_or(0, |(_, tree)| tree.locate_in_envelope_intersecting(&aabb).count());
                black_box(hits);
            });
        });

        group.bench_function(format!("rstar_build_bulk_t{tile}"), |b| {
            b.iter_batched(
                || levels.clone(),
                |levels| {
                    for (_, entries) in levels {
                        black_box(RTree::bulk_load(entries));
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_rtree_external_compare);
criterion_main!(benches);
