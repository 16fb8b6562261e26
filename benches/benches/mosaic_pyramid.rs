// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use understory_mosaic::{
    MosaicBuilder, PayloadRef, Region, Subsampling, Tile, TileManager, TileSize,
};

const SOURCE: i64 = 21_600;

fn gen_sources(columns: i64, rows: i64) -> Vec<Tile> {
    let mut out = Vec::with_capacity((columns * rows) as usize);
    for y in 0..rows {
        for x in 0..columns {
            let region = Region::from_xywh(x * SOURCE, y * SOURCE, SOURCE, SOURCE);
            let payload = PayloadRef::new(format!("source_{x}_{y}.png"));
            out.push(Tile::native(payload, region).unwrap());
        }
    }
    out
}

fn build(sources: &[Tile], tile: u32) -> TileManager {
    MosaicBuilder::new()
        .with_tile_size(TileSize::square(tile).unwrap())
        .create_tile_manager(sources)
        .unwrap()
}

fn bench_pyramid_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("pyramid_build");
    let sources = gen_sources(4, 2);
    for &tile in &[960u32, 480] {
        let tiles = build(&sources, tile).len();
        group.throughput(Throughput::Elements(tiles as u64));
        group.bench_function(format!("blue_marble_t{tile}"), |b| {
            b.iter(|| black_box(build(&sources, tile)));
        });
    }
    group.finish();
}

fn bench_get_tiles(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_tiles");
    let manager = build(&gen_sources(4, 2), 480);
    let domain = manager.domain().unwrap();
    let rois = [
        ("small", Region::from_xywh(40_000, 20_000, 2_000, 2_000)),
        ("quarter", Region::from_xywh(0, 0, domain.width() / 2, domain.height() / 2)),
        ("full", domain),
    ];
    for &factor in &[1u32, 9, 45] {
        let s = Subsampling::uniform(factor).unwrap();
        for (name, roi) in rois {
            group.bench_function(format!("{name}_s{factor}"), |b| {
                b.iter(|| {
                    let hits = manager.get_tiles(roi, s, false).unwrap().len();
                    black_box(hits);
                });
            });
        }
    }
    // Requests between levels pay for the adjustment.
    let odd = Subsampling::new(100, 120).unwrap();
    group.bench_function("adjusted_full", |b| {
        b.iter(|| black_box(manager.get_tiles(domain, odd, true).unwrap().len()));
    });
    group.finish();
}

fn bench_remove(c: &mut Criterion) {
    let mut group = c.benchmark_group("remove");
    let manager = build(&gen_sources(4, 2), 960);
    let victims: Vec<Tile> = manager.tiles().into_iter().step_by(97).cloned().collect();
    group.throughput(Throughput::Elements(victims.len() as u64));
    group.bench_function("every_97th", |b| {
        b.iter_batched(
            || manager.clone(),
            |mut m| {
                for v in &victims {
                    black_box(m.remove(v));
                }
            },
            BatchSize::LargeInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_pyramid_build, bench_get_tiles, bench_remove);
criterion_main!(benches);
