//! Performance benchmarks for hotswap-flags.
//!
//! Measures the hot paths of a reload:
//! - Parsing a config file
//! - Merging entries into a registry
//! - A full no-op reload through the engine
//! - Flag reads while reloads run

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use hotswap_flags::core::{CONFIG_FLAG, Merger, format_flags, parse_reader};
use hotswap_flags::prelude::*;
use std::collections::BTreeSet;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

fn registry_with(count: usize) -> FlagSet {
    let flags = FlagSet::new();
    for i in 0..count {
        flags
            .define_int(&format!("flag{}", i), 0, "benchmark flag")
            .unwrap();
    }
    flags
}

fn config_text(count: usize, value: i64) -> String {
    (0..count)
        .map(|i| format!("# benchmark flag\nflag{} {}\n", i, value))
        .collect()
}

/// Benchmark config file parsing
fn benchmark_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    for count in [10, 100, 1000] {
        let text = config_text(count, 42);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &text, |b, text| {
            b.iter(|| {
                let entries = parse_reader(Cursor::new(text.as_bytes()), Path::new("bench.conf"));
                black_box(entries.unwrap());
            });
        });
    }
    group.finish();
}

/// Benchmark merging into a registry, alternating values so every merge changes every flag
fn benchmark_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    let pinned = BTreeSet::new();

    for count in [10, 100, 1000] {
        let flags = registry_with(count);
        let even = parse_reader(Cursor::new(config_text(count, 1)), Path::new("a.conf")).unwrap();
        let odd = parse_reader(Cursor::new(config_text(count, 2)), Path::new("b.conf")).unwrap();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_function(BenchmarkId::new("changing", count), |b| {
            let mut flip = false;
            b.iter(|| {
                flip = !flip;
                let entries = if flip { &even } else { &odd };
                let changes = Merger::new(&flags, &pinned).merge(entries).unwrap();
                black_box(changes.len());
            });
        });

        Merger::new(&flags, &pinned).merge(&even).unwrap();
        group.bench_function(BenchmarkId::new("unchanged", count), |b| {
            b.iter(|| {
                let changes = Merger::new(&flags, &pinned).merge(&even).unwrap();
                black_box(changes.is_empty());
            });
        });
    }
    group.finish();
}

/// Benchmark a full reload that finds nothing to change
fn benchmark_engine_reload(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let _enter = runtime.enter();

    let temp_dir = tempfile::TempDir::new().unwrap();
    let path = temp_dir.path().join("bench.conf");
    fs::write(&path, config_text(100, 5)).unwrap();

    let flags = Arc::new(registry_with(100));
    let engine = HotswapFlags::builder()
        .with_registry(Arc::clone(&flags))
        .with_hangup_signal(false)
        .build()
        .unwrap();
    flags
        .set_from_command_line(CONFIG_FLAG, path.to_str().unwrap())
        .unwrap();
    engine.start().unwrap();

    let mut group = c.benchmark_group("engine");
    group.bench_function("noop_reload_100", |b| {
        b.iter(|| {
            let (changes, _) = engine.reload().unwrap();
            black_box(changes.generation);
        });
    });
    group.bench_function("dump_100", |b| {
        b.iter(|| black_box(format_flags(&*flags)));
    });
    group.finish();
    engine.shutdown();
}

/// Benchmark reads while another thread keeps merging
fn benchmark_read_during_merge(c: &mut Criterion) {
    let flags = Arc::new(registry_with(100));
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let flags = Arc::clone(&flags);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let pinned = BTreeSet::new();
            let a = parse_reader(Cursor::new(config_text(100, 1)), Path::new("a.conf")).unwrap();
            let b = parse_reader(Cursor::new(config_text(100, 2)), Path::new("b.conf")).unwrap();
            let mut flip = false;
            while !done.load(Ordering::Relaxed) {
                flip = !flip;
                let entries = if flip { &a } else { &b };
                let _ = Merger::new(&*flags, &pinned).merge(entries);
            }
        })
    };

    let mut group = c.benchmark_group("read_during_merge");
    group.bench_function("get_int", |b| {
        b.iter(|| black_box(flags.get_int("flag50")));
    });
    group.finish();

    done.store(true, Ordering::Relaxed);
    writer.join().unwrap();
}

criterion_group!(
    benches,
    benchmark_parse,
    benchmark_merge,
    benchmark_engine_reload,
    benchmark_read_during_merge
);
criterion_main!(benches);
