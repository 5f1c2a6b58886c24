//! Benchmarks for tag query parsing and evaluation.
//!
//! Benchmark targets:
//! - Query parsing: <10us
//! - Two-clause intersection over 100k files: <10ms
//! - Rule matching per file: <50us

// Criterion macros generate items without docs - this is expected for benchmarks
#![allow(missing_docs)]
#![allow(clippy::expect_used)]

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::Duration;

use tagsort::models::{FileMetadata, Rule};
use tagsort::services::{QueryAst, TagIndex, TermMatcher};

const SIMPLE_QUERY: &str = "elf";
const MEDIUM_QUERY: &str = "elf, forest, !armor";
const COMPLEX_QUERY: &str = "(elf|dwarf|orc), forest|cave|mountain, !armor, !sword|shield";

/// Builds an index of `files` files spread over 50 tags.
fn build_index(files: usize) -> TagIndex {
    let tags = [
        "elf", "dwarf", "orc", "forest", "cave", "mountain", "armor", "sword", "shield",
    ];
    let mut index = TagIndex::new();
    for (i, tag) in tags.iter().enumerate() {
        let step = i + 2;
        index.insert(tag, None, (0..files).step_by(step).map(|n| format!("img{n}.png")));
    }
    for filler in 0..41 {
        let tag = format!("filler{filler}");
        index.insert(&tag, None, (filler..files).step_by(97).map(|n| format!("img{n}.png")));
    }
    index
}

fn bench_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_parsing");
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("simple", |b| {
        b.iter(|| QueryAst::parse(black_box(SIMPLE_QUERY)));
    });
    group.bench_function("medium", |b| {
        b.iter(|| QueryAst::parse(black_box(MEDIUM_QUERY)));
    });
    group.bench_function("complex", |b| {
        b.iter(|| QueryAst::parse(black_box(COMPLEX_QUERY)));
    });

    group.finish();
}

fn bench_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_evaluation");
    group.measurement_time(Duration::from_secs(10));

    for files in [1_000usize, 10_000, 100_000] {
        let index = build_index(files);
        group.throughput(Throughput::Elements(files as u64));

        for (name, query) in [("medium", MEDIUM_QUERY), ("complex", COMPLEX_QUERY)] {
            let ast = QueryAst::parse(query).expect("bench query parses");
            group.bench_with_input(BenchmarkId::new(name, files), &ast, |b, ast| {
                b.iter(|| index.evaluate(black_box(ast)));
            });
        }
    }

    group.finish();
}

fn bench_matching(c: &mut Criterion) {
    let rules: Vec<Rule> = ["elf", "dwarf", "red hair", "forest", "armor", "night sky"]
        .into_iter()
        .enumerate()
        .map(|(i, term)| Rule::new(term).with_priority(u32::try_from(i + 1).unwrap_or(1)))
        .collect();
    let metadata = FileMetadata::new()
        .with_field("positive_prompt", "masterpiece, 1girl, elf, red hair, forest, night sky")
        .with_field("tags", "1girl, elf, pointy_ears, red_hair, forest, night, sky");

    c.bench_function("match_rules", |b| {
        let mut matcher = TermMatcher::new();
        b.iter(|| matcher.match_rules(black_box(&metadata), black_box(&rules)).len());
    });
}

criterion_group!(benches, bench_parsing, bench_evaluation, bench_matching);
criterion_main!(benches);
