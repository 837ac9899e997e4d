//! Microbenchmarks for result decoding.
//!
//! Measures how long instant and range bodies of realistic size take to turn
//! into typed results.
//!
//! Run with: `cargo bench -p vmclient -- decode`

#![allow(missing_docs)]

use std::fmt::Write;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use vmclient::decode::{decode_instant, decode_range};

/// Builds an instant-query body with `series` results.
fn instant_body(series: usize) -> Vec<u8> {
    let mut body = String::from(r#"{"status":"success","data":{"resultType":"vector","result":["#);
    for i in 0..series {
        if i > 0 {
            body.push(',');
        }
        write!(
            body,
            r#"{{"metric":{{"__name__":"vm_cpu","instance":"vm-{i}","core":"{}"}},"value":[1734677495.123,"{i}.5"]}}"#,
            i % 8
        )
        .unwrap();
    }
    body.push_str("]}}");
    body.into_bytes()
}

/// Builds a range-query body with `series` results of `points` pairs each.
fn range_body(series: usize, points: usize) -> Vec<u8> {
    let mut body = String::from(r#"{"status":"success","data":{"resultType":"matrix","result":["#);
    for i in 0..series {
        if i > 0 {
            body.push(',');
        }
        write!(
            body,
            r#"{{"metric":{{"__name__":"vm_cpu","instance":"vm-{i}"}},"values":["#
        )
        .unwrap();
        for p in 0..points {
            if p > 0 {
                body.push(',');
            }
            write!(body, r#"[{},"{}"]"#, 1_734_670_000 + p * 60, p % 100).unwrap();
        }
        body.push_str("]}");
    }
    body.push_str("]}}");
    body.into_bytes()
}

fn bench_decode_instant(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode/instant");
    for series in [1, 100, 1000] {
        let body = instant_body(series);
        group.bench_with_input(BenchmarkId::from_parameter(series), &body, |b, body| {
            b.iter(|| decode_instant(black_box(body)).unwrap());
        });
    }
    group.finish();
}

fn bench_decode_range(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode/range");
    for (series, points) in [(1, 60), (10, 1440), (100, 60)] {
        let body = range_body(series, points);
        group.bench_with_input(
            BenchmarkId::new(format!("{series}_series"), points),
            &body,
            |b, body| {
                b.iter(|| decode_range(black_box(body)).unwrap());
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_decode_instant, bench_decode_range);
criterion_main!(benches);
