//! Microbenchmarks for reply parsing and command encoding.
//!
//! Run with: `cargo bench -p rrdkit -- parse`

#![allow(missing_docs, clippy::cast_precision_loss)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rrdkit::{CommandLine, FetchResult, RrdInfo, UpdateTime};
use std::fmt::Write;
use std::path::Path;

/// Builds an `info` dump with `ds_count` data sources and four archives,
/// including the per-archive `cdp_prep` lines the parser skips.
fn info_dump(ds_count: usize) -> String {
    let mut out = String::new();
    out.push_str("filename = \"bench.rrd\"\nrrd_version = \"0003\"\nstep = 60\n");
    out.push_str("last_update = 1700000000\nheader_size = 4096\n");
    for i in 0..ds_count {
        let _ = writeln!(out, "ds[ds{i}].index = {i}");
        let _ = writeln!(out, "ds[ds{i}].type = \"GAUGE\"");
        let _ = writeln!(out, "ds[ds{i}].minimal_heartbeat = 120");
        let _ = writeln!(out, "ds[ds{i}].min = NaN");
        let _ = writeln!(out, "ds[ds{i}].max = NaN");
        let _ = writeln!(out, "ds[ds{i}].last_ds = \"{i}\"");
        let _ = writeln!(out, "ds[ds{i}].value = 0.0000000000e+00");
        let _ = writeln!(out, "ds[ds{i}].unknown_sec = 0");
    }
    for (r, cf) in ["AVERAGE", "MIN", "MAX", "LAST"].iter().enumerate() {
        let _ = writeln!(out, "rra[{r}].cf = \"{cf}\"");
        let _ = writeln!(out, "rra[{r}].rows = 1440");
        let _ = writeln!(out, "rra[{r}].cur_row = 17");
        let _ = writeln!(out, "rra[{r}].pdp_per_row = 1");
        let _ = writeln!(out, "rra[{r}].xff = 5.0000000000e-01");
        for i in 0..ds_count {
            let _ = writeln!(out, "rra[{r}].cdp_prep[{i}].value = NaN");
            let _ = writeln!(out, "rra[{r}].cdp_prep[{i}].unknown_datapoints = 0");
        }
    }
    out
}

/// Builds a `fetch` reply with three columns and `rows` rows.
fn fetch_dump(rows: u64) -> String {
    let mut out = String::from("                 in          out        total\n\n");
    for i in 0..rows {
        let ts = 1_700_000_000 + i * 60;
        if i % 10 == 0 {
            let _ = writeln!(out, "{ts}: -nan -nan -nan");
        } else {
            let _ = writeln!(
                out,
                "{ts}: {:.10e} {:.10e} {:.10e}",
                i as f64,
                (i * 2) as f64,
                (i * 3) as f64
            );
        }
    }
    out
}

fn bench_info_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse/info");

    for count in [1, 10, 100] {
        let dump = info_dump(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &dump, |b, dump| {
            b.iter(|| {
                let info = RrdInfo::parse_str(black_box(dump));
                info.data_source_definitions().unwrap()
            });
        });
    }

    group.finish();
}

fn bench_fetch_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse/fetch");

    for rows in [60, 1440] {
        let dump = fetch_dump(rows);
        group.bench_with_input(BenchmarkId::from_parameter(rows), &dump, |b, dump| {
            b.iter(|| FetchResult::parse(black_box(dump).lines()).unwrap());
        });
    }

    group.finish();
}

fn bench_update_encoding(c: &mut Criterion) {
    let values: Vec<(String, f64)> = (0..30).map(|i| (format!("ds{i}"), f64::from(i))).collect();
    let path = Path::new("/var/lib/rrd/bench.rrd");

    c.bench_function("encode/update_30_sources", |b| {
        b.iter(|| {
            CommandLine::update(black_box(path), UpdateTime::At(1_700_000_000), &values)
                .to_pipe_line()
                .unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_info_parse,
    bench_fetch_parse,
    bench_update_encoding,
);
criterion_main!(benches);
