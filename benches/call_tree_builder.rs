/// Call Tree Builder Benchmarks
///
/// Measures the per-stop cost of call tree reconstruction on synthetic
/// instruction streams, independent of ptrace overhead.
use calltrace::builder::CallTreeBuilder;
use calltrace::symbols::SymbolTable;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::convert::Infallible;
use std::time::Duration;

const NOP: u64 = 0x90;
const CALL: u64 = 0xe8;
const RET: u64 = 0xc3;

fn symbols() -> SymbolTable {
    let mut entries = vec![(0x1000u64, 0x100u64, "_start".to_string())];
    for i in 0..64u64 {
        entries.push((0x2000 + i * 0x100, 0x100, format!("fn_{}", i)));
    }
    SymbolTable::from_symbols(entries)
}

/// `_start` calls `fanout` distinct functions, each doing a little work
fn fanout_stream(fanout: u64) -> Vec<(u64, u64)> {
    let mut stops = Vec::new();
    let mut site = 0x1000;
    for i in 0..fanout {
        let callee = 0x2000 + (i % 64) * 0x100;
        stops.push((site, CALL));
        for off in 0..8 {
            stops.push((callee + off, NOP));
        }
        stops.push((callee + 8, RET));
        site += 5;
    }
    stops.push((site, NOP));
    stops
}

/// `fn_0` recursing directly `depth` times
fn recursion_stream(depth: u64) -> Vec<(u64, u64)> {
    let mut stops = vec![(0x1000, CALL)];
    for _ in 0..depth {
        stops.push((0x2000, NOP));
        stops.push((0x2001, CALL));
    }
    stops.push((0x2000, NOP));
    stops.push((0x2006, RET));
    for _ in 0..depth {
        stops.push((0x2006, RET));
    }
    stops.push((0x1005, NOP));
    stops
}

fn run(symbols: &SymbolTable, stops: &[(u64, u64)]) {
    let mut builder = CallTreeBuilder::new(symbols, ["_start"]);
    for &(ip, word) in stops {
        builder.observe(ip, || Ok::<_, Infallible>(word)).unwrap();
    }
    black_box(builder.finish());
}

/// Benchmark: Wide trees with many sibling calls
fn bench_fanout(c: &mut Criterion) {
    let syms = symbols();
    let mut group = c.benchmark_group("fanout");
    group.measurement_time(Duration::from_secs(5));

    for fanout in [10u64, 100, 1000] {
        let stops = fanout_stream(fanout);
        group.throughput(Throughput::Elements(stops.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(fanout), &stops, |b, stops| {
            b.iter(|| run(&syms, stops));
        });
    }

    group.finish();
}

/// Benchmark: Deep direct recursion folded into one node
fn bench_recursion(c: &mut Criterion) {
    let syms = symbols();
    let mut group = c.benchmark_group("recursion");
    group.measurement_time(Duration::from_secs(5));

    for depth in [10u64, 100, 1000] {
        let stops = recursion_stream(depth);
        group.throughput(Throughput::Elements(stops.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(depth), &stops, |b, stops| {
            b.iter(|| run(&syms, stops));
        });
    }

    group.finish();
}

/// Benchmark: Symbol lookup alone
fn bench_symbol_lookup(c: &mut Criterion) {
    use calltrace::symbols::SymbolResolver;

    let syms = symbols();
    c.bench_function("resolve_address", |b| {
        b.iter(|| black_box(syms.resolve(black_box(0x2a42))));
    });
}

criterion_group!(benches, bench_fanout, bench_recursion, bench_symbol_lookup);
criterion_main!(benches);
