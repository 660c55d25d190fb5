//! Benchmarks for analysis and re-emission
//!
//! Run with: cargo bench -p qfold-sema

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use qfold_sema::analyze;

/// Layered circuit written out statement by statement.
fn straight_line(num_qubits: u32, layers: u32) -> String {
    let mut source = format!("OPENQASM 3.0;\ninclude \"stdgates.inc\";\nqubit[{num_qubits}] q;\n");
    for _ in 0..layers {
        for q in 0..num_qubits {
            source.push_str(&format!("h q[{q}];\n"));
        }
        for q in 0..num_qubits - 1 {
            source.push_str(&format!("cx q[{q}], q[{}];\n", q + 1));
        }
    }
    source
}

/// The same circuit expressed with loops and a user gate.
fn looped(num_qubits: u32, layers: u32) -> String {
    format!(
        "OPENQASM 3.0;
include \"stdgates.inc\";
gate layer a, b {{ h a; cx a, b; }}
qubit[{num_qubits}] q;
for int k in [1:{layers}] {{
    for int i in [0:{}] {{
        layer q[i], q[i + 1];
    }}
}}
",
        num_qubits - 2
    )
}

fn bench_analyze(c: &mut Criterion) {
    let mut group = c.benchmark_group("analyze");

    for num_qubits in &[5u32, 20, 50] {
        let flat = straight_line(*num_qubits, 10);
        group.bench_with_input(BenchmarkId::new("straight_line", num_qubits), &flat, |b, s| {
            b.iter(|| analyze(black_box(s)));
        });

        let loops = looped(*num_qubits, 10);
        group.bench_with_input(BenchmarkId::new("looped", num_qubits), &loops, |b, s| {
            b.iter(|| analyze(black_box(s)));
        });
    }

    group.finish();
}

fn bench_emit(c: &mut Criterion) {
    let mut group = c.benchmark_group("to_source");

    for num_qubits in &[5u32, 20, 50] {
        let Ok(module) = analyze(&looped(*num_qubits, 10)) else {
            continue;
        };
        group.bench_with_input(BenchmarkId::new("looped", num_qubits), &module, |b, m| {
            b.iter(|| black_box(m).to_source());
        });
    }

    group.finish();
}

fn bench_depth(c: &mut Criterion) {
    let Ok(module) = analyze(&straight_line(50, 20)) else {
        return;
    };
    c.bench_function("depth_50x20", |b| {
        b.iter(|| black_box(&module).depth());
    });
}

criterion_group!(benches, bench_analyze, bench_emit, bench_depth);
criterion_main!(benches);
