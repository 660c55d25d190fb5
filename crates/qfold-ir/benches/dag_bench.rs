//! Benchmarks for DAG construction and depth
//!
//! Run with: cargo bench -p qfold-ir

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use qfold_ir::{CircuitDag, ControlState, Gate, Instruction, QubitId, Unitary2x2};

fn layered_dag(num_qubits: u32, layers: u32) -> CircuitDag {
    let mut dag = CircuitDag::new();
    for q in 0..num_qubits {
        dag.add_qubit(QubitId(q));
    }
    let h = Gate::builtin("h", vec![]).unwrap();
    let cx = Gate::builtin("x", vec![]).unwrap().controlled(ControlState::Positive);
    for _ in 0..layers {
        for q in 0..num_qubits {
            dag.apply(Instruction::gate(h.clone(), [QubitId(q)]).unwrap())
                .unwrap();
        }
        for q in 0..num_qubits - 1 {
            dag.apply(Instruction::gate(cx.clone(), [QubitId(q), QubitId(q + 1)]).unwrap())
                .unwrap();
        }
    }
    dag
}

fn bench_dag_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("dag_build");

    for num_qubits in &[5u32, 20, 50] {
        group.bench_with_input(
            BenchmarkId::new("layered", num_qubits),
            num_qubits,
            |b, &n| {
                b.iter(|| layered_dag(black_box(n), black_box(10)));
            },
        );
    }

    group.finish();
}

fn bench_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("depth");

    for num_qubits in &[5u32, 20, 50] {
        let dag = layered_dag(*num_qubits, 10);
        group.bench_with_input(BenchmarkId::new("layered", num_qubits), &dag, |b, dag| {
            b.iter(|| black_box(dag.depth()));
        });
    }

    group.finish();
}

fn bench_fractional_power(c: &mut Criterion) {
    let x = Unitary2x2::x();
    c.bench_function("pow_then_zyz", |b| {
        b.iter(|| {
            let m = black_box(x).power(black_box(0.5), 1e-8).unwrap();
            black_box(m.u_angles())
        });
    });
}

criterion_group!(benches, bench_dag_build, bench_depth, bench_fractional_power);
criterion_main!(benches);
