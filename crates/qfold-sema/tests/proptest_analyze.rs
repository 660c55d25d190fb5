//! Property-based tests over generated programs.
//!
//! Programs are built from valid gate calls, loops and measurements over a
//! single register, so analysis must succeed and the flat output must
//! re-analyze to the same shape.

use std::collections::BTreeMap;

use proptest::prelude::*;
use qfold_sema::{Module, analyze};

const SIZE: u32 = 4;

fn arb_gate_line() -> impl Strategy<Value = String> {
    prop_oneof![
        (prop::sample::select(vec!["h", "x", "s", "t", "sdg"]), 0..SIZE)
            .prop_map(|(g, q)| format!("{g} q[{q}];")),
        (prop::sample::select(vec!["rx", "rz", "p"]), -3.0_f64..3.0, 0..SIZE)
            .prop_map(|(g, a, q)| format!("{g}({a:.4}) q[{q}];")),
        (0..SIZE, 1..SIZE).prop_map(|(a, d)| format!("cx q[{a}], q[{}];", (a + d) % SIZE)),
        (0..SIZE, 1..SIZE).prop_map(|(a, d)| format!("ctrl @ z q[{a}], q[{}];", (a + d) % SIZE)),
        (0..SIZE).prop_map(|q| format!("inv @ t q[{q}];")),
        (1_u32..3, 0..SIZE).prop_map(|(k, q)| format!("pow({k}) @ sx q[{q}];")),
    ]
}

fn arb_statement() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => arb_gate_line(),
        1 => (0..SIZE, 0..SIZE).prop_map(|(a, b)| {
            let (lo, hi) = (a.min(b), a.max(b));
            format!("for int i in [{lo}:{hi}] {{ h q[i]; }}")
        }),
        1 => (0..SIZE).prop_map(|q| format!("c[{q}] = measure q[{q}];")),
        1 => (0..SIZE).prop_map(|q| format!("if (c[{q}] == 1) {{ x q[{q}]; }}")),
        1 => Just("barrier q;".to_string()),
    ]
}

fn arb_program() -> impl Strategy<Value = String> {
    prop::collection::vec(arb_statement(), 0..16).prop_map(|lines| {
        let mut source = format!(
            "OPENQASM 3.0;\ninclude \"stdgates.inc\";\nqubit[{SIZE}] q;\nbit[{SIZE}] c;\n"
        );
        for line in lines {
            source.push_str(&line);
            source.push('\n');
        }
        source
    })
}

fn analyze_clean(source: &str) -> Module {
    match analyze(source) {
        Ok(module) => module,
        Err(err) => panic!("analysis failed: {err}\n{source}"),
    }
}

fn non_barrier_counts(module: &Module) -> BTreeMap<String, usize> {
    let mut counts = module.gate_counts();
    counts.remove("barrier");
    counts
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn emission_is_deterministic(source in arb_program()) {
        let first = analyze_clean(&source).to_source();
        let second = analyze_clean(&source).to_source();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn round_trip_keeps_shape(source in arb_program()) {
        let module = analyze_clean(&source);
        let emitted = module.to_source();
        let again = analyze_clean(&emitted);

        prop_assert!(again.diagnostics().iter().all(|d| !d.is_error()));
        prop_assert_eq!(again.num_qubits(), module.num_qubits());
        prop_assert_eq!(again.num_clbits(), module.num_clbits());
        prop_assert_eq!(again.operations().count(), module.operations().count());
        prop_assert_eq!(again.gate_counts(), module.gate_counts());
    }

    #[test]
    fn idle_removal_keeps_used_qubits(source in arb_program()) {
        let module = analyze_clean(&source);
        let compact = module.remove_idle_qubits();

        prop_assert_eq!(compact.num_qubits(), module.used_qubits());
        prop_assert_eq!(compact.used_qubits(), module.used_qubits());
        prop_assert_eq!(non_barrier_counts(&compact), non_barrier_counts(&module));
    }

    #[test]
    fn reversing_twice_is_identity(source in arb_program()) {
        let module = analyze_clean(&source);
        let twice = module.reverse_qubit_order().reverse_qubit_order();

        let operands = |m: &Module| -> Vec<Vec<u32>> {
            m.operations().map(|op| op.qubits.iter().map(|q| q.0).collect()).collect()
        };
        prop_assert_eq!(operands(&twice), operands(&module));
    }
}
