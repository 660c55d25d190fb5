//! Integration tests for the analyzer and the flat module it builds.
//!
//! Programs go in as source text; assertions are made on the elementary
//! operations, the register layout, the diagnostics and the re-emitted
//! source.

use std::f64::consts::PI;

use qfold_ir::{ClbitId, ControlState, Instruction, ParameterExpression, QubitId, Unitary2x2};
use qfold_sema::{
    AnalyzerConfig, DiagnosticKind, ErrorMode, FlatStatement, Module, Severity, analyze,
    analyze_with,
};

const HEADER: &str = "OPENQASM 3.0;\ninclude \"stdgates.inc\";\n";

/// Helper: route analyzer logs to the test output (`RUST_LOG=qfold_sema=debug`).
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Helper: analyze a program body that is expected to be clean.
fn analyze_ok(body: &str) -> Module {
    init_tracing();
    let source = format!("{HEADER}{body}");
    match analyze(&source) {
        Ok(module) => module,
        Err(err) => panic!("unexpected failure: {err}\n{:#?}", err.diagnostics()),
    }
}

/// Helper: analyze a program body that is expected to fail, keeping the
/// partial module.
fn analyze_err(body: &str) -> Module {
    init_tracing();
    let source = format!("{HEADER}{body}");
    match analyze(&source) {
        Ok(module) => panic!("expected diagnostics, got\n{}", module.to_source()),
        Err(err) => err.into_module(),
    }
}

/// Helper: diagnostic kinds in report order.
fn kinds(module: &Module) -> Vec<DiagnosticKind> {
    module.diagnostics().iter().map(|d| d.kind).collect()
}

/// Helper: operation names in program order.
fn names(module: &Module) -> Vec<String> {
    module.operations().map(|op| op.name().to_string()).collect()
}

/// Helper: qubit operands in program order.
fn operands(module: &Module) -> Vec<Vec<u32>> {
    module
        .operations()
        .map(|op| op.qubits.iter().map(|q| q.0).collect())
        .collect()
}

fn constant_params(op: &Instruction) -> Vec<f64> {
    op.as_gate()
        .map(|g| g.params.iter().filter_map(ParameterExpression::as_f64).collect())
        .unwrap_or_default()
}

// ============================================================================
// Loops
// ============================================================================

#[test]
fn test_for_range_unrolls_in_order() {
    let module = analyze_ok("qubit[3] q;\nfor int i in [0:2] { h q[i]; }\n");

    assert_eq!(names(&module), ["h", "h", "h"]);
    assert_eq!(operands(&module), [vec![0], vec![1], vec![2]]);
    assert_eq!(module.depth(), 1);
}

#[test]
fn test_for_with_step_and_set() {
    let module = analyze_ok(
        "qubit[5] q;\nfor int i in [4:-2:0] { x q[i]; }\nfor int j in {1, 3} { z q[j]; }\n",
    );

    assert_eq!(names(&module), ["x", "x", "x", "z", "z"]);
    assert_eq!(
        operands(&module),
        [vec![4], vec![2], vec![0], vec![1], vec![3]]
    );
}

#[test]
fn test_empty_range_emits_nothing() {
    let module = analyze_ok("qubit[2] q;\nfor int i in [3:1] { h q[0]; }\nx q[1];\n");
    assert_eq!(names(&module), ["x"]);
}

#[test]
fn test_break_and_continue() {
    let module = analyze_ok(
        "qubit[4] q;\n\
         for int i in [0:3] {\n\
             if (i == 1) { continue; }\n\
             if (i == 3) { break; }\n\
             h q[i];\n\
         }\n",
    );
    assert_eq!(operands(&module), [vec![0], vec![2]]);
}

#[test]
fn test_constant_while_loop_unrolls() {
    let module = analyze_ok("qubit[1] q;\nint n = 0;\nwhile (n < 3) { x q[0]; n += 1; }\n");
    assert_eq!(names(&module), ["x", "x", "x"]);
    assert!(module.declarations().is_empty());
}

#[test]
fn test_while_on_measurement_is_not_unrolled() {
    let module = analyze_err(
        "qubit[1] q;\nbit c;\nc = measure q[0];\nwhile (c) { x q[0]; }\nh q[0];\n",
    );

    assert_eq!(kinds(&module), [DiagnosticKind::NonConstantBound]);
    assert_eq!(names(&module), ["measure", "h"]);
}

#[test]
fn test_loop_iteration_limit() {
    let config = AnalyzerConfig::builder()
        .with_max_loop_iterations(10)
        .build()
        .unwrap();
    let source = format!("{HEADER}qubit[1] q;\nfor int i in [0:20] {{ h q[0]; }}\nx q[0];\n");
    let module = analyze_with(&source, &config).unwrap_err().into_module();

    assert_eq!(kinds(&module), [DiagnosticKind::IterationLimit]);
    assert_eq!(names(&module), ["x"]);
}

#[test]
fn test_for_over_input_bound_is_dropped() {
    let module = analyze_err(
        "input int n;\nqubit[1] q;\nfor int i in [0:n] { x q[0]; }\nh q[0];\n",
    );

    assert_eq!(kinds(&module), [DiagnosticKind::NonConstantBound]);
    assert_eq!(names(&module), ["h"]);
}

#[test]
fn test_nested_runtime_while_drops_enclosing_for() {
    let module = analyze_err(
        "qubit[1] q;\nbit c;\nc = measure q[0];\n\
         for int i in [0:2] {\n\
             x q[0];\n\
             while (c) { z q[0]; }\n\
         }\n\
         x q[0];\n",
    );

    // Nothing from the loop survives, including ops before the while.
    assert_eq!(kinds(&module), [DiagnosticKind::NonConstantBound]);
    assert_eq!(names(&module), ["measure", "x"]);
}

// ============================================================================
// Modifiers
// ============================================================================

#[test]
fn test_double_inverse_is_identity() {
    let plain = analyze_ok("qubit[1] q;\ns q[0];\n");
    let twice = analyze_ok("qubit[1] q;\ninv @ inv @ s q[0];\n");

    let render = |m: &Module| -> Vec<String> {
        m.operations()
            .filter_map(|op| op.as_gate().map(ToString::to_string))
            .collect()
    };
    assert_eq!(render(&plain), render(&twice));
    assert_eq!(operands(&plain), operands(&twice));
}

#[test]
fn test_inverse_of_named_gate() {
    let module = analyze_ok("qubit[1] q;\ninv @ t q[0];\ninv @ rx(0.5) q[0];\n");
    assert_eq!(names(&module), ["tdg", "rx"]);
    let ops: Vec<_> = module.operations().collect();
    assert_eq!(constant_params(ops[1]), [-0.5]);
}

#[test]
fn test_ctrl_prepends_one_qubit() {
    let module = analyze_ok("qubit[2] q;\nctrl(1) @ x q[0], q[1];\nnegctrl @ h q[1], q[0];\n");

    let ops: Vec<_> = module.operations().collect();
    let first = ops[0].as_gate().unwrap();
    assert_eq!(first.name(), "x");
    assert_eq!(first.controls, [ControlState::Positive]);
    assert_eq!(ops[0].qubits, [QubitId(0), QubitId(1)]);

    let second = ops[1].as_gate().unwrap();
    assert_eq!(second.controls, [ControlState::Negative]);
    assert_eq!(ops[1].qubits, [QubitId(1), QubitId(0)]);
}

#[test]
fn test_integer_power_repeats() {
    let module = analyze_ok("qubit[1] q;\npow(2) @ x q[0];\npow(0) @ h q[0];\n");
    assert_eq!(names(&module), ["x", "x"]);
}

#[test]
fn test_negative_power_inverts() {
    let module = analyze_ok("qubit[1] q;\npow(-2) @ s q[0];\n");
    assert_eq!(names(&module), ["sdg", "sdg"]);
}

#[test]
fn test_fractional_power_of_rotation_scales_angle() {
    let module = analyze_ok("qubit[1] q;\npow(0.5) @ rx(pi) q[0];\n");

    let ops: Vec<_> = module.operations().collect();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].name(), "rx");
    let params = constant_params(ops[0]);
    assert!((params[0] - PI / 2.0).abs() < 1e-12);
}

#[test]
fn test_fractional_power_of_x_squares_to_x() {
    let module = analyze_ok("qubit[1] q;\npow(0.5) @ x q[0];\n");

    let ops: Vec<_> = module.operations().collect();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].name(), "u");
    let root = ops[0].as_gate().unwrap().matrix().unwrap();
    let square = root.mul(&root);
    assert!(square.equal_up_to_phase(&Unitary2x2::x(), 1e-8));
}

#[test]
fn test_fractional_power_of_controlled_gate_is_rejected() {
    let module = analyze_err("qubit[2] q;\npow(0.5) @ cx q[0], q[1];\nh q[0];\n");
    assert_eq!(
        kinds(&module),
        [DiagnosticKind::UnsupportedModifierCombination]
    );
    assert_eq!(names(&module), ["h"]);
}

#[test]
fn test_non_constant_control_count() {
    let module = analyze_err("input int n;\nqubit[2] q;\nctrl(n) @ x q[0], q[1];\n");
    assert_eq!(kinds(&module), [DiagnosticKind::NonConstantBound]);
}

// ============================================================================
// Gate definitions and broadcast
// ============================================================================

#[test]
fn test_user_gate_is_inlined() {
    let module = analyze_ok("gate bell a, b { h a; cx a, b; }\nqubit[2] q;\nbell q[0], q[1];\n");
    assert_eq!(names(&module), ["h", "cx"]);
    assert_eq!(operands(&module), [vec![0], vec![0, 1]]);
}

#[test]
fn test_inverse_of_user_gate_reverses_body() {
    let module = analyze_ok(
        "gate prep(t) a, b { rx(t) a; cx a, b; }\nqubit[2] q;\ninv @ prep(0.25) q[1], q[0];\n",
    );
    assert_eq!(names(&module), ["cx", "rx"]);
    assert_eq!(operands(&module), [vec![1, 0], vec![1]]);
    let ops: Vec<_> = module.operations().collect();
    assert_eq!(constant_params(ops[1]), [-0.25]);
}

#[test]
fn test_controlled_user_gate_controls_every_op() {
    let module = analyze_ok("gate pair a, b { x a; z b; }\nqubit[3] q;\nctrl @ pair q[2], q[0], q[1];\n");
    for op in module.operations() {
        assert_eq!(op.as_gate().unwrap().controls.len(), 1);
        assert_eq!(op.qubits[0], QubitId(2));
    }
    assert_eq!(operands(&module), [vec![2, 0], vec![2, 1]]);
}

#[test]
fn test_register_broadcast() {
    let module = analyze_ok("qubit[2] a;\nqubit[2] b;\ncx a, b;\nh a;\n");
    assert_eq!(names(&module), ["cx", "cx", "h", "h"]);
    assert_eq!(
        operands(&module),
        [vec![0, 2], vec![1, 3], vec![0], vec![1]]
    );
}

#[test]
fn test_broadcast_length_mismatch() {
    let module = analyze_err("qubit[2] a;\nqubit[3] b;\ncx a, b;\n");
    assert_eq!(kinds(&module), [DiagnosticKind::ArityMismatch]);
    assert_eq!(module.operations().count(), 0);
}

#[test]
fn test_duplicate_operand() {
    let module = analyze_err("qubit[2] q;\ncx q[0], q[0];\n");
    assert_eq!(kinds(&module), [DiagnosticKind::ResourceMisuse]);
}

#[test]
fn test_gate_parameter_count() {
    let module = analyze_err("qubit[1] q;\nrx q[0];\n");
    assert_eq!(kinds(&module), [DiagnosticKind::ArityMismatch]);
}

#[test]
fn test_external_gate_stays_opaque() {
    let config = AnalyzerConfig::builder()
        .with_external_gates(["mygate"])
        .build()
        .unwrap();
    let source = format!(
        "{HEADER}gate mygate(t) a, b {{ rx(t) a; cx a, b; }}\nqubit[2] q;\nmygate(0.5) q[0], q[1];\n"
    );
    let module = analyze_with(&source, &config).unwrap();

    assert_eq!(names(&module), ["mygate"]);
    let text = module.to_source();
    assert!(text.contains("gate mygate"));
    assert!(text.contains("mygate(0.5) q[0], q[1];"));
}

#[test]
fn test_alias_of_slice() {
    let module = analyze_ok("qubit[4] q;\nlet pair = q[1:2];\nh pair;\nx pair[1];\n");
    assert_eq!(operands(&module), [vec![1], vec![2], vec![2]]);
}

// ============================================================================
// Classical control
// ============================================================================

#[test]
fn test_constant_branch_is_folded() {
    let module = analyze_ok(
        "const int n = 2;\nqubit[1] q;\nif (n > 1) { x q[0]; } else { y q[0]; }\n",
    );
    assert_eq!(names(&module), ["x"]);
    assert!(
        module
            .statements()
            .iter()
            .all(|s| matches!(s, FlatStatement::Op(_)))
    );
}

#[test]
fn test_runtime_branch_is_kept() {
    let module = analyze_ok("qubit[2] q;\nbit c;\nc = measure q[0];\nif (c) { x q[1]; } else { z q[1]; }\n");

    match &module.statements()[1] {
        FlatStatement::Branch {
            clbits,
            then_body,
            else_body,
            ..
        } => {
            assert_eq!(clbits, &[ClbitId(0)]);
            assert_eq!(then_body.len(), 1);
            assert_eq!(else_body.len(), 1);
        }
        other => panic!("expected a branch, got {other:?}"),
    }
    assert_eq!(names(&module), ["measure", "x", "z"]);
    assert_eq!(module.depth(), 3);
    assert!(module.to_source().contains("if (c) {"));
}

#[test]
fn test_variable_written_in_runtime_branch_is_emitted() {
    let module = analyze_ok(
        "qubit[1] q;\nbit c;\nint k = 1;\nc = measure q[0];\nif (c) { k = 2; }\nrx(k) q[0];\n",
    );
    assert_eq!(module.declarations().len(), 1);
    let text = module.to_source();
    assert!(text.contains("k = 1;"));
    assert!(text.contains("k = 2;"));
    assert!(text.contains("rx(k) q[0];"));
}

#[test]
fn test_input_parameter_stays_symbolic() {
    let module = analyze_ok("input float theta;\nqubit[1] q;\nrx(theta) q[0];\n");
    let ops: Vec<_> = module.operations().collect();
    assert!(ops[0].as_gate().unwrap().params[0].is_symbolic());
    let text = module.to_source();
    assert!(text.contains("input "));
    assert!(text.contains("rx(theta) q[0];"));
}

#[test]
fn test_constant_needs_constant_initializer() {
    let module = analyze_err("input int n;\nconst int m = n;\n");
    assert_eq!(kinds(&module), [DiagnosticKind::NonConstantBound]);
}

#[test]
fn test_assign_to_constant() {
    let module = analyze_err("const int n = 1;\nn = 2;\n");
    assert_eq!(kinds(&module), [DiagnosticKind::TypeMismatch]);
}

#[test]
fn test_bit_index_assignment_folds() {
    let module = analyze_ok("qubit[1] q;\nbit[2] c = \"00\";\nc[0] = 1;\nif (c == 1) { x q[0]; }\n");
    assert_eq!(names(&module), ["x"]);
}

#[test]
fn test_wide_bit_positions_become_runtime() {
    let module = analyze_ok(
        "qubit[1] q;\nbit[100] b = 5;\nb[70] = 1;\nif (b[70] == 1) { x q[0]; }\n",
    );
    assert_eq!(module.num_clbits(), 100);
    assert_eq!(names(&module), ["x"]);
    assert!(
        module
            .statements()
            .iter()
            .any(|s| matches!(s, FlatStatement::Branch { .. }))
    );

    let module = analyze_ok("qubit[1] q;\nbit[100] b = 5;\nif (b[70] == 1) { x q[0]; }\n");
    assert_eq!(names(&module), ["x"]);
}

// ============================================================================
// Subroutines
// ============================================================================

#[test]
fn test_subroutine_return_value_is_folded() {
    let module = analyze_ok(
        "def add(int a, int b) -> int { return a + b; }\nqubit[1] q;\nint total = add(2, 3);\nfor int i in [1:total] { h q[0]; }\n",
    );
    assert_eq!(module.operations().count(), 5);
}

#[test]
fn test_subroutine_returning_measurement() {
    let module = analyze_ok(
        "def probe(qubit a) -> bit { h a; return measure a; }\nqubit[1] q;\nbit c;\nc = probe(q[0]);\n",
    );
    assert_eq!(names(&module), ["h", "measure"]);
    let ops: Vec<_> = module.operations().collect();
    assert_eq!(ops[1].clbits, [ClbitId(0)]);
}

#[test]
fn test_subroutine_qubit_argument_size() {
    let module = analyze_err("def f(qubit[2] r) { h r; }\nqubit[3] q;\nf(q);\n");
    assert_eq!(kinds(&module), [DiagnosticKind::ArityMismatch]);
}

#[test]
fn test_recursive_subroutine_is_rejected() {
    let module = analyze_err("def f(qubit a) { x a; f(a); }\nqubit[1] q;\nf(q[0]);\nh q[0];\n");

    assert_eq!(kinds(&module), [DiagnosticKind::Unsupported]);
    assert_eq!(names(&module), ["h"]);
}

#[test]
fn test_recursive_gate_is_rejected() {
    let module = analyze_err("gate g a { g a; }\nqubit[1] q;\ng q[0];\nx q[0];\n");
    assert_eq!(kinds(&module), [DiagnosticKind::Unsupported]);
    assert_eq!(names(&module), ["x"]);
}

#[test]
fn test_oversized_control_count() {
    let module = analyze_err("qubit[1] q;\nctrl(4294967295) @ x q[0];\nh q[0];\n");

    assert_eq!(kinds(&module), [DiagnosticKind::ArityMismatch]);
    assert_eq!(names(&module), ["h"]);
}

// ============================================================================
// Declarations and indices
// ============================================================================

#[test]
fn test_redeclaration_keeps_first() {
    let module = analyze_err("qubit[2] q;\nqubit[3] q;\nh q[1];\n");

    assert_eq!(kinds(&module), [DiagnosticKind::Redeclaration]);
    assert_eq!(module.num_qubits(), 2);
    assert_eq!(module.symbol("q").and_then(|s| s.size), Some(2));
    assert_eq!(operands(&module), [vec![1]]);
}

#[test]
fn test_builtin_gate_names_are_reserved() {
    let module = analyze_err("qubit[1] q;\nint s = 1;\nh q[0];\n");

    assert_eq!(kinds(&module), [DiagnosticKind::Redeclaration]);
    assert!(module.diagnostics()[0].message.contains("builtin gate"));
    assert_eq!(names(&module), ["h"]);
}

#[test]
fn test_oversized_register_is_rejected() {
    let module = analyze_err("qubit[4294967295] a;\nqubit[1] b;\nh b[0];\n");

    assert_eq!(kinds(&module), [DiagnosticKind::ResourceMisuse]);
    assert_eq!(module.num_qubits(), 1);
    assert_eq!(operands(&module), [vec![0]]);
}

#[test]
fn test_index_through_alias() {
    let module = analyze_ok(
        "qubit[4] q;\nbit[2] c;\nlet r = q[1:3];\nh r[-1];\nc[1] = measure r[0];\n",
    );
    let ops: Vec<_> = module.operations().collect();
    assert_eq!(ops[0].qubits, [QubitId(3)]);
    assert_eq!(ops[1].qubits, [QubitId(1)]);
    assert_eq!(ops[1].clbits, [ClbitId(1)]);

    let module = analyze_err("qubit[4] q;\nlet r = q[1:2];\nh r[2];\n");
    assert_eq!(kinds(&module), [DiagnosticKind::OutOfRangeIndex]);
}

#[test]
fn test_bare_header_is_clean() {
    let module = match analyze("OPENQASM 3.0;\n") {
        Ok(module) => module,
        Err(err) => panic!("unexpected failure: {err}"),
    };
    assert!(module.diagnostics().is_empty());
    assert_eq!(module.version(), Some("3.0"));
    assert_eq!(module.num_statements(), 0);
}

#[test]
fn test_out_of_range_index_drops_statement() {
    let module = analyze_err("qubit[4] q;\nh q[5];\nx q[0];\n");

    assert_eq!(kinds(&module), [DiagnosticKind::OutOfRangeIndex]);
    assert_eq!(names(&module), ["x"]);
}

#[test]
fn test_negative_index_counts_from_end() {
    let module = analyze_ok("qubit[4] q;\nh q[-1];\n");
    assert_eq!(operands(&module), [vec![3]]);
}

#[test]
fn test_undefined_name() {
    let module = analyze_err("qubit[1] q;\nh r[0];\n");
    assert_eq!(kinds(&module), [DiagnosticKind::UndefinedSymbol]);
}

#[test]
fn test_literal_too_wide() {
    let module = analyze_err("uint[2] v = 7;\n");
    assert_eq!(kinds(&module), [DiagnosticKind::TypeMismatch]);
}

#[test]
fn test_unknown_include() {
    let module = analyze_err("include \"mylib.inc\";\n");
    assert_eq!(kinds(&module), [DiagnosticKind::Unsupported]);
}

#[test]
fn test_parse_errors_become_diagnostics() {
    let err = analyze("OPENQASM 3.0;\nqubit[2] q;\nh q[0]\nx q[1];\n").unwrap_err();
    assert!(
        err.diagnostics()
            .iter()
            .any(|d| d.kind == DiagnosticKind::Syntax)
    );
}

#[test]
fn test_double_measurement_warns() {
    let module = analyze_ok("qubit[1] q;\nmeasure q[0];\nmeasure q[0];\n");

    assert_eq!(module.diagnostics().len(), 1);
    assert_eq!(module.diagnostics()[0].severity, Severity::Warning);
    assert_eq!(module.diagnostics()[0].kind, DiagnosticKind::ResourceMisuse);
}

// ============================================================================
// Error modes and configuration
// ============================================================================

#[test]
fn test_collect_all_reports_every_error() {
    let module = analyze_err("qubit[2] q;\nh q[5];\nh q[6];\nx q[0];\n");
    assert_eq!(module.diagnostics().len(), 2);
    assert_eq!(names(&module), ["x"]);
}

#[test]
fn test_fail_fast_stops_at_first_error() {
    let config = AnalyzerConfig::builder()
        .with_error_mode(ErrorMode::FailFast)
        .build()
        .unwrap();
    let source = format!("{HEADER}qubit[2] q;\nh q[5];\nh q[6];\nx q[0];\n");
    let module = analyze_with(&source, &config).unwrap_err().into_module();

    assert_eq!(module.diagnostics().len(), 1);
    assert_eq!(module.operations().count(), 0);
}

#[test]
fn test_warnings_can_be_fatal() {
    let config = AnalyzerConfig::builder()
        .with_fatal_severity(Severity::Warning)
        .build()
        .unwrap();
    let source = format!("{HEADER}qubit[1] q;\nmeasure q[0];\nmeasure q[0];\n");
    let err = analyze_with(&source, &config).unwrap_err();
    assert_eq!(err.diagnostics()[0].severity, Severity::Warning);
}

#[test]
fn test_device_qubit_limit() {
    let config = AnalyzerConfig::builder()
        .with_device_qubits(2)
        .build()
        .unwrap();
    let source = format!("{HEADER}qubit[3] q;\nh q[2];\n");
    let module = analyze_with(&source, &config).unwrap_err().into_module();

    assert_eq!(kinds(&module), [DiagnosticKind::ResourceMisuse]);
    assert_eq!(module.num_qubits(), 3);
    assert_eq!(module.operations().count(), 1);
}

#[test]
fn test_config_from_yaml() {
    let config = AnalyzerConfig::from_yaml_str(
        "error_mode: fail-fast\nmax_loop_iterations: 64\nexternal_gates: [oracle]\n",
    )
    .unwrap();

    assert_eq!(config.error_mode, ErrorMode::FailFast);
    assert_eq!(config.max_loop_iterations, 64);
    assert!(config.is_external("oracle"));
    assert_eq!(config.fatal_severity, Severity::Error);
}

#[test]
fn test_config_rejects_zero_iterations() {
    assert!(AnalyzerConfig::from_yaml_str("max_loop_iterations: 0\n").is_err());
    assert!(AnalyzerConfig::from_json_str("{\"unitary_tolerance\": -1.0}").is_err());
}

// ============================================================================
// Module queries and transformations
// ============================================================================

#[test]
fn test_gate_counts() {
    let module = analyze_ok("qubit[2] q;\nh q;\ncx q[0], q[1];\nctrl @ x q[1], q[0];\n");
    let counts = module.gate_counts();

    assert_eq!(counts.get("h"), Some(&2));
    assert_eq!(counts.get("cx"), Some(&1));
    assert_eq!(counts.get("ctrl @ x"), Some(&1));
}

#[test]
fn test_measurement_and_barrier_removal() {
    let module = analyze_ok("qubit[2] q;\nbit[2] c;\nh q[0];\nbarrier q;\nc = measure q;\n");
    assert!(module.has_measurements());
    assert!(module.has_barriers());

    let stripped = module.remove_measurements().remove_barriers();
    assert!(!stripped.has_measurements());
    assert!(!stripped.has_barriers());
    assert_eq!(names(&stripped), ["h"]);
    assert_eq!(stripped.num_clbits(), 2);
}

#[test]
fn test_reverse_qubit_order() {
    let module = analyze_ok("qubit[3] q;\ncx q[0], q[1];\n").reverse_qubit_order();
    assert_eq!(operands(&module), [vec![2, 1]]);
}

#[test]
fn test_remove_idle_qubits() {
    let module = analyze_ok("qubit[4] q;\nh q[2];\n");
    assert_eq!(module.used_qubits(), 1);

    let compact = module.remove_idle_qubits();
    assert_eq!(compact.num_qubits(), 1);
    assert_eq!(operands(&compact), [vec![0]]);
}

#[test]
fn test_populate_idle_qubits() {
    let module = analyze_ok("qubit[3] q;\nqubit[1] r;\nh q[1];\nbarrier q;\n");
    assert_eq!(module.used_qubits(), 1);

    let filled = module.populate_idle_qubits();
    assert_eq!(filled.used_qubits(), 4);
    assert_eq!(names(&filled), ["h", "barrier", "id", "id", "id"]);
    assert_eq!(
        operands(&filled)[2..],
        [vec![0], vec![2], vec![3]]
    );
    // The source module is untouched.
    assert_eq!(module.operations().count(), 2);
}

#[test]
fn test_remove_includes() {
    let module = analyze_ok("qubit[1] q;\nh q[0];\n");
    assert!(module.to_source().contains("include \"stdgates.inc\";"));

    let bare = module.remove_includes();
    let emitted = bare.to_source();
    assert!(!emitted.contains("include"));

    let again = match analyze(&emitted) {
        Ok(module) => module,
        Err(err) => panic!("re-analysis failed: {err}\n{emitted}"),
    };
    assert_eq!(names(&again), ["h"]);
}

#[test]
fn test_barrier_without_operands_covers_all_qubits() {
    let module = analyze_ok("qubit[2] a;\nqubit[1] b;\nbarrier;\n");
    assert_eq!(operands(&module), [vec![0, 1, 2]]);
    assert_eq!(module.used_qubits(), 0);
}

#[test]
fn test_diagnostics_json() {
    let module = analyze_err("qubit[1] q;\nh q[3];\n");
    let json = module.diagnostics_json().unwrap();
    assert!(json.contains("out-of-range-index"));
}

// ============================================================================
// Re-emission
// ============================================================================

const ROUND_TRIP: &str = "qubit[3] q;\nbit[3] c;\n\
    for int i in [0:1] { cx q[i], q[i + 1]; }\n\
    ctrl @ rx(pi / 4) q[0], q[2];\n\
    c[0] = measure q[0];\n\
    if (c[0] == 1) { x q[1]; } else { z q[1]; }\n\
    reset q[0];\n\
    c = measure q;\n";

#[test]
fn test_round_trip_preserves_counts() {
    let first = analyze_ok(ROUND_TRIP);
    let emitted = first.to_source();
    let second = match analyze(&emitted) {
        Ok(module) => module,
        Err(err) => panic!("re-analysis failed: {err}\n{emitted}"),
    };

    assert!(second.diagnostics().is_empty());
    assert_eq!(second.num_qubits(), first.num_qubits());
    assert_eq!(second.num_clbits(), first.num_clbits());
    assert_eq!(second.operations().count(), first.operations().count());
}

#[test]
fn test_emission_is_deterministic() {
    let a = analyze_ok(ROUND_TRIP).to_source();
    let b = analyze_ok(ROUND_TRIP).to_source();
    assert_eq!(a, b);
    assert!(a.starts_with("OPENQASM 3.0;\ninclude \"stdgates.inc\";\n"));
}
