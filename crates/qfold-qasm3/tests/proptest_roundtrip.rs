//! Property-based tests for print/parse round trips.
//!
//! Printing a tree and reparsing the text must be a fixed point: the second
//! print is byte-identical to the first.

use proptest::prelude::*;
use qfold_qasm3::{
    BinOp, Expression, GateCall, GateModifier, IndexItem, Program, Statement, StmtKind, UnaryOp,
    parse, print_expression, print_program,
};

fn arb_leaf() -> impl Strategy<Value = Expression> {
    prop_oneof![
        (0_u64..1000).prop_map(Expression::Int),
        (0.0_f64..100.0).prop_map(Expression::Float),
        Just(Expression::Pi),
        Just(Expression::Tau),
        prop::sample::select(vec!["a", "b", "theta"])
            .prop_map(|s| Expression::Identifier(s.to_string())),
    ]
}

fn arb_binop() -> impl Strategy<Value = BinOp> {
    prop::sample::select(vec![
        BinOp::Add,
        BinOp::Sub,
        BinOp::Mul,
        BinOp::Div,
        BinOp::Pow,
        BinOp::Lt,
        BinOp::Eq,
        BinOp::And,
        BinOp::BitXor,
        BinOp::LShift,
    ])
}

fn arb_expr() -> impl Strategy<Value = Expression> {
    arb_leaf().prop_recursive(4, 32, 2, |inner| {
        prop_oneof![
            (inner.clone(), arb_binop(), inner.clone()).prop_map(|(l, op, r)| {
                Expression::BinOp {
                    left: Box::new(l),
                    op,
                    right: Box::new(r),
                }
            }),
            inner.clone().prop_map(|e| Expression::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(e),
            }),
            inner.clone().prop_map(|e| Expression::FnCall {
                name: "sin".into(),
                args: vec![e],
            }),
            inner.prop_map(|e| Expression::Paren(Box::new(e))),
        ]
    })
}

fn qubit(index: u64) -> Expression {
    Expression::Index {
        base: Box::new(Expression::Identifier("q".into())),
        items: vec![IndexItem::Single(Expression::Int(index))],
    }
}

fn arb_modifier() -> impl Strategy<Value = GateModifier> {
    prop_oneof![
        Just(GateModifier::Inv),
        Just(GateModifier::Ctrl(None)),
        Just(GateModifier::NegCtrl(Some(Expression::Int(1)))),
        (1_u64..4).prop_map(|n| GateModifier::Pow(Expression::Int(n))),
    ]
}

fn arb_statement() -> impl Strategy<Value = StmtKind> {
    prop_oneof![
        (arb_expr(), 0_u64..4).prop_map(|(angle, q)| StmtKind::Gate(GateCall {
            name: "rz".into(),
            params: vec![angle],
            qubits: vec![qubit(q)],
            modifiers: vec![],
        })),
        (prop::collection::vec(arb_modifier(), 0..3), 0_u64..4).prop_map(|(modifiers, q)| {
            StmtKind::Gate(GateCall {
                name: "x".into(),
                params: vec![],
                qubits: vec![qubit(q), qubit(q + 4)],
                modifiers,
            })
        }),
        arb_expr().prop_map(|value| StmtKind::Alias {
            name: "v".into(),
            value,
        }),
        (0_u64..4).prop_map(|q| StmtKind::Reset(qubit(q))),
    ]
}

fn arb_program() -> impl Strategy<Value = Program> {
    prop::collection::vec(arb_statement(), 1..8).prop_map(|kinds| Program {
        version: Some("3.0".into()),
        statements: kinds
            .into_iter()
            .map(|kind| Statement::new(kind, Default::default()))
            .collect(),
    })
}

proptest! {
    #[test]
    fn expression_print_is_fixed_point(expr in arb_expr()) {
        let printed = print_expression(&expr);
        let (program, errors) = parse(&format!("let e = {printed};"));
        prop_assert!(errors.is_empty(), "{printed}: {errors:?}");
        let StmtKind::Alias { value, .. } = &program.statements[0].kind else {
            panic!("expected alias");
        };
        prop_assert_eq!(print_expression(value), printed);
    }

    #[test]
    fn program_print_is_fixed_point(program in arb_program()) {
        let printed = print_program(&program);
        let (reparsed, errors) = parse(&printed);
        prop_assert!(errors.is_empty(), "{printed}: {errors:?}");
        prop_assert_eq!(reparsed.statements.len(), program.statements.len());
        prop_assert_eq!(print_program(&reparsed), printed);
    }

    #[test]
    fn printed_constants_evaluate_the_same(expr in arb_expr()) {
        if let Some(value) = expr.as_f64() {
            let (program, _) = parse(&format!("let e = {};", print_expression(&expr)));
            let StmtKind::Alias { value: reparsed, .. } = &program.statements[0].kind else {
                panic!("expected alias");
            };
            let again = reparsed.as_f64().unwrap_or(f64::NAN);
            prop_assert!(
                (value.is_nan() && again.is_nan()) || value == again
                    || (value - again).abs() <= 1e-9 * value.abs().max(1.0),
                "{value} vs {again}"
            );
        }
    }
}
