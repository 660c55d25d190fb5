//! Loop unrolling.
//!
//! Loop bounds must fold to constants. Each iteration runs in its own scope
//! with the loop variable bound as an immutable value, so the body sees a
//! different constant every time round.

use qfold_qasm3::{Expression, ForIterable, RangeExpr, Statement, TypeSpec};
use tracing::{debug, instrument};

use crate::analyzer::{Analyzer, SemResult, Signal};
use crate::consteval::Value;
use crate::diagnostic::DiagnosticKind;
use crate::scope::{ScopeKind, Symbol, SymbolKind};
use crate::types::{ClassicalType, DEFAULT_FLOAT_WIDTH, DEFAULT_INT_WIDTH};

impl Analyzer<'_> {
    #[instrument(level = "debug", skip(self, var_type, iterable, body))]
    pub(crate) fn analyze_for(
        &mut self,
        var_type: Option<&TypeSpec>,
        variable: &str,
        iterable: &ForIterable,
        body: &[Statement],
    ) -> SemResult<Signal> {
        let values = self.iteration_values(iterable)?;
        let ty = match var_type {
            Some(spec) => self.resolve_type(spec)?,
            None => match values.first() {
                Some(Value::Float(_)) => ClassicalType::Float(DEFAULT_FLOAT_WIDTH),
                Some(Value::Bool(_)) => ClassicalType::Bool,
                _ => ClassicalType::Int(DEFAULT_INT_WIDTH),
            },
        };
        let values = values
            .into_iter()
            .map(|v| self.coerce_to(&ty, v))
            .collect::<SemResult<Vec<_>>>()?;
        debug!(iterations = values.len(), "unrolling for loop");

        let saved = self.loop_scope.replace(self.scopes.current());
        let result = self.unroll(variable, &ty, values, body);
        self.loop_scope = saved;
        result
    }

    fn unroll(
        &mut self,
        variable: &str,
        ty: &ClassicalType,
        values: Vec<Value>,
        body: &[Statement],
    ) -> SemResult<Signal> {
        for value in values {
            let symbol = Symbol::new(variable, SymbolKind::ClassicalVariable, self.span)
                .with_type(ty.clone())
                .with_value(Some(value));
            let signal = self.scoped(ScopeKind::Block, |a| {
                a.declare_symbol(symbol)?;
                a.analyze_block(body)
            })?;
            match signal {
                Signal::Break => break,
                Signal::Return(result) => return Ok(Signal::Return(result)),
                Signal::Normal | Signal::Continue => {}
            }
        }
        Ok(Signal::Normal)
    }

    /// The values a `for` loop variable takes, in order.
    fn iteration_values(&mut self, iterable: &ForIterable) -> SemResult<Vec<Value>> {
        match iterable {
            ForIterable::Range(range) => self.range_values(range),
            ForIterable::Set(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    match self.fold(item)? {
                        Some(v) => values.push(v),
                        None => return Err(self.non_constant(item)),
                    }
                }
                Ok(values)
            }
            ForIterable::Expr(expr) => match self.fold(expr)? {
                Some(Value::Array(values)) => Ok(values),
                Some(other) => Err(self.local(
                    DiagnosticKind::TypeMismatch,
                    format!("cannot iterate over {other}"),
                )),
                None => Err(self.non_constant(expr)),
            },
        }
    }

    fn range_values(&mut self, range: &RangeExpr) -> SemResult<Vec<Value>> {
        let (Some(start), Some(end)) = (&range.start, &range.end) else {
            return Err(self.local(
                DiagnosticKind::TypeMismatch,
                "loop ranges need an explicit start and end",
            ));
        };
        let start = self.loop_bound(start)?;
        let end = self.loop_bound(end)?;
        let step = match &range.step {
            Some(step) => self.loop_bound(step)?,
            None => 1,
        };
        if step == 0 {
            return Err(self.structural(
                DiagnosticKind::NonConstantBound,
                "loop step must be non-zero",
            ));
        }

        let (start, end, step) = (i128::from(start), i128::from(end), i128::from(step));
        let count = if (step > 0 && start > end) || (step < 0 && start < end) {
            0
        } else {
            (end - start) / step + 1
        };
        let limit = self.config.max_loop_iterations;
        if count > limit as i128 {
            return Err(self.structural(
                DiagnosticKind::IterationLimit,
                format!("loop runs {count} iterations, more than the limit of {limit}"),
            ));
        }
        Ok((0..count)
            .filter_map(|k| i64::try_from(start + k * step).ok())
            .map(Value::Int)
            .collect())
    }

    fn loop_bound(&mut self, expr: &Expression) -> SemResult<i64> {
        match self.fold(expr)? {
            Some(Value::Int(n)) => Ok(n),
            Some(other) => Err(self.local(
                DiagnosticKind::TypeMismatch,
                format!("loop bounds must be integers, found {other}"),
            )),
            None => Err(self.non_constant(expr)),
        }
    }

    fn non_constant(&self, expr: &Expression) -> crate::analyzer::SemError {
        self.structural(
            DiagnosticKind::NonConstantBound,
            format!(
                "loop bound `{}` is not a compile-time constant",
                qfold_qasm3::print_expression(expr)
            ),
        )
    }

    #[instrument(level = "debug", skip_all)]
    pub(crate) fn analyze_while(
        &mut self,
        condition: &Expression,
        body: &[Statement],
    ) -> SemResult<Signal> {
        let saved = self.loop_scope.replace(self.scopes.current());
        let result = self.iterate_while(condition, body);
        self.loop_scope = saved;
        result
    }

    fn iterate_while(&mut self, condition: &Expression, body: &[Statement]) -> SemResult<Signal> {
        let limit = self.config.max_loop_iterations;
        let mut iterations = 0usize;
        loop {
            let Some(value) = self.fold(condition)? else {
                return Err(self.structural(
                    DiagnosticKind::NonConstantBound,
                    format!(
                        "while condition `{}` depends on runtime values",
                        qfold_qasm3::print_expression(condition)
                    ),
                ));
            };
            let proceed = value.truthy().ok_or_else(|| {
                self.local(
                    DiagnosticKind::TypeMismatch,
                    format!("condition must be boolean, found {value}"),
                )
            })?;
            if !proceed {
                break;
            }
            iterations += 1;
            if iterations > limit {
                return Err(self.structural(
                    DiagnosticKind::IterationLimit,
                    format!("while loop exceeded {limit} iterations"),
                ));
            }
            match self.scoped(ScopeKind::Block, |a| a.analyze_block(body))? {
                Signal::Break => break,
                Signal::Return(result) => return Ok(Signal::Return(result)),
                Signal::Normal | Signal::Continue => {}
            }
        }
        debug!(iterations, "while loop unrolled");
        Ok(Signal::Normal)
    }
}
