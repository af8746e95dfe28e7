//! Offline evaluation of a specification over a complete trace.
//!
//! The offline evaluator has access to every sample of the trace, so future operators are
//! evaluated directly by scanning forward from each time. It computes the reference semantics
//! that an [`Evaluator`](crate::monitor::Evaluator) reproduces incrementally: the online value of
//! an output settled for time `t` equals the offline value at time `t`.
//!
//! Windows only aggregate the times that are present in the trace. For a given time `t` the
//! windows of the temporal operators are:
//!
//! | operator               | window               | empty window |
//! | ---------------------- | -------------------- | ------------ |
//! | `eventually[a:b](phi)` | `t + a ..= t + b`    | `-inf`       |
//! | `always[a:b](phi)`     | `t + a ..= t + b`    | `+inf`       |
//! | `once[a:b](phi)`       | `t - b ..= t - a`    | `-inf`       |
//! | `historically[a:b](phi)` | `t - b ..= t - a`  | `+inf`       |
use crate::declarations::{Declarations, VarType};
use crate::expr::{Connective, Expr, TemporalOp};
use crate::metrics::{infimum, supremum, Bottom, Join, Meet, Top};
use crate::monitor::{EvaluationError, Sample};
use crate::pastify::PastifyConfig;
use crate::specification::ParsedSpecification;
use crate::trace::Trace;

struct Offline<'a> {
    declarations: &'a Declarations,
    trace: &'a Trace<Sample>,
    config: PastifyConfig,
    outputs: Vec<Trace<f64>>,
}

impl<'a> Offline<'a> {
    fn pointwise<F>(&self, operand: &Expr, f: F) -> Result<Trace<f64>, EvaluationError>
    where
        F: Fn(f64) -> f64,
    {
        Ok(self.evaluate(operand)?.map_states(f))
    }

    fn zip<F>(&self, left: &Expr, right: &Expr, f: F) -> Result<Trace<f64>, EvaluationError>
    where
        F: Fn(f64, f64) -> f64,
    {
        let left = self.evaluate(left)?;
        let right = self.evaluate(right)?;

        Ok(left
            .into_iter()
            .zip(right.states())
            .map(|((time, l), r)| (time, f(l, *r)))
            .collect())
    }

    fn temporal(&self, op: TemporalOp, lower: usize, upper: usize, operand: &Expr) -> Result<Trace<f64>, EvaluationError> {
        let inner = self.evaluate(operand)?;

        let evaluate_time = |time: usize| {
            let values: Vec<f64> = if op.is_future() {
                inner.window(time.saturating_add(lower)..=time.saturating_add(upper)).copied().collect()
            } else if time >= lower {
                inner.window(time.saturating_sub(upper)..=time - lower).copied().collect()
            } else {
                Vec::new()
            };

            let value = if op.is_universal() { infimum(values) } else { supremum(values) };

            (time, value)
        };

        Ok(inner.times().map(evaluate_time).collect())
    }

    fn evaluate(&self, expr: &Expr) -> Result<Trace<f64>, EvaluationError> {
        let constant = |value: f64| -> Trace<f64> { self.trace.times().map(|time| (time, value)).collect() };

        match expr {
            Expr::Literal(value) => Ok(constant(value.into_inner())),
            Expr::Truth(true) => Ok(constant(f64::top())),
            Expr::Truth(false) => Ok(constant(f64::bottom())),
            Expr::Variable(id) => {
                let variable = self.declarations.variable(*id);

                self.trace
                    .iter()
                    .map(|(time, sample)| {
                        let value = sample
                            .get(*id)
                            .ok_or_else(|| EvaluationError::MissingVariable(variable.name.clone()))?;

                        match variable.ty {
                            VarType::Bool if value != 0.0 => Ok((time, f64::top())),
                            VarType::Bool => Ok((time, f64::bottom())),
                            VarType::Float | VarType::Int => Ok((time, value)),
                        }
                    })
                    .collect()
            }
            Expr::Output(id) => Ok(self.outputs[id.index()].clone()),
            Expr::Negate(operand) | Expr::Not(operand) => self.pointwise(operand, |value| -value),
            Expr::Abs(operand) => self.pointwise(operand, f64::abs),
            Expr::Arithmetic(op, left, right) => self.zip(left, right, |l, r| op.apply(l, r)),
            Expr::Comparison(op, left, right) => self.zip(left, right, |l, r| op.robustness(l, r)),
            Expr::Implies(antecedent, consequent) => self.zip(antecedent, consequent, |a, c| Join::max(&-a, &c)),
            Expr::Connective(connective, operands) => {
                let first = self.evaluate(&operands.head)?;

                operands.tail.iter().try_fold(first, |acc, operand| {
                    let combine: fn(f64, f64) -> f64 = match connective {
                        Connective::And => |l: f64, r: f64| Meet::min(&l, &r),
                        Connective::Or => |l: f64, r: f64| Join::max(&l, &r),
                    };

                    let next = self.evaluate(operand)?;

                    Ok(acc
                        .into_iter()
                        .zip(next.states())
                        .map(|((time, l), r)| (time, combine(l, *r)))
                        .collect())
                })
            }
            Expr::Temporal(op, interval, operand) => {
                let lower = self.config.steps(interval.lower())?;
                let upper = self.config.steps(interval.upper())?;

                self.temporal(*op, lower, upper, operand)
            }
        }
    }
}

/// Evaluate every output of `spec` over a complete trace.
///
/// The times of the trace are steps; `sampling_period` converts the bounds of temporal operators
/// from time units into steps. A bound that is not a multiple of the period, or a period that is
/// not positive and finite, is rejected like it is by pastification. The returned traces are
/// ordered like [`ParsedSpecification::outputs`].
pub fn evaluate(
    spec: &ParsedSpecification,
    trace: &Trace<Sample>,
    sampling_period: f64,
) -> Result<Vec<Trace<f64>>, EvaluationError> {
    let config = PastifyConfig::default()
        .with_max_window(usize::MAX)
        .with_sampling_period(sampling_period);
    config.check_period()?;

    let mut offline = Offline {
        declarations: spec.declarations(),
        trace,
        config,
        outputs: Vec::with_capacity(spec.outputs().len()),
    };

    for output in spec.outputs() {
        let robustness = offline.evaluate(&output.formula)?;
        offline.outputs.push(robustness);
    }

    Ok(offline.outputs)
}
