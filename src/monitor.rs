//! Incremental evaluation of pastified specifications.
//!
//! An [`Evaluator`] consumes one [`Sample`] per step and reports the robustness of every output
//! of the specification. Outputs of formulas that look into the future are reported late: an
//! output with a delay of `d` steps reports, at step `t`, the robustness of the formula at time
//! `t - d`, and is [`Verdict::Pending`] while `t < d`.
//!
//! Windows that reach before the start of the trace only aggregate the values that exist. A
//! window that contains no value at all reports the identity element of its aggregation:
//! `-inf` for `eventually`/`once`, `+inf` for `always`/`historically`.
//!
//! An arithmetic term without a value, such as `0 / 0`, produces a NaN robustness. NaN is carried
//! through every connective and window that reads it, so it is never replaced by a real number.
//!
//! ```
//! use pastiche::declarations::VarType;
//! use pastiche::monitor::{Evaluator, Verdict};
//! use pastiche::pastify::PastifyConfig;
//! use pastiche::specification::SpecificationBuilder;
//!
//! let mut builder = SpecificationBuilder::new();
//! let speed = builder.declare_var("speed", VarType::Float).unwrap();
//! builder.formula("eventually[0:1](speed <= 10)");
//!
//! let spec = builder.parse().unwrap().pastify(&PastifyConfig::default()).unwrap();
//! let mut evaluator = Evaluator::new(&spec);
//!
//! let outputs = evaluator.update(0, &spec.sample().with(speed, 12.0)).unwrap();
//! assert_eq!(outputs.top(), Verdict::Pending);
//!
//! let outputs = evaluator.update(1, &spec.sample().with(speed, 4.0)).unwrap();
//! assert_eq!(outputs.top(), Verdict::Settled { time: 0, robustness: 6.0 });
//! ```
use std::fmt::{Debug, Formatter};
use std::ops::Index;

use thiserror::Error;
use tracing::{trace, warn};

use crate::declarations::{VarId, VarType};
use crate::expr::{Connective, OutputId};
use crate::metrics::{infimum, supremum, Bottom, Join, Meet, Top};
use crate::pastify::{Aggregate, Node, Operand, Operator, PastifiedSpecification, PastifyError};
use crate::window::History;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("expected step {expected}, found step {found}")]
    OutOfOrder { expected: usize, found: usize },

    #[error("no value for variable \"{0}\"")]
    MissingVariable(String),

    #[error("invalid value {value} for {ty} variable \"{name}\"")]
    InvalidValue { name: String, ty: VarType, value: f64 },

    #[error("unknown variable \"{0}\"")]
    UnknownVariable(String),

    #[error("evaluator cannot be used after a previous error")]
    Poisoned,

    #[error(transparent)]
    Bounds(#[from] PastifyError),
}

/// Values of the variables at one step, indexed by [`VarId`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sample {
    values: Vec<Option<f64>>,
}

impl Sample {
    pub fn new(len: usize) -> Self {
        Self { values: vec![None; len] }
    }

    pub fn set(&mut self, id: VarId, value: f64) -> &mut Self {
        if id.0 >= self.values.len() {
            self.values.resize(id.0 + 1, None);
        }

        self.values[id.0] = Some(value);
        self
    }

    pub fn with(mut self, id: VarId, value: f64) -> Self {
        self.set(id, value);
        self
    }

    pub fn get(&self, id: VarId) -> Option<f64> {
        self.values.get(id.0).copied().flatten()
    }

    /// Remove every value, keeping the allocation.
    pub fn clear(&mut self) {
        self.values.iter_mut().for_each(|value| *value = None);
    }
}

/// Robustness reported for one output at one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// Not enough samples have arrived to describe any time of the trace yet.
    Pending,
    /// The robustness of the output at original time `time`.
    Settled { time: usize, robustness: f64 },
}

impl Verdict {
    pub fn robustness(&self) -> Option<f64> {
        match self {
            Self::Pending => None,
            Self::Settled { robustness, .. } => Some(*robustness),
        }
    }

    pub fn time(&self) -> Option<usize> {
        match self {
            Self::Pending => None,
            Self::Settled { time, .. } => Some(*time),
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Settled { .. })
    }
}

/// Verdicts of every output for one step.
#[derive(Clone)]
pub struct Outputs<'a> {
    spec: &'a PastifiedSpecification,
    step: usize,
    verdicts: Vec<Verdict>,
}

impl<'a> Outputs<'a> {
    /// The step that produced these verdicts.
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn verdict(&self, id: OutputId) -> Verdict {
        self.verdicts[id.index()]
    }

    /// Look up the verdict of an output by name.
    pub fn get(&self, name: &str) -> Option<Verdict> {
        self.spec.output_id(name).map(|id| self.verdict(id))
    }

    /// Verdict of the top-level formula.
    pub fn top(&self) -> Verdict {
        self.verdict(self.spec.top())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, Verdict)> + '_ {
        self.spec
            .outputs()
            .iter()
            .zip(&self.verdicts)
            .map(|(output, verdict)| (output.name.as_str(), *verdict))
    }

    pub fn len(&self) -> usize {
        self.verdicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verdicts.is_empty()
    }
}

impl<'a> Debug for Outputs<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'a> PartialEq for Outputs<'a> {
    fn eq(&self, other: &Self) -> bool {
        self.step == other.step && self.verdicts == other.verdicts
    }
}

impl<'a> Index<OutputId> for Outputs<'a> {
    type Output = Verdict;

    fn index(&self, id: OutputId) -> &Self::Output {
        &self.verdicts[id.index()]
    }
}

/// Online monitor state for a single trace.
///
/// Any error returned by [`update`](Evaluator::update) leaves the evaluator unusable: every later
/// call fails with [`EvaluationError::Poisoned`]. A new trace needs a new evaluator.
#[derive(Debug, Clone)]
pub struct Evaluator<'a> {
    spec: &'a PastifiedSpecification,
    histories: Vec<History>,
    next_step: usize,
    poisoned: bool,
}

impl<'a> Evaluator<'a> {
    pub fn new(spec: &'a PastifiedSpecification) -> Self {
        let histories = spec.nodes().iter().map(|node| History::new(node.depth)).collect();

        Self {
            spec,
            histories,
            next_step: 0,
            poisoned: false,
        }
    }

    pub fn spec(&self) -> &'a PastifiedSpecification {
        self.spec
    }

    /// The step the next call to [`update`](Evaluator::update) must provide.
    pub fn next_step(&self) -> usize {
        self.next_step
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Consume the sample for `step` and report the verdict of every output.
    pub fn update(&mut self, step: usize, sample: &Sample) -> Result<Outputs<'a>, EvaluationError> {
        if self.poisoned {
            return Err(EvaluationError::Poisoned);
        }

        if let Err(error) = self.check(step, sample) {
            warn!(step, %error, "evaluator poisoned");
            self.poisoned = true;
            return Err(error);
        }

        let outputs = self.advance(Some(sample), None);
        trace!(step, top = ?outputs.top(), "evaluated step");

        Ok(outputs)
    }

    /// Signal the end of the trace and report the outputs for the times that are still pending.
    ///
    /// Windows that extend past the end of the trace only aggregate the samples that exist, so the
    /// reported values are the ones an offline evaluation of the whole trace computes.
    pub fn finish(mut self) -> Result<Vec<Outputs<'a>>, EvaluationError> {
        if self.poisoned {
            return Err(EvaluationError::Poisoned);
        }

        let end = self.next_step;
        let drained = (0..self.spec.max_delay()).map(|_| self.advance(None, Some(end))).collect();

        Ok(drained)
    }

    fn check(&self, step: usize, sample: &Sample) -> Result<(), EvaluationError> {
        if step != self.next_step {
            return Err(EvaluationError::OutOfOrder {
                expected: self.next_step,
                found: step,
            });
        }

        let declarations = self.spec.declarations();

        for &id in self.spec.inputs() {
            let variable = declarations.variable(id);

            match sample.get(id) {
                None => return Err(EvaluationError::MissingVariable(variable.name.clone())),
                Some(value) if !variable.ty.admits(value) => {
                    return Err(EvaluationError::InvalidValue {
                        name: variable.name.clone(),
                        ty: variable.ty,
                        value,
                    })
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    fn advance(&mut self, sample: Option<&Sample>, end: Option<usize>) -> Outputs<'a> {
        let spec = self.spec;
        let step = self.next_step;

        for (index, node) in spec.nodes().iter().enumerate() {
            // The node describes time `step - delay`, which must lie within the trace.
            let within = step >= node.delay && !matches!(end, Some(end) if step - node.delay >= end);
            let value = if within { self.evaluate(node, sample) } else { None };

            self.histories[index].push(value);
        }

        self.next_step += 1;

        let verdicts = spec
            .outputs()
            .iter()
            .map(|output| match self.histories[output.node].get(0) {
                Some(robustness) => Verdict::Settled {
                    time: step - output.delay,
                    robustness,
                },
                None => Verdict::Pending,
            })
            .collect();

        Outputs { spec, step, verdicts }
    }

    fn read(&self, operand: &Operand) -> Option<f64> {
        self.histories[operand.node].get(operand.lag)
    }

    fn evaluate(&self, node: &Node, sample: Option<&Sample>) -> Option<f64> {
        let operands = &node.operands;

        let value = match &node.op {
            Operator::Literal(value) => value.into_inner(),
            Operator::Truth(true) => f64::top(),
            Operator::Truth(false) => f64::bottom(),
            Operator::Signal(id) => sample?.get(*id)?,
            Operator::Flag(id) => match sample?.get(*id)? {
                value if value != 0.0 => f64::top(),
                _ => f64::bottom(),
            },
            Operator::Negate | Operator::Not => -self.read(&operands[0])?,
            Operator::Abs => self.read(&operands[0])?.abs(),
            Operator::Arithmetic(op) => op.apply(self.read(&operands[0])?, self.read(&operands[1])?),
            Operator::Comparison(op) => op.robustness(self.read(&operands[0])?, self.read(&operands[1])?),
            Operator::Implies => {
                let antecedent = self.read(&operands[0])?;
                let consequent = self.read(&operands[1])?;

                Join::max(&-antecedent, &consequent)
            }
            Operator::Connective(Connective::And) => operands
                .iter()
                .try_fold(f64::top(), |acc, operand| self.read(operand).map(|value| Meet::min(&acc, &value)))?,
            Operator::Connective(Connective::Or) => operands
                .iter()
                .try_fold(f64::bottom(), |acc, operand| self.read(operand).map(|value| Join::max(&acc, &value)))?,
            Operator::Window { aggregate, first, last } => {
                let operand = &operands[0];
                let values = self.histories[operand.node].window(operand.lag + first..=operand.lag + last);

                match aggregate {
                    Aggregate::Max => supremum(values),
                    Aggregate::Min => infimum(values),
                }
            }
        };

        Some(value)
    }
}
