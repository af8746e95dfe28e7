//! Rewriting of bounded-future formulas into past-only formulas.
//!
//! The future operators `eventually[a:b]` and `always[a:b]` cannot be evaluated at time `t` until
//! the samples up to `t + b` have arrived. Pastification delays such an operator by `b` steps
//! instead: its value is computed at step `t + b` from a window of its operand's past values, and
//! is reported as describing time `t`. Delays accumulate through the formula so that every node
//! carries an output delay `d`, meaning that its value at step `t` describes the original time
//! `t - d`. Nodes that combine operands with different delays read each operand at the lag that
//! lines the operands up in original time.
//!
//! All statements of a specification are lowered into one shared graph. Structurally identical
//! sub-formulas (with identical operand lags) are merged, so a sub-specification referenced by
//! other statements is computed once per step.
use std::collections::HashMap;

use ordered_float::NotNan;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::declarations::{Declarations, VarId, VarType};
use crate::expr::{ArithOp, CmpOp, Connective, Expr, OutputId};
use crate::monitor::{EvaluationError, Sample};
use crate::specification::ParsedSpecification;

/// Relative tolerance used when checking that a bound is a multiple of the sampling period.
const ALIGNMENT_TOLERANCE: f64 = 1e-9;

/// Settings of the pastification transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PastifyConfig {
    /// Largest window, in steps, that any operator may look back over.
    pub max_window: usize,
    /// Time between two consecutive samples. Temporal bounds are divided by this value.
    pub sampling_period: f64,
}

impl Default for PastifyConfig {
    fn default() -> Self {
        Self {
            max_window: 100_000,
            sampling_period: 1.0,
        }
    }
}

impl PastifyConfig {
    pub fn with_max_window(self, max_window: usize) -> Self {
        Self { max_window, ..self }
    }

    pub fn with_sampling_period(self, sampling_period: f64) -> Self {
        Self {
            sampling_period,
            ..self
        }
    }

    pub(crate) fn check_period(&self) -> Result<(), PastifyError> {
        let period = self.sampling_period;

        if !(period.is_finite() && period > 0.0) {
            return Err(PastifyError::InvalidSamplingPeriod(period));
        }

        Ok(())
    }

    /// Convert a bound in time units into a number of steps. The bound must be an exact multiple
    /// of the sampling period.
    pub(crate) fn steps(&self, bound: f64) -> Result<usize, PastifyError> {
        let period = self.sampling_period;
        let exact = bound / period;
        let rounded = exact.round();

        if (exact - rounded).abs() > ALIGNMENT_TOLERANCE * rounded.max(1.0) {
            return Err(PastifyError::UnalignedBound { bound, period });
        }

        let too_large = PastifyError::WindowTooLarge {
            steps: usize::MAX,
            max: self.max_window,
        };

        if !rounded.is_finite() || rounded >= usize::MAX as f64 {
            return Err(too_large);
        }

        let steps = rounded as usize;

        if steps > self.max_window {
            return Err(PastifyError::WindowTooLarge {
                steps,
                max: self.max_window,
            });
        }

        Ok(steps)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PastifyError {
    #[error("window of {steps} steps exceeds the configured maximum of {max}")]
    WindowTooLarge { steps: usize, max: usize },

    #[error("bound {bound} is not a multiple of the sampling period {period}")]
    UnalignedBound { bound: f64, period: f64 },

    #[error("sampling period must be positive and finite, got {0}")]
    InvalidSamplingPeriod(f64),

    #[error("formula graph contains a cycle through node {0}")]
    Cycle(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Aggregate {
    Max,
    Min,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Operator {
    Literal(NotNan<f64>),
    Truth(bool),
    /// Numeric input signal.
    Signal(VarId),
    /// Boolean input signal, read as a robustness value.
    Flag(VarId),
    Negate,
    Abs,
    Arithmetic(ArithOp),
    Comparison(CmpOp),
    Not,
    Connective(Connective),
    Implies,
    /// Aggregate of the single operand over the lags `first..=last`.
    Window { aggregate: Aggregate, first: usize, last: usize },
}

/// Reference from a node to the value its operand produced `lag` steps earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Operand {
    pub node: usize,
    pub lag: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Node {
    pub op: Operator,
    pub operands: Vec<Operand>,
    pub delay: usize,
    /// Number of past values that consumers of this node read, including the current one.
    pub depth: usize,
}

impl Node {
    /// Oldest lag this node reads from its operands, relative to each operand's `lag`.
    fn reach(&self) -> usize {
        match self.op {
            Operator::Window { last, .. } => last,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PastifiedOutput {
    pub name: String,
    /// Number of steps between the arrival of a sample and the report of this output for it.
    pub delay: usize,
    pub(crate) node: usize,
}

struct Lowering<'a> {
    declarations: &'a Declarations,
    config: &'a PastifyConfig,
    nodes: Vec<Node>,
    interned: HashMap<(Operator, Vec<Operand>, usize), usize>,
    graph: DiGraphMap<usize, usize>,
    roots: Vec<usize>,
}

impl<'a> Lowering<'a> {
    fn new(declarations: &'a Declarations, config: &'a PastifyConfig) -> Self {
        Self {
            declarations,
            config,
            nodes: Vec::new(),
            interned: HashMap::new(),
            graph: DiGraphMap::new(),
            roots: Vec::new(),
        }
    }

    fn intern(&mut self, op: Operator, operands: Vec<Operand>, delay: usize) -> usize {
        // A future window and a past window over the same lags differ only by their delay.
        let key = (op, operands, delay);

        if let Some(&id) = self.interned.get(&key) {
            return id;
        }

        let id = self.nodes.len();
        self.graph.add_node(id);

        for operand in &key.1 {
            let lag = self.graph.edge_weight(operand.node, id).copied().unwrap_or(0).max(operand.lag);
            self.graph.add_edge(operand.node, id, lag);
        }

        self.nodes.push(Node {
            op: key.0.clone(),
            operands: key.1.clone(),
            delay,
            depth: 1,
        });
        self.interned.insert(key, id);

        id
    }

    fn pointwise(&mut self, op: Operator, children: &[usize]) -> usize {
        let delay = children.iter().map(|&child| self.nodes[child].delay).max().unwrap_or(0);
        let operands = children
            .iter()
            .map(|&child| Operand {
                node: child,
                lag: delay - self.nodes[child].delay,
            })
            .collect();

        self.intern(op, operands, delay)
    }

    fn unary(&mut self, op: Operator, operand: &Expr) -> Result<usize, PastifyError> {
        let child = self.lower(operand)?;
        Ok(self.pointwise(op, &[child]))
    }

    fn binary(&mut self, op: Operator, left: &Expr, right: &Expr) -> Result<usize, PastifyError> {
        let left = self.lower(left)?;
        let right = self.lower(right)?;
        Ok(self.pointwise(op, &[left, right]))
    }

    fn lower(&mut self, expr: &Expr) -> Result<usize, PastifyError> {
        let id = match expr {
            Expr::Literal(value) => self.intern(Operator::Literal(*value), Vec::new(), 0),
            Expr::Truth(value) => self.intern(Operator::Truth(*value), Vec::new(), 0),
            Expr::Variable(id) => {
                let op = match self.declarations.variable(*id).ty {
                    VarType::Bool => Operator::Flag(*id),
                    VarType::Float | VarType::Int => Operator::Signal(*id),
                };

                self.intern(op, Vec::new(), 0)
            }
            Expr::Output(id) => self.roots[id.index()],
            Expr::Negate(operand) => self.unary(Operator::Negate, operand)?,
            Expr::Abs(operand) => self.unary(Operator::Abs, operand)?,
            Expr::Not(operand) => self.unary(Operator::Not, operand)?,
            Expr::Arithmetic(op, left, right) => self.binary(Operator::Arithmetic(*op), left, right)?,
            Expr::Comparison(op, left, right) => self.binary(Operator::Comparison(*op), left, right)?,
            Expr::Implies(antecedent, consequent) => self.binary(Operator::Implies, antecedent, consequent)?,
            Expr::Connective(connective, operands) => {
                let children = operands
                    .iter()
                    .map(|operand| self.lower(operand))
                    .collect::<Result<Vec<_>, _>>()?;

                self.pointwise(Operator::Connective(*connective), &children)
            }
            Expr::Temporal(op, interval, operand) => {
                let child = self.lower(operand)?;
                let lower = self.config.steps(interval.lower())?;
                let upper = self.config.steps(interval.upper())?;
                let child_delay = self.nodes[child].delay;

                let aggregate = if op.is_universal() { Aggregate::Min } else { Aggregate::Max };
                let (delay, first, last) = if op.is_future() {
                    let delay = child_delay.checked_add(upper).ok_or(PastifyError::WindowTooLarge {
                        steps: usize::MAX,
                        max: self.config.max_window,
                    })?;

                    (delay, 0, upper - lower)
                } else {
                    (child_delay, lower, upper)
                };

                let window = Operator::Window { aggregate, first, last };
                self.intern(window, vec![Operand { node: child, lag: 0 }], delay)
            }
        };

        Ok(id)
    }
}

/// A specification lowered into a graph of past-only operators, ready to be evaluated.
///
/// The specification is immutable and may be shared between threads. Every
/// [`Evaluator`](crate::monitor::Evaluator) built from it owns its own history buffers.
#[derive(Debug, Clone)]
pub struct PastifiedSpecification {
    declarations: Declarations,
    outputs: Vec<PastifiedOutput>,
    nodes: Vec<Node>,
    inputs: Vec<VarId>,
    config: PastifyConfig,
}

impl PastifiedSpecification {
    pub fn new(spec: &ParsedSpecification, config: &PastifyConfig) -> Result<Self, PastifyError> {
        config.check_period()?;

        let mut lowering = Lowering::new(spec.declarations(), config);

        for output in spec.outputs() {
            let root = lowering.lower(&output.formula)?;
            lowering.roots.push(root);
        }

        let Lowering {
            mut nodes, graph, roots, ..
        } = lowering;

        let mut depths = vec![1; nodes.len()];

        for node in &nodes {
            for operand in &node.operands {
                let needed = operand
                    .lag
                    .checked_add(node.reach())
                    .and_then(|lag| lag.checked_add(1))
                    .ok_or(PastifyError::WindowTooLarge {
                        steps: usize::MAX,
                        max: config.max_window,
                    })?;

                depths[operand.node] = depths[operand.node].max(needed);
            }
        }

        for (node, depth) in nodes.iter_mut().zip(depths) {
            if depth - 1 > config.max_window {
                return Err(PastifyError::WindowTooLarge {
                    steps: depth - 1,
                    max: config.max_window,
                });
            }

            node.depth = depth;
        }

        let order = toposort(&graph, None).map_err(|cycle| PastifyError::Cycle(cycle.node_id()))?;
        let mut position = vec![0; nodes.len()];

        for (index, &id) in order.iter().enumerate() {
            position[id] = index;
        }

        let mut ordered: Vec<Option<Node>> = nodes.into_iter().map(Some).collect();
        let nodes: Vec<Node> = order
            .iter()
            .filter_map(|&id| ordered[id].take())
            .map(|mut node| {
                for operand in node.operands.iter_mut() {
                    operand.node = position[operand.node];
                }

                node
            })
            .collect();

        let outputs: Vec<PastifiedOutput> = spec
            .outputs()
            .iter()
            .zip(roots)
            .map(|(output, root)| PastifiedOutput {
                name: output.name.clone(),
                delay: nodes[position[root]].delay,
                node: position[root],
            })
            .collect();

        let mut inputs: Vec<VarId> = nodes
            .iter()
            .filter_map(|node| match node.op {
                Operator::Signal(id) | Operator::Flag(id) => Some(id),
                _ => None,
            })
            .collect();

        inputs.sort();
        inputs.dedup();

        let pastified = Self {
            declarations: spec.declarations().clone(),
            outputs,
            nodes,
            inputs,
            config: *config,
        };

        debug!(
            nodes = pastified.nodes.len(),
            inputs = pastified.inputs.len(),
            max_delay = pastified.max_delay(),
            history = pastified.history_size(),
            "pastified specification"
        );

        for output in &pastified.outputs {
            debug!(output = %output.name, delay = output.delay, "output delay");
        }

        Ok(pastified)
    }

    pub fn declarations(&self) -> &Declarations {
        &self.declarations
    }

    pub fn config(&self) -> &PastifyConfig {
        &self.config
    }

    pub fn outputs(&self) -> &[PastifiedOutput] {
        &self.outputs
    }

    pub fn output(&self, id: OutputId) -> &PastifiedOutput {
        &self.outputs[id.index()]
    }

    pub fn output_id(&self, name: &str) -> Option<OutputId> {
        self.outputs.iter().position(|output| output.name == name).map(OutputId)
    }

    /// Handle of the top-level formula.
    pub fn top(&self) -> OutputId {
        OutputId(self.outputs.len() - 1)
    }

    /// Largest output delay, in steps.
    pub fn max_delay(&self) -> usize {
        self.outputs.iter().map(|output| output.delay).max().unwrap_or(0)
    }

    /// Variables that must be present in every sample.
    pub fn inputs(&self) -> &[VarId] {
        &self.inputs
    }

    /// Number of distinct operator nodes after merging shared sub-formulas.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Total number of values retained by an evaluator of this specification.
    pub fn history_size(&self) -> usize {
        self.nodes.iter().fold(0, |total, node| total.saturating_add(node.depth))
    }

    pub(crate) fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// An empty sample with room for every declared variable.
    pub fn sample(&self) -> Sample {
        Sample::new(self.declarations.len())
    }

    /// Build a sample from name/value pairs.
    pub fn sample_from<'a, I>(&self, pairs: I) -> Result<Sample, EvaluationError>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut sample = self.sample();

        for (name, value) in pairs {
            let id = self
                .declarations
                .resolve(name)
                .ok_or_else(|| EvaluationError::UnknownVariable(name.to_string()))?;

            sample.set(id, value);
        }

        Ok(sample)
    }
}
