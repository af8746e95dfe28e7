#![deny(clippy::all)]

//! Online monitoring of discrete-time Signal Temporal Logic (STL) specifications.
//!
//! A specification is built in three stages:
//!
//! 1. Declare variables and constants on a [`SpecificationBuilder`] and add formulas to it.
//! 2. [`parse`](SpecificationBuilder::parse) the formulas into a [`ParsedSpecification`], which
//!    resolves every identifier and checks the types of every sub-formula.
//! 3. [`pastify`](ParsedSpecification::pastify) the parsed specification. Bounded-future operators
//!    are rewritten into bounded windows over past values and an output delay, producing a
//!    [`PastifiedSpecification`].
//!
//! An [`Evaluator`] then consumes one sample per step and reports the robustness of every output.
//! Robustness is a signed distance to satisfaction: a positive value means the formula holds, a
//! negative value means it is violated, and the magnitude is the margin.
//!
//! ```
//! use pastiche::{Evaluator, PastifyConfig, SpecificationBuilder, VarType, Verdict};
//!
//! let mut builder = SpecificationBuilder::new();
//! let req = builder.declare_var("req", VarType::Float)?;
//! let gnt = builder.declare_var("gnt", VarType::Float)?;
//! builder.formula("out = (req >= 3) implies eventually[0:1](gnt >= 3)");
//!
//! let spec = builder.parse()?.pastify(&PastifyConfig::default())?;
//! let mut evaluator = Evaluator::new(&spec);
//!
//! let mut verdicts = Vec::new();
//! for (step, (r, g)) in [(0.0, 0.0), (4.0, 0.0), (0.0, 2.0)].into_iter().enumerate() {
//!     let sample = spec.sample().with(req, r).with(gnt, g);
//!     verdicts.push(evaluator.update(step, &sample)?.top());
//! }
//!
//! assert_eq!(verdicts[0], Verdict::Pending);
//! assert_eq!(verdicts[2], Verdict::Settled { time: 1, robustness: -1.0 });
//! # Ok::<(), pastiche::Error>(())
//! ```

#[cfg(feature = "batch")]
pub mod batch;
pub mod declarations;
pub mod expr;
pub mod metrics;
pub mod monitor;
pub mod offline;
pub mod parser;
pub mod pastify;
pub mod specification;
pub mod trace;
mod window;

use thiserror::Error;

pub use crate::declarations::{DeclarationError, IoRole, VarId, VarType};
pub use crate::expr::{Expr, OutputId};
pub use crate::monitor::{EvaluationError, Evaluator, Outputs, Sample, Verdict};
pub use crate::parser::ParseError;
pub use crate::pastify::{PastifiedSpecification, PastifyConfig, PastifyError};
pub use crate::specification::{ParsedSpecification, SpecificationBuilder, SpecificationDef};
pub use crate::trace::Trace;

/// Any error produced while building or evaluating a specification.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Declaration(#[from] DeclarationError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Pastify(#[from] PastifyError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[cfg(feature = "batch")]
    #[error(transparent)]
    Batch(#[from] batch::BatchError),
}
