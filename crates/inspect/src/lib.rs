//! stepline-inspect: developer-facing views over a finished pipeline run.
//!
//! Consumes a [`StepTree`](stepline_core::StepTree) and the
//! [`ExecutionResult`](stepline_core::ExecutionResult) of one run and
//! produces text:
//!
//! - [`render`] -- the execution trace, truncated at the first failure
//! - [`extract`] -- a single best-effort error summary
//! - [`Inspector`] -- `execution_flow()`, `error()` and the composite
//!   `inspect()` report
//!
//! Nothing here runs steps; the core only interprets outcomes that already
//! exist.

pub mod error;
pub mod extract;
pub mod inspector;
pub mod render;

pub use error::InspectError;
pub use extract::{extract, ErrorSummary, MODEL_NOT_FOUND};
pub use inspector::{format_parameters, InspectReport, Inspector};
pub use render::{render, trace, FlowTrace};
