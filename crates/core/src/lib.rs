//! stepline-core: step trees and the execution-result model.
//!
//! A pipeline is declared once as a [`StepTree`] and run many times. Each run
//! produces an [`ExecutionResult`]: one [`StepOutcome`] per node that actually
//! ran, keyed by the node's key. [`flatten()`] derives the canonical numbered
//! sequence from the declaration alone, so numbering never depends on where
//! a run stopped.
//!
//! # Public API
//!
//! - [`StepTree`], [`TreeBuilder`], [`Node`], [`NodeKind`] -- the static tree
//! - [`flatten()`], [`Flattened`], [`FlatNode`] -- canonical numbering
//! - [`StepOutcome`], [`StepStatus`], [`ErrorPayload`], [`Fault`], [`Metadata`]
//! - [`ExecutionResult`], [`ExecutionRecorder`] -- per-run outcome mapping
//! - [`ValidationErrors`] -- validation-error collections
//! - [`TreeError`], [`OutcomeError`] -- declaration and decoding errors

pub mod error;
pub mod flatten;
pub mod outcome;
pub mod result;
pub mod tree;
pub mod validation;

pub use error::{OutcomeError, TreeError};
pub use flatten::{flatten, FlatNode, Flattened};
pub use outcome::{millis, ErrorPayload, Fault, Metadata, StepOutcome, StepStatus, Unexpected};
pub use result::{ExecutionRecorder, ExecutionResult, Parameters};
pub use tree::{lock_label, node_key, Node, NodeKind, StepTree, TreeBuilder};
pub use validation::{ValidationError, ValidationErrors};
