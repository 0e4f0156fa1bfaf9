//! The inspector facade: execution flow, error summary and the composite
//! report over one finished run.
//!
//! Every read is pure and repeatable. The inspector borrows the tree and the
//! result; nothing is cached besides the flattened sequence.

use serde::Serialize;
use tracing::warn;

use stepline_core::{ExecutionResult, Flattened, Parameters, StepTree};

use crate::error::InspectError;
use crate::extract::{extract, ErrorSummary};
use crate::render::{trace, FlowTrace};

pub struct Inspector<'a> {
    tree: &'a StepTree,
    result: &'a ExecutionResult,
    flat: Flattened<'a>,
}

/// Machine-readable form of an inspection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectReport {
    pub pipeline: String,
    pub succeeded: bool,
    pub total: usize,
    pub shown: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<String>,
    pub flow: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,
}

impl<'a> Inspector<'a> {
    /// Refuses results whose run has not finished; reading them concurrently
    /// with the writer is undefined.
    pub fn new(tree: &'a StepTree, result: &'a ExecutionResult) -> Result<Self, InspectError> {
        if !result.is_finished() {
            return Err(InspectError::RunInProgress {
                pipeline: tree.name().to_string(),
            });
        }
        for key in result.keys().filter(|k| !tree.contains_key(k)) {
            warn!(pipeline = tree.name(), key, "outcome key not declared in step tree");
        }
        Ok(Inspector {
            tree,
            result,
            flat: tree.flatten(),
        })
    }

    pub fn tree(&self) -> &StepTree {
        self.tree
    }

    pub fn result(&self) -> &ExecutionResult {
        self.result
    }

    pub fn flattened(&self) -> &Flattened<'a> {
        &self.flat
    }

    pub fn trace(&self) -> FlowTrace {
        trace(&self.flat, self.result)
    }

    pub fn execution_flow(&self) -> String {
        self.trace().to_text()
    }

    pub fn summary(&self) -> ErrorSummary {
        extract(&self.flat, self.result)
    }

    /// The error summary; empty when the run succeeded or the failing step
    /// supplied nothing to show.
    pub fn error(&self) -> String {
        self.summary().message
    }

    pub fn parameters(&self) -> Option<&Parameters> {
        self.result.raw_parameters()
    }

    /// Composite human-readable report.
    pub fn inspect(&self) -> String {
        let mut out = format!("Pipeline: {}\n\n{}", self.tree.name(), self.execution_flow());
        let summary = self.summary();
        if !summary.is_empty() {
            out.push_str("\n\nWhy it failed:\n\n");
            out.push_str(&summary.message);
            if let Some(parameters) = &summary.parameters {
                out.push_str("\n\nProvided parameters: ");
                out.push_str(&format_parameters(parameters));
            }
        }
        out
    }

    pub fn report(&self) -> InspectReport {
        let trace = self.trace();
        let summary = self.summary();
        InspectReport {
            pipeline: self.tree.name().to_string(),
            succeeded: summary.failed_key.is_none(),
            total: trace.total,
            shown: trace.shown,
            failed_at: summary.failed_key,
            flow: trace.to_text(),
            error: summary.message,
            parameters: summary.parameters,
        }
    }
}

/// Parameters as a compact JSON object, in capture order.
pub fn format_parameters(parameters: &Parameters) -> String {
    serde_json::to_string(parameters).unwrap_or_else(|_| format!("{:?}", parameters))
}
