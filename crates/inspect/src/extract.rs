//! Best-effort error summary for a finished run.
//!
//! Finds the first node (in flattened order) whose outcome is a failure or an
//! exception and turns its outcome into one human-readable line. The rule
//! depends on the kind of the failing node:
//!
//! | Kind | Summary |
//! |---|---|
//! | model | raised fault `message (Type)`, else the validation errors, else `Model not found` |
//! | params | the validation errors |
//! | policy | the attached `reason`, else nothing |
//! | lock | `Lock '<label>' was not acquired.` |
//! | try | raised fault `message (Type)` |
//! | options, transaction, step, group | the explicit error string, else nothing |
//!
//! Policy denials are silent unless a reason was attached; every other kind
//! surfaces something whenever the step supplied detail.

use stepline_core::{
    ErrorPayload, ExecutionResult, FlatNode, Flattened, Node, NodeKind, Parameters, StepOutcome,
};

pub const MODEL_NOT_FOUND: &str = "Model not found";

/// The extracted summary plus the raw parameters for display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorSummary {
    /// Empty when the run succeeded or the failing node supplied nothing.
    pub message: String,
    /// Raw parameters, whenever the run captured them.
    pub parameters: Option<Parameters>,
    /// Key of the first failing node.
    pub failed_key: Option<String>,
}

impl ErrorSummary {
    pub fn is_empty(&self) -> bool {
        self.message.is_empty()
    }
}

pub fn extract(flat: &Flattened<'_>, result: &ExecutionResult) -> ErrorSummary {
    let parameters = result.raw_parameters().cloned();
    match first_failure(flat, result) {
        Some((entry, outcome)) => ErrorSummary {
            message: summarize(entry.node, outcome),
            parameters,
            failed_key: Some(entry.node.key().to_string()),
        },
        None => ErrorSummary {
            message: String::new(),
            parameters,
            failed_key: None,
        },
    }
}

fn first_failure<'f, 'a>(
    flat: &'f Flattened<'a>,
    result: &'f ExecutionResult,
) -> Option<(&'f FlatNode<'a>, &'f StepOutcome)> {
    flat.iter().find_map(|entry| {
        result
            .outcome(entry.node.key())
            .filter(|outcome| !outcome.is_success())
            .map(|outcome| (entry, outcome))
    })
}

fn summarize(node: &Node, outcome: &StepOutcome) -> String {
    match node.kind() {
        NodeKind::Model => match outcome.error() {
            Some(ErrorPayload::Raised(fault)) => fault.to_string(),
            Some(ErrorPayload::Invalid(errors)) => errors.to_string(),
            Some(ErrorPayload::Message(_)) | None => MODEL_NOT_FOUND.to_string(),
        },
        NodeKind::Policy => outcome
            .metadata()
            .reason()
            .map(str::to_owned)
            .unwrap_or_default(),
        NodeKind::Lock => format!("Lock '{}' was not acquired.", node.label()),
        NodeKind::Params
        | NodeKind::Try
        | NodeKind::Options
        | NodeKind::Transaction
        | NodeKind::Step
        | NodeKind::Group => describe(outcome.error()),
    }
}

fn describe(payload: Option<&ErrorPayload>) -> String {
    match payload {
        Some(ErrorPayload::Message(message)) => message.clone(),
        Some(ErrorPayload::Raised(fault)) => fault.to_string(),
        Some(ErrorPayload::Invalid(errors)) => errors.to_string(),
        None => String::new(),
    }
}
