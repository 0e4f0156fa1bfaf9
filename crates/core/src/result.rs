//! Execution results and the single writer that builds them.
//!
//! During a run, [`ExecutionRecorder`] is the only writer. Once
//! [`ExecutionRecorder::finish`] hands out the [`ExecutionResult`] it is
//! read-only. Reading a result while a run is still writing to it is a
//! misuse; results decoded from disk carry a `finished` flag so inspectors
//! can refuse them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::outcome::StepOutcome;

/// Raw input parameters as seen by parameter validation.
pub type Parameters = IndexMap<String, Value>;

/// Outcomes of one pipeline run, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(default)]
    outcomes: IndexMap<String, StepOutcome>,
    #[serde(default)]
    raw_parameters: Option<Parameters>,
    #[serde(default)]
    finished: bool,
}

impl ExecutionResult {
    pub fn outcome(&self, key: &str) -> Option<&StepOutcome> {
        self.outcomes.get(key)
    }

    /// `(key, outcome)` pairs in execution order.
    pub fn outcomes(&self) -> impl Iterator<Item = (&str, &StepOutcome)> {
        self.outcomes.iter().map(|(k, o)| (k.as_str(), o))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.outcomes.keys().map(String::as_str)
    }

    /// `None` when the run never reached parameter validation.
    pub fn raw_parameters(&self) -> Option<&Parameters> {
        self.raw_parameters.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Key of the first non-success outcome, in execution order.
    pub fn halted_at(&self) -> Option<&str> {
        self.outcomes
            .iter()
            .find(|(_, o)| !o.is_success())
            .map(|(k, _)| k.as_str())
    }

    pub fn succeeded(&self) -> bool {
        self.halted_at().is_none()
    }
}

/// Builds an [`ExecutionResult`] during a single run.
#[derive(Debug, Default)]
pub struct ExecutionRecorder {
    result: ExecutionResult,
}

impl ExecutionRecorder {
    pub fn new() -> Self {
        ExecutionRecorder::default()
    }

    /// Append the outcome of a node. Returns `false` (and keeps the first
    /// outcome) when the key was already recorded.
    pub fn record(&mut self, key: impl Into<String>, outcome: StepOutcome) -> bool {
        let key = key.into();
        if self.result.outcomes.contains_key(&key) {
            return false;
        }
        self.result.outcomes.insert(key, outcome);
        true
    }

    /// Capture the raw parameters. Only the first capture is kept.
    pub fn capture_parameters(&mut self, parameters: Parameters) {
        if self.result.raw_parameters.is_none() {
            self.result.raw_parameters = Some(parameters);
        }
    }

    pub fn outcome(&self, key: &str) -> Option<&StepOutcome> {
        self.result.outcome(key)
    }

    pub fn len(&self) -> usize {
        self.result.len()
    }

    pub fn is_empty(&self) -> bool {
        self.result.is_empty()
    }

    pub fn finish(mut self) -> ExecutionResult {
        self.result.finished = true;
        self.result
    }
}
