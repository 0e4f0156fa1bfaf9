//! Mutable state threaded through one run.

use indexmap::IndexMap;
use serde_json::{Map, Value};

/// What steps can see and write while a pipeline runs.
///
/// `input` is the raw input as handed to the runner. `params` holds the
/// validated parameters once the params step has run; `models` the records
/// fetched by model steps; `values` anything else steps want to pass along.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    input: Map<String, Value>,
    params: IndexMap<String, Value>,
    models: IndexMap<String, Value>,
    values: IndexMap<String, Value>,
}

impl RunContext {
    pub fn new(input: Map<String, Value>) -> Self {
        RunContext {
            input,
            ..RunContext::default()
        }
    }

    pub fn input(&self) -> &Map<String, Value> {
        &self.input
    }

    /// Validated parameter, falling back to the raw input before validation.
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name).or_else(|| self.input.get(name))
    }

    pub fn params(&self) -> &IndexMap<String, Value> {
        &self.params
    }

    pub(crate) fn set_params(&mut self, params: IndexMap<String, Value>) {
        self.params = params;
    }

    pub fn model(&self, name: &str) -> Option<&Value> {
        self.models.get(name)
    }

    pub(crate) fn insert_model(&mut self, name: &str, value: Value) {
        self.models.insert(name.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }
}
