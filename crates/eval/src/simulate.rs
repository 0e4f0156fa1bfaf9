//! Scripted simulation of declared pipelines.
//!
//! Every non-group node in a pipeline file may carry a `script` table that
//! decides how its simulated handler behaves:
//!
//! | field     | applies to               | effect                                   |
//! |-----------|--------------------------|------------------------------------------|
//! | `fail`    | options, step, model, policy, transaction | bare failure            |
//! | `error`   | options, step, transaction | failure with this message              |
//! | `raise`   | options, step, model, policy | raises `{ message, type }`           |
//! | `reason`  | policy                   | denied with this reason                  |
//! | `deny`    | policy                   | denied without a reason                  |
//! | `missing` | model                    | record not found                         |
//! | `invalid` | model                    | record fails `[{ attribute, kind }]`     |
//! | `value`   | model                    | record returned when found (default `{}`)|
//! | `held`    | lock                     | lock already held elsewhere              |
//! | `expect`  | any scripted node        | expected boolean return (test mode)      |
//!
//! Params nodes are driven by the input itself.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use stepline_core::{ExecutionResult, Fault, StepTree, ValidationError, ValidationErrors};

use crate::context::RunContext;
use crate::decl::{NodeDecl, PipelineDecl};
use crate::error::SimulateError;
use crate::expect::Expectations;
use crate::handlers::{Handler, Handlers, ModelLookup, PolicyDecision, StepReturn};
use crate::providers::{InMemoryLocks, LockProvider, TransactionProvider};
use crate::runner::Runner;

const DEFAULT_FAULT_TYPE: &str = "SimulatedFault";
const DEFAULT_BEGIN_ERROR: &str = "transaction could not begin";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Script {
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub fail: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raise: Option<RaiseScript>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deny: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub missing: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub invalid: Vec<InvalidScript>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub held: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expect: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaiseScript {
    pub message: String,
    #[serde(rename = "type", default = "default_fault_type")]
    pub type_name: String,
}

fn default_fault_type() -> String {
    DEFAULT_FAULT_TYPE.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidScript {
    pub attribute: String,
    pub kind: String,
}

impl Script {
    pub fn is_empty(&self) -> bool {
        *self == Script::default()
    }

    fn fault(&self) -> Option<Fault> {
        self.raise
            .as_ref()
            .map(|r| Fault::new(r.message.clone(), r.type_name.clone()))
    }

    fn validation_errors(&self) -> ValidationErrors {
        self.invalid
            .iter()
            .map(|i| ValidationError::new(&i.attribute, &i.kind))
            .collect()
    }

    fn step(&self) -> Result<StepReturn, Fault> {
        if let Some(fault) = self.fault() {
            return Err(fault);
        }
        Ok(match &self.error {
            Some(message) => StepReturn::halt_with(message.clone()),
            None if self.fail => StepReturn::halt(),
            None => StepReturn::Continue,
        })
    }

    fn model(&self) -> Result<ModelLookup, Fault> {
        if let Some(fault) = self.fault() {
            return Err(fault);
        }
        if !self.invalid.is_empty() {
            return Ok(ModelLookup::Invalid(self.validation_errors()));
        }
        if self.missing || self.fail {
            return Ok(ModelLookup::Missing);
        }
        let value = self
            .value
            .clone()
            .unwrap_or_else(|| Value::Object(Map::new()));
        Ok(ModelLookup::Found(value))
    }

    fn policy(&self) -> Result<PolicyDecision, Fault> {
        if let Some(fault) = self.fault() {
            return Err(fault);
        }
        Ok(match &self.reason {
            Some(reason) => PolicyDecision::deny_because(reason.clone()),
            None if self.deny || self.fail => PolicyDecision::deny(),
            None => PolicyDecision::Allow,
        })
    }
}

/// Locks whose label is scripted as held elsewhere refuse every resource;
/// the rest behave like [`InMemoryLocks`].
#[derive(Debug, Default)]
pub struct ScriptedLocks {
    held: HashSet<String>,
    inner: InMemoryLocks,
}

impl ScriptedLocks {
    pub fn new() -> Self {
        ScriptedLocks::default()
    }

    pub fn hold(&mut self, label: impl Into<String>) {
        self.held.insert(label.into());
    }
}

impl LockProvider for ScriptedLocks {
    fn acquire(&self, resource: &str) -> bool {
        let label = resource.split_once('=').map_or(resource, |(label, _)| label);
        !self.held.contains(label) && self.inner.acquire(resource)
    }

    fn release(&self, resource: &str) {
        self.inner.release(resource);
    }
}

/// Transactions that refuse to begin when scripted to fail.
#[derive(Debug, Default)]
pub struct ScriptedTransactions {
    refusals: HashMap<String, String>,
}

impl ScriptedTransactions {
    pub fn new() -> Self {
        ScriptedTransactions::default()
    }

    pub fn refuse(&mut self, name: impl Into<String>, message: impl Into<String>) {
        self.refusals.insert(name.into(), message.into());
    }
}

impl TransactionProvider for ScriptedTransactions {
    fn begin(&self, name: &str) -> Result<(), String> {
        match self.refusals.get(name) {
            Some(message) => Err(message.clone()),
            None => Ok(()),
        }
    }

    fn commit(&self, _name: &str) {}

    fn rollback(&self, _name: &str) {}
}

/// Everything a runner needs to play a declared pipeline.
#[derive(Debug, Default)]
pub struct Simulation {
    pub handlers: Handlers,
    pub locks: ScriptedLocks,
    pub transactions: ScriptedTransactions,
    pub expectations: Expectations,
}

impl Simulation {
    pub fn runner(self) -> Runner {
        Runner::new(self.handlers)
            .with_locks(Arc::new(self.locks))
            .with_transactions(Arc::new(self.transactions))
            .with_expectations(self.expectations)
    }

    fn wire(&mut self, decls: &[NodeDecl]) {
        for decl in decls {
            let key = decl.key();
            if let Some(expected) = decl.script().and_then(|s| s.expect) {
                self.expectations.insert(key.clone(), expected);
            }
            match decl {
                NodeDecl::Options { script, .. } | NodeDecl::Step { script, .. } => {
                    let script = script.clone();
                    let f = move |_: &mut RunContext| script.step();
                    self.handlers.add(key, Handler::Step(Box::new(f)));
                }
                NodeDecl::Model { script, .. } => {
                    let script = script.clone();
                    let f = move |_: &RunContext| script.model();
                    self.handlers.add(key, Handler::Model(Box::new(f)));
                }
                NodeDecl::Policy { script, .. } => {
                    let script = script.clone();
                    let f = move |_: &RunContext| script.policy();
                    self.handlers.add(key, Handler::Policy(Box::new(f)));
                }
                NodeDecl::Params { fields, .. } => {
                    self.handlers.add(key, Handler::Params(fields.clone()));
                }
                NodeDecl::Lock { script, .. } => {
                    if script.held {
                        self.locks.hold(decl.label());
                    }
                }
                NodeDecl::Transaction { script, .. } => {
                    if let Some(message) = &script.error {
                        self.transactions.refuse(decl.label(), message.clone());
                    } else if script.fail {
                        self.transactions.refuse(decl.label(), DEFAULT_BEGIN_ERROR);
                    }
                }
                NodeDecl::Try { .. } | NodeDecl::Group { .. } => {}
            }
            self.wire(decl.children());
        }
    }
}

/// Wire simulated handlers and providers from the scripts in `decl`.
pub fn scripted(decl: &PipelineDecl) -> Simulation {
    let mut simulation = Simulation::default();
    simulation.wire(&decl.steps);
    simulation
}

/// Build the tree for `decl` and play it once over `input`.
pub fn simulate(
    decl: &PipelineDecl,
    input: Map<String, Value>,
) -> Result<(StepTree, ExecutionResult), SimulateError> {
    let tree = decl.to_tree()?;
    let result = scripted(decl).runner().run(&tree, input)?;
    Ok((tree, result))
}
