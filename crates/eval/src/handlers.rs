//! Handler registry: the code behind each declared node.
//!
//! Handlers are registered under the key of the node they serve. Group
//! nodes (lock, transaction, try, group) need no handler; their behavior is
//! fixed by the runner and its providers.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use stepline_core::{node_key, Fault, NodeKind, ValidationErrors};

use crate::context::RunContext;
use crate::params::ParamsContract;

/// What an options or plain step returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepReturn {
    Continue,
    /// Stop the pipeline, optionally with an explicit error message.
    Halt { error: Option<String> },
}

impl StepReturn {
    pub fn halt() -> Self {
        StepReturn::Halt { error: None }
    }

    pub fn halt_with(error: impl Into<String>) -> Self {
        StepReturn::Halt {
            error: Some(error.into()),
        }
    }
}

/// What a model step found.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelLookup {
    Found(Value),
    Missing,
    /// The record exists but does not pass its own validations.
    Invalid(ValidationErrors),
}

impl From<Option<Value>> for ModelLookup {
    fn from(value: Option<Value>) -> Self {
        match value {
            Some(Value::Null) | None => ModelLookup::Missing,
            Some(v) => ModelLookup::Found(v),
        }
    }
}

/// Authorization decision of a policy step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny { reason: Option<String> },
}

impl PolicyDecision {
    pub fn deny() -> Self {
        PolicyDecision::Deny { reason: None }
    }

    pub fn deny_because(reason: impl Into<String>) -> Self {
        PolicyDecision::Deny {
            reason: Some(reason.into()),
        }
    }
}

impl From<bool> for PolicyDecision {
    fn from(allowed: bool) -> Self {
        if allowed {
            PolicyDecision::Allow
        } else {
            PolicyDecision::deny()
        }
    }
}

pub type StepFn = Box<dyn Fn(&mut RunContext) -> Result<StepReturn, Fault>>;
pub type ModelFn = Box<dyn Fn(&RunContext) -> Result<ModelLookup, Fault>>;
pub type PolicyFn = Box<dyn Fn(&RunContext) -> Result<PolicyDecision, Fault>>;

pub enum Handler {
    Step(StepFn),
    Model(ModelFn),
    Policy(PolicyFn),
    Params(ParamsContract),
}

impl Handler {
    /// Whether this handler can serve a node of the given kind.
    pub fn serves(&self, kind: NodeKind) -> bool {
        match self {
            Handler::Step(_) => matches!(kind, NodeKind::Options | NodeKind::Step),
            Handler::Model(_) => kind == NodeKind::Model,
            Handler::Policy(_) => kind == NodeKind::Policy,
            Handler::Params(_) => kind == NodeKind::Params,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Handler::Step(_) => "step",
            Handler::Model(_) => "model",
            Handler::Policy(_) => "policy",
            Handler::Params(_) => "params",
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Params(contract) => f.debug_tuple("Params").field(contract).finish(),
            other => write!(f, "{}(<fn>)", other.name()),
        }
    }
}

/// Handlers keyed by node key.
#[derive(Debug, Default)]
pub struct Handlers {
    by_key: HashMap<String, Handler>,
}

impl Handlers {
    pub fn new() -> Self {
        Handlers::default()
    }

    /// Register a handler under an explicit node key.
    pub fn insert(mut self, key: impl Into<String>, handler: Handler) -> Self {
        self.add(key, handler);
        self
    }

    /// In-place form of [`Handlers::insert`]. A later registration for the
    /// same key replaces the earlier one.
    pub fn add(&mut self, key: impl Into<String>, handler: Handler) {
        self.by_key.insert(key.into(), handler);
    }

    pub fn options<F>(self, f: F) -> Self
    where
        F: Fn(&mut RunContext) -> Result<StepReturn, Fault> + 'static,
    {
        let key = node_key(NodeKind::Options, NodeKind::Options.tag());
        self.insert(key, Handler::Step(Box::new(f)))
    }

    pub fn model<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&RunContext) -> Result<ModelLookup, Fault> + 'static,
    {
        self.insert(node_key(NodeKind::Model, name), Handler::Model(Box::new(f)))
    }

    pub fn policy<F>(self, f: F) -> Self
    where
        F: Fn(&RunContext) -> Result<PolicyDecision, Fault> + 'static,
    {
        self.policy_named(NodeKind::Policy.tag(), f)
    }

    pub fn policy_named<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&RunContext) -> Result<PolicyDecision, Fault> + 'static,
    {
        self.insert(node_key(NodeKind::Policy, name), Handler::Policy(Box::new(f)))
    }

    pub fn params(self, contract: ParamsContract) -> Self {
        let key = node_key(NodeKind::Params, NodeKind::Params.tag());
        self.insert(key, Handler::Params(contract))
    }

    pub fn step<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&mut RunContext) -> Result<StepReturn, Fault> + 'static,
    {
        self.insert(node_key(NodeKind::Step, name), Handler::Step(Box::new(f)))
    }

    pub fn get(&self, key: &str) -> Option<&Handler> {
        self.by_key.get(key)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}
