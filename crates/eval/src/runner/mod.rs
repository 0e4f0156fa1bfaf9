//! Sequential pipeline runner.
//!
//! Walks a [`StepTree`] in declaration order and records exactly one outcome
//! per node that runs. The walk stops at the first failure or exception;
//! nodes after that point get no outcome at all.
//!
//! Group semantics:
//! - lock: acquired before its children run, released after; children are
//!   skipped when the lock is held elsewhere
//! - transaction: begun before its children, committed when they all
//!   succeed, rolled back otherwise
//! - try: a fault raised by any child stops the group and is recorded as the
//!   try node's own exception; the faulting child gets no outcome
//! - group: plain nesting
//!
//! Faults outside any try are recorded on the node that raised them.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{debug, info};

use stepline_core::{
    ExecutionRecorder, ExecutionResult, Fault, Metadata, Node, NodeKind, StepOutcome, StepTree,
};

use crate::context::RunContext;
use crate::error::RunError;
use crate::expect::Expectations;
use crate::handlers::{Handler, Handlers, ModelLookup, PolicyDecision, StepReturn};
use crate::providers::{InMemoryLocks, LockProvider, NoopTransactions, TransactionProvider};

/// How the walk continues after a node.
enum Flow {
    Continue,
    Halt,
    /// A fault travelling up to the nearest enclosing try.
    Raise(Fault),
}

pub struct Runner {
    handlers: Handlers,
    locks: Arc<dyn LockProvider>,
    transactions: Arc<dyn TransactionProvider>,
    expectations: Expectations,
}

impl Runner {
    pub fn new(handlers: Handlers) -> Self {
        Runner {
            handlers,
            locks: Arc::new(InMemoryLocks::new()),
            transactions: Arc::new(NoopTransactions),
            expectations: Expectations::new(),
        }
    }

    pub fn with_locks(mut self, locks: Arc<dyn LockProvider>) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_transactions(mut self, transactions: Arc<dyn TransactionProvider>) -> Self {
        self.transactions = transactions;
        self
    }

    /// Enable test-mode annotations.
    pub fn with_expectations(mut self, expectations: Expectations) -> Self {
        self.expectations = expectations;
        self
    }

    pub fn handlers(&self) -> &Handlers {
        &self.handlers
    }

    /// Check that every node needing a handler has a suitable one.
    pub fn check(&self, tree: &StepTree) -> Result<(), RunError> {
        check_nodes(&self.handlers, tree.nodes())
    }

    /// Run the pipeline once over `input`.
    pub fn run(&self, tree: &StepTree, input: Map<String, Value>) -> Result<ExecutionResult, RunError> {
        self.check(tree)?;

        let started = Instant::now();
        let mut ctx = RunContext::new(input);
        let mut recorder = ExecutionRecorder::new();
        debug!(pipeline = tree.name(), total = tree.len(), "run started");

        match self.run_nodes(tree.nodes(), &mut ctx, &mut recorder, false)? {
            Flow::Continue => {
                info!(
                    pipeline = tree.name(),
                    elapsed = ?started.elapsed(),
                    "run completed"
                );
            }
            Flow::Halt | Flow::Raise(_) => {
                let result = recorder.finish();
                info!(
                    pipeline = tree.name(),
                    halted_at = result.halted_at().unwrap_or("?"),
                    recorded = result.len(),
                    elapsed = ?started.elapsed(),
                    "run halted"
                );
                return Ok(result);
            }
        }
        Ok(recorder.finish())
    }

    fn run_nodes(
        &self,
        nodes: &[Node],
        ctx: &mut RunContext,
        rec: &mut ExecutionRecorder,
        in_try: bool,
    ) -> Result<Flow, RunError> {
        for node in nodes {
            match self.run_node(node, ctx, rec, in_try)? {
                Flow::Continue => continue,
                stop => return Ok(stop),
            }
        }
        Ok(Flow::Continue)
    }

    fn run_node(
        &self,
        node: &Node,
        ctx: &mut RunContext,
        rec: &mut ExecutionRecorder,
        in_try: bool,
    ) -> Result<Flow, RunError> {
        let started = Instant::now();
        debug!(key = node.key(), "step started");

        let flow = match node.kind() {
            NodeKind::Options | NodeKind::Step => {
                let Handler::Step(f) = self.handler(node)? else {
                    return Err(mismatch(node));
                };
                match f(ctx) {
                    Ok(StepReturn::Continue) => {
                        self.finish(rec, node, StepOutcome::success(started.elapsed()))
                    }
                    Ok(StepReturn::Halt { error: None }) => {
                        self.finish(rec, node, StepOutcome::failure(started.elapsed()))
                    }
                    Ok(StepReturn::Halt { error: Some(msg) }) => self.finish(
                        rec,
                        node,
                        StepOutcome::failure_with_message(started.elapsed(), msg),
                    ),
                    Err(fault) => self.raise(rec, node, fault, started, in_try),
                }
            }
            NodeKind::Model => {
                let Handler::Model(f) = self.handler(node)? else {
                    return Err(mismatch(node));
                };
                match f(ctx) {
                    Ok(ModelLookup::Found(value)) => {
                        ctx.insert_model(node.label(), value);
                        self.finish(rec, node, StepOutcome::success(started.elapsed()))
                    }
                    Ok(ModelLookup::Missing) => {
                        self.finish(rec, node, StepOutcome::failure(started.elapsed()))
                    }
                    Ok(ModelLookup::Invalid(errors)) => {
                        self.finish(rec, node, StepOutcome::invalid(started.elapsed(), errors))
                    }
                    Err(fault) => self.raise(rec, node, fault, started, in_try),
                }
            }
            NodeKind::Policy => {
                let Handler::Policy(f) = self.handler(node)? else {
                    return Err(mismatch(node));
                };
                match f(ctx) {
                    Ok(PolicyDecision::Allow) => {
                        self.finish(rec, node, StepOutcome::success(started.elapsed()))
                    }
                    Ok(PolicyDecision::Deny { reason }) => {
                        let mut outcome = StepOutcome::failure(started.elapsed());
                        if let Some(reason) = reason {
                            outcome = outcome.with_metadata(Metadata::REASON, reason);
                        }
                        self.finish(rec, node, outcome)
                    }
                    Err(fault) => self.raise(rec, node, fault, started, in_try),
                }
            }
            NodeKind::Params => {
                let Handler::Params(contract) = self.handler(node)? else {
                    return Err(mismatch(node));
                };
                rec.capture_parameters(contract.capture(ctx.input()));
                match contract.validate(ctx.input()) {
                    Ok(params) => {
                        ctx.set_params(params);
                        self.finish(rec, node, StepOutcome::success(started.elapsed()))
                    }
                    Err(errors) => {
                        self.finish(rec, node, StepOutcome::invalid(started.elapsed(), errors))
                    }
                }
            }
            NodeKind::Lock => {
                let resource = lock_resource(node, ctx);
                if !self.locks.acquire(&resource) {
                    debug!(key = node.key(), resource = %resource, "lock not acquired");
                    return Ok(self.finish(rec, node, StepOutcome::failure(started.elapsed())));
                }
                self.finish(rec, node, StepOutcome::success(started.elapsed()));
                let flow = self.run_nodes(node.children(), ctx, rec, in_try);
                self.locks.release(&resource);
                flow?
            }
            NodeKind::Transaction => {
                if let Err(msg) = self.transactions.begin(node.label()) {
                    return Ok(self.finish(
                        rec,
                        node,
                        StepOutcome::failure_with_message(started.elapsed(), msg),
                    ));
                }
                self.finish(rec, node, StepOutcome::success(started.elapsed()));
                let flow = self.run_nodes(node.children(), ctx, rec, in_try);
                match &flow {
                    Ok(Flow::Continue) => self.transactions.commit(node.label()),
                    _ => self.transactions.rollback(node.label()),
                }
                flow?
            }
            NodeKind::Try => match self.run_nodes(node.children(), ctx, rec, true)? {
                Flow::Raise(fault) => {
                    debug!(key = node.key(), fault = %fault, "fault caught");
                    self.finish(rec, node, StepOutcome::exception(started.elapsed(), fault))
                }
                Flow::Continue => self.finish(rec, node, StepOutcome::success(started.elapsed())),
                Flow::Halt => {
                    self.finish(rec, node, StepOutcome::success(started.elapsed()));
                    Flow::Halt
                }
            },
            NodeKind::Group => {
                self.finish(rec, node, StepOutcome::success(started.elapsed()));
                self.run_nodes(node.children(), ctx, rec, in_try)?
            }
        };
        Ok(flow)
    }

    fn handler(&self, node: &Node) -> Result<&Handler, RunError> {
        self.handlers
            .get(node.key())
            .ok_or_else(|| RunError::MissingHandler {
                key: node.key().to_string(),
                kind: node.kind().tag().to_string(),
            })
    }

    /// Record the outcome of `node` and decide whether the walk continues.
    fn finish(&self, rec: &mut ExecutionRecorder, node: &Node, mut outcome: StepOutcome) -> Flow {
        self.expectations.annotate(node.key(), &mut outcome);
        let ok = outcome.is_success();
        debug!(
            key = node.key(),
            status = %outcome.status(),
            elapsed = ?outcome.elapsed(),
            "step finished"
        );
        rec.record(node.key(), outcome);
        if ok {
            Flow::Continue
        } else {
            Flow::Halt
        }
    }

    /// A fault raised by `node`: handed to the enclosing try, or recorded
    /// on the node itself when there is none.
    fn raise(
        &self,
        rec: &mut ExecutionRecorder,
        node: &Node,
        fault: Fault,
        started: Instant,
        in_try: bool,
    ) -> Flow {
        if in_try {
            debug!(key = node.key(), fault = %fault, "fault raised inside try");
            return Flow::Raise(fault);
        }
        self.finish(rec, node, StepOutcome::exception(started.elapsed(), fault))
    }
}

fn mismatch(node: &Node) -> RunError {
    RunError::HandlerMismatch {
        key: node.key().to_string(),
        kind: node.kind().tag().to_string(),
    }
}

fn check_nodes(handlers: &Handlers, nodes: &[Node]) -> Result<(), RunError> {
    for node in nodes {
        if node.is_group() {
            check_nodes(handlers, node.children())?;
            continue;
        }
        match handlers.get(node.key()) {
            None => {
                return Err(RunError::MissingHandler {
                    key: node.key().to_string(),
                    kind: node.kind().tag().to_string(),
                })
            }
            Some(handler) if !handler.serves(node.kind()) => return Err(mismatch(node)),
            Some(_) => {}
        }
    }
    Ok(())
}

/// `"<label>=<values>"`, the values of the locked attributes joined by `:`.
/// Missing attributes contribute an empty segment.
pub fn lock_resource(node: &Node, ctx: &RunContext) -> String {
    let values: Vec<String> = node
        .attributes()
        .iter()
        .map(|attr| match ctx.param(attr) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        })
        .collect();
    format!("{}={}", node.label(), values.join(":"))
}

#[cfg(test)]
mod tests;
