//! Reference step-execution collaborator.
//!
//! Runs a [`StepTree`](stepline_core::StepTree) against registered handlers,
//! strictly in declaration order, and produces the finished
//! [`ExecutionResult`](stepline_core::ExecutionResult) that the inspector
//! reads. Pipelines can also be declared in TOML/JSON files and played with
//! scripted handlers.

pub mod context;
pub mod decl;
pub mod error;
pub mod expect;
pub mod handlers;
pub mod params;
pub mod providers;
pub mod runner;
pub mod simulate;

pub use context::RunContext;
pub use decl::{NodeDecl, PipelineDecl};
pub use error::{DeclError, RunError, SimulateError};
pub use expect::Expectations;
pub use handlers::{Handler, Handlers, ModelLookup, PolicyDecision, StepReturn};
pub use params::{ParamField, ParamType, ParamsContract};
pub use providers::{
    InMemoryLocks, JournalTransactions, LockProvider, NoopTransactions, TransactionProvider,
    TxEvent,
};
pub use runner::Runner;
pub use simulate::{scripted, simulate, Script, Simulation};
