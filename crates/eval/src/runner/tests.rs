use std::cell::Cell;
use std::rc::Rc;

use serde_json::json;
use stepline_core::{ErrorPayload, StepStatus};

use super::*;
use crate::params::{ParamField, ParamType, ParamsContract};
use crate::providers::{JournalTransactions, TxEvent};

fn input(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn ok(_: &mut RunContext) -> Result<StepReturn, Fault> {
    Ok(StepReturn::Continue)
}

/// options, model user, policy, params, lock user_id { transaction {
/// assign_attributes, save, try { notify, final_step } } }
fn update_profile() -> StepTree {
    StepTree::builder("UpdateProfile")
        .options()
        .model("user")
        .policy()
        .params()
        .lock(&["user_id"], |b| {
            b.transaction(|b| {
                b.step("assign_attributes")
                    .step("save")
                    .fault_tolerant(|b| b.step("notify").step("final_step"))
            })
        })
        .build()
        .unwrap()
}

fn contract() -> ParamsContract {
    ParamsContract::new()
        .field(ParamField::required("user_id").of_type(ParamType::Integer))
        .field(ParamField::optional("name").of_type(ParamType::String))
}

fn handlers() -> Handlers {
    Handlers::new()
        .options(ok)
        .model("user", |ctx| Ok(ctx.param("user_id").cloned().into()))
        .policy(|_| Ok(PolicyDecision::Allow))
        .params(contract())
        .step("assign_attributes", ok)
        .step("save", ok)
        .step("notify", ok)
        .step("final_step", ok)
}

// ──────────────────────────────────────
// Straight-through runs
// ──────────────────────────────────────

#[test]
fn successful_run_records_every_node_in_order() {
    let tree = update_profile();
    let result = Runner::new(handlers())
        .run(&tree, input(json!({ "user_id": 7 })))
        .unwrap();

    assert!(result.is_finished());
    assert!(result.succeeded());
    let keys: Vec<&str> = result.keys().collect();
    assert_eq!(
        keys,
        vec![
            "options.options",
            "model.user",
            "policy.policy",
            "params.params",
            "lock.user_id",
            "transaction.transaction",
            "step.assign_attributes",
            "step.save",
            "step.notify",
            "step.final_step",
            "try.try",
        ]
    );
    assert_eq!(result.len(), tree.len());
}

#[test]
fn model_is_visible_to_later_steps() {
    let tree = StepTree::builder("Show")
        .model("user")
        .step("render")
        .build()
        .unwrap();
    let seen = Rc::new(Cell::new(false));
    let flag = seen.clone();
    let handlers = Handlers::new()
        .model("user", |_| Ok(ModelLookup::Found(json!({ "id": 1 }))))
        .step("render", move |ctx| {
            flag.set(ctx.model("user") == Some(&json!({ "id": 1 })));
            Ok(StepReturn::Continue)
        });

    let result = Runner::new(handlers).run(&tree, Map::new()).unwrap();
    assert!(result.succeeded());
    assert!(seen.get());
}

// ──────────────────────────────────────
// Halting
// ──────────────────────────────────────

#[test]
fn missing_model_halts_with_bare_failure() {
    let tree = update_profile();
    let result = Runner::new(handlers())
        .run(&tree, input(json!({})))
        .unwrap();

    assert_eq!(result.len(), 2);
    assert_eq!(result.halted_at(), Some("model.user"));
    let outcome = result.outcome("model.user").unwrap();
    assert_eq!(outcome.status(), StepStatus::Failure);
    assert!(outcome.error().is_none());
    assert!(result.outcome("policy.policy").is_none());
}

#[test]
fn denied_policy_carries_reason() {
    let tree = StepTree::builder("Delete")
        .policy()
        .step("destroy")
        .build()
        .unwrap();
    let handlers = Handlers::new()
        .policy(|_| Ok(PolicyDecision::deny_because("Only admins can delete")))
        .step("destroy", ok);

    let result = Runner::new(handlers).run(&tree, Map::new()).unwrap();
    let outcome = result.outcome("policy.policy").unwrap();
    assert_eq!(outcome.status(), StepStatus::Failure);
    assert_eq!(outcome.metadata().reason(), Some("Only admins can delete"));
    assert!(result.outcome("step.destroy").is_none());
}

#[test]
fn invalid_params_record_errors_and_raw_parameters() {
    let tree = StepTree::builder("Create")
        .params()
        .step("save")
        .build()
        .unwrap();
    let handlers = Handlers::new().params(contract()).step("save", ok);

    let result = Runner::new(handlers)
        .run(&tree, input(json!({ "name": "Ada", "extra": true })))
        .unwrap();

    let outcome = result.outcome("params.params").unwrap();
    assert_eq!(outcome.status(), StepStatus::Failure);
    match outcome.error() {
        Some(ErrorPayload::Invalid(errors)) => {
            assert_eq!(errors.full_messages(), vec!["User id can't be blank"]);
        }
        other => panic!("expected validation errors, got {other:?}"),
    }
    let raw = result.raw_parameters().unwrap();
    let keys: Vec<&str> = raw.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["user_id", "name", "extra"]);
    assert_eq!(raw["user_id"], Value::Null);
}

#[test]
fn halting_step_with_message() {
    let tree = StepTree::builder("Pay").step("charge").build().unwrap();
    let handlers =
        Handlers::new().step("charge", |_| Ok(StepReturn::halt_with("card declined")));

    let result = Runner::new(handlers).run(&tree, Map::new()).unwrap();
    let outcome = result.outcome("step.charge").unwrap();
    assert_eq!(
        outcome.error(),
        Some(&ErrorPayload::Message("card declined".into()))
    );
}

// ──────────────────────────────────────
// Faults
// ──────────────────────────────────────

#[test]
fn fault_outside_try_is_recorded_on_the_step() {
    let tree = StepTree::builder("Sync")
        .step("fetch")
        .step("store")
        .build()
        .unwrap();
    let handlers = Handlers::new()
        .step("fetch", |_| Err(Fault::new("timeout", "NetError")))
        .step("store", ok);

    let result = Runner::new(handlers).run(&tree, Map::new()).unwrap();
    let outcome = result.outcome("step.fetch").unwrap();
    assert_eq!(outcome.status(), StepStatus::Exception);
    assert_eq!(
        outcome.error(),
        Some(&ErrorPayload::Raised(Fault::new("timeout", "NetError")))
    );
    assert_eq!(result.len(), 1);
}

#[test]
fn fault_inside_try_is_recorded_on_the_try_and_rolls_back() {
    let tree = update_profile();
    let journal = Arc::new(JournalTransactions::new());
    let handlers = handlers().step("notify", |_| Err(Fault::new("smtp down", "MailError")));

    let result = Runner::new(handlers)
        .with_transactions(journal.clone())
        .run(&tree, input(json!({ "user_id": 7 })))
        .unwrap();

    assert!(result.outcome("step.notify").is_none());
    assert!(result.outcome("step.final_step").is_none());
    let try_outcome = result.outcome("try.try").unwrap();
    assert_eq!(try_outcome.status(), StepStatus::Exception);
    assert_eq!(result.halted_at(), Some("try.try"));
    assert_eq!(
        journal.events(),
        vec![
            TxEvent::Begin("transaction".into()),
            TxEvent::Rollback("transaction".into()),
        ]
    );
}

// ──────────────────────────────────────
// Locks and transactions
// ──────────────────────────────────────

#[test]
fn lock_resource_joins_attribute_values() {
    let tree = StepTree::builder("Move")
        .lock(&["account_id", "region"], |b| b.step("move"))
        .build()
        .unwrap();
    let node = &tree.nodes()[0];
    let ctx = RunContext::new(input(json!({ "account_id": 42, "region": "eu" })));
    assert_eq!(lock_resource(node, &ctx), "account_id:region=42:eu");

    let ctx = RunContext::new(input(json!({ "region": "eu" })));
    assert_eq!(lock_resource(node, &ctx), "account_id:region=:eu");
}

#[test]
fn held_lock_fails_without_running_children() {
    let tree = update_profile();
    let locks = Arc::new(InMemoryLocks::new());
    assert!(locks.acquire("user_id=7"));

    let result = Runner::new(handlers())
        .with_locks(locks.clone())
        .run(&tree, input(json!({ "user_id": 7 })))
        .unwrap();

    assert_eq!(result.halted_at(), Some("lock.user_id"));
    assert!(result.outcome("transaction.transaction").is_none());
    assert!(locks.is_held("user_id=7"));
}

#[test]
fn lock_is_released_after_the_run() {
    let tree = update_profile();
    let locks = Arc::new(InMemoryLocks::new());
    let handlers = handlers().step("save", |_| Ok(StepReturn::halt()));

    let result = Runner::new(handlers)
        .with_locks(locks.clone())
        .run(&tree, input(json!({ "user_id": 7 })))
        .unwrap();

    assert_eq!(result.halted_at(), Some("step.save"));
    assert!(!locks.is_held("user_id=7"));
}

#[test]
fn transaction_commits_when_children_succeed() {
    let tree = update_profile();
    let journal = Arc::new(JournalTransactions::new());

    Runner::new(handlers())
        .with_transactions(journal.clone())
        .run(&tree, input(json!({ "user_id": 7 })))
        .unwrap();

    assert_eq!(
        journal.events(),
        vec![
            TxEvent::Begin("transaction".into()),
            TxEvent::Commit("transaction".into()),
        ]
    );
}

struct RefusingTransactions;

impl TransactionProvider for RefusingTransactions {
    fn begin(&self, _name: &str) -> Result<(), String> {
        Err("database is read-only".into())
    }

    fn commit(&self, _name: &str) {}

    fn rollback(&self, _name: &str) {}
}

#[test]
fn failed_begin_fails_the_transaction_node() {
    let tree = update_profile();
    let result = Runner::new(handlers())
        .with_transactions(Arc::new(RefusingTransactions))
        .run(&tree, input(json!({ "user_id": 7 })))
        .unwrap();

    let outcome = result.outcome("transaction.transaction").unwrap();
    assert_eq!(
        outcome.error(),
        Some(&ErrorPayload::Message("database is read-only".into()))
    );
    assert!(result.outcome("step.assign_attributes").is_none());
}

// ──────────────────────────────────────
// Wiring and expectations
// ──────────────────────────────────────

#[test]
fn missing_handler_is_reported_before_running() {
    let tree = update_profile();
    let ran = Rc::new(Cell::new(false));
    let flag = ran.clone();
    let handlers = Handlers::new().options(move |_| {
        flag.set(true);
        Ok(StepReturn::Continue)
    });

    let err = Runner::new(handlers).run(&tree, Map::new()).unwrap_err();
    assert_eq!(
        err,
        RunError::MissingHandler {
            key: "model.user".into(),
            kind: "model".into(),
        }
    );
    assert!(!ran.get());
}

#[test]
fn mismatched_handler_is_reported() {
    let tree = StepTree::builder("One").model("user").build().unwrap();
    let handlers = Handlers::new().insert("model.user", Handler::Step(Box::new(ok)));

    let err = Runner::new(handlers).run(&tree, Map::new()).unwrap_err();
    assert!(matches!(err, RunError::HandlerMismatch { .. }));
}

#[test]
fn expectations_annotate_surprising_outcomes() {
    let tree = update_profile();
    let expectations = Expectations::new()
        .expect("model.user", true)
        .expect("options.options", true);

    let result = Runner::new(handlers())
        .with_expectations(expectations)
        .run(&tree, input(json!({})))
        .unwrap();

    assert!(result
        .outcome("options.options")
        .unwrap()
        .metadata()
        .unexpected()
        .is_none());
    let unexpected = result
        .outcome("model.user")
        .unwrap()
        .metadata()
        .unexpected()
        .unwrap();
    assert_eq!(unexpected.expected, &json!(true));
    assert_eq!(unexpected.actual, &json!(false));
}
