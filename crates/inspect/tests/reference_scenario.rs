//! End-to-end inspection of the eleven-node reference pipeline:
//! options, model, policy, params, lock { transaction { step, step, try { step, step } } }.

use std::time::Duration;

use serde_json::{json, Value};
use stepline_core::{
    ExecutionRecorder, ExecutionResult, Fault, Parameters, StepOutcome, StepTree, ValidationError,
    ValidationErrors,
};
use stepline_inspect::{Inspector, MODEL_NOT_FOUND};

const FOOTER_TAIL: &str = "more steps not shown as the execution flow was stopped before reaching them)";

fn reference_tree() -> StepTree {
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
        .expect("reference tree is valid")
}

fn ok() -> StepOutcome {
    StepOutcome::success(Duration::from_micros(120))
}

fn run(records: Vec<(&str, StepOutcome)>, parameters: Option<Parameters>) -> ExecutionResult {
    let mut rec = ExecutionRecorder::new();
    if let Some(p) = parameters {
        rec.capture_parameters(p);
    }
    for (key, outcome) in records {
        rec.record(key, outcome);
    }
    rec.finish()
}

fn missing_parameter() -> Parameters {
    let mut params = Parameters::new();
    params.insert("user_id".into(), Value::Null);
    params.insert("parameter".into(), Value::Null);
    params
}

fn flow_lines(flow: &str) -> Vec<&str> {
    flow.lines().filter(|l| l.starts_with('[')).collect()
}

#[test]
fn params_failure_renders_four_lines_and_footer() {
    let tree = reference_tree();
    let mut errors = ValidationErrors::new();
    errors.add("parameter", "blank");
    let result = run(
        vec![
            ("options.options", ok()),
            ("model.user", ok()),
            ("policy.policy", ok()),
            ("params.params", StepOutcome::invalid(Duration::from_micros(80), errors)),
        ],
        Some(missing_parameter()),
    );
    let inspector = Inspector::new(&tree, &result).unwrap();
    let flow = inspector.execution_flow();

    let lines = flow_lines(&flow);
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "[ 1/11] [options] options ✅ (0.12 ms)");
    assert_eq!(lines[1], "[ 2/11] [model] user ✅ (0.12 ms)");
    assert_eq!(lines[2], "[ 3/11] [policy] policy ✅ (0.12 ms)");
    assert_eq!(lines[3], "[ 4/11] [params] params ❌ (0.08 ms)");
    assert!(flow.ends_with(&format!("\n\n(7 {}", FOOTER_TAIL)));

    assert_eq!(inspector.error(), "Parameter can't be blank");

    let report = inspector.inspect();
    assert!(report.starts_with("Pipeline: UpdateProfile\n\n[ 1/11]"));
    assert!(report.contains("\n\nWhy it failed:\n\nParameter can't be blank\n\n"));
    assert!(report.ends_with("Provided parameters: {\"user_id\":null,\"parameter\":null}"));
}

#[test]
fn complete_run_renders_all_lines_without_footer() {
    let tree = reference_tree();
    let keys = [
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
    ];
    let result = run(keys.iter().map(|k| (*k, ok())).collect(), None);
    let inspector = Inspector::new(&tree, &result).unwrap();
    let flow = inspector.execution_flow();

    assert!(!flow.contains(FOOTER_TAIL));
    let lines = flow_lines(&flow);
    assert_eq!(lines.len(), 11);
    assert_eq!(lines[4], "[ 5/11] [lock] user_id ✅ (0.12 ms)");
    assert_eq!(lines[5], "[ 6/11]   [transaction] transaction (0.12 ms)");
    assert_eq!(lines[6], "[ 7/11]     [step] assign_attributes ✅ (0.12 ms)");
    assert_eq!(lines[8], "[ 9/11]     [try] try (0.12 ms)");
    assert_eq!(lines[10], "[11/11]       [step] final_step ✅ (0.12 ms)");
    assert_eq!(inspector.error(), "");
    assert_eq!(inspector.inspect(), format!("Pipeline: UpdateProfile\n\n{}", flow));
}

#[test]
fn footer_counts_from_first_non_success() {
    let tree = reference_tree();
    let total = tree.flatten().total();
    let keys = [
        "options.options",
        "model.user",
        "policy.policy",
        "params.params",
        "lock.user_id",
        "transaction.transaction",
        "step.assign_attributes",
        "step.save",
    ];
    for fail_at in 0..keys.len() {
        let records = keys
            .iter()
            .enumerate()
            .take(fail_at + 1)
            .map(|(i, k)| {
                let outcome = if i == fail_at {
                    StepOutcome::failure(Duration::ZERO)
                } else {
                    ok()
                };
                (*k, outcome)
            })
            .collect();
        let result = run(records, None);
        let inspector = Inspector::new(&tree, &result).unwrap();
        let flow = inspector.execution_flow();
        let shown = fail_at + 1;

        assert_eq!(flow_lines(&flow).len(), shown);
        assert!(flow.ends_with(&format!("({} {}", total - shown, FOOTER_TAIL)));
        assert_eq!(tree.flatten().total(), total);
    }
}

#[test]
fn model_not_found_and_model_fault() {
    let tree = reference_tree();

    let missing = run(
        vec![
            ("options.options", ok()),
            ("model.user", StepOutcome::failure(Duration::ZERO)),
        ],
        None,
    );
    let inspector = Inspector::new(&tree, &missing).unwrap();
    assert_eq!(inspector.error(), MODEL_NOT_FOUND);
    // Parameters were never captured, so nothing follows the summary.
    assert!(inspector.inspect().ends_with("Why it failed:\n\nModel not found"));

    let raised = run(
        vec![
            ("options.options", ok()),
            (
                "model.user",
                StepOutcome::exception(
                    Duration::ZERO,
                    Fault::new("relation \"users\" does not exist", "StatementInvalid"),
                ),
            ),
        ],
        None,
    );
    let inspector = Inspector::new(&tree, &raised).unwrap();
    let error = inspector.error();
    assert!(error.contains("relation \"users\" does not exist"));
    assert!(error.contains("StatementInvalid"));
    assert!(inspector.execution_flow().contains("[model] user 💥"));
}

#[test]
fn lock_failure_message() {
    let tree = reference_tree();
    let result = run(
        vec![
            ("options.options", ok()),
            ("model.user", ok()),
            ("policy.policy", ok()),
            ("params.params", ok()),
            ("lock.user_id", StepOutcome::failure(Duration::ZERO)),
        ],
        Some(missing_parameter()),
    );
    let inspector = Inspector::new(&tree, &result).unwrap();
    assert_eq!(inspector.error(), "Lock 'user_id' was not acquired.");
    assert!(inspector
        .inspect()
        .ends_with("Provided parameters: {\"user_id\":null,\"parameter\":null}"));
}

#[test]
fn try_exception_stops_at_header() {
    let tree = reference_tree();
    let result = run(
        vec![
            ("options.options", ok()),
            ("model.user", ok()),
            ("policy.policy", ok()),
            ("params.params", ok()),
            ("lock.user_id", ok()),
            ("transaction.transaction", ok()),
            ("step.assign_attributes", ok()),
            ("step.save", ok()),
            ("step.notify", ok()),
            (
                "try.try",
                StepOutcome::exception(Duration::ZERO, Fault::new("smtp down", "DeliveryError")),
            ),
        ],
        None,
    );
    let inspector = Inspector::new(&tree, &result).unwrap();
    let flow = inspector.execution_flow();
    assert_eq!(flow_lines(&flow).len(), 9);
    assert!(flow.contains("[ 9/11]     [try] try 💥 (0.00 ms)"));
    assert!(flow.ends_with(&format!("(2 {}", FOOTER_TAIL)));
    assert_eq!(inspector.error(), "smtp down (DeliveryError)");
}

#[test]
fn recorded_results_round_trip_through_json() {
    let tree = reference_tree();
    let mut errors = ValidationErrors::new();
    errors.push(ValidationError::new("user_id", "invalid_type").with_option("expected", "integer"));
    let result = run(
        vec![
            ("options.options", ok()),
            ("model.user", ok()),
            ("policy.policy", ok()),
            ("params.params", StepOutcome::invalid(Duration::ZERO, errors)),
        ],
        Some(missing_parameter()),
    );
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["finished"], json!(true));
    let decoded: ExecutionResult = serde_json::from_value(json).unwrap();

    let before = Inspector::new(&tree, &result).unwrap();
    let after = Inspector::new(&tree, &decoded).unwrap();
    assert_eq!(before.inspect(), after.inspect());
    assert_eq!(after.error(), "User id is not a valid integer");
}
