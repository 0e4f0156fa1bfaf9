//! Textual execution trace.
//!
//! One line per node that ran, in flattened order:
//!
//! ```text
//! [ 1/11] [options] options ✅ (0.01 ms)
//! [ 5/11] [lock] email ✅ (0.02 ms)
//! [ 6/11]   [transaction] transaction (0.40 ms)
//! ```
//!
//! The walk stops at the first node without an outcome, or right after the
//! first failure/exception. When it stops early a footer counts the declared
//! nodes that were never shown.

use serde_json::Value;
use stepline_core::{
    millis, ExecutionResult, FlatNode, Flattened, NodeKind, StepOutcome, StepStatus,
};

pub const SUCCESS_GLYPH: &str = "✅";
pub const FAILURE_GLYPH: &str = "❌";
pub const EXCEPTION_GLYPH: &str = "💥";
pub const WARNING_GLYPH: &str = "⚠️";

/// A rendered trace before it is joined into text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowTrace {
    pub lines: Vec<String>,
    /// Index of the last rendered line (0 when nothing ran).
    pub shown: usize,
    pub total: usize,
}

impl FlowTrace {
    /// Declared nodes that were not rendered.
    pub fn hidden(&self) -> usize {
        self.total - self.shown
    }

    pub fn to_text(&self) -> String {
        let mut out = self.lines.join("\n");
        if self.hidden() > 0 {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(&footer(self.hidden()));
        }
        out
    }
}

pub fn footer(hidden: usize) -> String {
    format!(
        "({} more steps not shown as the execution flow was stopped before reaching them)",
        hidden
    )
}

pub fn trace(flat: &Flattened<'_>, result: &ExecutionResult) -> FlowTrace {
    let total = flat.total();
    let width = total.to_string().len();
    let mut lines = Vec::new();
    let mut shown = 0;

    for entry in flat {
        let Some(outcome) = result.outcome(entry.node.key()) else {
            break;
        };
        lines.push(render_line(entry, total, width, outcome));
        shown = entry.index;
        if !outcome.is_success() {
            break;
        }
    }

    FlowTrace {
        lines,
        shown,
        total,
    }
}

/// Render the trace as text.
pub fn render(flat: &Flattened<'_>, result: &ExecutionResult) -> String {
    trace(flat, result).to_text()
}

fn render_line(entry: &FlatNode<'_>, total: usize, width: usize, outcome: &StepOutcome) -> String {
    let node = entry.node;
    let mut line = format!(
        "[{:>width$}/{}] {}[{}] {}",
        entry.index,
        total,
        "  ".repeat(entry.depth),
        node.kind(),
        node.label(),
        width = width,
    );
    if let Some(glyph) = glyph(node.kind(), outcome.status()) {
        line.push(' ');
        line.push_str(glyph);
    }
    line.push_str(&format!(" ({:.2} ms)", millis(outcome.elapsed())));
    if let Some(unexpected) = outcome.metadata().unexpected() {
        line.push_str(&format!(
            " {}  <= expected to return {} but got {} instead",
            WARNING_GLYPH,
            plain(unexpected.expected),
            plain(unexpected.actual)
        ));
    }
    line
}

/// Strings print without quotes; every other value prints as JSON.
fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Successful transaction, try and plain group headers render bare.
fn glyph(kind: NodeKind, status: StepStatus) -> Option<&'static str> {
    match status {
        StepStatus::Failure => Some(FAILURE_GLYPH),
        StepStatus::Exception => Some(EXCEPTION_GLYPH),
        StepStatus::Success => match kind {
            NodeKind::Transaction | NodeKind::Try | NodeKind::Group => None,
            NodeKind::Options
            | NodeKind::Model
            | NodeKind::Policy
            | NodeKind::Params
            | NodeKind::Lock
            | NodeKind::Step => Some(SUCCESS_GLYPH),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use stepline_core::{ExecutionRecorder, Fault, StepTree};

    use super::*;

    fn tree() -> StepTree {
        StepTree::builder("Demo")
            .step("first")
            .transaction(|b| b.step("inner"))
            .step("last")
            .build()
            .unwrap()
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn full_success_has_no_footer() {
        let tree = tree();
        let mut rec = ExecutionRecorder::new();
        rec.record("step.first", StepOutcome::success(ms(1)));
        rec.record("transaction.transaction", StepOutcome::success(ms(2)));
        rec.record("step.inner", StepOutcome::success(ms(3)));
        rec.record("step.last", StepOutcome::success(ms(4)));
        let text = render(&tree.flatten(), &rec.finish());

        assert_eq!(
            text,
            "[1/4] [step] first ✅ (1.00 ms)\n\
             [2/4] [transaction] transaction (2.00 ms)\n\
             [3/4]   [step] inner ✅ (3.00 ms)\n\
             [4/4] [step] last ✅ (4.00 ms)"
        );
    }

    #[test]
    fn stops_after_first_failure() {
        let tree = tree();
        let mut rec = ExecutionRecorder::new();
        rec.record("step.first", StepOutcome::success(ms(1)));
        rec.record("transaction.transaction", StepOutcome::success(ms(1)));
        rec.record("step.inner", StepOutcome::failure(ms(1)));
        // Outcomes after the failure are never shown.
        rec.record("step.last", StepOutcome::success(ms(1)));
        let trace = trace(&tree.flatten(), &rec.finish());

        assert_eq!(trace.shown, 3);
        assert_eq!(trace.lines[2], "[3/4]   [step] inner ❌ (1.00 ms)");
        assert!(trace.to_text().ends_with(
            "\n\n(1 more steps not shown as the execution flow was stopped before reaching them)"
        ));
    }

    #[test]
    fn stops_at_first_missing_outcome() {
        let tree = tree();
        let mut rec = ExecutionRecorder::new();
        rec.record("step.first", StepOutcome::success(ms(1)));
        let text = render(&tree.flatten(), &rec.finish());
        assert_eq!(
            text,
            "[1/4] [step] first ✅ (1.00 ms)\n\n\
             (3 more steps not shown as the execution flow was stopped before reaching them)"
        );
    }

    #[test]
    fn nothing_ran_renders_only_footer() {
        let tree = tree();
        let text = render(&tree.flatten(), &ExecutionRecorder::new().finish());
        assert_eq!(text, footer(4));
    }

    #[test]
    fn exception_glyph_on_group_header() {
        let tree = StepTree::builder("Demo")
            .fault_tolerant(|b| b.step("a"))
            .build()
            .unwrap();
        let mut rec = ExecutionRecorder::new();
        rec.record(
            "try.try",
            StepOutcome::exception(ms(1), Fault::new("boom", "RuntimeError")),
        );
        let text = render(&tree.flatten(), &rec.finish());
        assert!(text.starts_with("[1/2] [try] try 💥 (1.00 ms)"));
        assert!(text.ends_with(&footer(1)));
    }

    #[test]
    fn lock_header_shows_success_glyph() {
        let tree = StepTree::builder("Demo")
            .lock(&["user_id"], |b| b.group("nested", |b| b.step("a")))
            .build()
            .unwrap();
        let mut rec = ExecutionRecorder::new();
        rec.record("lock.user_id", StepOutcome::success(ms(1)));
        rec.record("group.nested", StepOutcome::success(ms(1)));
        rec.record("step.a", StepOutcome::success(ms(1)));
        let lines = trace(&tree.flatten(), &rec.finish()).lines;
        assert_eq!(lines[0], "[1/3] [lock] user_id ✅ (1.00 ms)");
        assert_eq!(lines[1], "[2/3]   [group] nested (1.00 ms)");
        assert_eq!(lines[2], "[3/3]     [step] a ✅ (1.00 ms)");
    }

    #[test]
    fn unexpected_result_annotation() {
        let tree = StepTree::builder("Demo").step("check").build().unwrap();
        let mut outcome = StepOutcome::success(Duration::from_micros(250));
        outcome.metadata_mut().mark_unexpected(false, true);
        let mut rec = ExecutionRecorder::new();
        rec.record("step.check", outcome);
        let text = render(&tree.flatten(), &rec.finish());
        assert_eq!(
            text,
            "[1/1] [step] check ✅ (0.25 ms) ⚠️  <= expected to return false but got true instead"
        );
    }

    #[test]
    fn unexpected_string_values_print_unquoted() {
        let tree = StepTree::builder("Demo").step("check").build().unwrap();
        let mut outcome = StepOutcome::failure(Duration::from_micros(250));
        outcome.metadata_mut().mark_unexpected("approved", 3);
        let mut rec = ExecutionRecorder::new();
        rec.record("step.check", outcome);
        let lines = trace(&tree.flatten(), &rec.finish()).lines;
        assert_eq!(
            lines[0],
            "[1/1] [step] check ❌ (0.25 ms) ⚠️  <= expected to return approved but got 3 instead"
        );
    }

    #[test]
    fn indices_are_padded_to_total_width() {
        let mut builder = StepTree::builder("Wide");
        for i in 0..10 {
            builder = builder.step(format!("s{i}"));
        }
        let tree = builder.build().unwrap();
        let mut rec = ExecutionRecorder::new();
        rec.record("step.s0", StepOutcome::success(ms(0)));
        let trace = trace(&tree.flatten(), &rec.finish());
        assert_eq!(trace.lines[0], "[ 1/10] [step] s0 ✅ (0.00 ms)");
        assert_eq!(trace.hidden(), 9);
    }
}
