//! Static outline of a pipeline: every declared node, numbered the same way
//! the execution flow numbers them, without any run data.

use serde::Serialize;
use stepline_core::Flattened;

#[derive(Debug, Serialize)]
pub(crate) struct OutlineEntry<'a> {
    pub index: usize,
    pub depth: usize,
    pub kind: &'static str,
    pub label: &'a str,
    pub key: &'a str,
}

pub(crate) fn entries<'a>(flat: &Flattened<'a>) -> Vec<OutlineEntry<'a>> {
    flat.iter()
        .map(|entry| OutlineEntry {
            index: entry.index,
            depth: entry.depth,
            kind: entry.node.kind().tag(),
            label: entry.node.label(),
            key: entry.node.key(),
        })
        .collect()
}

pub(crate) fn render(flat: &Flattened<'_>) -> String {
    let total = flat.total();
    let width = total.to_string().len();
    flat.iter()
        .map(|entry| {
            format!(
                "[{:>width$}/{}] {}[{}] {}",
                entry.index,
                total,
                indent(entry.depth),
                entry.node.kind(),
                entry.node.label(),
                width = width,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}
