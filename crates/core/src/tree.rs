//! The static, declaration-time structure of a pipeline.
//!
//! A [`StepTree`] is built once (through [`TreeBuilder`] or from a declarative
//! pipeline file) and never mutated afterwards. Its shape is identical across
//! every run, which is what makes the flattened numbering stable.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TreeError;
use crate::flatten::{flatten, Flattened};

/// Closed set of node kinds. Adding a kind must be handled by the
/// flattener, the renderer and the error extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Options,
    Model,
    Policy,
    Params,
    Lock,
    Transaction,
    Try,
    Step,
    Group,
}

impl NodeKind {
    pub const ALL: [NodeKind; 9] = [
        NodeKind::Options,
        NodeKind::Model,
        NodeKind::Policy,
        NodeKind::Params,
        NodeKind::Lock,
        NodeKind::Transaction,
        NodeKind::Try,
        NodeKind::Step,
        NodeKind::Group,
    ];

    /// Tag used in keys and in rendered traces.
    pub fn tag(self) -> &'static str {
        match self {
            NodeKind::Options => "options",
            NodeKind::Model => "model",
            NodeKind::Policy => "policy",
            NodeKind::Params => "params",
            NodeKind::Lock => "lock",
            NodeKind::Transaction => "transaction",
            NodeKind::Try => "try",
            NodeKind::Step => "step",
            NodeKind::Group => "group",
        }
    }

    /// Kinds that own an ordered sequence of child nodes.
    pub fn is_group(self) -> bool {
        match self {
            NodeKind::Lock | NodeKind::Transaction | NodeKind::Try | NodeKind::Group => true,
            NodeKind::Options
            | NodeKind::Model
            | NodeKind::Policy
            | NodeKind::Params
            | NodeKind::Step => false,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Key of a node: `"<kind tag>.<name>"`, e.g. `"policy.policy"`.
pub fn node_key(kind: NodeKind, name: &str) -> String {
    format!("{}.{}", kind.tag(), name)
}

/// Label of a lock node: its attribute names joined with `:`.
pub fn lock_label<S: AsRef<str>>(attributes: &[S]) -> String {
    attributes
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(":")
}

/// One node of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    kind: NodeKind,
    label: String,
    key: String,
    attributes: Vec<String>,
    children: Vec<Node>,
}

impl Node {
    /// A leaf node. `name` becomes both the label and the key suffix.
    pub fn leaf(kind: NodeKind, name: impl Into<String>) -> Self {
        Node::group(kind, name, Vec::new())
    }

    /// A node with children. Also used for leaves (with no children).
    pub fn group(kind: NodeKind, name: impl Into<String>, children: Vec<Node>) -> Self {
        let label = name.into();
        Node {
            kind,
            key: node_key(kind, &label),
            label,
            attributes: Vec::new(),
            children,
        }
    }

    /// A lock scope over the given attribute names.
    pub fn lock(attributes: Vec<String>, children: Vec<Node>) -> Self {
        let label = lock_label(&attributes);
        Node {
            kind: NodeKind::Lock,
            key: node_key(NodeKind::Lock, &label),
            label,
            attributes,
            children,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Attribute names a lock node locks on; empty for every other kind.
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn is_group(&self) -> bool {
        self.kind.is_group()
    }

    /// This node plus all of its descendants.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Node::count).sum::<usize>()
    }
}

/// An immutable, validated pipeline declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTree {
    name: String,
    nodes: Vec<Node>,
    total: usize,
}

impl StepTree {
    /// Validate and freeze a sequence of top-level nodes.
    pub fn new(name: impl Into<String>, nodes: Vec<Node>) -> Result<Self, TreeError> {
        let mut seen = HashSet::new();
        validate(&nodes, &mut seen)?;
        let total = nodes.iter().map(Node::count).sum();
        Ok(StepTree {
            name: name.into(),
            nodes,
            total,
        })
    }

    pub fn builder(name: impl Into<String>) -> TreeBuilder {
        TreeBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Total number of nodes, group headers included.
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Depth-first lookup by key.
    pub fn find(&self, key: &str) -> Option<&Node> {
        fn search<'a>(nodes: &'a [Node], key: &str) -> Option<&'a Node> {
            nodes
                .iter()
                .find_map(|n| if n.key == key { Some(n) } else { search(&n.children, key) })
        }
        search(&self.nodes, key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    pub fn flatten(&self) -> Flattened<'_> {
        flatten(self)
    }
}

fn validate(nodes: &[Node], seen: &mut HashSet<String>) -> Result<(), TreeError> {
    for node in nodes {
        if node.kind == NodeKind::Lock && node.attributes.is_empty() {
            return Err(TreeError::EmptyLock);
        }
        if node.label.trim().is_empty() {
            return Err(TreeError::EmptyName {
                kind: node.kind.tag().to_string(),
            });
        }
        if !seen.insert(node.key.clone()) {
            return Err(TreeError::DuplicateKey {
                key: node.key.clone(),
            });
        }
        if node.is_group() && node.children.is_empty() {
            return Err(TreeError::EmptyGroup {
                key: node.key.clone(),
            });
        }
        validate(&node.children, seen)?;
    }
    Ok(())
}

/// Fluent builder for [`StepTree`]. Groups take a closure that fills a child
/// builder:
///
/// ```
/// use stepline_core::StepTree;
///
/// let tree = StepTree::builder("CreateUser")
///     .options()
///     .params()
///     .lock(&["email"], |b| b.transaction(|b| b.step("persist")))
///     .build()
///     .unwrap();
/// assert_eq!(tree.len(), 5);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TreeBuilder {
    name: String,
    nodes: Vec<Node>,
}

impl TreeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        TreeBuilder {
            name: name.into(),
            nodes: Vec::new(),
        }
    }

    pub fn node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn options(self) -> Self {
        self.node(Node::leaf(NodeKind::Options, NodeKind::Options.tag()))
    }

    pub fn model(self, name: impl Into<String>) -> Self {
        self.node(Node::leaf(NodeKind::Model, name))
    }

    pub fn policy(self) -> Self {
        self.policy_named(NodeKind::Policy.tag())
    }

    pub fn policy_named(self, name: impl Into<String>) -> Self {
        self.node(Node::leaf(NodeKind::Policy, name))
    }

    pub fn params(self) -> Self {
        self.node(Node::leaf(NodeKind::Params, NodeKind::Params.tag()))
    }

    pub fn step(self, name: impl Into<String>) -> Self {
        self.node(Node::leaf(NodeKind::Step, name))
    }

    pub fn lock<S, F>(self, attributes: &[S], children: F) -> Self
    where
        S: AsRef<str>,
        F: FnOnce(TreeBuilder) -> TreeBuilder,
    {
        let attributes = attributes.iter().map(|a| a.as_ref().to_string()).collect();
        let inner = children(TreeBuilder::default());
        self.node(Node::lock(attributes, inner.nodes))
    }

    pub fn transaction<F>(self, children: F) -> Self
    where
        F: FnOnce(TreeBuilder) -> TreeBuilder,
    {
        self.scope(NodeKind::Transaction, NodeKind::Transaction.tag(), children)
    }

    pub fn transaction_named<F>(self, name: impl Into<String>, children: F) -> Self
    where
        F: FnOnce(TreeBuilder) -> TreeBuilder,
    {
        self.scope(NodeKind::Transaction, name, children)
    }

    /// Fault-tolerant scope: faults raised by its children become this
    /// node's own outcome.
    pub fn fault_tolerant<F>(self, children: F) -> Self
    where
        F: FnOnce(TreeBuilder) -> TreeBuilder,
    {
        self.scope(NodeKind::Try, NodeKind::Try.tag(), children)
    }

    pub fn fault_tolerant_named<F>(self, name: impl Into<String>, children: F) -> Self
    where
        F: FnOnce(TreeBuilder) -> TreeBuilder,
    {
        self.scope(NodeKind::Try, name, children)
    }

    pub fn group<F>(self, name: impl Into<String>, children: F) -> Self
    where
        F: FnOnce(TreeBuilder) -> TreeBuilder,
    {
        self.scope(NodeKind::Group, name, children)
    }

    fn scope<F>(self, kind: NodeKind, name: impl Into<String>, children: F) -> Self
    where
        F: FnOnce(TreeBuilder) -> TreeBuilder,
    {
        let inner = children(TreeBuilder::default());
        self.node(Node::group(kind, name, inner.nodes))
    }

    pub fn build(self) -> Result<StepTree, TreeError> {
        StepTree::new(self.name, self.nodes)
    }
}
