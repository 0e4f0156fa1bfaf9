//! Declarative pipeline files.
//!
//! A pipeline is a name plus a list of steps; group steps nest their own
//! `steps`. Files are TOML (`.toml` or no extension) or JSON (`.json`):
//!
//! ```toml
//! name = "CreateUser"
//!
//! [[steps]]
//! kind = "params"
//! fields = [{ name = "email", required = true, type = "string" }]
//!
//! [[steps]]
//! kind = "lock"
//! attributes = ["email"]
//!   [[steps.steps]]
//!   kind = "step"
//!   name = "persist"
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use stepline_core::{lock_label, node_key, Node, NodeKind, StepTree};

use crate::error::DeclError;
use crate::params::ParamsContract;
use crate::simulate::Script;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDecl {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<NodeDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeDecl {
    Options {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Script::is_empty")]
        script: Script,
    },
    Model {
        name: String,
        #[serde(default, skip_serializing_if = "Script::is_empty")]
        script: Script,
    },
    Policy {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Script::is_empty")]
        script: Script,
    },
    Params {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default)]
        fields: ParamsContract,
    },
    Lock {
        attributes: Vec<String>,
        #[serde(default)]
        steps: Vec<NodeDecl>,
        #[serde(default, skip_serializing_if = "Script::is_empty")]
        script: Script,
    },
    Transaction {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default)]
        steps: Vec<NodeDecl>,
        #[serde(default, skip_serializing_if = "Script::is_empty")]
        script: Script,
    },
    Try {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default)]
        steps: Vec<NodeDecl>,
    },
    Step {
        name: String,
        #[serde(default, skip_serializing_if = "Script::is_empty")]
        script: Script,
    },
    Group {
        name: String,
        #[serde(default)]
        steps: Vec<NodeDecl>,
    },
}

impl PipelineDecl {
    /// Load a pipeline file, picking the format from the extension.
    pub fn from_path(path: &Path) -> Result<Self, DeclError> {
        let extension = path.extension().and_then(|e| e.to_str());
        if let Some(ext) = extension {
            if ext != "toml" && ext != "json" {
                return Err(DeclError::UnsupportedFormat {
                    extension: ext.to_string(),
                });
            }
        }
        let text = fs::read_to_string(path).map_err(|source| DeclError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match extension {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_toml_str(&text),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, DeclError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self, DeclError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_tree(&self) -> Result<StepTree, DeclError> {
        let nodes = self.steps.iter().map(NodeDecl::to_node).collect();
        Ok(StepTree::new(self.name.clone(), nodes)?)
    }
}

impl NodeDecl {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeDecl::Options { .. } => NodeKind::Options,
            NodeDecl::Model { .. } => NodeKind::Model,
            NodeDecl::Policy { .. } => NodeKind::Policy,
            NodeDecl::Params { .. } => NodeKind::Params,
            NodeDecl::Lock { .. } => NodeKind::Lock,
            NodeDecl::Transaction { .. } => NodeKind::Transaction,
            NodeDecl::Try { .. } => NodeKind::Try,
            NodeDecl::Step { .. } => NodeKind::Step,
            NodeDecl::Group { .. } => NodeKind::Group,
        }
    }

    pub fn label(&self) -> String {
        match self {
            NodeDecl::Options { name, .. }
            | NodeDecl::Policy { name, .. }
            | NodeDecl::Params { name, .. }
            | NodeDecl::Transaction { name, .. }
            | NodeDecl::Try { name, .. } => name
                .clone()
                .unwrap_or_else(|| self.kind().tag().to_string()),
            NodeDecl::Model { name, .. }
            | NodeDecl::Step { name, .. }
            | NodeDecl::Group { name, .. } => name.clone(),
            NodeDecl::Lock { attributes, .. } => lock_label(attributes.as_slice()),
        }
    }

    pub fn key(&self) -> String {
        node_key(self.kind(), &self.label())
    }

    pub fn children(&self) -> &[NodeDecl] {
        match self {
            NodeDecl::Lock { steps, .. }
            | NodeDecl::Transaction { steps, .. }
            | NodeDecl::Try { steps, .. }
            | NodeDecl::Group { steps, .. } => steps,
            _ => &[],
        }
    }

    /// Simulation script; params, try and group nodes never carry one.
    pub fn script(&self) -> Option<&Script> {
        match self {
            NodeDecl::Options { script, .. }
            | NodeDecl::Model { script, .. }
            | NodeDecl::Policy { script, .. }
            | NodeDecl::Lock { script, .. }
            | NodeDecl::Transaction { script, .. }
            | NodeDecl::Step { script, .. } => Some(script),
            NodeDecl::Params { .. } | NodeDecl::Try { .. } | NodeDecl::Group { .. } => None,
        }
    }

    fn to_node(&self) -> Node {
        let children = || -> Vec<Node> {
            self.children().iter().map(NodeDecl::to_node).collect()
        };
        match self {
            NodeDecl::Lock { attributes, .. } => Node::lock(attributes.clone(), children()),
            _ if self.kind().is_group() => Node::group(self.kind(), self.label(), children()),
            _ => Node::leaf(self.kind(), self.label()),
        }
    }
}
