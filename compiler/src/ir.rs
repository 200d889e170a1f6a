// ir.rs — Intermediate representation handed to code generation
//
// The flow graph of an Arc program: the functions it declares, the nodes
// that instantiate them, the edges between node parameters, the sequences
// and stages that group nodes, and the execution strata. Everything here is
// plain data; the graph builder fills it and the stratifier partitions it.
//
// Preconditions: none.
// Postconditions: `IR` round-trips through serde unchanged.
// Failure modes: none.
// Side effects: none.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::symbol::Channels;
use crate::types::{FunctionProps, Params};

// ── Handles and edges ──

/// One parameter of one node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle {
    pub node: String,
    pub param: String,
}

impl Handle {
    pub fn new(node: impl Into<String>, param: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            param: param.into(),
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.param)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Steady-state streaming (`->`).
    Continuous,
    /// Fires once per activation (`=>`).
    OneShot,
}

impl EdgeKind {
    pub fn arrow(self) -> &'static str {
        match self {
            EdgeKind::Continuous => "->",
            EdgeKind::OneShot => "=>",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: Handle,
    pub target: Handle,
    pub kind: EdgeKind,
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.source, self.kind.arrow(), self.target)
    }
}

/// Edges in insertion order. Duplicates are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Edges(pub Vec<Edge>);

impl Edges {
    pub fn push(&mut self, edge: Edge) {
        self.0.push(edge);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Edge> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn by_kind(&self, kind: EdgeKind) -> impl Iterator<Item = &Edge> {
        self.0.iter().filter(move |e| e.kind == kind)
    }

    /// Edges whose target is node `key`.
    pub fn into_node<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Edge> {
        self.0.iter().filter(move |e| e.target.node == key)
    }

    /// Edges whose source is node `key`.
    pub fn from_node<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Edge> {
        self.0.iter().filter(move |e| e.source.node == key)
    }
}

impl<'a> IntoIterator for &'a Edges {
    type Item = &'a Edge;
    type IntoIter = std::slice::Iter<'a, Edge>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ── Nodes and functions ──

/// Node type tags the builder emits besides function names.
pub mod node_type {
    pub const ON: &str = "on";
    pub const WRITE: &str = "write";
    pub const CONSTANT: &str = "constant";
    pub const STAGE_ENTRY: &str = "stage_entry";
}

/// The input every stage entry node exposes.
pub const ACTIVATE: &str = "activate";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub key: String,
    /// `on`, `write`, `constant`, `stage_entry`, or a function name.
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub config: Params,
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub inputs: Params,
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub outputs: Params,
    #[serde(default, skip_serializing_if = "Channels::is_empty")]
    pub channels: Channels,
}

impl Node {
    pub fn new(key: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ty: ty.into(),
            config: Params::new(),
            inputs: Params::new(),
            outputs: Params::new(),
            channels: Channels::new(),
        }
    }

    /// Whether `param` is a declared input or output of this node.
    pub fn has_param(&self, param: &str) -> bool {
        self.inputs.has(param) || self.outputs.has(param)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.ty)?;
        if !self.config.is_empty() {
            write!(f, " {{{}}}", self.config)?;
        }
        if !self.inputs.is_empty() {
            write!(f, " ({})", self.inputs)?;
        }
        if !self.outputs.is_empty() {
            write!(f, " -> ({})", self.outputs)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nodes(pub Vec<Node>);

impl Nodes {
    pub fn push(&mut self, node: Node) {
        self.0.push(node);
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.0.iter().find(|n| n.key == key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Node> {
        self.0.iter_mut().find(|n| n.key == key)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|n| n.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a Nodes {
    type Item = &'a Node;
    type IntoIter = std::slice::Iter<'a, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A function declared in source, or synthesized for a flow expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub key: String,
    #[serde(flatten)]
    pub props: FunctionProps,
    #[serde(default, skip_serializing_if = "Channels::is_empty")]
    pub channels: Channels,
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)?;
        if !self.props.config.is_empty() {
            write!(f, " {{{}}}", self.props.config)?;
        }
        write!(f, " ({})", self.props.inputs)?;
        if !self.props.outputs.is_empty() {
            write!(f, " -> ({})", self.props.outputs)?;
        }
        Ok(())
    }
}

// ── Strata ──

/// Execution levels: every edge between two nodes of one partition goes
/// from a lower stratum to a higher one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Strata(pub Vec<Vec<String>>);

impl Strata {
    /// Stratum index of node `key`.
    pub fn get(&self, key: &str) -> Option<usize> {
        self.0.iter().position(|level| level.iter().any(|k| k == key))
    }

    pub fn node_count(&self) -> usize {
        self.0.iter().map(Vec::len).sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Vec<String>> {
        self.0.iter()
    }
}

impl fmt::Display for Strata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, level) in self.0.iter().enumerate() {
            writeln!(f, "[{i}]: {}", level.join(", "))?;
        }
        Ok(())
    }
}

// ── Sequences ──

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub key: String,
    /// Keys of the nodes this stage introduces, in insertion order.
    pub nodes: Vec<String>,
    #[serde(default)]
    pub strata: Strata,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let children: Vec<String> = self
            .strata
            .iter()
            .enumerate()
            .map(|(i, level)| format!("[{i}]: {}", level.join(", ")))
            .collect();
        f.write_str(&tree(
            &format!("{}: [{}]", self.key, self.nodes.join(", ")),
            &children,
        ))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub key: String,
    pub stages: Vec<Stage>,
}

impl Sequence {
    /// The stage a sequence starts in.
    pub fn entry(&self) -> Option<&Stage> {
        self.stages.first()
    }

    pub fn find_stage(&self, key: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.key == key)
    }

    /// The stage after `key`, if any.
    pub fn next_stage(&self, key: &str) -> Option<&Stage> {
        let i = self.stages.iter().position(|s| s.key == key)?;
        self.stages.get(i + 1)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let children: Vec<String> = self.stages.iter().map(ToString::to_string).collect();
        f.write_str(&tree(&self.key, &children))
    }
}

// ── IR ──

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IR {
    pub functions: Vec<Function>,
    pub nodes: Nodes,
    pub edges: Edges,
    pub sequences: Vec<Sequence>,
    /// Strata of every node not owned by a stage.
    pub strata: Strata,
    /// SHA-256 of the source text, lowercase hex.
    pub fingerprint: String,
}

impl IR {
    pub fn function(&self, key: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.key == key)
    }

    pub fn sequence(&self, key: &str) -> Option<&Sequence> {
        self.sequences.iter().find(|s| s.key == key)
    }

    /// The stage owning node `key`, as `(sequence, stage)`.
    pub fn stage_of(&self, key: &str) -> Option<(&Sequence, &Stage)> {
        self.sequences.iter().find_map(|seq| {
            seq.stages
                .iter()
                .find(|st| st.nodes.iter().any(|n| n == key))
                .map(|st| (seq, st))
        })
    }
}

/// Fingerprint of a source text as stored on the IR.
pub fn fingerprint(source: &str) -> String {
    format!("{:x}", Sha256::digest(source.as_bytes()))
}

impl fmt::Display for IR {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.fingerprint.get(..8).unwrap_or(&self.fingerprint);
        let functions: Vec<String> = self.functions.iter().map(ToString::to_string).collect();
        let nodes: Vec<String> = self.nodes.iter().map(ToString::to_string).collect();
        let edges: Vec<String> = self.edges.iter().map(ToString::to_string).collect();
        let sequences: Vec<String> = self.sequences.iter().map(ToString::to_string).collect();
        let strata: Vec<String> = self.strata.to_string().lines().map(String::from).collect();
        let sections = [
            tree("functions", &functions),
            tree("nodes", &nodes),
            tree("edges", &edges),
            tree("sequences", &sequences),
            tree("strata", &strata),
        ];
        f.write_str(&tree(&format!("ir {short}"), &sections))
    }
}

/// Render `root` with `children` hanging off it, box-drawing style.
/// Children may span several lines; continuation lines are indented under
/// their branch.
fn tree(root: &str, children: &[String]) -> String {
    let mut out = String::new();
    out.push_str(root);
    out.push('\n');
    for (i, child) in children.iter().enumerate() {
        let last = i + 1 == children.len();
        let (head, tail) = if last {
            ("└── ", "    ")
        } else {
            ("├── ", "│   ")
        };
        for (j, line) in child.lines().enumerate() {
            out.push_str(if j == 0 { head } else { tail });
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}
