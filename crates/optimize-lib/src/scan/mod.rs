//! Manifest scanning
//!
//! This module provides a small filter chain over streams of manifest nodes:
//! - `Reader`, `Filter` and `Writer` stages joined by a `Pipeline`
//! - `Scanner`, which selects nodes, maps them to typed facts and transforms
//!   the facts into new nodes
//! - `ResourceExpander`, which replaces resource locators with the manifests
//!   they point to
//! - YAML stream parsing and writing

mod expand;
mod yaml;

#[cfg(test)]
mod tests;

pub use expand::{locator_nodes, unexpanded_locators, ResourceExpander, DEFAULT_DEPTH};
pub use yaml::{parse_documents, YamlWriter};

use std::collections::BTreeMap;

use crate::error::Result;

/// A single manifest document
pub type Node = serde_json::Value;

/// Identifying fields of a manifest node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceMeta {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
}

impl ResourceMeta {
    pub fn of(node: &Node) -> Self {
        let text = |pointer: &str| {
            node.pointer(pointer)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        let labels = node
            .pointer("/metadata/labels")
            .and_then(|v| v.as_object())
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            api_version: text("/apiVersion"),
            kind: text("/kind"),
            name: text("/metadata/name"),
            namespace: text("/metadata/namespace"),
            labels,
        }
    }

    /// The API group, empty for the core group
    pub fn group(&self) -> &str {
        self.api_version
            .rsplit_once('/')
            .map(|(group, _)| group)
            .unwrap_or_default()
    }

    /// The API version without the group
    pub fn version(&self) -> &str {
        self.api_version
            .rsplit_once('/')
            .map(|(_, version)| version)
            .unwrap_or(&self.api_version)
    }
}

/// Produces nodes for a pipeline
pub trait Reader {
    fn read(&mut self) -> Result<Vec<Node>>;
}

/// Rewrites the node stream
pub trait Filter {
    fn filter(&mut self, nodes: Vec<Node>) -> Result<Vec<Node>>;
}

/// Consumes the final node stream
pub trait Writer {
    fn write(&mut self, nodes: Vec<Node>) -> Result<()>;
}

impl Reader for Vec<Node> {
    fn read(&mut self) -> Result<Vec<Node>> {
        Ok(std::mem::take(self))
    }
}

impl Writer for Vec<Node> {
    fn write(&mut self, nodes: Vec<Node>) -> Result<()> {
        self.extend(nodes);
        Ok(())
    }
}

impl<W: Writer + ?Sized> Writer for &mut W {
    fn write(&mut self, nodes: Vec<Node>) -> Result<()> {
        (**self).write(nodes)
    }
}

impl<F> Filter for F
where
    F: FnMut(Vec<Node>) -> Result<Vec<Node>>,
{
    fn filter(&mut self, nodes: Vec<Node>) -> Result<Vec<Node>> {
        self(nodes)
    }
}

/// Remove a top level field (e.g. `status`) from every node
pub fn clear_field(field: &'static str) -> impl Filter {
    move |mut nodes: Vec<Node>| -> Result<Vec<Node>> {
        for node in &mut nodes {
            if let Some(map) = node.as_object_mut() {
                map.remove(field);
            }
        }
        Ok(nodes)
    }
}

/// The three stages of a scan
pub trait Scan {
    type Fact;

    /// Choose the nodes that participate in the scan
    fn select(&self, nodes: &[Node]) -> Result<Vec<Node>> {
        Ok(nodes.to_vec())
    }

    /// Extract facts from a selected node
    fn map(&self, node: &Node, meta: &ResourceMeta) -> Result<Vec<Self::Fact>>;

    /// Produce the output stream from the original nodes and all facts
    fn transform(&self, nodes: Vec<Node>, facts: Vec<Self::Fact>) -> Result<Vec<Node>>;
}

/// Adapts a `Scan` to the `Filter` interface
pub struct Scanner<'a, S> {
    scan: &'a S,
}

impl<'a, S: Scan> Scanner<'a, S> {
    pub fn new(scan: &'a S) -> Self {
        Self { scan }
    }
}

impl<S: Scan> Filter for Scanner<'_, S> {
    fn filter(&mut self, nodes: Vec<Node>) -> Result<Vec<Node>> {
        let mut facts = Vec::new();
        for node in self.scan.select(&nodes)? {
            let meta = ResourceMeta::of(&node);
            facts.extend(self.scan.map(&node, &meta)?);
        }
        self.scan.transform(nodes, facts)
    }
}

/// Reads every input, runs the filters in order and writes to every output
#[derive(Default)]
pub struct Pipeline<'a> {
    pub inputs: Vec<Box<dyn Reader + 'a>>,
    pub filters: Vec<Box<dyn Filter + 'a>>,
    pub outputs: Vec<Box<dyn Writer + 'a>>,
}

impl<'a> Pipeline<'a> {
    pub fn new() -> Self {
        Self {
            inputs: Vec::new(),
            filters: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn input(mut self, reader: impl Reader + 'a) -> Self {
        self.inputs.push(Box::new(reader));
        self
    }

    pub fn filter(mut self, filter: impl Filter + 'a) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn output(mut self, writer: impl Writer + 'a) -> Self {
        self.outputs.push(Box::new(writer));
        self
    }

    pub fn execute(mut self) -> Result<()> {
        let mut nodes = Vec::new();
        for input in &mut self.inputs {
            nodes.extend(input.read()?);
        }

        for filter in &mut self.filters {
            nodes = filter.filter(nodes)?;
        }

        for output in &mut self.outputs {
            output.write(nodes.clone())?;
        }
        Ok(())
    }
}
