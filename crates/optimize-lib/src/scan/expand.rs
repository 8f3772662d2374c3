use std::fs;
use std::io::Read;
use std::path::Path;

use serde_json::json;
use tracing::{debug, warn};

use super::yaml::parse_documents;
use super::{Filter, Node};
use crate::api::application::{ResourceLocator, LOCATOR_API_VERSION};
use crate::error::Result;

/// Default limit on nested locator expansion
pub const DEFAULT_DEPTH: usize = 100;

const MANIFEST_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Convert application resource locators into locator nodes
pub fn locator_nodes(locators: &[ResourceLocator]) -> Vec<Node> {
    let mut nodes = Vec::new();
    for locator in locators {
        if let Some(resource) = &locator.resource {
            nodes.push(json!({
                "apiVersion": LOCATOR_API_VERSION,
                "kind": "Resource",
                "resources": resource.resources,
            }));
        }
        if let Some(kubernetes) = &locator.kubernetes {
            nodes.push(json!({
                "apiVersion": LOCATOR_API_VERSION,
                "kind": "Kubernetes",
                "namespaces": kubernetes.namespaces,
                "selector": kubernetes.selector,
            }));
        }
    }
    nodes
}

fn is_locator(node: &Node) -> bool {
    node.get("apiVersion").and_then(|v| v.as_str()) == Some(LOCATOR_API_VERSION)
}

fn is_file_locator(node: &Node) -> bool {
    is_locator(node) && node.get("kind").and_then(|v| v.as_str()) == Some("Resource")
}

/// Describe the locators an expansion left in the stream (remote URLs,
/// cluster selectors, or files beyond the depth limit)
pub fn unexpanded_locators(nodes: &[Node]) -> Vec<String> {
    nodes
        .iter()
        .filter(|n| is_locator(n))
        .map(|n| match n.get("kind").and_then(|v| v.as_str()) {
            Some("Kubernetes") => format!(
                "kubernetes selector {:?} in {}",
                n["selector"].as_str().unwrap_or_default(),
                n["namespaces"],
            ),
            _ => n["resources"]
                .as_array()
                .map(|paths| {
                    paths
                        .iter()
                        .filter_map(|p| p.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default(),
        })
        .collect()
}

fn is_url(path: &str) -> bool {
    path.contains("://")
}

/// Replaces file locators with the manifests they reference.
///
/// `-` reads from the default reader (once). Directories contribute every
/// manifest file beneath them in name order. Remote URLs and cluster
/// locators are left in the stream untouched.
pub struct ResourceExpander<'a> {
    pub depth: usize,
    default_reader: Option<Box<dyn Read + 'a>>,
}

impl Default for ResourceExpander<'_> {
    fn default() -> Self {
        Self {
            depth: DEFAULT_DEPTH,
            default_reader: None,
        }
    }
}

impl<'a> ResourceExpander<'a> {
    pub fn new(default_reader: Option<Box<dyn Read + 'a>>) -> Self {
        Self {
            depth: DEFAULT_DEPTH,
            default_reader,
        }
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    fn expand(&mut self, nodes: Vec<Node>, depth: usize) -> Result<Vec<Node>> {
        let mut result = Vec::new();
        for node in nodes {
            if !is_file_locator(&node) {
                result.push(node);
                continue;
            }
            if depth == 0 {
                warn!(
                    event = "expansion_depth_exceeded",
                    limit = self.depth,
                    "Resource locator left unexpanded"
                );
                result.push(node);
                continue;
            }

            let paths: Vec<String> = node
                .get("resources")
                .and_then(|v| v.as_array())
                .map(|paths| {
                    paths
                        .iter()
                        .filter_map(|p| p.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();

            let mut expanded = Vec::new();
            let mut remote = Vec::new();
            for path in paths {
                if path == "-" {
                    expanded.extend(self.read_default()?);
                } else if is_url(&path) {
                    remote.push(path);
                } else {
                    read_path(Path::new(&path), &mut expanded)?;
                }
            }

            result.extend(self.expand(expanded, depth - 1)?);
            if !remote.is_empty() {
                result.push(json!({
                    "apiVersion": LOCATOR_API_VERSION,
                    "kind": "Resource",
                    "resources": remote,
                }));
            }
        }
        Ok(result)
    }

    fn read_default(&mut self) -> Result<Vec<Node>> {
        let Some(mut reader) = self.default_reader.take() else {
            return Ok(Vec::new());
        };
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        parse_documents(&text)
    }
}

fn read_path(path: &Path, out: &mut Vec<Node>) -> Result<()> {
    if fs::metadata(path)?.is_dir() {
        let mut entries = fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        entries.sort();
        for entry in entries {
            let is_manifest = entry
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| MANIFEST_EXTENSIONS.contains(&e));
            if entry.is_dir() || is_manifest {
                read_path(&entry, out)?;
            }
        }
        return Ok(());
    }

    debug!(path = %path.display(), "Reading manifests");
    let text = fs::read_to_string(path)?;
    out.extend(parse_documents(&text)?);
    Ok(())
}

impl Filter for ResourceExpander<'_> {
    fn filter(&mut self, nodes: Vec<Node>) -> Result<Vec<Node>> {
        let depth = self.depth;
        self.expand(nodes, depth)
    }
}
