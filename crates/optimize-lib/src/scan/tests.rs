use std::fs;

use serde_json::json;
use tempfile::TempDir;

use super::*;
use crate::api::application::{ResourceLocator, LOCATOR_API_VERSION};

const DEPLOYMENT: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: shop
  labels:
    app: web
status:
  replicas: 1
---
apiVersion: v1
kind: Service
metadata:
  name: web
"#;

#[test]
fn test_parse_documents_skips_empty() {
    let nodes = parse_documents("---\na: 1\n---\n---\nb: 2\n").unwrap();
    assert_eq!(nodes, vec![json!({"a": 1}), json!({"b": 2})]);
    assert!(parse_documents("a: [").is_err());
}

#[test]
fn test_resource_meta() {
    let nodes = parse_documents(DEPLOYMENT).unwrap();
    let meta = ResourceMeta::of(&nodes[0]);
    assert_eq!(meta.kind, "Deployment");
    assert_eq!(meta.group(), "apps");
    assert_eq!(meta.version(), "v1");
    assert_eq!(meta.namespace, "shop");
    assert_eq!(meta.labels["app"], "web");

    let service = ResourceMeta::of(&nodes[1]);
    assert_eq!(service.group(), "");
    assert_eq!(service.version(), "v1");
}

#[test]
fn test_expander_reads_files_and_directories() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("b.yaml"), DEPLOYMENT).unwrap();
    fs::write(dir.path().join("a.yml"), "kind: ConfigMap\n").unwrap();
    fs::write(dir.path().join("notes.txt"), "not a manifest").unwrap();

    let locators = vec![ResourceLocator::files([dir.path().to_string_lossy()])];
    let mut expander = ResourceExpander::default();
    let nodes = expander.filter(locator_nodes(&locators)).unwrap();

    let kinds: Vec<_> = nodes.iter().map(|n| ResourceMeta::of(n).kind).collect();
    assert_eq!(kinds, vec!["ConfigMap", "Deployment", "Service"]);
}

#[test]
fn test_expander_reads_default_reader_once() {
    let input: &[u8] = b"kind: Secret\n";
    let mut expander = ResourceExpander::new(Some(Box::new(input)));
    let nodes = expander
        .filter(locator_nodes(&[ResourceLocator::files(["-", "-"])]))
        .unwrap();
    assert_eq!(nodes, vec![json!({"kind": "Secret"})]);
}

#[test]
fn test_expander_follows_nested_locators() {
    let dir = TempDir::new().unwrap();
    let inner = dir.path().join("inner.yaml");
    fs::write(&inner, "kind: Namespace\n").unwrap();
    let outer = dir.path().join("outer.yaml");
    fs::write(
        &outer,
        format!(
            "apiVersion: {LOCATOR_API_VERSION}\nkind: Resource\nresources:\n- {}\n",
            inner.display()
        ),
    )
    .unwrap();

    let nodes = ResourceExpander::default()
        .filter(locator_nodes(&[ResourceLocator::files([outer.to_string_lossy()])]))
        .unwrap();
    assert_eq!(nodes, vec![json!({"kind": "Namespace"})]);
}

#[test]
fn test_expander_stops_at_depth_limit() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("self.yaml");
    fs::write(
        &path,
        format!(
            "apiVersion: {LOCATOR_API_VERSION}\nkind: Resource\nresources:\n- {}\n",
            path.display()
        ),
    )
    .unwrap();

    let nodes = ResourceExpander::default()
        .with_depth(3)
        .filter(locator_nodes(&[ResourceLocator::files([path.to_string_lossy()])]))
        .unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(ResourceMeta::of(&nodes[0]).kind, "Resource");
}

#[test]
fn test_expander_aborts_on_io_error() {
    let result = ResourceExpander::default()
        .filter(locator_nodes(&[ResourceLocator::files(["/does/not/exist.yaml"])]));
    assert!(matches!(result, Err(crate::Error::Io(_))));
}

#[test]
fn test_expander_keeps_urls_and_cluster_locators() {
    let mut locators = vec![ResourceLocator::files(["https://example.com/app.yaml"])];
    locators.push(ResourceLocator {
        resource: None,
        kubernetes: Some(crate::api::application::KubernetesResources {
            namespaces: vec!["default".into()],
            selector: "app=web".into(),
        }),
    });
    let input = locator_nodes(&locators);
    let nodes = ResourceExpander::default().filter(input.clone()).unwrap();
    assert_eq!(nodes, input);
}

struct CountKinds;

impl Scan for CountKinds {
    type Fact = String;

    fn select(&self, nodes: &[Node]) -> crate::Result<Vec<Node>> {
        Ok(nodes.iter().filter(|n| n.get("kind").is_some()).cloned().collect())
    }

    fn map(&self, _: &Node, meta: &ResourceMeta) -> crate::Result<Vec<String>> {
        Ok(vec![meta.kind.clone()])
    }

    fn transform(&self, _: Vec<Node>, facts: Vec<String>) -> crate::Result<Vec<Node>> {
        Ok(vec![json!({"kinds": facts, "status": {"x": 1}})])
    }
}

#[test]
fn test_pipeline_with_scanner() {
    let mut output: Vec<Node> = Vec::new();
    let scan = CountKinds;
    Pipeline::new()
        .input(parse_documents(DEPLOYMENT).unwrap())
        .input(vec![json!({"unrelated": true})])
        .filter(Scanner::new(&scan))
        .filter(clear_field("status"))
        .output(&mut output)
        .execute()
        .unwrap();
    assert_eq!(output, vec![json!({"kinds": ["Deployment", "Service"]})]);
}

#[test]
fn test_yaml_writer_separates_documents() {
    let mut writer = YamlWriter::new(Vec::new());
    writer.write(vec![json!({"a": 1}), json!({"b": 2})]).unwrap();
    let text = String::from_utf8(writer.into_inner()).unwrap();
    assert_eq!(text, "a: 1\n---\nb: 2\n");
    assert_eq!(parse_documents(&text).unwrap().len(), 2);
}
