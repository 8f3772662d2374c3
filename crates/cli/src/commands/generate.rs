//! Generation commands: applications from manifests, experiments from
//! applications

use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use optimize_lib::api::application::{APPLICATION_API_VERSION, APPLICATION_KIND};
use optimize_lib::api::{Application, ResourceLocator};
use optimize_lib::scan::{Node, ResourceMeta, YamlWriter};
use optimize_lib::{ApplicationGenerator, ExperimentGenerator};

use super::{base_dir, read_manifests};

/// Scan manifests into an application and write it as YAML
pub fn generate_application<'a>(
    name: Option<String>,
    resources: Vec<String>,
    objectives: Vec<String>,
    input: impl Read + 'a,
    out: impl Write,
) -> Result<()> {
    let resources = if resources.is_empty() {
        vec!["-".to_string()]
    } else {
        resources
    };

    let mut generator = ApplicationGenerator {
        name: name.unwrap_or_default(),
        resources: vec![ResourceLocator::files(resources)],
        objectives,
        default_reader: Some(Box::new(input)),
        ..Default::default()
    };
    generator
        .execute(YamlWriter::new(out))
        .context("Failed to generate application")
}

/// Options for `generate experiment`
#[derive(Debug, Clone, Default)]
pub struct ExperimentOptions {
    /// Files holding the application; the first one anchors relative paths
    pub files: Vec<String>,
    /// Application name, needed when the files hold more than one
    pub application: Option<String>,
    pub scenario: Option<String>,
    pub objective: Option<String>,
}

/// Generate an experiment (and its auxiliary resources) as YAML
pub fn generate_experiment(options: &ExperimentOptions, out: impl Write) -> Result<()> {
    let nodes = read_manifests(&options.files)?;
    let application = find_application(&nodes, options.application.as_deref())?;

    let mut generator = ExperimentGenerator::new(application);
    generator.scenario = options.scenario.clone().unwrap_or_default();
    generator.objective = options.objective.clone().unwrap_or_default();
    generator.base_dir = options
        .files
        .first()
        .map(|f| base_dir(f))
        .unwrap_or_else(|| PathBuf::from("."));

    generator
        .execute(YamlWriter::new(out))
        .context("Failed to generate experiment")
}

fn is_application(node: &Node) -> bool {
    let meta = ResourceMeta::of(node);
    meta.kind == APPLICATION_KIND && meta.api_version == APPLICATION_API_VERSION
}

/// Pick the application out of a manifest stream
pub fn find_application(nodes: &[Node], name: Option<&str>) -> Result<Application> {
    let mut candidates = nodes
        .iter()
        .filter(|n| is_application(n))
        .filter(|n| name.map_or(true, |name| ResourceMeta::of(n).name == name));

    let node = match (candidates.next(), candidates.next(), name) {
        (Some(node), None, _) => node,
        (Some(_), Some(_), _) => anyhow::bail!("multiple applications found, a name is required"),
        (None, _, Some(name)) => anyhow::bail!("application {name:?} not found"),
        (None, _, None) => anyhow::bail!("no application found"),
    };
    serde_json::from_value(node.clone()).context("Invalid application")
}

#[cfg(test)]
mod tests {
    use super::*;
    use optimize_lib::scan::parse_documents;
    use std::io::Write as _;

    const DEPLOYMENT: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  template:
    spec:
      containers:
      - name: app
        image: nginx
        resources:
          requests:
            cpu: 100m
            memory: 64Mi
"#;

    #[test]
    fn test_generate_application_from_input() {
        let mut out = Vec::new();
        generate_application(
            Some("shop".into()),
            Vec::new(),
            vec!["cost".into()],
            DEPLOYMENT.as_bytes(),
            &mut out,
        )
        .unwrap();

        let nodes = parse_documents(&String::from_utf8(out).unwrap()).unwrap();
        let app = find_application(&nodes, None).unwrap();
        assert_eq!(app.name(), "shop");
        assert_eq!(app.objectives.len(), 1);
        assert_eq!(app.objectives[0].name, "cost");
    }

    #[test]
    fn test_generate_experiment_from_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("deployment.yaml"), DEPLOYMENT).unwrap();
        let app_path = dir.path().join("app.yaml");
        let mut app = std::fs::File::create(&app_path).unwrap();
        write!(
            app,
            r#"
apiVersion: apps.redskyops.dev/v1alpha1
kind: Application
metadata:
  name: shop
resources:
- resource:
    resources:
    - deployment.yaml
scenarios:
- name: load
  custom:
    image: loadgen:latest
objectives:
- name: cost
  goals:
  - name: time
    duration:
      durationType: trial
"#
        )
        .unwrap();

        let options = ExperimentOptions {
            files: vec![app_path.to_string_lossy().into_owned()],
            ..Default::default()
        };
        let mut out = Vec::new();
        generate_experiment(&options, &mut out).unwrap();

        let nodes = parse_documents(&String::from_utf8(out).unwrap()).unwrap();
        let experiment = nodes
            .iter()
            .find(|n| n["kind"] == "Experiment")
            .expect("experiment generated");
        assert_eq!(experiment["metadata"]["name"], "shop-load-cost");
        assert!(!experiment["spec"]["parameters"]
            .as_array()
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_find_application() {
        let nodes = parse_documents(
            r#"
apiVersion: apps.redskyops.dev/v1alpha1
kind: Application
metadata:
  name: one
---
apiVersion: v1
kind: Service
metadata:
  name: one
---
apiVersion: apps.redskyops.dev/v1alpha1
kind: Application
metadata:
  name: two
"#,
        )
        .unwrap();

        assert!(find_application(&nodes, None).is_err());
        assert_eq!(find_application(&nodes, Some("two")).unwrap().name(), "two");
        let err = find_application(&nodes, Some("three")).unwrap_err();
        assert!(err.to_string().contains("three"));
    }
}
