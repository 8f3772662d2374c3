//! Export the patches of a completed trial
//!
//! The trial's assignments come from the optimization service; the
//! experiment comes from the given manifests, either directly or generated
//! from the application it was created for.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use optimize_lib::api::experiment::EXPERIMENT_API_VERSION;
use optimize_lib::api::{Experiment, Trial, TrialSpec};
use optimize_lib::experiment::populate_trial_from_template;
use optimize_lib::remote::{
    split_trial_name, ExperimentName, ExperimentsApi, TrialAssignments, TrialListQuery,
    TrialStatus,
};
use optimize_lib::scan::{Node, ResourceMeta};
use optimize_lib::server::to_cluster_trial;
use optimize_lib::template::Engine;
use optimize_lib::{create_patches, guess_scenario_and_objective, ExperimentGenerator, Patch};
use serde::Serialize;

use super::generate::find_application;
use super::{base_dir, read_manifests};

const KUSTOMIZE_API_VERSION: &str = "kustomize.config.k8s.io/v1beta1";

/// Remote experiment labels naming what the experiment was generated from
const LABEL_APPLICATION: &str = "application";
const LABEL_SCENARIO: &str = "scenario";
const LABEL_OBJECTIVE: &str = "objective";

/// Kustomization carrying nothing but the trial patches
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Kustomization {
    api_version: &'static str,
    kind: &'static str,
    patches: Vec<Patch>,
}

/// Fetch the assignments of a completed trial and write its patches.
///
/// With `patch_only` each rendered patch body is written on its own line,
/// otherwise a kustomization holding the patches and their targets.
pub async fn export_trial(
    api: &dyn ExperimentsApi,
    trial_name: &str,
    files: &[String],
    patch_only: bool,
    mut out: impl Write,
) -> Result<()> {
    let (experiment_name, number) = split_trial_name(trial_name);
    if number < 0 {
        anyhow::bail!("invalid trial name {trial_name:?}, expected <experiment>-<number>");
    }

    let remote = api
        .get_experiment_by_name(&experiment_name)
        .await
        .with_context(|| format!("Failed to get experiment {experiment_name}"))?;
    let query = TrialListQuery {
        status: vec![TrialStatus::Completed],
    };
    let trials = api
        .get_all_trials(&remote.meta.trials_url, &query)
        .await
        .context("Failed to list trials")?;
    let suggestion = trials
        .trials
        .into_iter()
        .find(|t| t.number == number)
        .map(|t| t.assignments)
        .with_context(|| {
            format!("trial {trial_name:?} not found (only completed trials can be exported)")
        })?;

    let nodes = read_manifests(files)?;
    let base_dir = files.first().map(|f| base_dir(f)).unwrap_or_else(|| PathBuf::from("."));
    let experiment = find_experiment(&nodes, &experiment_name, &remote.labels, base_dir)?;

    let patches = trial_patches(&experiment, &suggestion)?;
    if patch_only {
        for patch in &patches {
            writeln!(out, "{}", patch.patch)?;
        }
    } else {
        let kustomization = Kustomization {
            api_version: KUSTOMIZE_API_VERSION,
            kind: "Kustomization",
            patches,
        };
        out.write_all(serde_yaml::to_string(&kustomization)?.as_bytes())?;
    }
    out.flush()?;
    Ok(())
}

/// Render the patches of an experiment for a set of assignments
pub fn trial_patches(experiment: &Experiment, suggestion: &TrialAssignments) -> Result<Vec<Patch>> {
    let mut trial = Trial::new("", TrialSpec::default());
    trial.metadata.name = None;
    populate_trial_from_template(experiment, &mut trial);
    to_cluster_trial(&mut trial, suggestion);

    create_patches(experiment, &trial, &Engine::new()).context("Failed to render patches")
}

fn is_experiment(node: &Node, name: &ExperimentName) -> bool {
    let meta = ResourceMeta::of(node);
    meta.kind == "Experiment" && meta.api_version == EXPERIMENT_API_VERSION && meta.name == name.name()
}

/// Find the named experiment in the manifests, generating it from an
/// application when only the application is present
fn find_experiment(
    nodes: &[Node],
    name: &ExperimentName,
    labels: &BTreeMap<String, String>,
    base_dir: PathBuf,
) -> Result<Experiment> {
    if let Some(node) = nodes.iter().find(|n| is_experiment(n, name)) {
        return serde_json::from_value(node.clone()).context("Invalid experiment");
    }

    let application = find_application(nodes, labels.get(LABEL_APPLICATION).map(String::as_str))
        .with_context(|| format!("experiment {name} not found in the input"))?;

    let (guessed_scenario, guessed_objective) =
        guess_scenario_and_objective(&application, name.name());
    let mut generator = ExperimentGenerator::new(application);
    generator.scenario = labels.get(LABEL_SCENARIO).cloned().unwrap_or(guessed_scenario);
    generator.objective = labels.get(LABEL_OBJECTIVE).cloned().unwrap_or(guessed_objective);
    generator.base_dir = base_dir;

    let mut generated: Vec<Node> = Vec::new();
    generator
        .execute(&mut generated)
        .context("Failed to generate experiment")?;

    let node = generated
        .iter()
        .find(|n| ResourceMeta::of(n).kind == "Experiment")
        .context("no experiment generated")?;
    serde_json::from_value(node.clone()).context("Invalid experiment")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use optimize_lib::remote::{
        self, Assignment, ErrorType, Labels, NumberOrString, TrialItem, TrialList, TrialMeta,
        TrialValues,
    };

    const EXPERIMENT: &str = r#"
apiVersion: redskyops.dev/v1beta1
kind: Experiment
metadata:
  name: demo
  namespace: store
spec:
  parameters:
  - name: replicas
    min: 1
    max: 5
  patches:
  - targetRef:
      apiVersion: apps/v1
      kind: Deployment
      name: web
    patch: |
      spec:
        replicas: {{ .Values.replicas }}
"#;

    struct FakeApi {
        trials: Vec<TrialItem>,
    }

    #[async_trait]
    impl ExperimentsApi for FakeApi {
        async fn get_experiment_by_name(
            &self,
            name: &ExperimentName,
        ) -> Result<remote::Experiment, remote::Error> {
            if name.name() != "demo" {
                return Err(remote::Error::new(ErrorType::ExperimentNotFound, "not found"));
            }
            let mut exp = remote::Experiment::default();
            exp.meta.trials_url = "http://example.com/experiments/demo/trials/".into();
            Ok(exp)
        }

        async fn get_all_trials(
            &self,
            _: &str,
            query: &TrialListQuery,
        ) -> Result<TrialList, remote::Error> {
            assert_eq!(query.status, vec![TrialStatus::Completed]);
            Ok(TrialList {
                trials: self.trials.clone(),
            })
        }

        async fn label_experiment(&self, _: &str, _: &Labels) -> Result<(), remote::Error> {
            Ok(())
        }

        async fn label_trial(&self, _: &str, _: &Labels) -> Result<(), remote::Error> {
            Ok(())
        }
    }

    fn fake() -> FakeApi {
        FakeApi {
            trials: vec![TrialItem {
                assignments: TrialAssignments {
                    meta: TrialMeta {
                        self_url: "http://example.com/experiments/demo/trials/7".into(),
                        labels_url: String::new(),
                    },
                    labels: Default::default(),
                    assignments: vec![Assignment {
                        parameter_name: "replicas".into(),
                        value: NumberOrString::from_i64(3),
                    }],
                },
                values: TrialValues::default(),
                number: 7,
                status: TrialStatus::Completed,
            }],
        }
    }

    fn manifest() -> (tempfile::NamedTempFile, String) {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), EXPERIMENT).unwrap();
        let path = file.path().to_string_lossy().into_owned();
        (file, path)
    }

    #[tokio::test]
    async fn test_export_kustomization() {
        let (_file, path) = manifest();
        let mut out = Vec::new();
        export_trial(&fake(), "demo-007", &[path], false, &mut out)
            .await
            .unwrap();

        let doc: serde_json::Value = serde_yaml::from_slice(&out).unwrap();
        assert_eq!(doc["kind"], "Kustomization");
        assert_eq!(doc["patches"][0]["target"]["kind"], "Deployment");
        assert_eq!(doc["patches"][0]["target"]["name"], "web");
        let body: serde_json::Value =
            serde_json::from_str(doc["patches"][0]["patch"].as_str().unwrap()).unwrap();
        assert_eq!(body["spec"]["replicas"], 3);
    }

    #[tokio::test]
    async fn test_export_patch_only() {
        let (_file, path) = manifest();
        let mut out = Vec::new();
        export_trial(&fake(), "demo-7", &[path], true, &mut out)
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        let body: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(body["kind"], "Deployment");
        assert_eq!(body["spec"]["replicas"], 3);
    }

    #[tokio::test]
    async fn test_export_unknown_trial() {
        let (_file, path) = manifest();
        let err = export_trial(&fake(), "demo-8", &[path], false, Vec::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("demo-8"), "{err}");
    }

    #[tokio::test]
    async fn test_export_requires_trial_number() {
        let err = export_trial(&fake(), "demo", &[], false, Vec::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("<experiment>-<number>"));
    }
}
