//! Summaries of the experiments in a cluster

use anyhow::{Context, Result};
use kube::api::{Api, ListParams};
use optimize_lib::api::meta::{is_condition_true, LABEL_EXPERIMENT};
use optimize_lib::api::{Experiment, Trial, TrialConditionType};
use optimize_lib::summarize;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{color_phase, print_table, OutputFormat};

/// Row for the experiments table
#[derive(Debug, Tabled, Serialize)]
pub struct ExperimentRow {
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Namespace")]
    pub namespace: String,
    #[tabled(rename = "Phase")]
    pub phase: String,
    #[tabled(rename = "Active")]
    pub active: i32,
    #[tabled(rename = "Trials")]
    pub trials: usize,
}

fn is_finished(trial: &Trial) -> bool {
    is_condition_true(trial.conditions(), TrialConditionType::Complete)
        || is_condition_true(trial.conditions(), TrialConditionType::Failed)
}

fn belongs_to(trial: &Trial, experiment: &Experiment) -> bool {
    let label = trial
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(LABEL_EXPERIMENT));
    label == experiment.metadata.name.as_ref()
        && trial.metadata.namespace == experiment.metadata.namespace
}

/// Summarize each experiment from the trials that carry its label
pub fn experiment_rows(experiments: &[Experiment], trials: &[Trial], color: bool) -> Vec<ExperimentRow> {
    experiments
        .iter()
        .map(|experiment| {
            let owned: Vec<&Trial> = trials.iter().filter(|t| belongs_to(t, experiment)).collect();
            let active = owned.iter().filter(|t| !is_finished(t)).count();
            let active = i32::try_from(active).unwrap_or(i32::MAX);

            let phase = summarize(experiment, active, owned.len());
            ExperimentRow {
                name: experiment.metadata.name.clone().unwrap_or_default(),
                namespace: experiment.metadata.namespace.clone().unwrap_or_default(),
                phase: if color {
                    color_phase(phase)
                } else {
                    phase.to_string()
                },
                active,
                trials: owned.len(),
            }
        })
        .collect()
}

/// List experiments in a namespace (or all of them) with their phase
pub async fn get_experiments(
    client: kube::Client,
    namespace: Option<String>,
    all_namespaces: bool,
    format: OutputFormat,
) -> Result<()> {
    let (experiments, trials): (Api<Experiment>, Api<Trial>) = match (all_namespaces, namespace) {
        (true, _) => (Api::all(client.clone()), Api::all(client)),
        (false, Some(ns)) => (Api::namespaced(client.clone(), &ns), Api::namespaced(client, &ns)),
        (false, None) => (
            Api::default_namespaced(client.clone()),
            Api::default_namespaced(client),
        ),
    };

    let experiments = experiments
        .list(&ListParams::default())
        .await
        .context("Failed to list experiments")?;
    let trials = trials
        .list(&ListParams::default().labels(LABEL_EXPERIMENT))
        .await
        .context("Failed to list trials")?;

    let rows = experiment_rows(&experiments.items, &trials.items, format == OutputFormat::Table);
    print_table(&rows, format)
}
