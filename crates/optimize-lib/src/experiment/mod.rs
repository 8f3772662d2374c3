//! Experiment lifecycle
//!
//! - `summarize`: collapse an experiment and its trial counts into a `Phase`
//! - Condition updates for experiments and trials
//! - Trial construction from an experiment's trial template


use std::fmt;

use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::Resource;
use serde::{Deserialize, Serialize};

use crate::api::experiment::{Experiment, ExperimentConditionType};
use crate::api::meta::{
    is_condition_true, upsert_condition, ConditionStatus, SyncCursors, LABEL_EXPERIMENT,
};
use crate::api::trial::{Trial, TrialConditionType};

/// The lifecycle phase reported for an experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Empty,
    Created,
    Paused,
    Running,
    Idle,
    Completed,
    Failed,
    Deleted,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Empty => "Empty",
            Phase::Created => "Created",
            Phase::Paused => "Paused",
            Phase::Running => "Running",
            Phase::Idle => "Idle",
            Phase::Completed => "Completed",
            Phase::Failed => "Failed",
            Phase::Deleted => "Deleted",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Determine the phase of an experiment.
///
/// The checks are ordered; the first one that matches wins:
/// deleted, running trials, complete, failed, paused (zero replicas),
/// no trials yet (created once synchronized, otherwise empty), idle.
pub fn summarize(experiment: &Experiment, active_trials: i32, total_trials: usize) -> Phase {
    if experiment.metadata.deletion_timestamp.is_some() {
        return Phase::Deleted;
    }

    if active_trials > 0 {
        return Phase::Running;
    }

    let conditions = experiment.conditions();
    if is_condition_true(conditions, ExperimentConditionType::Complete) {
        return Phase::Completed;
    }
    if is_condition_true(conditions, ExperimentConditionType::Failed) {
        return Phase::Failed;
    }

    if experiment.spec.replicas == Some(0) {
        return Phase::Paused;
    }

    if total_trials == 0 {
        return if SyncCursors::from_meta(&experiment.metadata).is_synced() {
            Phase::Created
        } else {
            Phase::Empty
        };
    }

    Phase::Idle
}

/// Record the phase computed by `summarize` on the experiment status
pub fn update_status(
    experiment: &mut Experiment,
    active_trials: i32,
    total_trials: usize,
) -> Phase {
    let phase = summarize(experiment, active_trials, total_trials);
    let status = experiment.status.get_or_insert_with(Default::default);
    status.phase = phase.to_string();
    status.active_trials = active_trials;
    phase
}

/// Insert or update an experiment condition
pub fn apply_condition(
    experiment: &mut Experiment,
    type_: ExperimentConditionType,
    status: ConditionStatus,
    reason: &str,
    message: &str,
    time: &Time,
) {
    let conditions = &mut experiment
        .status
        .get_or_insert_with(Default::default)
        .conditions;
    upsert_condition(conditions, type_, status, reason, message, time);
}

/// Insert or update a trial condition
pub fn apply_trial_condition(
    trial: &mut Trial,
    type_: TrialConditionType,
    status: ConditionStatus,
    reason: &str,
    message: &str,
    time: &Time,
) {
    let conditions = &mut trial.status.get_or_insert_with(Default::default).conditions;
    upsert_condition(conditions, type_, status, reason, message, time);
}

fn self_reference(experiment: &Experiment) -> ObjectReference {
    ObjectReference {
        api_version: Some(Experiment::api_version(&()).into_owned()),
        kind: Some(Experiment::kind(&()).into_owned()),
        name: experiment.metadata.name.clone(),
        namespace: experiment.metadata.namespace.clone(),
        uid: experiment.metadata.uid.clone(),
        ..Default::default()
    }
}

/// Start a trial from the experiment's trial template.
///
/// The template's metadata and spec replace the trial's, then the experiment
/// reference, the experiment label, a generated name prefix and the
/// namespace are filled in.
pub fn populate_trial_from_template(experiment: &Experiment, trial: &mut Trial) {
    if let Some(template) = &experiment.spec.trial_template {
        if let Some(metadata) = &template.metadata {
            trial.metadata = metadata.clone();
        }
        trial.spec = template.spec.clone();
    }

    let experiment_name = experiment.metadata.name.clone().unwrap_or_default();
    trial
        .metadata
        .labels
        .get_or_insert_with(Default::default)
        .insert(LABEL_EXPERIMENT.to_string(), experiment_name.clone());
    trial.metadata.annotations.get_or_insert_with(Default::default);
    trial.spec.experiment_ref = Some(self_reference(experiment));

    if trial.metadata.name.is_none() && trial.metadata.generate_name.is_none() {
        trial.metadata.generate_name = Some(format!("{experiment_name}-"));
    }

    if trial.metadata.namespace.is_none() {
        trial.metadata.namespace = experiment.metadata.namespace.clone();
    }
}
