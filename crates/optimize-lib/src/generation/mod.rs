//! Experiment generation from applications
//!
//! This module provides:
//! - Scenario sources (Locust, custom pods, Prometheus and duration goals)
//!   that contribute metrics, trial job changes and auxiliary resources
//! - The built-in Prometheus setup used by metrics without a URL
//! - Container resource parameters and patches derived from workloads
//! - `ExperimentGenerator`, which ties the pieces together

mod custom;
mod duration;
mod generator;
mod locust;
mod prometheus;
mod resources;


pub use custom::CustomSource;
pub use duration::DurationSource;
pub use generator::{guess_scenario_and_objective, ExperimentGenerator};
pub use locust::LocustSource;
pub use prometheus::{BuiltInPrometheus, PrometheusSource};
pub use resources::{container_resources, ContainerResourcesFact};

use k8s_openapi::api::core::v1::{PodSpec, PodTemplateSpec};

use crate::api::application::{Goal, RequestsGoal};
use crate::api::experiment::{Metric, MetricType, ResourceTarget};
use crate::api::selector::parse_label_selector;
use crate::api::Experiment;
use crate::error::{Error, Result};
use crate::quantity::Quantity;
use crate::scan::{Node, Reader};

/// Changes the experiment, usually its trial job template
pub trait ExperimentSource {
    fn update(&mut self, experiment: &mut Experiment) -> Result<()>;
}

/// Contributes metrics for the goals of an objective
pub trait MetricSource {
    fn metrics(&self) -> Result<Vec<Metric>>;
}

/// Everything that can contribute to a generated experiment.
///
/// Each source supports a subset of the capabilities; the accessors return
/// `None` for the ones it lacks.
pub enum Source {
    Locust(LocustSource),
    Custom(CustomSource),
    Prometheus(PrometheusSource),
    Duration(DurationSource),
    BuiltInPrometheus(BuiltInPrometheus),
}

impl Source {
    pub fn as_experiment_source(&mut self) -> Option<&mut dyn ExperimentSource> {
        match self {
            Source::Locust(s) => Some(s),
            Source::Custom(s) => Some(s),
            Source::BuiltInPrometheus(s) => Some(s),
            Source::Prometheus(_) | Source::Duration(_) => None,
        }
    }

    pub fn as_metric_source(&self) -> Option<&dyn MetricSource> {
        match self {
            Source::Locust(s) => Some(s),
            Source::Custom(s) => Some(s),
            Source::Prometheus(s) => Some(s),
            Source::Duration(s) => Some(s),
            Source::BuiltInPrometheus(_) => None,
        }
    }

    pub fn as_reader(&mut self) -> Option<&mut dyn Reader> {
        match self {
            Source::Locust(s) => Some(s),
            Source::BuiltInPrometheus(s) => Some(s),
            Source::Custom(_) | Source::Prometheus(_) | Source::Duration(_) => None,
        }
    }
}

/// Image used for the built-in trial jobs
pub fn trial_job_image(job: &str) -> String {
    format!(
        "thestormforge/optimize-trials:v{}-{job}",
        env!("CARGO_PKG_VERSION")
    )
}

/// A Prometheus metric named after the goal
pub(crate) fn new_goal_metric(goal: &Goal, query: impl Into<String>) -> Metric {
    Metric {
        name: goal.name.clone(),
        minimize: !goal.max,
        optimize: goal.optimize,
        metric_type: MetricType::Prometheus,
        query: query.into(),
        ..Default::default()
    }
}

/// The weighted sum of pod resource requests.
///
/// Weights are rescaled so memory is expressed per gigabyte (`1000^4` of the
/// byte weight) and everything else per thousand.
pub(crate) fn requests_metric(goal: &Goal, requests: &RequestsGoal) -> Result<Metric> {
    let mut weights = Vec::new();
    for (name, quantity) in &requests.weights {
        let exponent = if name == "memory" { 4 } else { 1 };
        let value = Quantity::try_from(quantity)?.value() as f64;
        let weight = value / 1000f64.powi(exponent);
        weights.push(format!("{name}={weight}"));
    }
    let query = format!("{{{{ resourceRequests .Target {:?} }}}}", weights.join(","));

    let label_selector = parse_label_selector(&requests.selector)
        .map_err(|e| e.context(format!("invalid selector for goal {:?}", goal.name)))?;

    let mut metric = new_goal_metric(goal, query);
    metric.metric_type = MetricType::Kubernetes;
    metric.target = Some(ResourceTarget {
        api_version: "v1".to_string(),
        kind: "PodList".to_string(),
        label_selector: Some(label_selector),
        ..Default::default()
    });
    Ok(metric)
}

/// The pod template of the trial job, created on demand
pub(crate) fn ensure_trial_job_pod(experiment: &mut Experiment) -> &mut PodTemplateSpec {
    let template = experiment
        .spec
        .trial_template
        .get_or_insert_with(Default::default);
    let job = template.spec.job_template.get_or_insert_with(Default::default);
    &mut job.spec.get_or_insert_with(Default::default).template
}

pub(crate) fn ensure_pod_spec(pod: &mut PodTemplateSpec) -> &mut PodSpec {
    pod.spec.get_or_insert_with(Default::default)
}

/// Serialize a typed object into a manifest node
pub(crate) fn to_node<T: serde::Serialize>(object: &T) -> Result<Node> {
    serde_json::to_value(object).map_err(Error::from)
}
