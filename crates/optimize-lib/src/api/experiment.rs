//! The `Experiment` resource (`redskyops.dev/v1beta1`)

use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

use super::meta::Condition;
use super::trial::TrialSpec;

pub const EXPERIMENT_API_VERSION: &str = "redskyops.dev/v1beta1";

#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "redskyops.dev",
    version = "v1beta1",
    kind = "Experiment",
    namespaced,
    status = "ExperimentStatus",
    derive = "Default",
    derive = "PartialEq",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentSpec {
    /// Number of trials to run concurrently; zero pauses the experiment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub optimization: Vec<Optimization>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<Metric>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patches: Vec<PatchTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial_template: Option<TrialTemplateSpec>,
}

/// Free-form hints passed through to the optimizer
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Optimization {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    #[serde(default)]
    pub min: i32,
    #[serde(default)]
    pub max: i32,
    /// Categorical values; when present the bounds are ignored
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<IntOrString>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraint {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderConstraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum: Option<SumConstraint>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConstraint {
    pub lower_parameter: String,
    pub upper_parameter: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SumConstraint {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_upper_bound: bool,
    pub bound: Quantity,
    #[serde(default)]
    pub parameters: Vec<SumConstraintParameter>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SumConstraintParameter {
    pub name: String,
    pub weight: Quantity,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    #[default]
    Kubernetes,
    Prometheus,
    Jsonpath,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub name: String,
    #[serde(default)]
    pub minimize: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimize: Option<bool>,
    #[serde(default, rename = "type")]
    pub metric_type: MetricType,
    pub query: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_query: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ResourceTarget>,
}

/// The object (or list of objects) a Kubernetes metric is evaluated against
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTarget {
    pub api_version: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<LabelSelector>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchType {
    #[default]
    Strategic,
    Merge,
    Json,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchTemplate {
    #[serde(default, rename = "type")]
    pub patch_type: PatchType,
    /// Template producing the patch body as YAML or JSON
    pub patch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_ref: Option<ObjectReference>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialTemplateSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ObjectMeta>,
    #[serde(default)]
    pub spec: TrialSpec,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExperimentConditionType {
    Complete,
    Failed,
}

pub type ExperimentCondition = Condition<ExperimentConditionType>;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phase: String,
    #[serde(default)]
    pub active_trials: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ExperimentCondition>,
}

impl Experiment {
    /// The conditions recorded on the status, empty when there is no status
    pub fn conditions(&self) -> &[ExperimentCondition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;

    #[test]
    fn test_experiment_type_metadata() {
        assert_eq!(Experiment::api_version(&()), EXPERIMENT_API_VERSION);
        assert_eq!(Experiment::kind(&()), "Experiment");
    }

    #[test]
    fn test_experiment_from_yaml() {
        let exp: Experiment = serde_yaml::from_str(
            r#"
apiVersion: redskyops.dev/v1beta1
kind: Experiment
metadata:
  name: postgres
spec:
  replicas: 0
  parameters:
  - name: cpu
    min: 100
    max: 4000
    baseline: 1000
  - name: engine
    values: [innodb, myisam]
  constraints:
  - name: total
    sum:
      bound: "1"
      parameters:
      - name: cpu
        weight: "500m"
  metrics:
  - name: time
    minimize: true
    type: prometheus
    query: "{{ duration .StartTime .CompletionTime }}"
  patches:
  - patch: |
      spec:
        replicas: 1
    targetRef:
      kind: Deployment
      name: postgres
"#,
        )
        .unwrap();

        assert_eq!(exp.spec.replicas, Some(0));
        assert_eq!(exp.spec.parameters[0].baseline, Some(IntOrString::Int(1000)));
        assert_eq!(exp.spec.parameters[1].values.len(), 2);
        assert_eq!(exp.spec.metrics[0].metric_type, MetricType::Prometheus);
        assert_eq!(exp.spec.patches[0].patch_type, PatchType::Strategic);
        assert!(exp.conditions().is_empty());
    }
}
