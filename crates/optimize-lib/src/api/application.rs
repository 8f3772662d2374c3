//! The `Application` resource (`apps.redskyops.dev/v1alpha1`)
//!
//! An application is written by users: it lists where the workload manifests
//! live, how to exercise the workload (scenarios) and what to optimize for
//! (objectives). Unlike the experiment types the fields sit at the top level of
//! the document instead of under `spec`.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

pub const APPLICATION_API_VERSION: &str = "apps.redskyops.dev/v1alpha1";
pub const APPLICATION_KIND: &str = "Application";

/// API version of the nested resource locator documents
pub const LOCATOR_API_VERSION: &str = "konjure.carnegietech.io/v1beta1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceLocator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<Ingress>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scenarios: Vec<Scenario>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objectives: Vec<Objective>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_provider: Option<CloudProvider>,
}

impl Default for Application {
    fn default() -> Self {
        Self {
            api_version: APPLICATION_API_VERSION.to_string(),
            kind: APPLICATION_KIND.to_string(),
            metadata: ObjectMeta::default(),
            resources: Vec::new(),
            parameters: None,
            ingress: None,
            scenarios: Vec::new(),
            objectives: Vec::new(),
            cloud_provider: None,
        }
    }
}

impl Application {
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn ingress_url(&self) -> Option<&str> {
        self.ingress
            .as_ref()
            .map(|i| i.url.as_str())
            .filter(|u| !u.is_empty())
    }

    /// Fill in the names users are allowed to leave out
    pub fn default_names(&mut self) {
        for scenario in &mut self.scenarios {
            if scenario.name.is_empty() {
                scenario.name = "default".to_string();
            }
        }

        for objective in &mut self.objectives {
            for goal in &mut objective.goals {
                if goal.name.is_empty() {
                    if let Some(kind) = &goal.kind {
                        goal.name = kind.default_name();
                    }
                }
            }

            if objective.name.is_empty() {
                match objective.goals.first().and_then(|g| g.kind.as_ref()) {
                    Some(GoalKind::Requests(_)) => objective.name = "cost".to_string(),
                    Some(GoalKind::Latency(_)) => objective.name = "latency".to_string(),
                    _ => {}
                }
            }
        }
    }
}

/// Where to find manifests: exactly one of a file list or a cluster selector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLocator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<FileResources>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes: Option<KubernetesResources>,
}

impl ResourceLocator {
    pub fn files<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resource: Some(FileResources {
                resources: paths.into_iter().map(Into::into).collect(),
            }),
            kubernetes: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResources {
    #[serde(default)]
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesResources {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub selector: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_resources: Option<ContainerResources>,
}

/// Which containers get CPU and memory parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerResources {
    /// Label selector matched against workload labels
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub selector: String,
    /// Resource names to tune, `cpu` and `memory` when empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingress {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudProvider {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generic: Option<ProviderCost>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcp: Option<ProviderCost>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<ProviderCost>,
}

/// Cost per unit of each resource (e.g. `cpu: 17m`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderCost {
    #[serde(default)]
    pub cost: BTreeMap<String, Quantity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub kind: ScenarioKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScenarioKind {
    Locust(LocustScenario),
    Custom(CustomScenario),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocustScenario {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawn_rate: Option<i32>,
    /// Duration string such as `5m`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_time: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub locustfile: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomScenario {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_template: Option<PodTemplateSpec>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub initial_delay_seconds: i32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub approximate_runtime_seconds: i32,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub push_gateway: bool,
}

fn is_zero(v: &i32) -> bool {
    *v == 0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Objective {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goals: Vec<Goal>,
}

impl Objective {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            goals: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub max: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimize: Option<bool>,
    /// Set once a metric has been produced for this goal
    #[serde(skip)]
    pub implemented: bool,
    #[serde(flatten)]
    pub kind: Option<GoalKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GoalKind {
    Requests(RequestsGoal),
    Latency(LatencyGoal),
    ErrorRate(ErrorRateGoal),
    Duration(DurationGoal),
    Prometheus(PrometheusGoal),
}

impl GoalKind {
    fn default_name(&self) -> String {
        match self {
            GoalKind::Requests(_) => "cost".to_string(),
            GoalKind::Latency(l) => format!("latency-{}", l.latency_type.to_lowercase()),
            GoalKind::ErrorRate(_) => "error-rate".to_string(),
            GoalKind::Duration(_) => "time".to_string(),
            GoalKind::Prometheus(_) => "custom".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestsGoal {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub selector: String,
    #[serde(default)]
    pub weights: BTreeMap<String, Quantity>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyGoal {
    pub latency_type: String,
}

/// The latency statistics a load test can report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyType {
    Minimum,
    Maximum,
    Mean,
    Percentile50,
    Percentile95,
    Percentile99,
}

impl LatencyType {
    /// Normalize the spellings accepted in manifests
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "min" | "minimum" => Some(Self::Minimum),
            "max" | "maximum" => Some(Self::Maximum),
            "mean" | "average" => Some(Self::Mean),
            "p50" | "percentile50" | "median" => Some(Self::Percentile50),
            "p95" | "percentile95" => Some(Self::Percentile95),
            "p99" | "percentile99" => Some(Self::Percentile99),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRateGoal {
    pub error_rate_type: String,
}

pub const ERROR_RATE_REQUESTS: &str = "requests";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationGoal {
    pub duration_type: String,
}

pub const DURATION_TRIAL: &str = "trial";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusGoal {
    pub query: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub maximize: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP: &str = r#"
apiVersion: apps.redskyops.dev/v1alpha1
kind: Application
metadata:
  name: sampleapp
resources:
- resource:
    resources:
    - manifests/
ingress:
  url: http://sampleapp.local
scenarios:
- locust:
    users: 10
    locustfile: locustfile.py
objectives:
- goals:
  - requests:
      weights:
        cpu: "17"
        memory: "2"
- goals:
  - latency:
      latencyType: p95
"#;

    #[test]
    fn test_application_from_yaml() {
        let app: Application = serde_yaml::from_str(APP).unwrap();
        assert_eq!(app.name(), "sampleapp");
        assert_eq!(app.ingress_url(), Some("http://sampleapp.local"));
        assert_eq!(app.resources, vec![ResourceLocator::files(["manifests/"])]);
        match &app.scenarios[0].kind {
            ScenarioKind::Locust(l) => {
                assert_eq!(l.users, Some(10));
                assert_eq!(l.locustfile, "locustfile.py");
            }
            other => panic!("unexpected scenario {other:?}"),
        }
        assert!(matches!(
            app.objectives[1].goals[0].kind,
            Some(GoalKind::Latency(_))
        ));
    }

    #[test]
    fn test_default_names() {
        let mut app: Application = serde_yaml::from_str(APP).unwrap();
        app.default_names();
        assert_eq!(app.scenarios[0].name, "default");
        assert_eq!(app.objectives[0].name, "cost");
        assert_eq!(app.objectives[1].name, "latency");
        assert_eq!(app.objectives[0].goals[0].name, "cost");
        assert_eq!(app.objectives[1].goals[0].name, "latency-p95");
    }

    #[test]
    fn test_default_names_keeps_explicit_names() {
        let mut app = Application::default();
        app.objectives.push(Objective::named("speed"));
        app.default_names();
        assert_eq!(app.objectives[0].name, "speed");
    }

    #[test]
    fn test_latency_type_spellings() {
        assert_eq!(LatencyType::parse("P95"), Some(LatencyType::Percentile95));
        assert_eq!(LatencyType::parse("average"), Some(LatencyType::Mean));
        assert_eq!(LatencyType::parse("p42"), None);
    }
}
