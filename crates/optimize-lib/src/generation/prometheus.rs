use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::debug;

use super::{new_goal_metric, to_node, ExperimentSource, MetricSource};
use crate::api::application::{Goal, GoalKind};
use crate::api::experiment::{Metric, MetricType};
use crate::api::trial::SetupTask;
use crate::api::Experiment;
use crate::error::Result;
use crate::scan::{Node, Reader};

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";

/// A user supplied Prometheus query
#[derive(Debug, Clone, Default)]
pub struct PrometheusSource {
    pub goal: Goal,
}

impl MetricSource for PrometheusSource {
    fn metrics(&self) -> Result<Vec<Metric>> {
        if self.goal.implemented {
            return Ok(Vec::new());
        }
        let Some(GoalKind::Prometheus(prometheus)) = &self.goal.kind else {
            return Ok(Vec::new());
        };

        let mut metric = new_goal_metric(&self.goal, prometheus.query.clone());
        metric.url = prometheus.url.clone();
        metric.minimize = !prometheus.maximize;
        Ok(vec![metric])
    }
}

/// Provisions a throwaway Prometheus for metrics that do not name a server.
///
/// Nothing is added unless at least one Prometheus metric lacks a URL.
#[derive(Debug, Clone)]
pub struct BuiltInPrometheus {
    pub setup_task_name: String,
    pub cluster_role_name: String,
    pub service_account_name: String,
    pub cluster_role_binding_name: String,
    objects: Vec<Node>,
}

impl BuiltInPrometheus {
    pub fn new(experiment_name: &str) -> Self {
        Self {
            setup_task_name: "monitoring".to_string(),
            cluster_role_name: "optimize-prometheus".to_string(),
            service_account_name: "optimize-setup".to_string(),
            cluster_role_binding_name: format!("{experiment_name}-prometheus"),
            objects: Vec::new(),
        }
    }

    fn cluster_role(&self) -> ClusterRole {
        let rule = |groups: &[&str], resources: &[&str], verbs: &[&str]| PolicyRule {
            api_groups: Some(groups.iter().map(|s| s.to_string()).collect()),
            resources: Some(resources.iter().map(|s| s.to_string()).collect()),
            verbs: verbs.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };

        ClusterRole {
            metadata: ObjectMeta {
                name: Some(self.cluster_role_name.clone()),
                ..Default::default()
            },
            rules: Some(vec![
                // Manage the Prometheus resources from the setup task
                rule(
                    &[RBAC_GROUP],
                    &["clusterroles", "clusterrolebindings"],
                    &["get", "create", "delete"],
                ),
                rule(
                    &[""],
                    &["serviceaccounts", "services", "configmaps"],
                    &["get", "create", "delete"],
                ),
                rule(
                    &["apps"],
                    &["deployments"],
                    &["get", "create", "delete", "list", "watch"],
                ),
                // Delegated to the Prometheus server itself
                rule(
                    &[""],
                    &["nodes", "nodes/metrics", "nodes/proxy", "services"],
                    &["list", "watch", "get"],
                ),
                rule(&[""], &["pods"], &["list", "watch"]),
            ]),
            ..Default::default()
        }
    }
}

impl ExperimentSource for BuiltInPrometheus {
    fn update(&mut self, experiment: &mut Experiment) -> Result<()> {
        let needs_prometheus = experiment
            .spec
            .metrics
            .iter()
            .any(|m| m.metric_type == MetricType::Prometheus && m.url.is_empty());
        if !needs_prometheus {
            return Ok(());
        }

        let namespace = experiment.metadata.namespace.clone();
        let template = experiment
            .spec
            .trial_template
            .get_or_insert_with(Default::default);
        template.spec.setup_service_account_name = self.service_account_name.clone();
        if template
            .spec
            .setup_tasks
            .iter()
            .any(|t| t.name == self.setup_task_name)
        {
            return Ok(());
        }
        template.spec.setup_tasks.push(SetupTask {
            name: self.setup_task_name.clone(),
            args: vec!["prometheus".to_string(), "$(MODE)".to_string()],
            ..Default::default()
        });
        debug!(
            event = "builtin_prometheus_added",
            setup_task = %self.setup_task_name,
            "Metrics without a Prometheus URL use the built-in server"
        );

        let service_account = ServiceAccount {
            metadata: ObjectMeta {
                name: Some(self.service_account_name.clone()),
                ..Default::default()
            },
            ..Default::default()
        };
        let binding = ClusterRoleBinding {
            metadata: ObjectMeta {
                name: Some(self.cluster_role_binding_name.clone()),
                ..Default::default()
            },
            role_ref: RoleRef {
                api_group: RBAC_GROUP.to_string(),
                kind: "ClusterRole".to_string(),
                name: self.cluster_role_name.clone(),
            },
            subjects: Some(vec![Subject {
                kind: "ServiceAccount".to_string(),
                name: self.service_account_name.clone(),
                namespace,
                ..Default::default()
            }]),
        };

        self.objects.push(to_node(&service_account)?);
        self.objects.push(to_node(&self.cluster_role())?);
        self.objects.push(to_node(&binding)?);
        Ok(())
    }
}

impl Reader for BuiltInPrometheus {
    fn read(&mut self) -> Result<Vec<Node>> {
        Ok(std::mem::take(&mut self.objects))
    }
}
