use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, EnvVar, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::{
    ensure_pod_spec, ensure_trial_job_pod, new_goal_metric, requests_metric, to_node,
    trial_job_image, ExperimentSource, MetricSource,
};
use crate::api::application::{
    GoalKind, LatencyType, LocustScenario, Objective, ERROR_RATE_REQUESTS,
};
use crate::api::experiment::Metric;
use crate::api::meta::parse_duration;
use crate::api::Experiment;
use crate::error::{Error, Result};
use crate::scan::{Node, Reader};

const INSTANCE: &str = r#"{job="trialRun",instance="{{ .Trial.Name }}"}"#;

/// A Locust load test run as the trial job
#[derive(Debug, Clone, Default)]
pub struct LocustSource {
    pub scenario_name: String,
    pub scenario: LocustScenario,
    pub objective: Option<Objective>,
    pub ingress_url: Option<String>,
    /// Directory the locustfile path is relative to
    pub base_dir: PathBuf,
}

impl LocustSource {
    fn config_map_name(&self) -> String {
        format!("{}-locustfile", self.scenario_name)
    }

    fn env(&self) -> Result<Vec<EnvVar>> {
        let var = |name: &str, value: String| EnvVar {
            name: name.to_string(),
            value: Some(value),
            ..Default::default()
        };

        let mut env = Vec::new();
        if let Some(users) = self.scenario.users {
            env.push(var("NUM_USERS", users.to_string()));
        }
        if let Some(spawn_rate) = self.scenario.spawn_rate {
            env.push(var("SPAWN_RATE", spawn_rate.to_string()));
        }
        if let Some(run_time) = &self.scenario.run_time {
            // Locust accepts a plain number of seconds
            let seconds = parse_duration(run_time).ok_or_else(|| {
                Error::input(format!(
                    "invalid run time {run_time:?} for scenario {:?}",
                    self.scenario_name
                ))
            })?;
            env.push(var("RUN_TIME", format!("{seconds:.0}")));
        }
        Ok(env)
    }
}

fn latency_metric_name(latency_type: &str) -> Option<&'static str> {
    match LatencyType::parse(latency_type)? {
        LatencyType::Minimum => Some("min_response_time"),
        LatencyType::Maximum => Some("max_response_time"),
        LatencyType::Mean => Some("average_response_time"),
        LatencyType::Percentile50 => Some("p50"),
        LatencyType::Percentile95 => Some("p95"),
        LatencyType::Percentile99 => Some("p99"),
    }
}

impl ExperimentSource for LocustSource {
    fn update(&mut self, experiment: &mut Experiment) -> Result<()> {
        let ingress_url = self
            .ingress_url
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::input("ingress must be configured when using Locust scenarios"))?;

        let mut env = self.env()?;
        env.push(EnvVar {
            name: "HOST".to_string(),
            value: Some(ingress_url),
            ..Default::default()
        });

        let config_map_name = self.config_map_name();
        let pod = ensure_pod_spec(ensure_trial_job_pod(experiment));
        pod.containers = vec![Container {
            name: "locust".to_string(),
            image: Some(trial_job_image("locust")),
            env: Some(env),
            volume_mounts: Some(vec![VolumeMount {
                name: "locustfile".to_string(),
                read_only: Some(true),
                mount_path: "/mnt/locust".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }];
        pod.volumes = Some(vec![Volume {
            name: "locustfile".to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: Some(config_map_name),
                ..Default::default()
            }),
            ..Default::default()
        }]);
        Ok(())
    }
}

impl MetricSource for LocustSource {
    fn metrics(&self) -> Result<Vec<Metric>> {
        let mut result = Vec::new();
        let Some(objective) = &self.objective else {
            return Ok(result);
        };

        for goal in objective.goals.iter().filter(|g| !g.implemented) {
            match &goal.kind {
                Some(GoalKind::Latency(latency)) => {
                    if let Some(name) = latency_metric_name(&latency.latency_type) {
                        let query = format!("scalar({name}{INSTANCE})");
                        result.push(new_goal_metric(goal, query));
                    }
                }
                Some(GoalKind::ErrorRate(error_rate))
                    if error_rate.error_rate_type == ERROR_RATE_REQUESTS =>
                {
                    let query =
                        format!("scalar(failure_count{INSTANCE} / request_count{INSTANCE})");
                    result.push(new_goal_metric(goal, query));
                }
                Some(GoalKind::Requests(requests)) => {
                    result.push(requests_metric(goal, requests)?);
                }
                _ => {}
            }
        }
        Ok(result)
    }
}

impl Reader for LocustSource {
    fn read(&mut self) -> Result<Vec<Node>> {
        if self.scenario.locustfile.is_empty() {
            return Err(Error::input(format!(
                "missing Locust file for scenario {:?}",
                self.scenario_name
            )));
        }

        let path = self.base_dir.join(&self.scenario.locustfile);
        let script = fs::read_to_string(&path)
            .map_err(|e| Error::input(format!("unable to read {}: {e}", path.display())))?;

        let config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some(self.config_map_name()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([("locustfile.py".to_string(), script)])),
            ..Default::default()
        };
        Ok(vec![to_node(&config_map)?])
    }
}
