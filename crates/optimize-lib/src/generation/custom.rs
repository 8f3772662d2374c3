use super::{
    ensure_pod_spec, ensure_trial_job_pod, requests_metric, ExperimentSource, MetricSource,
};
use crate::api::application::{CustomScenario, GoalKind, Objective};
use crate::api::experiment::Metric;
use crate::api::meta::format_duration;
use crate::api::Experiment;
use crate::error::Result;

/// A user supplied pod run as the trial job
#[derive(Debug, Clone, Default)]
pub struct CustomSource {
    pub scenario_name: String,
    pub scenario: CustomScenario,
    pub objective: Option<Objective>,
}

/// Container name derived from an image reference, without registry or tag
fn image_basename(image: &str) -> &str {
    let name = image.rsplit('/').next().unwrap_or(image);
    match name.find(':') {
        Some(pos) if pos > 0 => &name[..pos],
        _ => name,
    }
}

impl ExperimentSource for CustomSource {
    fn update(&mut self, experiment: &mut Experiment) -> Result<()> {
        if let Some(pod_template) = &self.scenario.pod_template {
            *ensure_trial_job_pod(experiment) = pod_template.clone();
        }

        let template = experiment
            .spec
            .trial_template
            .get_or_insert_with(Default::default);
        if self.scenario.initial_delay_seconds > 0 {
            template.spec.initial_delay_seconds = self.scenario.initial_delay_seconds;
        }
        if self.scenario.approximate_runtime_seconds > 0 {
            template.spec.approximate_runtime = Some(format_duration(
                self.scenario.approximate_runtime_seconds as i64,
            ));
        }

        if !self.scenario.image.is_empty() {
            let pod = ensure_pod_spec(ensure_trial_job_pod(experiment));
            if pod.containers.is_empty() {
                pod.containers.push(Default::default());
            }
            pod.containers[0].image = Some(self.scenario.image.clone());
        }

        let has_job = experiment
            .spec
            .trial_template
            .as_ref()
            .is_some_and(|t| t.spec.job_template.is_some());
        if has_job {
            let pod = ensure_pod_spec(ensure_trial_job_pod(experiment));
            for container in pod.containers.iter_mut().filter(|c| c.name.is_empty()) {
                let image = container.image.as_deref().unwrap_or_default();
                container.name = image_basename(image).to_string();
            }
        }
        Ok(())
    }
}

impl MetricSource for CustomSource {
    fn metrics(&self) -> Result<Vec<Metric>> {
        let mut result = Vec::new();
        let Some(objective) = &self.objective else {
            return Ok(result);
        };

        for goal in objective.goals.iter().filter(|g| !g.implemented) {
            if let Some(GoalKind::Requests(requests)) = &goal.kind {
                // Values are pushed by the job itself
                if self.scenario.push_gateway {
                    continue;
                }
                result.push(requests_metric(goal, requests)?);
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_basename() {
        assert_eq!(image_basename("nginx"), "nginx");
        assert_eq!(image_basename("nginx:1.19"), "nginx");
        assert_eq!(image_basename("gcr.io/project/load-test:v2"), "load-test");
        assert_eq!(image_basename("localhost:5000/tool"), "tool");
    }
}
