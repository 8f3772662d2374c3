use super::{new_goal_metric, MetricSource};
use crate::api::application::{Goal, GoalKind, DURATION_TRIAL};
use crate::api::experiment::{Metric, MetricType};
use crate::error::Result;

/// Measures how long trials take
#[derive(Debug, Clone, Default)]
pub struct DurationSource {
    pub goal: Goal,
}

impl MetricSource for DurationSource {
    fn metrics(&self) -> Result<Vec<Metric>> {
        if self.goal.implemented {
            return Ok(Vec::new());
        }
        match &self.goal.kind {
            Some(GoalKind::Duration(d)) if d.duration_type == DURATION_TRIAL => {
                let mut metric =
                    new_goal_metric(&self.goal, "{{ duration .StartTime .CompletionTime }}");
                metric.metric_type = MetricType::Kubernetes;
                Ok(vec![metric])
            }
            _ => Ok(Vec::new()),
        }
    }
}
