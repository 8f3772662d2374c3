//! Translation between cluster resources and the remote service model
//!
//! - `from_cluster` / `to_cluster`: experiment definitions and sync cursors
//! - `to_cluster_trial` / `from_cluster_trial`: suggested assignments in,
//!   observed values out
//! - `stop_experiment`: react to the service refusing further trials


use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use tracing::debug;

use crate::api::experiment::{self as cluster, Experiment};
use crate::api::meta::{add_finalizer, is_condition_true, SyncCursors};
use crate::api::trial::{Assignment, Trial, TrialConditionType};
use crate::error::{Error, Result};
use crate::observability::StructuredLogger;
use crate::quantity::Quantity;
use crate::remote::{self, ErrorType, ExperimentName, NumberOrString};

const BASELINE_LABEL: &str = "baseline";

fn logger() -> StructuredLogger {
    StructuredLogger::new("server")
}

fn quantity_f64(q: &k8s_openapi::apimachinery::pkg::api::resource::Quantity) -> Result<f64> {
    Ok(Quantity::try_from(q)?.as_f64())
}

fn is_categorical(p: &cluster::Parameter) -> bool {
    !p.values.is_empty()
}

fn remote_parameter(p: &cluster::Parameter) -> remote::Parameter {
    if is_categorical(p) {
        return remote::Parameter {
            parameter_type: remote::ParameterType::Categorical,
            name: p.name.clone(),
            bounds: None,
            values: p.values.clone(),
        };
    }
    remote::Parameter {
        parameter_type: remote::ParameterType::Integer,
        name: p.name.clone(),
        bounds: Some(remote::Bounds {
            min: p.min.into(),
            max: p.max.into(),
        }),
        values: Vec::new(),
    }
}

fn baseline_value(p: &cluster::Parameter, baseline: &IntOrString) -> Result<NumberOrString> {
    match (is_categorical(p), baseline) {
        (true, IntOrString::String(s)) => Ok(NumberOrString::from_string(s.as_str())),
        (true, IntOrString::Int(i)) => Ok(NumberOrString::from_string(i.to_string())),
        (false, IntOrString::Int(i)) => Ok(NumberOrString::from_i64(i64::from(*i))),
        (false, IntOrString::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(NumberOrString::from_i64)
            .map_err(|_| {
                Error::input(format!(
                    "invalid baseline {s:?} for integer parameter {:?}",
                    p.name
                ))
            }),
    }
}

fn remote_constraint(c: &cluster::Constraint) -> Result<Option<remote::Constraint>> {
    if let Some(order) = &c.order {
        return Ok(Some(remote::Constraint {
            name: c.name.clone(),
            constraint_type: remote::ConstraintType::Order,
            sum: Default::default(),
            order: remote::OrderConstraint {
                lower_parameter: order.lower_parameter.clone(),
                upper_parameter: order.upper_parameter.clone(),
            },
        }));
    }

    if let Some(sum) = &c.sum {
        let parameters = sum
            .parameters
            .iter()
            .map(|p| {
                Ok(remote::SumConstraintParameter {
                    name: p.name.clone(),
                    weight: quantity_f64(&p.weight)
                        .map_err(|e| e.context(format!("constraint {:?}", c.name)))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(Some(remote::Constraint {
            name: c.name.clone(),
            constraint_type: remote::ConstraintType::Sum,
            sum: remote::SumConstraint {
                is_upper_bound: sum.is_upper_bound,
                bound: quantity_f64(&sum.bound)
                    .map_err(|e| e.context(format!("constraint {:?}", c.name)))?,
                parameters,
            },
            order: Default::default(),
        }));
    }

    debug!(constraint = %c.name, "Skipping constraint without an order or sum");
    Ok(None)
}

/// Build the remote representation of a cluster experiment.
///
/// The baseline trial is returned when any parameter declares a baseline.
pub fn from_cluster(
    experiment: &Experiment,
) -> Result<(ExperimentName, remote::Experiment, Option<remote::TrialAssignments>)> {
    let name = ExperimentName::new(experiment.metadata.name.clone().unwrap_or_default());
    let cursors = SyncCursors::from_meta(&experiment.metadata);

    let mut out = remote::Experiment {
        meta: remote::ExperimentMeta {
            last_modified: experiment.metadata.creation_timestamp.as_ref().map(|t| t.0),
            self_url: cursors.experiment_url.unwrap_or_default(),
            next_trial_url: cursors.next_trial_url.unwrap_or_default(),
            ..Default::default()
        },
        ..Default::default()
    };

    out.optimization = experiment
        .spec
        .optimization
        .iter()
        .map(|o| remote::Optimization {
            name: o.name.clone(),
            value: o.value.clone(),
        })
        .collect();

    let mut baseline = remote::TrialAssignments::default();
    for p in &experiment.spec.parameters {
        out.parameters.push(remote_parameter(p));
        if let Some(value) = &p.baseline {
            baseline.assignments.push(remote::Assignment {
                parameter_name: p.name.clone(),
                value: baseline_value(p, value)?,
            });
        }
    }

    for c in &experiment.spec.constraints {
        out.constraints.extend(remote_constraint(c)?);
    }

    out.metrics = experiment
        .spec
        .metrics
        .iter()
        .map(|m| remote::Metric {
            name: m.name.clone(),
            minimize: m.minimize,
            optimize: m.optimize,
        })
        .collect();

    let baseline = (!baseline.assignments.is_empty()).then(|| {
        baseline
            .labels
            .insert(BASELINE_LABEL.to_string(), "true".to_string());
        baseline
    });

    Ok((name, out, baseline))
}

/// Merge the remote experiment back into the cluster experiment
pub fn to_cluster(experiment: &mut Experiment, remote: &remote::Experiment) {
    let mut cursors = SyncCursors::from_meta(&experiment.metadata);
    if !remote.meta.self_url.is_empty() {
        cursors.experiment_url = Some(remote.meta.self_url.clone());
    }
    if !remote.meta.next_trial_url.is_empty() {
        cursors.next_trial_url = Some(remote.meta.next_trial_url.clone());
    }
    cursors.apply_to(&mut experiment.metadata);

    experiment.spec.optimization = remote
        .optimization
        .iter()
        .map(|o| cluster::Optimization {
            name: o.name.clone(),
            value: o.value.clone(),
        })
        .collect();

    add_finalizer(&mut experiment.metadata);
}

fn trial_suffix(self_url: &str) -> String {
    let id = self_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    match id.parse::<u64>() {
        Ok(number) => format!("{number:03}"),
        Err(_) => id.to_string(),
    }
}

fn cluster_value(trial: &str, parameter: &str, value: &NumberOrString) -> IntOrString {
    if value.is_string() {
        return IntOrString::String(value.to_string());
    }
    let wide = value.as_i64().unwrap_or_default();
    let narrow = i32::try_from(wide).unwrap_or(if wide < 0 { i32::MIN } else { i32::MAX });
    if i64::from(narrow) != wide {
        logger().log_assignment_clamped(trial, parameter, wide, narrow);
    }
    IntOrString::Int(narrow)
}

fn display_value(value: &IntOrString) -> String {
    match value {
        IntOrString::Int(i) => i.to_string(),
        IntOrString::String(s) => s.clone(),
    }
}

/// Fill in a new trial from the assignments suggested by the service.
///
/// Values outside the 32-bit range are clamped.
pub fn to_cluster_trial(trial: &mut Trial, suggestion: &remote::TrialAssignments) {
    let generate_name = trial.metadata.generate_name.clone().unwrap_or_default();
    if trial.metadata.name.as_deref().unwrap_or_default().is_empty() && !generate_name.is_empty() {
        trial.metadata.name = Some(format!(
            "{generate_name}{}",
            trial_suffix(&suggestion.meta.self_url)
        ));
    }

    let mut cursors = SyncCursors::from_meta(&trial.metadata);
    cursors.report_trial_url = Some(suggestion.meta.self_url.clone());
    cursors.apply_to(&mut trial.metadata);
    add_finalizer(&mut trial.metadata);

    let trial_name = trial.metadata.name.clone().unwrap_or_default();
    trial.spec.assignments = suggestion
        .assignments
        .iter()
        .map(|a| Assignment {
            name: a.parameter_name.clone(),
            value: cluster_value(&trial_name, &a.parameter_name, &a.value),
        })
        .collect();

    let summary = trial
        .spec
        .assignments
        .iter()
        .map(|a| format!("{}={}", a.name, display_value(&a.value)))
        .collect::<Vec<_>>()
        .join(", ");

    let status = trial.status.get_or_insert_with(Default::default);
    status.phase = "Created".to_string();
    status.assignments = summary;

    let experiment = trial
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(crate::api::meta::LABEL_EXPERIMENT))
        .map(String::as_str)
        .unwrap_or_default();
    logger().log_trial_synced(experiment, &trial_name, trial.spec.assignments.len());
}

/// Collect the values of a finished trial for reporting
pub fn from_cluster_trial(trial: &Trial) -> remote::TrialValues {
    let trial_name = trial.metadata.name.as_deref().unwrap_or_default();

    if is_condition_true(trial.conditions(), TrialConditionType::Failed) {
        let mut out = remote::TrialValues {
            failed: true,
            ..Default::default()
        };
        if let Some(failed) = trial
            .conditions()
            .iter()
            .find(|c| c.type_ == TrialConditionType::Failed)
        {
            out.failure_reason = failed.reason.clone();
            out.failure_message = failed.message.clone();
        }
        logger().log_trial_reported(trial_name, true, 0);
        return out;
    }

    let parse = |metric: &str, text: &str| {
        if text.is_empty() {
            return 0.0;
        }
        text.trim().parse::<f64>().unwrap_or_else(|_| {
            debug!(metric = %metric, value = %text, "Unparsable metric value reported as zero");
            0.0
        })
    };

    let values: Vec<remote::Value> = trial
        .spec
        .values
        .iter()
        .map(|v| remote::Value {
            metric_name: v.name.clone(),
            value: parse(&v.name, &v.value),
            error: parse(&v.name, &v.error),
        })
        .collect();

    logger().log_trial_reported(trial_name, false, values.len());
    remote::TrialValues {
        values,
        ..Default::default()
    }
}

/// Handle an error from requesting the next trial.
///
/// Returns `true` when the service reported the experiment as stopped; the
/// next trial cursor is cleared so no further trials are requested. Any
/// other error leaves the experiment untouched.
pub fn stop_experiment(experiment: &mut Experiment, err: &Error) -> bool {
    let Error::Remote(remote) = err else {
        return false;
    };
    if remote.error_type != ErrorType::ExperimentStopped {
        return false;
    }

    let mut cursors = SyncCursors::from_meta(&experiment.metadata);
    cursors.next_trial_url = None;
    cursors.apply_to(&mut experiment.metadata);

    logger().log_experiment_stopped(
        experiment.metadata.name.as_deref().unwrap_or_default(),
        &remote.message,
    );
    true
}
