use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::numstr::NumberOrString;

/// Links and timestamps delivered alongside an experiment (headers, not body)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExperimentMeta {
    pub last_modified: Option<DateTime<Utc>>,
    pub self_url: String,
    pub next_trial_url: String,
    pub trials_url: String,
    pub labels_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    #[serde(skip)]
    pub meta: ExperimentMeta,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub optimization: Vec<Optimization>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Optimization {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    #[default]
    Integer,
    Double,
    Categorical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: serde_json::Number,
    pub max: serde_json::Number,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(rename = "type")]
    pub parameter_type: ParameterType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintType {
    Sum,
    Order,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SumConstraintParameter {
    pub name: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SumConstraint {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_upper_bound: bool,
    #[serde(default)]
    pub bound: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<SumConstraintParameter>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConstraint {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub lower_parameter: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub upper_parameter: String,
}

/// A constraint; only the fields of its type are populated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraint {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(rename = "constraintType")]
    pub constraint_type: ConstraintType,
    #[serde(flatten)]
    pub sum: SumConstraint,
    #[serde(flatten)]
    pub order: OrderConstraint,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    #[serde(default)]
    pub minimize: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimize: Option<bool>,
}

/// Links delivered alongside a trial
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialMeta {
    pub self_url: String,
    pub labels_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub parameter_name: String,
    pub value: NumberOrString,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialAssignments {
    #[serde(skip)]
    pub meta: TrialMeta,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Value {
    pub metric_name: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub error: f64,
}

fn is_zero(v: &f64) -> bool {
    *v == 0.0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialValues {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub failed: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub failure_reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub failure_message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialStatus {
    Active,
    Completed,
    Failed,
    Staged,
    Abandoned,
}

impl TrialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrialStatus::Active => "active",
            TrialStatus::Completed => "completed",
            TrialStatus::Failed => "failed",
            TrialStatus::Staged => "staged",
            TrialStatus::Abandoned => "abandoned",
        }
    }
}

/// A trial as listed by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialItem {
    #[serde(flatten)]
    pub assignments: TrialAssignments,
    #[serde(flatten)]
    pub values: TrialValues,
    pub number: i64,
    pub status: TrialStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialList {
    #[serde(default)]
    pub trials: Vec<TrialItem>,
}

/// Filter for trial listings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialListQuery {
    pub status: Vec<TrialStatus>,
}

impl TrialListQuery {
    /// Encode as query pairs (`status=completed,failed`)
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        if self.status.is_empty() {
            return Vec::new();
        }
        let status = self
            .status
            .iter()
            .map(TrialStatus::as_str)
            .collect::<Vec<_>>()
            .join(",");
        vec![("status", status)]
    }
}

/// Label changes; an empty value removes the label
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Labels {
    pub labels: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_is_flattened() {
        let c = Constraint {
            name: "one-two".into(),
            constraint_type: ConstraintType::Order,
            sum: SumConstraint::default(),
            order: OrderConstraint {
                lower_parameter: "one".into(),
                upper_parameter: "two".into(),
            },
        };
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "one-two",
                "constraintType": "order",
                "bound": 0.0,
                "lowerParameter": "one",
                "upperParameter": "two"
            })
        );
    }

    #[test]
    fn test_trial_list_from_json() {
        let list: TrialList = serde_json::from_str(
            r#"{"trials":[{"number":3,"status":"completed","labels":{"best":"true"},
                "assignments":[{"parameterName":"cpu","value":500}],
                "values":[{"metricName":"cost","value":1.5}]}]}"#,
        )
        .unwrap();
        let trial = &list.trials[0];
        assert_eq!(trial.number, 3);
        assert_eq!(trial.status, TrialStatus::Completed);
        assert_eq!(trial.assignments.labels["best"], "true");
        assert_eq!(trial.assignments.assignments[0].value, NumberOrString::from_i64(500));
        assert_eq!(trial.values.values[0].value, 1.5);
    }

    #[test]
    fn test_trial_list_query_pairs() {
        let query = TrialListQuery {
            status: vec![TrialStatus::Completed, TrialStatus::Failed],
        };
        assert_eq!(query.to_pairs(), vec![("status", "completed,failed".to_string())]);
        assert!(TrialListQuery::default().to_pairs().is_empty());
    }
}
