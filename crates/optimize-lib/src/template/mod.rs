//! Text templates for patches, metric queries and Helm values
//!
//! Templates use the `{{ ... }}` action syntax:
//! - `.Values.cpu` field chains, `$` for the root data
//! - `if`, `with`, `range` blocks with `else`
//! - pipelines (`.Values.cpu | percent 50`) and the functions in `funcs`
//!
//! Data is plain JSON so any serializable resource can be exposed.

mod exec;
mod funcs;
mod parse;

#[cfg(test)]
mod tests;

pub use funcs::{func_map, Func, FuncMap};

use std::fmt;

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde_json::{json, Map, Value};

use crate::api::{HelmValue, Metric, PatchTemplate, Trial};

/// Where a template failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateErrorKind {
    Parse,
    Exec,
}

/// A template that could not be parsed or executed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct TemplateError {
    pub name: String,
    pub kind: TemplateErrorKind,
    pub message: String,
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "template: {}: {}", self.name, self.message)
    }
}

/// Renders templates with a fixed function table
#[derive(Clone)]
pub struct Engine {
    funcs: FuncMap,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self { funcs: func_map() }
    }

    /// Register an additional function, replacing any existing one
    pub fn with_func(mut self, name: &'static str, func: Func) -> Self {
        self.funcs.insert(name, func);
        self
    }

    /// Parse and execute `text` against `data`
    pub fn render(&self, name: &str, text: &str, data: &Value) -> Result<String, TemplateError> {
        let nodes = parse::parse(text, &|f| self.funcs.contains_key(f)).map_err(|message| {
            TemplateError {
                name: name.to_string(),
                kind: TemplateErrorKind::Parse,
                message,
            }
        })?;
        exec::Exec::new(&self.funcs, data)
            .run(&nodes)
            .map_err(|message| TemplateError {
                name: name.to_string(),
                kind: TemplateErrorKind::Exec,
                message,
            })
    }

    /// Render a patch template into a JSON document
    pub fn render_patch(&self, patch: &PatchTemplate, trial: &Trial) -> crate::Result<Value> {
        let name = patch
            .target_ref
            .as_ref()
            .and_then(|r| r.name.as_deref())
            .filter(|n| !n.is_empty())
            .unwrap_or("patch");
        let rendered = self.render(name, &patch.patch, &patch_data(trial))?;
        let value: Value = serde_yaml::from_str(&rendered)?;
        Ok(value)
    }

    /// Render a Helm value; integer values are used verbatim
    pub fn render_helm_value(&self, helm: &HelmValue, trial: &Trial) -> Result<String, TemplateError> {
        match &helm.value {
            IntOrString::Int(i) => Ok(i.to_string()),
            IntOrString::String(text) => self.render(&helm.name, text, &patch_data(trial)),
        }
    }

    /// Render the query and error query of a metric.
    ///
    /// `target` is the resource the metric collects from, if any.
    pub fn render_metric_queries(
        &self,
        metric: &Metric,
        trial: &Trial,
        target: Option<&Value>,
    ) -> Result<(String, String), TemplateError> {
        let data = metric_data(trial, target);
        let query = self.render(&metric.name, &metric.query, &data)?;
        let error_query = self.render(&metric.name, &metric.error_query, &data)?;
        Ok((query, error_query))
    }
}

const ZERO_TIME: &str = "0001-01-01T00:00:00Z";

/// The instant unset timestamps stand for
fn zero_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(ZERO_TIME)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn assignment_values(trial: &Trial) -> Value {
    let values: Map<String, Value> = trial
        .spec
        .assignments
        .iter()
        .map(|a| {
            let value = match &a.value {
                IntOrString::Int(i) => Value::from(*i),
                IntOrString::String(s) => Value::from(s.clone()),
            };
            (a.name.clone(), value)
        })
        .collect();
    Value::Object(values)
}

fn time_value(time: Option<&Time>) -> Value {
    match time {
        Some(t) => Value::from(t.0.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
        None => Value::from(ZERO_TIME),
    }
}

/// Data exposed to patch and Helm value templates
pub fn patch_data(trial: &Trial) -> Value {
    json!({
        "Trial": serde_json::to_value(&trial.metadata).unwrap_or(Value::Null),
        "Values": assignment_values(trial),
    })
}

/// Data exposed to metric queries
pub fn metric_data(trial: &Trial, target: Option<&Value>) -> Value {
    let status = trial.status.as_ref();
    let start = status.and_then(|s| s.start_time.as_ref());
    let completion = status.and_then(|s| s.completion_time.as_ref());

    let at = |time: Option<&Time>| time.map_or_else(zero_time, |t| t.0);
    let range = (at(completion) - at(start)).num_milliseconds().max(0) as f64 / 1000.0;
    let target = target.cloned().unwrap_or(Value::Null);

    json!({
        "Trial": serde_json::to_value(trial).unwrap_or(Value::Null),
        "Target": target.clone(),
        "Pods": target,
        "StartTime": time_value(start),
        "CompletionTime": time_value(completion),
        "Range": format!("{range:.0}s"),
        "Values": assignment_values(trial),
    })
}
