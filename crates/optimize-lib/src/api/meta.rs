//! Shared metadata helpers: annotation keys, finalizers, sync cursors and
//! status conditions

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Annotation holding the remote URL of a synchronized experiment
pub const ANNOTATION_EXPERIMENT_URL: &str = "redskyops.dev/experiment-url";
/// Annotation holding the remote URL used to request the next trial
pub const ANNOTATION_NEXT_TRIAL_URL: &str = "redskyops.dev/next-trial-url";
/// Annotation holding the remote URL used to report trial values
pub const ANNOTATION_REPORT_TRIAL_URL: &str = "redskyops.dev/report-trial-url";
/// Annotation recording when an application was last scanned
pub const ANNOTATION_LAST_SCANNED: &str = "apps.redskyops.dev/last-scanned";

pub const LABEL_EXPERIMENT: &str = "redskyops.dev/experiment";
pub const LABEL_APPLICATION: &str = "redskyops.dev/application";
pub const LABEL_SCENARIO: &str = "redskyops.dev/scenario";
pub const LABEL_OBJECTIVE: &str = "redskyops.dev/objective";

/// Finalizer that keeps cluster objects around until the remote server is told
pub const FINALIZER: &str = "serverFinalizer.redskyops.dev";

/// Remote synchronization state carried by an experiment or trial.
///
/// The cursors are persisted as annotations; this struct is the only place the
/// annotation keys are read or written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncCursors {
    pub experiment_url: Option<String>,
    pub next_trial_url: Option<String>,
    pub report_trial_url: Option<String>,
}

impl SyncCursors {
    /// Read the cursors from an object's annotations
    pub fn from_meta(meta: &ObjectMeta) -> Self {
        let get = |key: &str| {
            meta.annotations
                .as_ref()
                .and_then(|a| a.get(key))
                .cloned()
        };
        Self {
            experiment_url: get(ANNOTATION_EXPERIMENT_URL),
            next_trial_url: get(ANNOTATION_NEXT_TRIAL_URL),
            report_trial_url: get(ANNOTATION_REPORT_TRIAL_URL),
        }
    }

    /// Write the cursors back to an object's annotations, removing unset ones
    pub fn apply_to(&self, meta: &mut ObjectMeta) {
        let annotations = meta.annotations.get_or_insert_with(BTreeMap::new);
        let mut put = |key: &str, value: &Option<String>| match value {
            Some(v) => {
                annotations.insert(key.to_string(), v.clone());
            }
            None => {
                annotations.remove(key);
            }
        };
        put(ANNOTATION_EXPERIMENT_URL, &self.experiment_url);
        put(ANNOTATION_NEXT_TRIAL_URL, &self.next_trial_url);
        put(ANNOTATION_REPORT_TRIAL_URL, &self.report_trial_url);
    }

    /// An object is synchronized once it knows its own remote URL
    pub fn is_synced(&self) -> bool {
        self.experiment_url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

/// Add the server finalizer if it is not already present
pub fn add_finalizer(meta: &mut ObjectMeta) -> bool {
    let finalizers = meta.finalizers.get_or_insert_with(Vec::new);
    if finalizers.iter().any(|f| f == FINALIZER) {
        return false;
    }
    finalizers.push(FINALIZER.to_string());
    true
}

/// Remove the server finalizer, returning `true` if it was present
pub fn remove_finalizer(meta: &mut ObjectMeta) -> bool {
    let Some(finalizers) = meta.finalizers.as_mut() else {
        return false;
    };
    let before = finalizers.len();
    finalizers.retain(|f| f != FINALIZER);
    before != finalizers.len()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

/// A status condition, generic over the condition type enumeration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition<T> {
    #[serde(rename = "type")]
    pub type_: T,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_probe_time: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<Time>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Find a condition of the given type with a `True` status
pub fn is_condition_true<T: PartialEq>(conditions: &[Condition<T>], type_: T) -> bool {
    conditions
        .iter()
        .any(|c| c.type_ == type_ && c.status == ConditionStatus::True)
}

/// Insert or update a condition.
///
/// A repeated status, reason and message leaves the condition untouched. A
/// status change replaces every field and resets both timestamps; a changed
/// reason or message under the same status only moves the probe time.
pub fn upsert_condition<T: PartialEq>(
    conditions: &mut Vec<Condition<T>>,
    type_: T,
    status: ConditionStatus,
    reason: &str,
    message: &str,
    time: &Time,
) {
    let Some(existing) = conditions.iter_mut().find(|c| c.type_ == type_) else {
        conditions.push(Condition {
            type_,
            status,
            last_probe_time: Some(time.clone()),
            last_transition_time: Some(time.clone()),
            reason: reason.to_string(),
            message: message.to_string(),
        });
        return;
    };

    if existing.status == status && existing.reason == reason && existing.message == message {
        return;
    }

    if existing.status != status {
        existing.status = status;
        existing.reason = reason.to_string();
        existing.message = message.to_string();
        existing.last_transition_time = Some(time.clone());
    }
    existing.last_probe_time = Some(time.clone());
}

/// Parse a duration such as `1h30m`, `90s` or `250ms` into seconds.
///
/// A duration is `0` or a sequence of decimal numbers (fraction allowed), each
/// followed by one of the units `h`, `m`, `s`, `ms`, `us` (or `µs`) and `ns`.
pub fn parse_duration(s: &str) -> Option<f64> {
    let s = s.trim();
    if s == "0" {
        return Some(0.0);
    }

    let whole = Regex::new(r"^(?:(?:\d+\.?\d*|\.\d+)(?:h|ms|m|s|us|µs|ns))+$").ok()?;
    if !whole.is_match(s) {
        return None;
    }

    let part = Regex::new(r"(\d+\.?\d*|\.\d+)(h|ms|m|s|us|µs|ns)").ok()?;
    part.captures_iter(s)
        .map(|cap| {
            let value: f64 = cap[1].parse().ok()?;
            let factor = match &cap[2] {
                "h" => 3600.0,
                "m" => 60.0,
                "s" => 1.0,
                "ms" => 1e-3,
                "us" | "µs" => 1e-6,
                _ => 1e-9,
            };
            Some(value * factor)
        })
        .sum()
}

/// Format whole seconds the way durations are written in manifests (`1m30s`)
pub fn format_duration(seconds: i64) -> String {
    if seconds == 0 {
        return "0s".to_string();
    }
    let sign = if seconds < 0 { "-" } else { "" };
    let seconds = seconds.unsigned_abs();
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if h > 0 {
        format!("{sign}{h}h{m}m{s}s")
    } else if m > 0 {
        format!("{sign}{m}m{s}s")
    } else {
        format!("{sign}{s}s")
    }
}
