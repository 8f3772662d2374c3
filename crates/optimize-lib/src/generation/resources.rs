use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::api::experiment::{Parameter, PatchTemplate, PatchType};
use crate::api::selector::matches;
use crate::error::Result;
use crate::quantity::{quantity_suffix, scale_to_int, Format, Quantity, Scale, MEGA, MILLI};
use crate::scan::{Node, ResourceMeta};

const WORKLOAD_KINDS: [&str; 2] = ["Deployment", "StatefulSet"];

/// The resources of one container in a workload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerResourcesFact {
    pub target: ObjectReference,
    pub container: String,
    pub requests: BTreeMap<String, String>,
    pub limits: BTreeMap<String, String>,
}

impl ContainerResourcesFact {
    fn baseline(&self, resource: &str) -> Option<&str> {
        self.requests
            .get(resource)
            .or_else(|| self.limits.get(resource))
            .map(String::as_str)
    }
}

fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), v)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Extract the containers of a workload whose labels match the selector
pub fn container_resources(
    node: &Node,
    meta: &ResourceMeta,
    selector: &LabelSelector,
) -> Vec<ContainerResourcesFact> {
    if !WORKLOAD_KINDS.contains(&meta.kind.as_str()) || !matches(selector, &meta.labels) {
        return Vec::new();
    }

    let target = ObjectReference {
        api_version: Some(meta.api_version.clone()),
        kind: Some(meta.kind.clone()),
        name: Some(meta.name.clone()),
        namespace: (!meta.namespace.is_empty()).then(|| meta.namespace.clone()),
        ..Default::default()
    };

    node.pointer("/spec/template/spec/containers")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .filter_map(|c| {
            let name = c.get("name")?.as_str()?;
            Some(ContainerResourcesFact {
                target: target.clone(),
                container: name.to_string(),
                requests: string_map(c.pointer("/resources/requests")),
                limits: string_map(c.pointer("/resources/limits")),
            })
        })
        .collect()
}

struct ResourceRange {
    scale: Scale,
    default_min: i32,
    default_max: i32,
    default_suffix: &'static str,
}

fn resource_range(resource: &str) -> Option<ResourceRange> {
    match resource {
        "cpu" => Some(ResourceRange {
            scale: MILLI,
            default_min: 100,
            default_max: 4000,
            default_suffix: "m",
        }),
        "memory" => Some(ResourceRange {
            scale: MEGA,
            default_min: 128,
            default_max: 4096,
            default_suffix: "Mi",
        }),
        _ => None,
    }
}

/// Parameters and one strategic merge patch per workload for the requested
/// container resources. Bounds span half to double the current value.
pub(crate) fn resource_parameters(
    facts: &[ContainerResourcesFact],
    resources: &[String],
) -> Result<(Vec<Parameter>, Vec<PatchTemplate>)> {
    let mut container_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for fact in facts {
        *container_counts.entry(fact.container.as_str()).or_default() += 1;
    }

    let mut parameters = Vec::new();
    let mut patches: Vec<(ObjectReference, Vec<Value>)> = Vec::new();

    for fact in facts {
        let prefix = if container_counts[fact.container.as_str()] > 1 {
            format!(
                "{}_{}",
                fact.target.name.as_deref().unwrap_or_default(),
                fact.container
            )
        } else {
            fact.container.clone()
        };

        let mut values = Map::new();
        for resource in resources {
            let Some(range) = resource_range(resource) else {
                debug!(resource = %resource, "Skipping unsupported container resource");
                continue;
            };
            let name = format!("{prefix}_{resource}");

            let (min, max, baseline, suffix) = match fact.baseline(resource) {
                Some(text) => {
                    let quantity = Quantity::parse(text)?;
                    let format = match quantity.format() {
                        Format::DecimalExponent => Format::DecimalSI,
                        other => other,
                    };
                    let suffix = match quantity_suffix(range.scale, format) {
                        "" => range.default_suffix,
                        s => s,
                    };
                    let baseline = scale_to_int(&quantity, range.scale).max(1);
                    (
                        (baseline / 2).max(1),
                        baseline.saturating_mul(2),
                        Some(IntOrString::Int(baseline)),
                        suffix,
                    )
                }
                None => (range.default_min, range.default_max, None, range.default_suffix),
            };

            values.insert(
                resource.clone(),
                Value::from(format!("{{{{ index .Values `{name}` }}}}{suffix}")),
            );
            parameters.push(Parameter {
                name,
                min,
                max,
                baseline,
                ..Default::default()
            });
        }
        if values.is_empty() {
            continue;
        }

        let container = json!({
            "name": fact.container,
            "resources": {"limits": values.clone(), "requests": values},
        });
        match patches.iter_mut().find(|(t, _)| *t == fact.target) {
            Some((_, containers)) => containers.push(container),
            None => patches.push((fact.target.clone(), vec![container])),
        }
    }

    let patches = patches
        .into_iter()
        .map(|(target, containers)| {
            let patch = json!({"spec": {"template": {"spec": {"containers": containers}}}});
            Ok(PatchTemplate {
                patch_type: PatchType::Strategic,
                patch: serde_yaml::to_string(&patch)?,
                target_ref: Some(target),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((parameters, patches))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::parse_documents;

    const WORKLOADS: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  labels:
    tier: frontend
spec:
  template:
    spec:
      containers:
      - name: app
        resources:
          requests:
            cpu: 500m
            memory: 256Mi
---
apiVersion: apps/v1
kind: StatefulSet
metadata:
  name: db
  labels:
    tier: backend
spec:
  template:
    spec:
      containers:
      - name: postgres
---
apiVersion: v1
kind: Service
metadata:
  name: web
"#;

    fn facts(selector: &LabelSelector) -> Vec<ContainerResourcesFact> {
        parse_documents(WORKLOADS)
            .unwrap()
            .iter()
            .flat_map(|n| container_resources(n, &ResourceMeta::of(n), selector))
            .collect()
    }

    #[test]
    fn test_container_resources_respects_selector() {
        assert_eq!(facts(&LabelSelector::default()).len(), 2);

        let frontend = crate::api::selector::parse_label_selector("tier=frontend").unwrap();
        let selected = facts(&frontend);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].container, "app");
        assert_eq!(selected[0].requests["cpu"], "500m");
    }

    #[test]
    fn test_resource_parameters_bounds_and_defaults() {
        let resources = vec!["cpu".to_string(), "memory".to_string()];
        let (parameters, patches) =
            resource_parameters(&facts(&LabelSelector::default()), &resources).unwrap();

        let by_name: BTreeMap<_, _> = parameters.iter().map(|p| (p.name.as_str(), p)).collect();
        assert_eq!((by_name["app_cpu"].min, by_name["app_cpu"].max), (250, 1000));
        assert_eq!(by_name["app_cpu"].baseline, Some(IntOrString::Int(500)));
        assert_eq!((by_name["app_memory"].min, by_name["app_memory"].max), (128, 512));
        assert_eq!((by_name["postgres_cpu"].min, by_name["postgres_cpu"].max), (100, 4000));
        assert_eq!(by_name["postgres_memory"].baseline, None);

        assert_eq!(patches.len(), 2);
        let trial = crate::api::Trial::new(
            "web-001",
            crate::api::TrialSpec {
                assignments: vec![crate::api::Assignment {
                    name: "app_memory".into(),
                    value: IntOrString::Int(300),
                }],
                ..Default::default()
            },
        );
        let rendered = crate::template::Engine::new()
            .render_patch(&patches[0], &trial)
            .unwrap();
        assert_eq!(
            rendered.pointer("/spec/template/spec/containers/0/resources/requests/memory"),
            Some(&json!("300Mi"))
        );
        assert_eq!(
            patches[1].target_ref.as_ref().and_then(|t| t.kind.as_deref()),
            Some("StatefulSet")
        );
    }

    #[test]
    fn test_resource_parameters_skip_unknown_resources() {
        let resources = vec!["ephemeral-storage".to_string()];
        let (parameters, patches) =
            resource_parameters(&facts(&LabelSelector::default()), &resources).unwrap();
        assert!(parameters.is_empty());
        assert!(patches.is_empty());
    }
}
