//! Rendered patches for a trial
//!
//! Each patch template of an experiment is rendered with the trial's
//! assignments and paired with a selector for the resource it applies to.
//! Applying the patches is left to external tooling.

use k8s_openapi::api::core::v1::ObjectReference;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::experiment::{Experiment, PatchType};
use crate::api::trial::Trial;
use crate::error::{Error, Result};
use crate::scan::ResourceMeta;
use crate::template::Engine;

/// Identifies the resource a patch applies to; empty fields match anything
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchTarget {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

impl PatchTarget {
    fn from_reference(reference: &ObjectReference) -> Self {
        let api_version = reference.api_version.as_deref().unwrap_or_default();
        let (group, version) = match api_version.rsplit_once('/') {
            Some((group, version)) => (group, version),
            None => ("", api_version),
        };
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: reference.kind.clone().unwrap_or_default(),
            name: reference.name.clone().unwrap_or_default(),
            namespace: reference.namespace.clone().unwrap_or_default(),
        }
    }

    fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Check a resource against the non-empty fields of the target
    pub fn matches(&self, meta: &ResourceMeta) -> bool {
        let field = |want: &str, have: &str| want.is_empty() || want == have;
        field(&self.kind, &meta.kind)
            && field(&self.group, meta.group())
            && field(&self.version, meta.version())
            && field(&self.name, &meta.name)
            && field(&self.namespace, &meta.namespace)
    }
}

/// A rendered patch and the resource it applies to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// JSON encoded patch body
    pub patch: String,
    pub target: PatchTarget,
}

/// Render every patch template of the experiment for a trial.
///
/// Strategic and merge patches get the target's `apiVersion`, `kind` and
/// `metadata` injected so they can be applied inline; JSON patches are used
/// as rendered.
pub fn create_patches(experiment: &Experiment, trial: &Trial, engine: &Engine) -> Result<Vec<Patch>> {
    experiment
        .spec
        .patches
        .iter()
        .enumerate()
        .map(|(index, template)| {
            let rendered = engine
                .render_patch(template, trial)
                .map_err(|e| e.context(format!("patch {index}")))?;

            let reference = match &template.target_ref {
                Some(reference) => reference.clone(),
                None => reference_of(&rendered).ok_or_else(|| {
                    Error::input(format!("patch {index} does not identify a target resource"))
                })?,
            };
            let target = PatchTarget::from_reference(&reference);

            let body = match template.patch_type {
                PatchType::Json => rendered,
                PatchType::Strategic | PatchType::Merge => inject_type_meta(rendered, &target),
            };

            Ok(Patch {
                patch: serde_json::to_string(&body)?,
                target,
            })
        })
        .collect()
}

/// Derive a reference from the type and object metadata of a patch body
fn reference_of(patch: &Value) -> Option<ObjectReference> {
    let text = |pointer: &str| patch.pointer(pointer).and_then(Value::as_str).map(str::to_string);
    let kind = text("/kind")?;
    let name = text("/metadata/name")?;
    Some(ObjectReference {
        api_version: text("/apiVersion"),
        kind: Some(kind),
        name: Some(name),
        namespace: text("/metadata/namespace"),
        ..Default::default()
    })
}

fn inject_type_meta(patch: Value, target: &PatchTarget) -> Value {
    let mut object = match patch {
        Value::Object(object) => object,
        // Empty patch bodies render to null
        _ => Map::new(),
    };

    object.insert("apiVersion".to_string(), Value::from(target.api_version()));
    object.insert("kind".to_string(), Value::from(target.kind.clone()));

    let metadata = object
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(metadata) = metadata {
        metadata.insert("name".to_string(), Value::from(target.name.clone()));
        if !target.namespace.is_empty() {
            metadata.insert(
                "namespace".to_string(),
                Value::from(target.namespace.clone()),
            );
        }
    }
    Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::experiment::{ExperimentSpec, PatchTemplate};
    use crate::api::trial::{Assignment, TrialSpec};
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
    use serde_json::json;

    fn trial() -> Trial {
        Trial::new(
            "demo-001",
            TrialSpec {
                assignments: vec![
                    Assignment {
                        name: "cpu".into(),
                        value: IntOrString::Int(250),
                    },
                    Assignment {
                        name: "replicas".into(),
                        value: IntOrString::Int(3),
                    },
                ],
                ..Default::default()
            },
        )
    }

    fn deployment(name: &str) -> ObjectReference {
        ObjectReference {
            api_version: Some("apps/v1".into()),
            kind: Some("Deployment".into()),
            name: Some(name.into()),
            namespace: Some("store".into()),
            ..Default::default()
        }
    }

    fn experiment(patches: Vec<PatchTemplate>) -> Experiment {
        Experiment::new(
            "demo",
            ExperimentSpec {
                patches,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_strategic_patch_gets_type_meta() {
        let exp = experiment(vec![PatchTemplate {
            patch_type: PatchType::Strategic,
            patch: "spec:\n  replicas: {{ .Values.replicas }}\n".into(),
            target_ref: Some(deployment("web")),
        }]);

        let patches = create_patches(&exp, &trial(), &Engine::new()).unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!(
            patches[0].target,
            PatchTarget {
                group: "apps".into(),
                version: "v1".into(),
                kind: "Deployment".into(),
                name: "web".into(),
                namespace: "store".into(),
            }
        );

        let body: Value = serde_json::from_str(&patches[0].patch).unwrap();
        assert_eq!(
            body,
            json!({
                "apiVersion": "apps/v1",
                "kind": "Deployment",
                "metadata": {"name": "web", "namespace": "store"},
                "spec": {"replicas": 3},
            })
        );
    }

    #[test]
    fn test_json_patch_is_untouched() {
        let exp = experiment(vec![PatchTemplate {
            patch_type: PatchType::Json,
            patch: r#"[{"op": "replace", "path": "/spec/replicas", "value": {{ .Values.replicas }}}]"#
                .into(),
            target_ref: Some(deployment("web")),
        }]);

        let patches = create_patches(&exp, &trial(), &Engine::new()).unwrap();
        let body: Value = serde_json::from_str(&patches[0].patch).unwrap();
        assert_eq!(
            body,
            json!([{"op": "replace", "path": "/spec/replicas", "value": 3}])
        );
    }

    #[test]
    fn test_target_from_patch_body() {
        let exp = experiment(vec![PatchTemplate {
            patch_type: PatchType::Merge,
            patch: r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
data:
  cpu: "{{ .Values.cpu }}m"
"#
            .into(),
            target_ref: None,
        }]);

        let patches = create_patches(&exp, &trial(), &Engine::new()).unwrap();
        assert_eq!(patches[0].target.kind, "ConfigMap");
        assert_eq!(patches[0].target.group, "");
        assert_eq!(patches[0].target.version, "v1");
        let body: Value = serde_json::from_str(&patches[0].patch).unwrap();
        assert_eq!(body["data"]["cpu"], "250m");
    }

    #[test]
    fn test_missing_target_is_an_error() {
        let exp = experiment(vec![PatchTemplate {
            patch: "spec:\n  replicas: 1\n".into(),
            ..Default::default()
        }]);
        let err = create_patches(&exp, &trial(), &Engine::new()).unwrap_err();
        assert!(err.to_string().contains("patch 0"), "{err}");
    }

    #[test]
    fn test_render_errors_name_the_patch() {
        let exp = experiment(vec![PatchTemplate {
            patch: "spec: {{ .Values.cpu | nope }}".into(),
            target_ref: Some(deployment("web")),
            ..Default::default()
        }]);
        let err = create_patches(&exp, &trial(), &Engine::new()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("patch 0"), "{message}");
        assert!(message.contains("web"), "{message}");
    }

    #[test]
    fn test_target_matches() {
        let target = PatchTarget::from_reference(&deployment("web"));
        let meta = |api_version: &str, kind: &str, name: &str| ResourceMeta {
            api_version: api_version.into(),
            kind: kind.into(),
            name: name.into(),
            namespace: "store".into(),
            ..Default::default()
        };
        assert!(target.matches(&meta("apps/v1", "Deployment", "web")));
        assert!(!target.matches(&meta("apps/v1", "Deployment", "db")));
        assert!(!target.matches(&meta("apps/v1beta1", "Deployment", "web")));
        assert!(PatchTarget::default().matches(&meta("v1", "Service", "web")));
    }
}
