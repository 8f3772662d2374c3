use chrono::{TimeZone, Utc};
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde_json::json;

use super::*;
use crate::api::{Assignment, MetricType, PatchType, TrialSpec, TrialStatus};

fn trial() -> Trial {
    let mut trial = Trial::new(
        "sample-001",
        TrialSpec {
            assignments: vec![
                Assignment {
                    name: "cpu".into(),
                    value: IntOrString::Int(500),
                },
                Assignment {
                    name: "mode".into(),
                    value: IntOrString::String("fast".into()),
                },
            ],
            ..Default::default()
        },
    );
    trial.metadata.namespace = Some("default".into());
    trial
}

#[test]
fn test_render_text_and_fields() {
    let engine = Engine::new();
    let out = engine
        .render("t", "cpu={{ .Values.cpu }}m mode={{ .Values.mode }}", &patch_data(&trial()))
        .unwrap();
    assert_eq!(out, "cpu=500m mode=fast");
}

#[test]
fn test_render_trim_and_blocks() {
    let engine = Engine::new();
    let data = json!({"Items": ["a", "b"], "Flag": true, "Empty": []});
    let text = "{{- range .Items }}[{{ . }}]{{ end -}} {{ if .Flag }}yes{{ else }}no{{ end }}\
                {{ range .Empty }}x{{ else }}none{{ end }}";
    assert_eq!(engine.render("t", text, &data).unwrap(), "[a][b]yesnone");
}

#[test]
fn test_render_pipeline_and_functions() {
    let engine = Engine::new();
    let data = patch_data(&trial());
    assert_eq!(
        engine.render("t", "{{ .Values.cpu | percent 50 }}", &data).unwrap(),
        "250"
    );
    assert_eq!(
        engine.render("t", r#"{{ .Values.missing | default "x" }}"#, &data).unwrap(),
        "x"
    );
    assert_eq!(
        engine.render("t", "{{ index .Values \"mode\" | upper | quote }}", &data).unwrap(),
        "\"FAST\""
    );
}

#[test]
fn test_unknown_function_is_a_parse_error() {
    let err = Engine::new().render("t", "{{ nope 1 }}", &json!({})).unwrap_err();
    assert_eq!(err.kind, TemplateErrorKind::Parse);
    assert!(err.message.contains("function \"nope\" not defined"));
    assert!(err.to_string().starts_with("template: t: "));
}

#[test]
fn test_function_failure_is_an_exec_error() {
    let err = Engine::new()
        .render("t", "{{ percent \"abc\" 10 }}", &json!({}))
        .unwrap_err();
    assert_eq!(err.kind, TemplateErrorKind::Exec);
    assert!(err.message.contains("error calling percent"));
}

#[test]
fn test_custom_function() {
    fn answer(_: &[Value]) -> Result<Value, String> {
        Ok(json!(42))
    }
    let engine = Engine::new().with_func("answer", answer);
    assert_eq!(engine.render("t", "{{ answer }}", &json!({})).unwrap(), "42");
}

#[test]
fn test_render_patch() {
    let patch = PatchTemplate {
        patch_type: PatchType::Strategic,
        patch: "spec:\n  template:\n    spec:\n      containers:\n      - name: app\n        resources:\n          limits:\n            cpu: \"{{ .Values.cpu }}m\"\n".into(),
        target_ref: Some(ObjectReference {
            name: Some("app".into()),
            ..Default::default()
        }),
    };
    let value = Engine::new().render_patch(&patch, &trial()).unwrap();
    assert_eq!(
        value.pointer("/spec/template/spec/containers/0/resources/limits/cpu"),
        Some(&json!("500m"))
    );
}

#[test]
fn test_render_helm_value() {
    let engine = Engine::new();
    let literal = HelmValue {
        name: "replicas".into(),
        force_string: false,
        value: IntOrString::Int(3),
    };
    assert_eq!(engine.render_helm_value(&literal, &trial()).unwrap(), "3");

    let templated = HelmValue {
        name: "resources.cpu".into(),
        force_string: true,
        value: IntOrString::String("{{ .Values.cpu }}m".into()),
    };
    assert_eq!(engine.render_helm_value(&templated, &trial()).unwrap(), "500m");
}

#[test]
fn test_metric_queries() {
    let mut trial = trial();
    trial.status = Some(TrialStatus {
        start_time: Some(Time(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap())),
        completion_time: Some(Time(Utc.with_ymd_and_hms(2020, 1, 1, 0, 1, 30).unwrap())),
        ..Default::default()
    });
    let metric = Metric {
        name: "duration".into(),
        metric_type: MetricType::Kubernetes,
        query: "{{ duration .StartTime .CompletionTime }}".into(),
        error_query: "rate[{{ .Range }}] {{ .Trial.Name }}".into(),
        ..Default::default()
    };
    let (query, error_query) = Engine::new()
        .render_metric_queries(&metric, &trial, None)
        .unwrap();
    assert_eq!(query, "90");
    assert_eq!(error_query, "rate[90s] sample-001");
}

#[test]
fn test_metric_queries_without_times() {
    let metric = Metric {
        name: "duration".into(),
        query: "{{ duration .StartTime .CompletionTime }} {{ .Range }}".into(),
        ..Default::default()
    };
    let (query, _) = Engine::new()
        .render_metric_queries(&metric, &trial(), None)
        .unwrap();
    assert_eq!(query, "0 0s");
}

#[test]
fn test_metric_range_agrees_with_duration() {
    let mut trial = trial();
    trial.status = Some(TrialStatus {
        completion_time: Some(Time(Utc.with_ymd_and_hms(2020, 1, 1, 0, 1, 30).unwrap())),
        ..Default::default()
    });
    let metric = Metric {
        name: "duration".into(),
        query: "{{ duration .StartTime .CompletionTime }} {{ .Range }}".into(),
        ..Default::default()
    };
    let (query, _) = Engine::new()
        .render_metric_queries(&metric, &trial, None)
        .unwrap();
    assert_eq!(query, "63713433690 63713433690s");

    // A start without a completion never yields a negative range
    trial.status = Some(TrialStatus {
        start_time: Some(Time(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap())),
        ..Default::default()
    });
    let metric = Metric {
        name: "range".into(),
        query: "{{ .Range }}".into(),
        ..Default::default()
    };
    let (query, _) = Engine::new()
        .render_metric_queries(&metric, &trial, None)
        .unwrap();
    assert_eq!(query, "0s");
}

#[test]
fn test_metric_target_pods() {
    let pods = json!({"items": [{"spec": {"containers": [
        {"resources": {"requests": {"cpu": "250m"}}}
    ]}}]});
    let metric = Metric {
        name: "cpu-requests".into(),
        query: "{{ resourceRequests .Pods \"cpu=1\" }}".into(),
        ..Default::default()
    };
    let (query, _) = Engine::new()
        .render_metric_queries(&metric, &trial(), Some(&pods))
        .unwrap();
    assert_eq!(query, "0.25");
}
