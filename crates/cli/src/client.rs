//! HTTP client for the optimization service
//!
//! Links between resources are delivered in RFC 8288 `Link` headers (and in
//! the `_metadata` of listed trials); they are collected into the `meta`
//! fields of the returned values.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use optimize_lib::remote::{
    self, ErrorType, ExperimentName, ExperimentsApi, Labels, TrialList, TrialListQuery,
};
use reqwest::header::{HeaderMap, LAST_MODIFIED, LINK};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tracing::debug;
use url::Url;

pub const REL_SELF: &str = "self";
pub const REL_NEXT_TRIAL: &str = "next-trial";
pub const REL_TRIALS: &str = "trials";
pub const REL_LABELS: &str = "labels";

/// API client for the optimization service
pub struct ApiClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str, token: Option<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        // Relative joins only keep the last path segment with a trailing slash
        let mut base_url = Url::parse(base_url).context("Invalid API URL")?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, not_found: ErrorType) -> Result<Response, remote::Error> {
        let response = self.request(builder).send().await.map_err(transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(status = %status, body = %body, "Optimization service returned an error");
        Err(error_from_response(status, &body, not_found))
    }
}

#[async_trait]
impl ExperimentsApi for ApiClient {
    async fn get_experiment_by_name(
        &self,
        name: &ExperimentName,
    ) -> Result<remote::Experiment, remote::Error> {
        let url = self
            .base_url
            .join(&format!("experiments/{}", name.name()))
            .map_err(transport)?;

        let response = self
            .send(self.client.get(url.clone()), ErrorType::ExperimentNotFound)
            .await?;
        let headers = response.headers().clone();
        let mut experiment: remote::Experiment = response.json().await.map_err(transport)?;

        let links = parse_links(&headers, &url);
        experiment.meta = remote::ExperimentMeta {
            last_modified: last_modified(&headers),
            self_url: link(&links, REL_SELF).unwrap_or_else(|| url.to_string()),
            next_trial_url: link(&links, REL_NEXT_TRIAL).unwrap_or_default(),
            trials_url: link(&links, REL_TRIALS).unwrap_or_else(|| format!("{url}/trials/")),
            labels_url: link(&links, REL_LABELS).unwrap_or_else(|| format!("{url}/labels/")),
        };
        Ok(experiment)
    }

    async fn get_all_trials(
        &self,
        trials_url: &str,
        query: &TrialListQuery,
    ) -> Result<TrialList, remote::Error> {
        let url = Url::parse(trials_url).map_err(transport)?;
        let response = self
            .send(
                self.client.get(url.clone()).query(&query.to_pairs()),
                ErrorType::ExperimentNotFound,
            )
            .await?;

        let body: Value = response.json().await.map_err(transport)?;
        let mut list: TrialList = serde_json::from_value(body.clone()).map_err(transport)?;

        let items = body.get("trials").and_then(Value::as_array);
        for (index, trial) in list.trials.iter_mut().enumerate() {
            let links = items
                .and_then(|items| items.get(index))
                .map(|item| metadata_links(item, &url))
                .unwrap_or_default();
            let self_url = link(&links, REL_SELF)
                .unwrap_or_else(|| format!("{}{}", with_slash(&url), trial.number));
            trial.assignments.meta = remote::TrialMeta {
                labels_url: link(&links, REL_LABELS)
                    .unwrap_or_else(|| format!("{self_url}/labels/")),
                self_url,
            };
        }
        Ok(list)
    }

    async fn label_experiment(&self, labels_url: &str, labels: &Labels) -> Result<(), remote::Error> {
        let url = Url::parse(labels_url).map_err(transport)?;
        self.send(self.client.post(url).json(labels), ErrorType::ExperimentNotFound)
            .await?;
        Ok(())
    }

    async fn label_trial(&self, labels_url: &str, labels: &Labels) -> Result<(), remote::Error> {
        let url = Url::parse(labels_url).map_err(transport)?;
        self.send(self.client.post(url).json(labels), ErrorType::TrialNotFound)
            .await?;
        Ok(())
    }
}

fn transport(err: impl std::fmt::Display) -> remote::Error {
    remote::Error::new(ErrorType::Transport, err.to_string())
}

/// Map a failed response to a service error, preferring the typed error body
fn error_from_response(status: StatusCode, body: &str, not_found: ErrorType) -> remote::Error {
    if let Ok(err) = serde_json::from_str::<remote::Error>(body) {
        return err;
    }

    let error_type = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorType::Unauthorized,
        StatusCode::NOT_FOUND => not_found,
        _ => ErrorType::Unexpected(format!("http-{}", status.as_u16())),
    };
    let message = match body.trim() {
        "" => format!("unexpected response ({status})"),
        text => format!("unexpected response ({status}): {text}"),
    };
    remote::Error::new(error_type, message)
}

fn with_slash(url: &Url) -> String {
    let url = url.as_str();
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

fn link(links: &[(String, String)], rel: &str) -> Option<String> {
    links
        .iter()
        .find(|(r, _)| r == rel)
        .map(|(_, url)| url.clone())
}

fn last_modified(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    let value = headers.get(LAST_MODIFIED)?.to_str().ok()?;
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn parse_links(headers: &HeaderMap, base: &Url) -> Vec<(String, String)> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| parse_link_values(v, base))
        .collect()
}

/// Links of a listed item: `_metadata.Link` is a string or a list of strings
fn metadata_links(item: &Value, base: &Url) -> Vec<(String, String)> {
    match item.pointer("/_metadata/Link") {
        Some(Value::String(v)) => parse_link_values(v, base),
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(Value::as_str)
            .flat_map(|v| parse_link_values(v, base))
            .collect(),
        _ => Vec::new(),
    }
}

/// Parse `<url>; rel="name", <url>; rel=name` into (relation, absolute url)
fn parse_link_values(value: &str, base: &Url) -> Vec<(String, String)> {
    let mut links = Vec::new();
    for part in value.split(',') {
        let mut fields = part.split(';').map(str::trim);
        let Some(target) = fields
            .next()
            .and_then(|t| t.strip_prefix('<'))
            .and_then(|t| t.strip_suffix('>'))
        else {
            continue;
        };
        let Ok(url) = base.join(target) else {
            continue;
        };

        for field in fields {
            if let Some(rel) = field.strip_prefix("rel=") {
                for rel in rel.trim_matches('"').split_whitespace() {
                    links.push((rel.to_string(), url.to_string()));
                }
            }
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use optimize_lib::remote::TrialStatus;
    use std::collections::BTreeMap;

    #[test]
    fn test_parse_link_values() {
        let base = Url::parse("http://example.com/v1/experiments/demo").unwrap();
        let links = parse_link_values(
            r#"</v1/experiments/demo/trials/>; rel="trials", <labels/>; rel=labels"#,
            &base,
        );
        assert_eq!(
            links,
            vec![
                (
                    "trials".to_string(),
                    "http://example.com/v1/experiments/demo/trials/".to_string()
                ),
                (
                    "labels".to_string(),
                    "http://example.com/v1/experiments/labels/".to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_error_from_response() {
        let err = error_from_response(
            StatusCode::CONFLICT,
            r#"{"error":"experiment-stopped","message":"done"}"#,
            ErrorType::ExperimentNotFound,
        );
        assert_eq!(err.error_type, ErrorType::ExperimentStopped);

        let err = error_from_response(StatusCode::NOT_FOUND, "", ErrorType::TrialNotFound);
        assert_eq!(err.error_type, ErrorType::TrialNotFound);

        let err = error_from_response(StatusCode::BAD_GATEWAY, "oops", ErrorType::TrialNotFound);
        assert_eq!(err.error_type, ErrorType::Unexpected("http-502".into()));
        assert!(err.message.contains("oops"));
    }

    #[tokio::test]
    async fn test_get_experiment_by_name() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/experiments/demo")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header(
                "link",
                r#"</v1/experiments/demo/trials/>; rel="trials", </v1/experiments/demo/next/>; rel="next-trial""#,
            )
            .with_header("last-modified", "Tue, 15 Nov 1994 08:12:31 GMT")
            .with_body(r#"{"displayName":"demo","labels":{"application":"shop"}}"#)
            .create_async()
            .await;

        let client =
            ApiClient::new(&format!("{}/v1", server.url()), Some("secret".into())).unwrap();
        let exp = client
            .get_experiment_by_name(&ExperimentName::new("demo"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(exp.labels["application"], "shop");
        assert_eq!(exp.meta.trials_url, format!("{}/v1/experiments/demo/trials/", server.url()));
        assert_eq!(exp.meta.next_trial_url, format!("{}/v1/experiments/demo/next/", server.url()));
        assert_eq!(exp.meta.self_url, format!("{}/v1/experiments/demo", server.url()));
        assert!(exp.meta.last_modified.is_some());
    }

    #[tokio::test]
    async fn test_get_experiment_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/experiments/missing")
            .with_status(404)
            .create_async()
            .await;

        let client = ApiClient::new(&format!("{}/v1/", server.url()), None).unwrap();
        let err = client
            .get_experiment_by_name(&ExperimentName::new("missing"))
            .await
            .unwrap_err();
        assert_eq!(err.error_type, ErrorType::ExperimentNotFound);
    }

    #[tokio::test]
    async fn test_get_all_trials_and_label() {
        let mut server = mockito::Server::new_async().await;
        let trials_url = format!("{}/v1/experiments/demo/trials/", server.url());
        server
            .mock("GET", "/v1/experiments/demo/trials/")
            .match_query(mockito::Matcher::UrlEncoded(
                "status".into(),
                "completed".into(),
            ))
            .with_status(200)
            .with_body(
                r#"{"trials":[
                    {"number":1,"status":"completed","assignments":[{"parameterName":"cpu","value":100}],
                     "_metadata":{"Link":["</v1/experiments/demo/trials/1/labels>; rel=\"labels\""]}},
                    {"number":2,"status":"completed","assignments":[]}
                ]}"#,
            )
            .create_async()
            .await;
        let label = server
            .mock("POST", "/v1/experiments/demo/trials/1/labels")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "labels": {"best": "true"}
            })))
            .with_status(204)
            .create_async()
            .await;

        let client = ApiClient::new(&format!("{}/v1/", server.url()), None).unwrap();
        let query = TrialListQuery {
            status: vec![TrialStatus::Completed],
        };
        let list = client.get_all_trials(&trials_url, &query).await.unwrap();
        assert_eq!(list.trials.len(), 2);
        assert_eq!(
            list.trials[1].assignments.meta.labels_url,
            format!("{trials_url}2/labels/")
        );

        let labels = Labels {
            labels: BTreeMap::from([("best".to_string(), "true".to_string())]),
        };
        client
            .label_trial(&list.trials[0].assignments.meta.labels_url, &labels)
            .await
            .unwrap();
        label.assert_async().await;
    }

    #[test]
    fn test_transport_error() {
        let client = ApiClient::new("http://127.0.0.1:1/v1/", None).unwrap();
        let err = tokio_test::block_on(client.label_experiment("not a url", &Labels::default()))
            .unwrap_err();
        assert_eq!(err.error_type, ErrorType::Transport);
    }
}
