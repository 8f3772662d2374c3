//! Label experiments and trials on the optimization service

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use optimize_lib::remote::{
    split_trial_name, ExperimentName, ExperimentsApi, Labels, TrialListQuery, TrialStatus,
};

/// Something that can be labeled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Experiment(ExperimentName),
    Trial(ExperimentName, i64),
}

impl Target {
    fn parse(kind: &str, name: &str) -> Result<Self> {
        match kind {
            "experiment" | "experiments" | "exp" => Ok(Target::Experiment(ExperimentName::new(name))),
            "trial" | "trials" | "tr" => match split_trial_name(name) {
                (experiment, number) if number >= 0 => Ok(Target::Trial(experiment, number)),
                _ => anyhow::bail!("invalid trial name {name:?}, expected <experiment>-<number>"),
            },
            other => anyhow::bail!("cannot label {other}"),
        }
    }
}

/// Split arguments into targets and label changes.
///
/// Targets are `TYPE NAME...` or `TYPE/NAME`; labels are `KEY=VALUE` and a
/// trailing dash (`KEY-`) removes a label.
pub fn parse_args(args: &[String]) -> Result<(Vec<Target>, BTreeMap<String, String>)> {
    let mut labels = BTreeMap::new();
    let mut names = Vec::new();
    for arg in args {
        if let Some((key, value)) = arg.split_once('=') {
            labels.insert(key.to_string(), value.to_string());
        } else if arg.ends_with('-') && !arg.trim_matches('-').is_empty() {
            labels.insert(arg.trim_end_matches('-').to_string(), String::new());
        } else {
            names.push(arg.as_str());
        }
    }

    let mut targets = Vec::new();
    let mut kind: Option<&str> = None;
    for name in names {
        match (name.split_once('/'), kind) {
            (Some((k, n)), _) => targets.push(Target::parse(k, n)?),
            (None, Some(k)) => targets.push(Target::parse(k, name)?),
            (None, None) => kind = Some(name),
        }
    }

    if targets.is_empty() {
        anyhow::bail!("at least one experiment or trial name is required");
    }
    if labels.is_empty() {
        anyhow::bail!("at least one label change is required");
    }
    Ok((targets, labels))
}

/// Apply label changes; returns a description of each labeled object
pub async fn label(
    api: &dyn ExperimentsApi,
    targets: &[Target],
    labels: BTreeMap<String, String>,
) -> Result<Vec<String>> {
    let labels = Labels { labels };
    let mut labeled = Vec::new();

    let mut trials: BTreeMap<String, Vec<i64>> = BTreeMap::new();
    for target in targets {
        match target {
            Target::Experiment(name) => {
                let exp = api
                    .get_experiment_by_name(name)
                    .await
                    .with_context(|| format!("Failed to get experiment {name}"))?;
                api.label_experiment(&exp.meta.labels_url, &labels)
                    .await
                    .with_context(|| format!("Failed to label experiment {name}"))?;
                labeled.push(format!("experiment {name}"));
            }
            Target::Trial(name, number) => {
                trials.entry(name.name().to_string()).or_default().push(*number);
            }
        }
    }

    // Only completed trials can be labeled
    let query = TrialListQuery {
        status: vec![TrialStatus::Completed],
    };
    for (name, numbers) in trials {
        let name = ExperimentName::new(name);
        let exp = api
            .get_experiment_by_name(&name)
            .await
            .with_context(|| format!("Failed to get experiment {name}"))?;
        let list = api
            .get_all_trials(&exp.meta.trials_url, &query)
            .await
            .context("Failed to list trials")?;

        let mut count = 0;
        for trial in list.trials.iter().filter(|t| numbers.contains(&t.number)) {
            api.label_trial(&trial.assignments.meta.labels_url, &labels)
                .await
                .with_context(|| format!("Failed to label trial {name}-{:03}", trial.number))?;
            labeled.push(format!("trial {name}-{:03}", trial.number));
            count += 1;
        }

        if count != numbers.len() {
            anyhow::bail!("unable to label some trials (only \"completed\" trials can be labeled)");
        }
    }

    Ok(labeled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use optimize_lib::remote::{
        self, TrialAssignments, TrialItem, TrialList, TrialMeta, TrialValues,
    };
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingApi {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ExperimentsApi for RecordingApi {
        async fn get_experiment_by_name(
            &self,
            name: &ExperimentName,
        ) -> Result<remote::Experiment, remote::Error> {
            let mut exp = remote::Experiment::default();
            exp.meta.labels_url = format!("/experiments/{name}/labels");
            exp.meta.trials_url = format!("/experiments/{name}/trials");
            Ok(exp)
        }

        async fn get_all_trials(
            &self,
            trials_url: &str,
            _: &TrialListQuery,
        ) -> Result<TrialList, remote::Error> {
            let trial = |number: i64| TrialItem {
                assignments: TrialAssignments {
                    meta: TrialMeta {
                        self_url: format!("{trials_url}/{number}"),
                        labels_url: format!("{trials_url}/{number}/labels"),
                    },
                    ..Default::default()
                },
                values: TrialValues::default(),
                number,
                status: TrialStatus::Completed,
            };
            Ok(TrialList {
                trials: vec![trial(1), trial(2)],
            })
        }

        async fn label_experiment(&self, url: &str, labels: &Labels) -> Result<(), remote::Error> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{url} {:?}", labels.labels));
            Ok(())
        }

        async fn label_trial(&self, url: &str, labels: &Labels) -> Result<(), remote::Error> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{url} {:?}", labels.labels));
            Ok(())
        }
    }

    fn args(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        let (targets, labels) =
            parse_args(&args(&["trial", "demo-001", "demo-2", "best=true", "old-"])).unwrap();
        assert_eq!(
            targets,
            vec![
                Target::Trial(ExperimentName::new("demo"), 1),
                Target::Trial(ExperimentName::new("demo"), 2),
            ]
        );
        assert_eq!(labels["best"], "true");
        assert_eq!(labels["old"], "");

        let (targets, _) = parse_args(&args(&["experiment/demo", "a=b"])).unwrap();
        assert_eq!(targets, vec![Target::Experiment(ExperimentName::new("demo"))]);
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(parse_args(&args(&["experiment", "demo"])).is_err());
        assert!(parse_args(&args(&["a=b"])).is_err());
        assert!(parse_args(&args(&["pod/web", "a=b"])).is_err());
        assert!(parse_args(&args(&["trial/demo", "a=b"])).is_err());
    }

    #[tokio::test]
    async fn test_label_experiment_and_trials() {
        let api = RecordingApi::default();
        let (targets, labels) =
            parse_args(&args(&["experiment/demo", "trial/demo-2", "best=true"])).unwrap();

        let labeled = label(&api, &targets, labels).await.unwrap();
        assert_eq!(labeled, vec!["experiment demo", "trial demo-002"]);

        let calls = api.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("/experiments/demo/labels"));
        assert!(calls[1].starts_with("/experiments/demo/trials/2/labels"));
    }

    #[tokio::test]
    async fn test_label_missing_trial() {
        let api = RecordingApi::default();
        let (targets, labels) = parse_args(&args(&["trial", "demo-9", "best=true"])).unwrap();
        let err = label(&api, &targets, labels).await.unwrap_err();
        assert!(err.to_string().contains("completed"));
    }
}
