use std::path::{Path, PathBuf};

use crate::api::application::{Application, GoalKind, Objective, Scenario, ScenarioKind};
use crate::api::experiment::ExperimentSpec;
use crate::api::meta::{LABEL_APPLICATION, LABEL_OBJECTIVE, LABEL_SCENARIO};
use crate::api::selector::parse_label_selector;
use crate::api::Experiment;
use crate::error::{Error, Result};
use crate::observability::StructuredLogger;
use crate::scan::{
    clear_field, locator_nodes, unexpanded_locators, Node, Pipeline, ResourceExpander,
    ResourceMeta, Scan, Scanner, Writer,
};

use super::resources::{container_resources, resource_parameters, ContainerResourcesFact};
use super::{
    to_node, BuiltInPrometheus, CustomSource, DurationSource, LocustSource, PrometheusSource,
    Source,
};

const DEFAULT_RESOURCES: [&str; 2] = ["cpu", "memory"];

/// Generates an experiment for one scenario and objective of an application.
///
/// The application's resources are expanded and scanned for workloads; every
/// matching container gets CPU and memory parameters. The output stream holds
/// the experiment followed by any auxiliary resources the scenario needs.
#[derive(Debug, Clone, Default)]
pub struct ExperimentGenerator {
    pub application: Application,
    /// Scenario name, may be empty when the application has one scenario
    pub scenario: String,
    /// Objective name, may be empty when the application has one objective
    pub objective: String,
    /// Directory relative file references are resolved against
    pub base_dir: PathBuf,
}

impl ExperimentGenerator {
    pub fn new(application: Application) -> Self {
        Self {
            application,
            ..Default::default()
        }
    }

    pub fn execute(&self, output: impl Writer) -> Result<()> {
        let mut locators = self.application.resources.clone();
        for locator in &mut locators {
            if let Some(resource) = &mut locator.resource {
                for path in &mut resource.resources {
                    *path = self.resolve(path);
                }
            }
        }

        Pipeline::new()
            .input(locator_nodes(&locators))
            .filter(ResourceExpander::default())
            .filter(Scanner::new(self))
            .filter(clear_field("status"))
            .output(output)
            .execute()
    }

    fn resolve(&self, path: &str) -> String {
        if path == "-" || path.contains("://") || Path::new(path).is_absolute() {
            return path.to_string();
        }
        self.base_dir.join(path).to_string_lossy().into_owned()
    }

    fn sources(
        &self,
        app: &Application,
        scenario: &Scenario,
        objective: Option<&Objective>,
    ) -> Vec<Source> {
        let mut sources = Vec::new();
        match &scenario.kind {
            ScenarioKind::Locust(locust) => sources.push(Source::Locust(LocustSource {
                scenario_name: scenario.name.clone(),
                scenario: locust.clone(),
                objective: objective.cloned(),
                ingress_url: app.ingress_url().map(str::to_string),
                base_dir: self.base_dir.clone(),
            })),
            ScenarioKind::Custom(custom) => sources.push(Source::Custom(CustomSource {
                scenario_name: scenario.name.clone(),
                scenario: custom.clone(),
                objective: objective.cloned(),
            })),
        }

        for goal in objective.iter().flat_map(|o| &o.goals) {
            match &goal.kind {
                Some(GoalKind::Prometheus(_)) => {
                    sources.push(Source::Prometheus(PrometheusSource { goal: goal.clone() }))
                }
                Some(GoalKind::Duration(_)) => {
                    sources.push(Source::Duration(DurationSource { goal: goal.clone() }))
                }
                _ => {}
            }
        }
        sources
    }
}

fn select_scenario<'a>(app: &'a Application, name: &str) -> Result<&'a Scenario> {
    if name.is_empty() {
        return match app.scenarios.as_slice() {
            [only] => Ok(only),
            [] => Err(Error::input("application has no scenarios")),
            _ => Err(Error::input(
                "a scenario name is required when the application has multiple scenarios",
            )),
        };
    }
    app.scenarios
        .iter()
        .find(|s| s.name == name)
        .ok_or_else(|| Error::input(format!("unable to find scenario {name:?}")))
}

fn select_objective<'a>(app: &'a Application, name: &str) -> Result<Option<&'a Objective>> {
    if name.is_empty() {
        return match app.objectives.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(only)),
            _ => Err(Error::input(
                "an objective name is required when the application has multiple objectives",
            )),
        };
    }
    app.objectives
        .iter()
        .find(|o| o.name == name)
        .map(Some)
        .ok_or_else(|| Error::input(format!("unable to find objective {name:?}")))
}

impl Scan for ExperimentGenerator {
    type Fact = ContainerResourcesFact;

    fn map(&self, node: &Node, meta: &ResourceMeta) -> Result<Vec<Self::Fact>> {
        let selector = self
            .application
            .parameters
            .as_ref()
            .and_then(|p| p.container_resources.as_ref())
            .map(|c| c.selector.as_str())
            .unwrap_or_default();
        let selector = parse_label_selector(selector)
            .map_err(|e| e.context("invalid container resources selector"))?;
        Ok(container_resources(node, meta, &selector))
    }

    fn transform(&self, nodes: Vec<Node>, facts: Vec<Self::Fact>) -> Result<Vec<Node>> {
        let unreadable = unexpanded_locators(&nodes);
        if !unreadable.is_empty() {
            return Err(Error::input(format!(
                "unable to read application resources: {}",
                unreadable.join("; ")
            )));
        }

        let mut app = self.application.clone();
        app.default_names();

        let scenario = select_scenario(&app, &self.scenario)?;
        let objective = select_objective(&app, &self.objective)?;

        let name = match objective {
            Some(o) => format!("{}-{}-{}", app.name(), scenario.name, o.name),
            None => format!("{}-{}", app.name(), scenario.name),
        };
        let mut experiment = Experiment::new(&name, ExperimentSpec::default());
        experiment.metadata.namespace = app.metadata.namespace.clone();
        let labels = experiment.metadata.labels.get_or_insert_with(Default::default);
        labels.insert(LABEL_APPLICATION.to_string(), app.name().to_string());
        labels.insert(LABEL_SCENARIO.to_string(), scenario.name.clone());
        if let Some(o) = objective {
            labels.insert(LABEL_OBJECTIVE.to_string(), o.name.clone());
        }

        let resources: Vec<String> = app
            .parameters
            .as_ref()
            .and_then(|p| p.container_resources.as_ref())
            .map(|c| c.resources.clone())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_RESOURCES.iter().map(|r| r.to_string()).collect());
        let (parameters, patches) = resource_parameters(&facts, &resources)?;
        experiment.spec.parameters = parameters;
        experiment.spec.patches = patches;

        let mut sources = self.sources(&app, scenario, objective);
        for source in &sources {
            if let Some(metrics) = source.as_metric_source() {
                experiment.spec.metrics.extend(metrics.metrics()?);
            }
        }

        // Needs the complete metric list
        sources.push(Source::BuiltInPrometheus(BuiltInPrometheus::new(&name)));
        for source in &mut sources {
            if let Some(updater) = source.as_experiment_source() {
                updater.update(&mut experiment)?;
            }
        }

        let mut output = vec![to_node(&experiment)?];
        for source in &mut sources {
            if let Some(reader) = source.as_reader() {
                output.extend(reader.read()?);
            }
        }

        StructuredLogger::new("generator").log_experiment_generated(
            &name,
            &scenario.name,
            objective.map(|o| o.name.as_str()).unwrap_or_default(),
            experiment.spec.parameters.len(),
            experiment.spec.metrics.len(),
        );
        Ok(output)
    }
}

/// Recover the scenario and objective names from an experiment name of the
/// form `<application>-<scenario>-<objective>`.
///
/// Falls back to the only scenario or objective of the application; names
/// that cannot be determined are returned empty.
pub fn guess_scenario_and_objective(app: &Application, experiment_name: &str) -> (String, String) {
    let rest = experiment_name
        .strip_prefix(app.name())
        .and_then(|r| r.strip_prefix('-'))
        .unwrap_or(experiment_name);

    for scenario in &app.scenarios {
        for objective in &app.objectives {
            if rest == format!("{}-{}", scenario.name, objective.name) {
                return (scenario.name.clone(), objective.name.clone());
            }
        }
    }

    let scenario = app
        .scenarios
        .iter()
        .find(|s| rest == s.name || rest.starts_with(&format!("{}-", s.name)))
        .or(match app.scenarios.as_slice() {
            [only] => Some(only),
            _ => None,
        })
        .map(|s| s.name.clone())
        .unwrap_or_default();

    let objective = app
        .objectives
        .iter()
        .find(|o| rest.ends_with(&format!("-{}", o.name)))
        .or(match app.objectives.as_slice() {
            [only] => Some(only),
            _ => None,
        })
        .map(|o| o.name.clone())
        .unwrap_or_default();

    (scenario, objective)
}
