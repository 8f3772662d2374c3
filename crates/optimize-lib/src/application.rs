//! Application generation
//!
//! Builds an `Application` document from a stream of manifests. Applications
//! already present in the stream are folded together and the generator's own
//! settings are applied on top, so running the generator on its own output
//! yields the same application again.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

use crate::api::application::{
    Application, Objective, ResourceLocator, APPLICATION_API_VERSION, APPLICATION_KIND,
};
use crate::api::meta::ANNOTATION_LAST_SCANNED;
use crate::error::Result;
use crate::observability::StructuredLogger;
use crate::scan::{
    clear_field, locator_nodes, unexpanded_locators, Node, Pipeline, ResourceExpander,
    ResourceMeta, Scan, Scanner, Writer,
};

/// Generates an application from the manifests behind a set of locators
#[derive(Default)]
pub struct ApplicationGenerator<'a> {
    /// Overrides the application name when not empty
    pub name: String,
    pub resources: Vec<ResourceLocator>,
    /// Objective names to add to the application
    pub objectives: Vec<String>,
    /// Source for the `-` locator
    pub default_reader: Option<Box<dyn Read + 'a>>,
    /// Time recorded in the last scanned annotation, defaults to now
    pub scanned_at: Option<DateTime<Utc>>,
}

impl<'a> ApplicationGenerator<'a> {
    pub fn execute(&mut self, output: impl Writer) -> Result<()> {
        let expander = ResourceExpander::new(self.default_reader.take());
        let generator: &Self = self;
        Pipeline::new()
            .input(locator_nodes(&generator.resources))
            .filter(expander)
            .filter(Scanner::new(generator))
            .filter(clear_field("status"))
            .output(output)
            .execute()
    }

    fn apply(&self, app: &mut Application) {
        if !self.name.is_empty() {
            app.metadata.name = Some(self.name.clone());
        }

        let scanned_at = self.scanned_at.unwrap_or_else(Utc::now);
        app.metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(
                ANNOTATION_LAST_SCANNED.to_string(),
                scanned_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            );

        app.resources.extend(self.resources.iter().cloned());
        app.objectives
            .extend(self.objectives.iter().map(|name| Objective::named(name)));
    }
}

/// Fold `src` into `dst`: scalars are last-wins, maps are a right-biased
/// union and lists are concatenated
fn merge(src: Application, dst: &mut Application) {
    if src.metadata.name.as_deref().is_some_and(|n| !n.is_empty()) {
        dst.metadata.name = src.metadata.name;
    }
    if src.metadata.namespace.as_deref().is_some_and(|n| !n.is_empty()) {
        dst.metadata.namespace = src.metadata.namespace;
    }
    merge_map(&mut dst.metadata.labels, src.metadata.labels);
    merge_map(&mut dst.metadata.annotations, src.metadata.annotations);

    if src.parameters.is_some() {
        dst.parameters = src.parameters;
    }
    if src.ingress.is_some() {
        dst.ingress = src.ingress;
    }
    if src.cloud_provider.is_some() {
        dst.cloud_provider = src.cloud_provider;
    }

    dst.resources.extend(src.resources);
    dst.scenarios.extend(src.scenarios);
    dst.objectives.extend(src.objectives);
}

fn merge_map(dst: &mut Option<BTreeMap<String, String>>, src: Option<BTreeMap<String, String>>) {
    let Some(src) = src else { return };
    dst.get_or_insert_with(Default::default).extend(src);
}

fn is_stream_path(path: &str) -> bool {
    path == "-" || Path::new(path).parent() == Some(Path::new("/dev/fd"))
}

/// Drop locators that only make sense for the invocation that scanned them
fn clean(app: &mut Application) {
    app.resources.retain_mut(|locator| {
        let Some(resource) = &mut locator.resource else {
            return true;
        };
        resource.resources.retain(|path| !is_stream_path(path));
        !resource.resources.is_empty()
    });
}

impl Scan for ApplicationGenerator<'_> {
    type Fact = Application;

    fn map(&self, node: &Node, meta: &ResourceMeta) -> Result<Vec<Self::Fact>> {
        if meta.kind != APPLICATION_KIND || meta.api_version != APPLICATION_API_VERSION {
            return Ok(Vec::new());
        }
        Ok(vec![serde_json::from_value(node.clone())?])
    }

    fn transform(&self, nodes: Vec<Node>, facts: Vec<Self::Fact>) -> Result<Vec<Node>> {
        for locator in unexpanded_locators(&nodes) {
            warn!(
                event = "locator_not_scanned",
                locator = %locator,
                "Resources kept on the application without being scanned"
            );
        }

        let mut app = Application::default();
        for fact in facts {
            merge(fact, &mut app);
        }

        self.apply(&mut app);
        clean(&mut app);

        StructuredLogger::new("application")
            .log_application_scanned(app.name(), app.resources.len());
        Ok(vec![serde_json::to_value(&app)?])
    }
}
