//! Cluster object model
//!
//! - `Application` (`apps.redskyops.dev/v1alpha1`): user authored workload description
//! - `Experiment` and `Trial` (`redskyops.dev/v1beta1`): generated optimization resources
//! - Annotation keys, finalizers and the sync cursors persisted through them
//! - Label selector parsing shared by generation and matching

pub mod application;
pub mod experiment;
pub mod meta;
pub mod selector;
pub mod trial;

pub use application::{
    Application, ContainerResources, CustomScenario, Goal, GoalKind, Ingress, LatencyType,
    LocustScenario, Objective, ResourceLocator, Scenario, ScenarioKind,
};
pub use experiment::{
    Constraint, Experiment, ExperimentCondition, ExperimentConditionType, ExperimentSpec,
    ExperimentStatus, Metric, MetricType, Optimization, OrderConstraint, Parameter, PatchTemplate,
    PatchType, ResourceTarget, SumConstraint, SumConstraintParameter, TrialTemplateSpec,
};
pub use meta::{ConditionStatus, SyncCursors, FINALIZER};
pub use trial::{
    Assignment, HelmValue, MetricValue, SetupTask, Trial, TrialCondition, TrialConditionType,
    TrialSpec, TrialStatus,
};
