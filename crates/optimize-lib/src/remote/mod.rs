//! Wire model of the remote optimization service
//!
//! This module provides:
//! - Request and response bodies (experiments, trials, values, labels)
//! - `NumberOrString` assignment values
//! - The typed service `Error`
//! - The `ExperimentsApi` trait implemented by HTTP clients

mod error;
mod numstr;
mod types;

pub use error::{Error, ErrorType};
pub use numstr::NumberOrString;
pub use types::{
    Assignment, Bounds, Constraint, ConstraintType, Experiment, ExperimentMeta, Labels, Metric,
    Optimization, OrderConstraint, Parameter, ParameterType, SumConstraint,
    SumConstraintParameter, TrialAssignments, TrialItem, TrialList, TrialListQuery, TrialMeta,
    TrialStatus, TrialValues, Value,
};

use std::fmt;

use async_trait::async_trait;

/// The name an experiment is registered under remotely
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ExperimentName(String);

impl ExperimentName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExperimentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Split a trial name of the form `<experiment>-<number>`.
///
/// The number is `-1` when the name has no numeric suffix.
pub fn split_trial_name(name: &str) -> (ExperimentName, i64) {
    if let Some((experiment, number)) = name.rsplit_once('-') {
        if let Ok(number) = number.parse::<i64>() {
            if number >= 0 {
                return (ExperimentName::new(experiment), number);
            }
        }
    }
    (ExperimentName::new(name), -1)
}

/// Operations the command line needs from the optimization service
#[async_trait]
pub trait ExperimentsApi: Send + Sync {
    /// Fetch an experiment, including its links
    async fn get_experiment_by_name(&self, name: &ExperimentName) -> Result<Experiment, Error>;

    /// List the trials of an experiment, filtered by status
    async fn get_all_trials(&self, trials_url: &str, query: &TrialListQuery)
        -> Result<TrialList, Error>;

    /// Add, change or remove (empty value) experiment labels
    async fn label_experiment(&self, labels_url: &str, labels: &Labels) -> Result<(), Error>;

    /// Add, change or remove (empty value) trial labels
    async fn label_trial(&self, labels_url: &str, labels: &Labels) -> Result<(), Error>;
}
