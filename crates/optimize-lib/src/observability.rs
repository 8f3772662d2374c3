//! Structured logging for experiment lifecycle events
//!
//! Every event carries an `event` field and the emitting component so the
//! JSON output of the CLI can be filtered without parsing messages.

use tracing::{info, warn};

/// Structured logger for generation and synchronization events
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    component: String,
}

impl StructuredLogger {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    /// Log a generated experiment
    pub fn log_experiment_generated(
        &self,
        experiment: &str,
        scenario: &str,
        objective: &str,
        parameters: usize,
        metrics: usize,
    ) {
        info!(
            event = "experiment_generated",
            component = %self.component,
            experiment = %experiment,
            scenario = %scenario,
            objective = %objective,
            parameters = parameters,
            metrics = metrics,
            "Generated experiment"
        );
    }

    /// Log a scanned application
    pub fn log_application_scanned(&self, application: &str, resources: usize) {
        info!(
            event = "application_scanned",
            component = %self.component,
            application = %application,
            resources = resources,
            "Scanned application resources"
        );
    }

    /// Log a trial received from the server
    pub fn log_trial_synced(&self, experiment: &str, trial: &str, assignments: usize) {
        info!(
            event = "trial_synced",
            component = %self.component,
            experiment = %experiment,
            trial = %trial,
            assignments = assignments,
            "Created trial from server assignments"
        );
    }

    /// Log trial values reported back to the server
    pub fn log_trial_reported(&self, trial: &str, failed: bool, values: usize) {
        if failed {
            warn!(
                event = "trial_reported",
                component = %self.component,
                trial = %trial,
                failed = true,
                values = values,
                "Reported failed trial"
            );
        } else {
            info!(
                event = "trial_reported",
                component = %self.component,
                trial = %trial,
                failed = false,
                values = values,
                "Reported trial values"
            );
        }
    }

    /// Log an experiment the server no longer accepts trials for
    pub fn log_experiment_stopped(&self, experiment: &str, message: &str) {
        info!(
            event = "experiment_stopped",
            component = %self.component,
            experiment = %experiment,
            message = %message,
            "Experiment stopped by the server"
        );
    }

    /// Log an assignment that did not fit in a 32-bit integer
    pub fn log_assignment_clamped(&self, trial: &str, parameter: &str, value: i64, clamped: i32) {
        warn!(
            event = "assignment_clamped",
            component = %self.component,
            trial = %trial,
            parameter = %parameter,
            value = value,
            clamped = clamped,
            "Assignment out of range, clamped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("server");
        assert_eq!(logger.component(), "server");

        // Emitting without a subscriber must not panic
        logger.log_trial_reported("demo-001", true, 0);
        logger.log_assignment_clamped("demo-001", "cpu", i64::MAX, i32::MAX);
    }
}
