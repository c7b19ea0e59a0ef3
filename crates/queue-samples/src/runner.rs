//! Sequential, fail-fast execution of sample scenarios.
//!
//! Scenarios run one at a time in the order given, sharing one client. The
//! first failure stops the run and is returned with its cause untouched.
//! Nothing created by earlier steps is cleaned up.

use async_trait::async_trait;
use queue_storage_client::{QueueError, QueueServiceClient};
use std::sync::Arc;
use tracing::{debug, error, info};

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;

// ============================================================================
// Scenario Contract
// ============================================================================

/// One named demonstration against the queue service
#[async_trait]
pub trait Scenario: Send + Sync {
    /// Human-readable description, reported when the scenario completes
    fn name(&self) -> &str;

    /// Perform the scenario's calls, awaiting each before the next
    async fn run(&self, client: &dyn QueueServiceClient) -> Result<(), ScenarioError>;
}

/// Why a scenario failed
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Unexpected response from {operation}: {message}")]
    UnexpectedResponse { operation: String, message: String },
}

impl ScenarioError {
    /// Failure for a response the scenario cannot continue from
    pub fn unexpected(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Endpoint that refused the connection, if that is what happened
    pub fn refused_endpoint(&self) -> Option<&str> {
        match self {
            Self::Queue(QueueError::ConnectionRefused { endpoint }) => Some(endpoint),
            _ => None,
        }
    }
}

// ============================================================================
// Run Outcome
// ============================================================================

/// Progress of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    /// Index of the scenario in flight
    Running(usize),
    Failed { index: usize },
    Completed,
}

/// Scenarios that completed, in run order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub completed: Vec<String>,
    /// Always `Completed` for a run that returned a report
    pub state: RunState,
}

/// The scenario that stopped the run and its unmodified cause
#[derive(Debug, thiserror::Error)]
#[error("Scenario {} '{name}' failed: {cause}", .index + 1)]
pub struct RunFailure {
    /// Zero-based position in the run order
    pub index: usize,
    pub name: String,
    /// `Failed` at `index`
    pub state: RunState,
    #[source]
    pub cause: ScenarioError,
}

// ============================================================================
// Runner
// ============================================================================

/// Executes an ordered, fixed list of scenarios against one client
pub struct ScenarioRunner {
    client: Arc<dyn QueueServiceClient>,
    scenarios: Vec<Box<dyn Scenario>>,
}

impl ScenarioRunner {
    pub fn new(client: Arc<dyn QueueServiceClient>, scenarios: Vec<Box<dyn Scenario>>) -> Self {
        Self { client, scenarios }
    }

    /// Names of the scenarios in run order
    pub fn scenario_names(&self) -> Vec<&str> {
        self.scenarios.iter().map(|s| s.name()).collect()
    }

    /// Run every scenario in order, stopping at the first failure.
    ///
    /// The runner is consumed, so a finished run can never be repeated. The
    /// terminal state comes back in the report or the failure.
    pub async fn run(self) -> Result<RunReport, RunFailure> {
        let mut state = RunState::NotStarted;
        info!(
            provider = %self.client.provider_type(),
            scenarios = self.scenarios.len(),
            state = ?state,
            "Starting sample run"
        );

        let mut completed = Vec::with_capacity(self.scenarios.len());
        for (index, scenario) in self.scenarios.iter().enumerate() {
            state = RunState::Running(index);
            debug!(state = ?state, scenario = scenario.name(), "Running scenario");

            if let Err(cause) = scenario.run(self.client.as_ref()).await {
                state = RunState::Failed { index };
                report_failure(scenario.name(), &cause);
                return Err(RunFailure {
                    index,
                    name: scenario.name().to_string(),
                    state,
                    cause,
                });
            }

            info!(scenario = scenario.name(), "Scenario completed");
            completed.push(scenario.name().to_string());
        }

        state = RunState::Completed;
        info!(
            completed = completed.len(),
            state = ?state,
            "Sample run completed"
        );
        Ok(RunReport { completed, state })
    }
}

fn report_failure(scenario: &str, cause: &ScenarioError) {
    if let Some(endpoint) = cause.refused_endpoint() {
        error!(
            endpoint,
            "Connection refused. Is the storage emulator running? Start it (for example Azurite on port 10001) or point the samples at a storage account"
        );
    }
    error!(scenario, error = %cause, "Scenario failed");
}
