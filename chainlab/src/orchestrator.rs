// chainlab/src/orchestrator.rs
//!
//! Orchestrator: runs a chain front to back
//!
//! Execution is strictly sequential. Each component sees only the
//! components before it; its output is written back into the chain before
//! the next one starts.
//!
//! Stop conditions:
//! - a component fails: the run aborts, earlier outputs are kept, nothing
//!   is rolled back;
//! - the `StopHandle` is cleared: checked between components, so the
//!   component in flight always finishes.

use crate::backend::Backend;
use crate::chain::Chain;
use crate::component::{ComponentId, ComponentOutput};
use crate::runner::{RunError, Runner};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared between a run and whoever may stop it.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Value of one app-output component after a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppOutput {
    pub id: ComponentId,
    pub title: String,
    pub output: Option<ComponentOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Ids of the components that completed, in order.
    pub executed: Vec<ComponentId>,
    pub stopped: bool,
    pub outputs: Vec<AppOutput>,
}

#[derive(Debug, thiserror::Error)]
pub enum ChainRunError {
    #[error("Action {} ({title}) failed: {source}", .index + 1)]
    ComponentFailed {
        index: usize,
        id: ComponentId,
        title: String,
        #[source]
        source: RunError,
        /// Components that completed before the failure.
        executed: Vec<ComponentId>,
    },
}

impl ChainRunError {
    pub fn component_id(&self) -> ComponentId {
        match self {
            ChainRunError::ComponentFailed { id, .. } => *id,
        }
    }
}

pub struct Orchestrator<'a> {
    backend: &'a dyn Backend,
}

impl<'a> Orchestrator<'a> {
    pub fn new(backend: &'a dyn Backend) -> Self {
        Self { backend }
    }

    /// Runs every component once. `stop` is set running for the duration.
    pub fn run(&self, chain: &mut Chain, stop: &StopHandle) -> Result<RunReport, ChainRunError> {
        stop.start();
        let result = self.run_components(chain, stop);
        stop.stop();
        result
    }

    fn run_components(
        &self,
        chain: &mut Chain,
        stop: &StopHandle,
    ) -> Result<RunReport, ChainRunError> {
        let total = chain.len();
        let mut executed = Vec::with_capacity(total);
        let mut stopped = false;

        for index in 0..total {
            let (preceding, rest) = chain.components_mut().split_at_mut(index);
            let component = &mut rest[0];

            tracing::debug!(action = index + 1, title = %component.title, "chain action start");
            if let Err(source) = component.run(preceding, self.backend) {
                return Err(ChainRunError::ComponentFailed {
                    index,
                    id: component.id,
                    title: component.title.clone(),
                    source,
                    executed,
                });
            }
            executed.push(component.id);
            tracing::debug!(action = index + 1, "chain action completed");

            if index + 1 < total && !stop.is_running() {
                tracing::info!(executed = executed.len(), total, "chain run stopped");
                stopped = true;
                break;
            }
        }

        Ok(RunReport {
            executed,
            stopped,
            outputs: app_outputs(chain),
        })
    }
}

pub fn app_outputs(chain: &Chain) -> Vec<AppOutput> {
    chain
        .app_outputs()
        .into_iter()
        .map(|component| AppOutput {
            id: component.id,
            title: component.title.clone(),
            output: component.output.clone(),
            notice: component.status.notice.clone(),
        })
        .collect()
}
