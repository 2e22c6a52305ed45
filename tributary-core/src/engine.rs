//! Engine
//!
//! The entry point. An engine owns the base declarations (from any number
//! of dataflows), the backend formulas run on, and an optional execution
//! history. Each call to `run` resolves the target's graph against the
//! tracker's current state and starts scheduling immediately.

use std::sync::Arc;

use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{ConfigError, GraphDefinitionError};
use crate::execution::{
    Backend, CompositeLogger, ExecutionHandle, ExecutionHistory, ExecutionLogger, Run,
    ThreadPoolBackend, TracingLogger,
};
use crate::flow::{Catalog, Dataflow, Declaration};
use crate::graph::{resolve, ResolvedGraph};
use crate::state::ExecutionStateTracker;
use crate::token::Token;

pub struct Engine {
    catalog: Catalog,
    backend: Arc<dyn Backend>,
    history: Option<Arc<ExecutionHistory>>,
    config: EngineConfig,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn history(&self) -> Option<&Arc<ExecutionHistory>> {
        self.history.as_ref()
    }

    /// Start evaluating `target`.
    ///
    /// Events go to `logger`, or to a `TracingLogger` when none is given.
    /// `extra` declarations apply to this run only and take precedence over
    /// the engine's base declarations. Values produced by the run are
    /// committed to `tracker` once it finishes. Structural problems are
    /// reported through the returned handle, after a log that contains only
    /// its start and end events.
    pub fn run<T: Send + Sync + 'static>(
        &self,
        target: &Token<T>,
        extra: impl IntoIterator<Item = Declaration>,
        tracker: &Arc<ExecutionStateTracker>,
        logger: Option<Arc<dyn ExecutionLogger>>,
    ) -> ExecutionHandle<T> {
        let graph = self.resolve(target, extra, tracker);
        let logger = self.logger_for_run(logger);
        let run = Arc::new(Run::new(
            target.erased().clone(),
            graph,
            Arc::clone(tracker),
            logger,
            Arc::clone(&self.backend),
        ));
        debug!(execution_id = %run.execution_id(), target = %target.erased(), "starting run");
        run.launch();
        ExecutionHandle::new(run, self.config.default_timeout())
    }

    /// Resolve the graph `run` would use, without evaluating anything.
    pub fn resolve<T>(
        &self,
        target: &Token<T>,
        extra: impl IntoIterator<Item = Declaration>,
        tracker: &ExecutionStateTracker,
    ) -> Result<ResolvedGraph, GraphDefinitionError> {
        let catalog = self.catalog.with_extra(extra);
        resolve(target.erased(), &catalog, &tracker.current())
    }

    /// Render every declaration, plus `extra`, as a flow chart.
    pub fn render_flow_chart(
        &self,
        extra: impl IntoIterator<Item = Declaration>,
        use_code_name: bool,
        sink: impl FnMut(&str),
    ) {
        self.catalog
            .with_extra(extra)
            .render_flow_chart(use_code_name, sink);
    }

    /// The run's logger: the caller's or `TracingLogger`, plus the history
    /// when one is attached.
    fn logger_for_run(&self, logger: Option<Arc<dyn ExecutionLogger>>) -> Arc<dyn ExecutionLogger> {
        let logger: Arc<dyn ExecutionLogger> = match logger {
            Some(logger) => logger,
            None => Arc::new(TracingLogger),
        };
        match &self.history {
            None => logger,
            Some(history) => {
                let history = Arc::clone(history) as Arc<dyn ExecutionLogger>;
                Arc::new(CompositeLogger::new([history, logger]))
            }
        }
    }
}

#[derive(Default)]
pub struct EngineBuilder {
    declarations: Vec<Declaration>,
    backend: Option<Arc<dyn Backend>>,
    history: Option<Arc<ExecutionHistory>>,
    record_history: bool,
    config: Option<EngineConfig>,
}

impl EngineBuilder {
    pub fn dataflow(mut self, dataflow: &dyn Dataflow) -> Self {
        debug!(dataflow = dataflow.name(), "registering dataflow");
        self.declarations.extend(dataflow.declarations());
        self
    }

    pub fn declarations(mut self, declarations: impl IntoIterator<Item = Declaration>) -> Self {
        self.declarations.extend(declarations);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Record runs in a history sized from the config.
    pub fn with_history(mut self) -> Self {
        self.record_history = true;
        self
    }

    /// Record runs in an existing history, possibly shared between engines.
    pub fn history(mut self, history: Arc<ExecutionHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the engine. Without an explicit backend a thread pool sized
    /// by `worker_threads` is started.
    pub fn build(self) -> Result<Engine, ConfigError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let backend: Arc<dyn Backend> = match self.backend {
            Some(backend) => backend,
            None => Arc::new(ThreadPoolBackend::new(config.worker_threads)?),
        };
        let history = match self.history {
            Some(history) => Some(history),
            None if self.record_history => {
                Some(Arc::new(ExecutionHistory::new(config.history_capacity)))
            }
            None => None,
        };

        Ok(Engine {
            catalog: Catalog::new(self.declarations),
            backend,
            history,
            config,
        })
    }
}
