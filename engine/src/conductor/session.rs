//! Research session
//!
//! Front door to the conductor: assemble context, plan, and (unless this is a
//! dry run) execute. One session can serve many queries; each `run` owns its
//! own execution state.

use sdk::errors::ResearchError;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::conductor::context::ContextAssembler;
use crate::conductor::executor::{Executor, ExecutorSettings};
use crate::conductor::planner::{Planner, PlannerSettings};
use crate::conductor::types::{Plan, Summary};
use crate::config::Config;
use crate::db::MemoryStore;
use crate::llm::gateway::ModelGateway;
use crate::tools::ToolRegistry;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Plan only; no tool calls and no memory writes
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", content = "result", rename_all = "snake_case")]
pub enum RunOutcome {
    Planned(Plan),
    Completed(Summary),
}

pub struct ResearchSession {
    assembler: ContextAssembler,
    planner: Planner,
    executor: Executor,
    cancel: CancellationToken,
}

impl ResearchSession {
    pub fn new(
        config: &Config,
        memory: MemoryStore,
        gateway: Arc<ModelGateway>,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        let assembler = ContextAssembler::new(
            memory.clone(),
            config.planner.context_turns,
            config.planner.context_facts,
        );
        let planner = Planner::new(
            Arc::clone(&gateway),
            Arc::clone(&registry),
            PlannerSettings::from(&config.planner),
        );
        let executor = Executor::new(
            registry,
            gateway,
            memory,
            ExecutorSettings::from(&config.executor),
        );

        Self {
            assembler,
            planner,
            executor,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the current and future runs between steps
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Plan `query` against current memory
    pub async fn plan(&self, query: &str) -> Result<Plan, ResearchError> {
        let context = self.assembler.assemble(query).await?;
        Ok(self.planner.plan(query, &context).await)
    }

    pub async fn run(&self, query: &str, options: RunOptions) -> Result<RunOutcome, ResearchError> {
        let plan = self.plan(query).await?;
        info!(
            plan_id = %plan.id,
            origin = %plan.origin,
            steps = plan.steps.len(),
            dry_run = options.dry_run,
            "Plan ready"
        );

        if options.dry_run {
            return Ok(RunOutcome::Planned(plan));
        }

        let summary = self.executor.execute(&plan, &self.cancel).await?;
        Ok(RunOutcome::Completed(summary))
    }
}
