//! Conductor System
//!
//! Orchestrates planning, memory retrieval, and step execution for research
//! queries.

pub mod context;
pub mod executor;
pub mod planner;
pub mod session;
pub mod types;

pub use context::{ContextAssembler, PlanningContext};
pub use executor::{Executor, ExecutorSettings};
pub use planner::{Planner, PlannerSettings};
pub use session::{ResearchSession, RunOptions, RunOutcome};
pub use types::{
    Citation, ManifestEntry, Plan, PlanOrigin, PlanRun, Step, StepRecord, StepResult, StepStatus,
    Summary,
};
