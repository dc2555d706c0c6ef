// Deployment steps
//
// Each step submits its transactions through `TransactionSubmitter` and
// reports what it deployed. Sequencing lives in the orchestrator.

pub mod approval;
pub mod splitter;
pub mod strategy;

pub use approval::ApprovalStep;
pub use splitter::{SplitterOutcome, SplitterStep};
pub use strategy::{plan, resolution_target, DeploymentPlan, ResolutionTarget, StrategyDeployment, StrategyStep};
