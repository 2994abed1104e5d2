//! Stage scheduling and scenario fan-out around the pure engines.

pub mod pipeline;
pub mod scenarios;
pub mod stages;

pub use pipeline::{
    Artifact, ArtifactKind, Pipeline, PipelineContext, PipelineError, Stage, StageError,
};
pub use scenarios::{run_scenarios, ScenarioError, ScenarioRun};
pub use stages::{
    standard_pipeline, LedgerStage, OwnershipStage, ReturnsStage, SnapshotStage, WaterfallStage,
};
