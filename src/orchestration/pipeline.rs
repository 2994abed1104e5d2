//! Named-artifact pipeline: stages declare what they read and write, and the
//! executor runs them in dependency order.

use crate::domain::{CapTable, ExitScenario, ReturnsConfig};
use crate::engine::replay::ReplayError;
use crate::engine::returns::{InvestmentLedger, ReturnsReport};
use crate::engine::snapshot::CapTableSnapshot;
use crate::engine::waterfall::{WaterfallError, WaterfallResult};
use crate::report::OwnershipReport;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArtifactKind {
    CapTable,
    AsOfDate,
    Snapshot,
    Scenario,
    ReturnsConfig,
    Ledger,
    Ownership,
    Waterfall,
    Returns,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::CapTable => "cap_table",
            ArtifactKind::AsOfDate => "as_of_date",
            ArtifactKind::Snapshot => "cap_table_snapshot",
            ArtifactKind::Scenario => "exit_scenario",
            ArtifactKind::ReturnsConfig => "returns_config",
            ArtifactKind::Ledger => "investment_ledger",
            ArtifactKind::Ownership => "cap_table_ownership",
            ArtifactKind::Waterfall => "waterfall_result",
            ArtifactKind::Returns => "returns_report",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value held in the pipeline context.
///
/// The snapshot and cap table are shared behind `Arc` so that scenario fan-out
/// never copies them.
#[derive(Debug, Clone)]
pub enum Artifact {
    CapTable(Arc<CapTable>),
    AsOfDate(NaiveDate),
    Snapshot(Arc<CapTableSnapshot>),
    Scenario(ExitScenario),
    ReturnsConfig(ReturnsConfig),
    Ledger(InvestmentLedger),
    Ownership(OwnershipReport),
    Waterfall(WaterfallResult),
    Returns(ReturnsReport),
}

impl Artifact {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Artifact::CapTable(_) => ArtifactKind::CapTable,
            Artifact::AsOfDate(_) => ArtifactKind::AsOfDate,
            Artifact::Snapshot(_) => ArtifactKind::Snapshot,
            Artifact::Scenario(_) => ArtifactKind::Scenario,
            Artifact::ReturnsConfig(_) => ArtifactKind::ReturnsConfig,
            Artifact::Ledger(_) => ArtifactKind::Ledger,
            Artifact::Ownership(_) => ArtifactKind::Ownership,
            Artifact::Waterfall(_) => ArtifactKind::Waterfall,
            Artifact::Returns(_) => ArtifactKind::Returns,
        }
    }
}

/// Failure inside a single stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("artifact {0} not found in context")]
    Missing(ArtifactKind),
    #[error(transparent)]
    Replay(#[from] ReplayError),
    #[error(transparent)]
    Waterfall(#[from] WaterfallError),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("multiple stages produce {artifact}: {first} and {second}")]
    DuplicateProducer {
        artifact: ArtifactKind,
        first: String,
        second: String,
    },
    #[error("circular dependency detected among stages: {}", .stages.join(", "))]
    CircularDependency { stages: Vec<String> },
    #[error("stage {stage} requires input {artifact} but it is not in context")]
    MissingInput {
        stage: String,
        artifact: ArtifactKind,
    },
    #[error("stage {stage} declared output {artifact} but did not write it")]
    MissingOutput {
        stage: String,
        artifact: ArtifactKind,
    },
    #[error("stage {stage} failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: StageError,
    },
}

#[derive(Debug, Clone, Default)]
pub struct PipelineContext {
    artifacts: BTreeMap<ArtifactKind, Artifact>,
}

macro_rules! artifact_accessor {
    ($($getter:ident => $variant:ident: $ty:ty),* $(,)?) => {
        impl PipelineContext {
            $(
                pub fn $getter(&self) -> Result<&$ty, StageError> {
                    match self.artifacts.get(&ArtifactKind::$variant) {
                        Some(Artifact::$variant(value)) => Ok(value),
                        _ => Err(StageError::Missing(ArtifactKind::$variant)),
                    }
                }
            )*
        }
    };
}

artifact_accessor! {
    cap_table => CapTable: Arc<CapTable>,
    as_of_date => AsOfDate: NaiveDate,
    snapshot => Snapshot: Arc<CapTableSnapshot>,
    scenario => Scenario: ExitScenario,
    returns_config => ReturnsConfig: ReturnsConfig,
    ledger => Ledger: InvestmentLedger,
    ownership => Ownership: OwnershipReport,
    waterfall => Waterfall: WaterfallResult,
    returns => Returns: ReturnsReport,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an artifact under its kind, returning the value it replaced.
    pub fn insert(&mut self, artifact: Artifact) -> Option<Artifact> {
        self.artifacts.insert(artifact.kind(), artifact)
    }

    pub fn with(mut self, artifact: Artifact) -> Self {
        self.insert(artifact);
        self
    }

    pub fn contains(&self, kind: ArtifactKind) -> bool {
        self.artifacts.contains_key(&kind)
    }

    pub fn get(&self, kind: ArtifactKind) -> Option<&Artifact> {
        self.artifacts.get(&kind)
    }

    pub fn remove(&mut self, kind: ArtifactKind) -> Option<Artifact> {
        self.artifacts.remove(&kind)
    }

    pub fn kinds(&self) -> Vec<ArtifactKind> {
        self.artifacts.keys().copied().collect()
    }
}

/// A unit of computation with declared inputs and outputs.
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;
    fn inputs(&self) -> Vec<ArtifactKind>;
    fn outputs(&self) -> Vec<ArtifactKind>;
    fn execute(&self, ctx: &mut PipelineContext) -> Result<(), StageError>;
}

/// Stages sorted once at construction; `run` can be called repeatedly.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Result<Self, PipelineError> {
        let stages = topological_sort(stages)?;
        Ok(Self { stages })
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn run(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        for stage in &self.stages {
            for artifact in stage.inputs() {
                if !ctx.contains(artifact) {
                    return Err(PipelineError::MissingInput {
                        stage: stage.name().to_string(),
                        artifact,
                    });
                }
            }

            tracing::debug!(stage = stage.name(), "Executing stage");
            stage.execute(ctx).map_err(|source| PipelineError::Stage {
                stage: stage.name().to_string(),
                source,
            })?;

            for artifact in stage.outputs() {
                if !ctx.contains(artifact) {
                    return Err(PipelineError::MissingOutput {
                        stage: stage.name().to_string(),
                        artifact,
                    });
                }
            }
        }

        tracing::debug!(stages = self.stages.len(), "Pipeline complete");
        Ok(())
    }
}

/// Kahn's algorithm over producer -> consumer edges. Inputs nobody produces
/// are expected in the initial context. Ties keep the caller's order.
fn topological_sort(stages: Vec<Box<dyn Stage>>) -> Result<Vec<Box<dyn Stage>>, PipelineError> {
    let mut producers: HashMap<ArtifactKind, usize> = HashMap::new();
    for (idx, stage) in stages.iter().enumerate() {
        for artifact in stage.outputs() {
            if let Some(&first) = producers.get(&artifact) {
                return Err(PipelineError::DuplicateProducer {
                    artifact,
                    first: stages[first].name().to_string(),
                    second: stage.name().to_string(),
                });
            }
            producers.insert(artifact, idx);
        }
    }

    let mut in_degree = vec![0usize; stages.len()];
    let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); stages.len()];
    for (idx, stage) in stages.iter().enumerate() {
        for artifact in stage.inputs() {
            if let Some(&producer) = producers.get(&artifact) {
                consumers[producer].push(idx);
                in_degree[idx] += 1;
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..stages.len())
        .filter(|&idx| in_degree[idx] == 0)
        .collect();
    let mut order = Vec::with_capacity(stages.len());
    while let Some(current) = queue.pop_front() {
        order.push(current);
        for &next in &consumers[current] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    if order.len() != stages.len() {
        let stuck = (0..stages.len())
            .filter(|&idx| in_degree[idx] > 0)
            .map(|idx| stages[idx].name().to_string())
            .collect();
        return Err(PipelineError::CircularDependency { stages: stuck });
    }

    let mut slots: Vec<Option<Box<dyn Stage>>> = stages.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|idx| slots[idx].take())
        .collect())
}
