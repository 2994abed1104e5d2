//! Standard stages: snapshot, ownership, ledger, waterfall, returns.

use super::pipeline::{
    Artifact, ArtifactKind, Pipeline, PipelineContext, PipelineError, Stage, StageError,
};
use crate::engine::returns::{compute_returns, InvestmentLedger};
use crate::engine::waterfall::distribute;
use crate::report::ownership_report;
use std::sync::Arc;

/// Replays the cap table up to the as-of date.
#[derive(Debug, Default, Clone, Copy)]
pub struct SnapshotStage;

impl Stage for SnapshotStage {
    fn name(&self) -> &str {
        "snapshot"
    }

    fn inputs(&self) -> Vec<ArtifactKind> {
        vec![ArtifactKind::CapTable, ArtifactKind::AsOfDate]
    }

    fn outputs(&self) -> Vec<ArtifactKind> {
        vec![ArtifactKind::Snapshot]
    }

    fn execute(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        let snapshot = ctx.cap_table()?.snapshot(*ctx.as_of_date()?)?;
        ctx.insert(Artifact::Snapshot(Arc::new(snapshot)));
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OwnershipStage;

impl Stage for OwnershipStage {
    fn name(&self) -> &str {
        "ownership"
    }

    fn inputs(&self) -> Vec<ArtifactKind> {
        vec![ArtifactKind::Snapshot]
    }

    fn outputs(&self) -> Vec<ArtifactKind> {
        vec![ArtifactKind::Ownership]
    }

    fn execute(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        let report = ownership_report(ctx.snapshot()?);
        ctx.insert(Artifact::Ownership(report));
        Ok(())
    }
}

/// Derives invested amounts from snapshot cost bases.
///
/// Leave this stage out and seed the context with a ledger to use
/// externally sourced amounts instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct LedgerStage;

impl Stage for LedgerStage {
    fn name(&self) -> &str {
        "ledger"
    }

    fn inputs(&self) -> Vec<ArtifactKind> {
        vec![ArtifactKind::Snapshot]
    }

    fn outputs(&self) -> Vec<ArtifactKind> {
        vec![ArtifactKind::Ledger]
    }

    fn execute(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        let ledger = InvestmentLedger::from_snapshot(ctx.snapshot()?);
        ctx.insert(Artifact::Ledger(ledger));
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WaterfallStage;

impl Stage for WaterfallStage {
    fn name(&self) -> &str {
        "waterfall"
    }

    fn inputs(&self) -> Vec<ArtifactKind> {
        vec![ArtifactKind::Snapshot, ArtifactKind::Scenario]
    }

    fn outputs(&self) -> Vec<ArtifactKind> {
        vec![ArtifactKind::Waterfall]
    }

    fn execute(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        let result = distribute(ctx.snapshot()?, ctx.scenario()?)?;
        ctx.insert(Artifact::Waterfall(result));
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ReturnsStage;

impl Stage for ReturnsStage {
    fn name(&self) -> &str {
        "returns"
    }

    fn inputs(&self) -> Vec<ArtifactKind> {
        vec![
            ArtifactKind::Waterfall,
            ArtifactKind::Scenario,
            ArtifactKind::Ledger,
            ArtifactKind::ReturnsConfig,
        ]
    }

    fn outputs(&self) -> Vec<ArtifactKind> {
        vec![ArtifactKind::Returns]
    }

    fn execute(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        let report = compute_returns(
            ctx.waterfall()?,
            ctx.scenario()?,
            ctx.ledger()?,
            ctx.returns_config()?,
        );
        ctx.insert(Artifact::Returns(report));
        Ok(())
    }
}

/// Snapshot, ownership, ledger, waterfall and returns in one pipeline.
///
/// Expects `CapTable`, `AsOfDate`, `Scenario` and `ReturnsConfig` in the
/// initial context.
pub fn standard_pipeline() -> Result<Pipeline, PipelineError> {
    Pipeline::new(vec![
        Box::new(SnapshotStage),
        Box::new(OwnershipStage),
        Box::new(LedgerStage),
        Box::new(WaterfallStage),
        Box::new(ReturnsStage),
    ])
}
