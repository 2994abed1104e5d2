//! Pure computation engines: replay, waterfall, returns.

pub mod irr;
pub mod replay;
pub mod returns;
pub mod snapshot;
pub mod waterfall;

pub use irr::{xirr, DatedCashFlow, IrrError};
pub use replay::{apply_event, replay, ReplayError};
pub use returns::{
    compute_returns, ClassReturn, HolderReturn, Investment, InvestmentLedger, ReturnsReport,
    ReturnsSummary,
};
pub use snapshot::{CapTableSnapshot, SnapshotBuilder, SnapshotError};
pub use waterfall::{
    distribute, split_pro_rata, ClassDistribution, HolderDistribution, PreferenceChoice,
    WaterfallError, WaterfallResult, WaterfallStep,
};
