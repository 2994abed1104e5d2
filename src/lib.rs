pub mod api;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod events;
pub mod orchestration;
pub mod report;

pub use config::Config;
pub use domain::{
    CapTable, Decimal, ExitScenario, HolderId, Position, ReturnsConfig, ShareClass, ShareClassId,
    ShareClassRegistry,
};
pub use engine::{compute_returns, distribute, replay, CapTableSnapshot, WaterfallResult};
pub use error::AppError;
pub use events::{CapTableEvent, EventKind, EventLog};
