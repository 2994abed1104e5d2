//! Domain types for the cap table.
//!
//! This module provides:
//! - Lossless numeric handling via the Decimal wrapper
//! - Validated identifiers, percentages and currency codes
//! - Share classes with their economic rights
//! - Instruments, positions and exit scenarios
//! - The cap table aggregate root

pub mod cap_table;
pub mod decimal;
pub mod instruments;
pub mod position;
pub mod primitives;
pub mod scenario;
pub mod share_class;
pub mod validation;

pub use cap_table::{CapTable, CapTableError};
pub use decimal::Decimal;
pub use instruments::{
    ConversionBasis, ConversionQuote, ConvertibleNoteInstrument, Instrument, InterestType,
    PricedRoundInstrument, SafeInstrument, SafeType, WarrantInstrument,
};
pub use position::{Position, PositionKey};
pub use primitives::{CurrencyCode, EventId, HolderId, Percentage, RoundId, ShareClassId};
pub use scenario::{ExitScenario, ExitType, ReturnsConfig};
pub use share_class::{
    AntiDilution, ConversionRights, LiquidationPreference, Participation, ShareClass,
    ShareClassRegistry, ShareType,
};
pub use validation::{ensure_non_negative, ensure_positive, ValidationError};
