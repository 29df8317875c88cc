pub mod money;
pub mod samples;
pub mod tariff;
pub mod usage_row;

pub use money::{FixedPoint, MilliUnits, FIXED_POINT_DECIMALS, FIXED_POINT_SCALE};
pub use samples::{
    Channel, Flow, RawCumulativeSample, RawEpochReading, RawIntervalSample, UnknownChannel, UnknownFlow,
};
pub use tariff::TariffInterval;
pub use usage_row::{EpochTotals, RegisterReading, RowCosts, RowPricing, UsageRow};
