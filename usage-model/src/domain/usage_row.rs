use std::collections::BTreeMap;

use time::OffsetDateTime;

use super::{
    money::{FixedPoint, MilliUnits},
    samples::{Channel, Flow},
};

/// One half-hour bucket of reconciled usage.
///
/// Each source owns its own map; a missing key means the source had nothing
/// for this bucket, which is not the same as zero consumption. `pricing` is
/// written once, after every energy source has reported.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageRow {
    pub ts: OffsetDateTime,
    pub registers: BTreeMap<Flow, RegisterReading>,
    pub intervals: BTreeMap<Flow, f64>,
    pub epochs: BTreeMap<Channel, EpochTotals>,
    pub pricing: Option<RowPricing>,
}

impl UsageRow {
    pub fn new(ts: OffsetDateTime) -> Self {
        Self {
            ts,
            registers: BTreeMap::new(),
            intervals: BTreeMap::new(),
            epochs: BTreeMap::new(),
            pricing: None,
        }
    }

    pub fn register(&self, flow: Flow) -> Option<&RegisterReading> {
        self.registers.get(&flow)
    }

    pub fn register_delta_kwh(&self, flow: Flow) -> Option<f64> {
        self.registers.get(&flow).and_then(|r| r.delta_kwh)
    }

    pub fn interval_kwh(&self, flow: Flow) -> Option<f64> {
        self.intervals.get(&flow).copied()
    }

    pub fn epoch(&self, channel: Channel) -> Option<&EpochTotals> {
        self.epochs.get(&channel)
    }

    pub fn rate(&self, flow: Flow) -> Option<f64> {
        let pricing = self.pricing.as_ref()?;
        match flow {
            Flow::Import => pricing.import_rate,
            Flow::Export => pricing.export_rate,
        }
    }
}

/// Cumulative counter state for a bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterReading {
    /// Highest counter value seen in the bucket, or the last known value when carried forward.
    pub cumulative_kwh: f64,
    /// Energy since the nearest earlier bucket that had a reading.
    pub delta_kwh: Option<f64>,
    pub carried_forward: bool,
}

/// Energy and metered cost summed over the epochs that ended inside a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EpochTotals {
    pub energy_wh: i64,
    pub cost: MilliUnits,
}

impl EpochTotals {
    /// Energy in kWh; exact because 1 Wh is 10 fixed point units.
    ///
    /// `None` when the total does not fit a [`FixedPoint`].
    pub fn energy_kwh(&self) -> Option<FixedPoint> {
        self.energy_wh.checked_mul(10).map(FixedPoint::from_raw)
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        Some(Self {
            energy_wh: self.energy_wh.checked_add(rhs.energy_wh)?,
            cost: self.cost.checked_add(rhs.cost)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowPricing {
    pub import_rate: Option<f64>,
    pub export_rate: Option<f64>,
    pub costs: RowCosts,
}

/// Costs in display currency units. `None` when either the energy or the rate is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RowCosts {
    pub register_import: Option<FixedPoint>,
    pub register_export: Option<FixedPoint>,
    pub interval_import: Option<FixedPoint>,
    pub interval_export: Option<FixedPoint>,
    pub epoch_import: Option<FixedPoint>,
    pub epoch_export: Option<FixedPoint>,
}
