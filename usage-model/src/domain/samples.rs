use std::{fmt, str::FromStr};

use time::OffsetDateTime;

use super::money::MilliUnits;

/// Direction of energy flow through the grid connection.
///
/// Names both the cumulative register counters and the interval
/// consumption feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Flow {
    Import,
    Export,
}

impl Flow {
    pub const ALL: [Flow; 2] = [Flow::Import, Flow::Export];

    pub fn as_str(self) -> &'static str {
        match self {
            Flow::Import => "import",
            Flow::Export => "export",
        }
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown counter '{0}'")]
pub struct UnknownFlow(pub String);

impl FromStr for Flow {
    type Err = UnknownFlow;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "import" => Ok(Flow::Import),
            "export" => Ok(Flow::Export),
            _ => Err(UnknownFlow(s.to_string())),
        }
    }
}

/// Sub-metering epoch channel.
///
/// Wire names follow the device feed (`IMPORT`, `EXPORT`, `GAS_ENERGY`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[non_exhaustive]
pub enum Channel {
    Import,
    Export,
    GasEnergy,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Import, Channel::Export, Channel::GasEnergy];

    pub fn wire_name(self) -> &'static str {
        match self {
            Channel::Import => "IMPORT",
            Channel::Export => "EXPORT",
            Channel::GasEnergy => "GAS_ENERGY",
        }
    }

    /// The electricity flow whose tariff prices this channel, if any.
    pub fn priced_flow(self) -> Option<Flow> {
        match self {
            Channel::Import => Some(Flow::Import),
            Channel::Export => Some(Flow::Export),
            Channel::GasEnergy => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown epoch channel '{0}'")]
pub struct UnknownChannel(pub String);

impl FromStr for Channel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|c| c.wire_name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownChannel(s.to_string()))
    }
}

/// One reading of a monotonically non-decreasing energy counter.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCumulativeSample {
    pub at: OffsetDateTime,
    pub counter: Flow,
    pub value_kwh: f64,
}

/// A consumption total for one already-aligned interval.
#[derive(Debug, Clone, PartialEq)]
pub struct RawIntervalSample {
    pub interval_start: OffsetDateTime,
    pub consumption_kwh: f64,
}

/// Energy and cost measured on one channel over one sub-metering epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEpochReading {
    pub group_start: OffsetDateTime,
    pub duration_seconds: i64,
    pub channel: Channel,
    pub energy_wh: i64,
    pub cost: MilliUnits,
}

impl RawEpochReading {
    /// `group_start + duration`, or `None` if that is not a representable instant.
    pub fn epoch_end(&self) -> Option<OffsetDateTime> {
        self.group_start.checked_add(time::Duration::seconds(self.duration_seconds))
    }
}
