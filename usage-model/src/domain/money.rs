use std::{
    fmt,
    iter::Sum,
    ops::{Add, AddAssign},
};

/// Number of decimal places carried by [`FixedPoint`].
pub const FIXED_POINT_DECIMALS: u32 = 4;

/// Scaling factor shared by every [`FixedPoint`] value in a run.
pub const FIXED_POINT_SCALE: i64 = 10_i64.pow(FIXED_POINT_DECIMALS);

const MILLI_DECIMALS: usize = 3;

const MILLI_TO_FIXED: i64 = FIXED_POINT_SCALE / 1_000;

/// A decimal quantity stored as an integer number of `1 / FIXED_POINT_SCALE` units.
///
/// Used for energy (kWh), unit rates and currency amounts so that sums never
/// accumulate floating point drift. `Display` honors the formatter precision
/// (`{:.2}`) and rounds half away from zero; without a precision all four
/// stored decimals are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FixedPoint(i64);

impl FixedPoint {
    pub const ZERO: Self = Self(0);

    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Scales a float into fixed point, rounding to the nearest unit.
    ///
    /// Returns `None` for non-finite input or values outside the `i64` range.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let scaled = (value * FIXED_POINT_SCALE as f64).round();
        if scaled < i64::MIN as f64 || scaled >= i64::MAX as f64 {
            return None;
        }
        Some(Self(scaled as i64))
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / FIXED_POINT_SCALE as f64
    }

    /// Multiplies two fixed point values, truncating the extra decimals toward zero.
    pub fn checked_mul(self, rhs: Self) -> Option<Self> {
        let product = i128::from(self.0) * i128::from(rhs.0) / i128::from(FIXED_POINT_SCALE);
        i64::try_from(product).ok().map(Self)
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }
}

/// Overflow follows plain `i64` addition; sum untrusted input with
/// [`FixedPoint::checked_add`].
impl Add for FixedPoint {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for FixedPoint {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sum for FixedPoint {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_scaled(f, self.0, FIXED_POINT_DECIMALS as usize)
    }
}

/// Writes `value / 10^decimals`, honoring the formatter precision (four
/// decimals by default) and rounding half away from zero.
fn write_scaled(f: &mut fmt::Formatter<'_>, value: i64, decimals: usize) -> fmt::Result {
    let precision = f.precision().unwrap_or(FIXED_POINT_DECIMALS as usize).min(18);
    let magnitude = u128::from(value.unsigned_abs());

    let scaled = if precision >= decimals {
        magnitude * 10_u128.pow((precision - decimals) as u32)
    } else {
        let divisor = 10_u128.pow((decimals - precision) as u32);
        (magnitude + divisor / 2) / divisor
    };

    let unit = 10_u128.pow(precision as u32);
    let whole = scaled / unit;
    let frac = scaled % unit;
    let sign = if value < 0 && scaled != 0 { "-" } else { "" };

    if precision == 0 {
        write!(f, "{sign}{whole}")
    } else {
        write!(f, "{sign}{whole}.{frac:0precision$}")
    }
}

/// Integer thousandths of the display currency unit (e.g. milli-pence).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MilliUnits(pub i64);

impl MilliUnits {
    pub const ZERO: Self = Self(0);

    /// Exact conversion into display units, `None` if it leaves the `i64` range.
    pub fn to_fixed_point(self) -> Option<FixedPoint> {
        self.0.checked_mul(MILLI_TO_FIXED).map(FixedPoint::from_raw)
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }
}

/// Overflow follows plain `i64` addition; sum untrusted input with
/// [`MilliUnits::checked_add`].
impl Add for MilliUnits {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for MilliUnits {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl fmt::Display for MilliUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_scaled(f, self.0, MILLI_DECIMALS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_f64_rounds_to_nearest_unit() {
        assert_eq!(FixedPoint::from_f64(10.5), Some(FixedPoint::from_raw(105_000)));
        assert_eq!(FixedPoint::from_f64(1.15), Some(FixedPoint::from_raw(11_500)));
        assert_eq!(FixedPoint::from_f64(-0.00004), Some(FixedPoint::from_raw(0)));
        assert_eq!(FixedPoint::from_f64(f64::NAN), None);
        assert_eq!(FixedPoint::from_f64(f64::INFINITY), None);
        assert_eq!(FixedPoint::from_f64(1e30), None);
    }

    #[test]
    fn checked_mul_truncates_extra_decimals() {
        let energy = FixedPoint::from_raw(3); // 0.0003
        let rate = FixedPoint::from_raw(5_000); // 0.5
        assert_eq!(energy.checked_mul(rate), Some(FixedPoint::from_raw(1)));

        let negative = FixedPoint::from_raw(-3);
        assert_eq!(negative.checked_mul(rate), Some(FixedPoint::from_raw(-1)));
    }

    #[test]
    fn checked_mul_reports_overflow() {
        let big = FixedPoint::from_raw(i64::MAX);
        assert_eq!(big.checked_mul(big), None);
    }

    #[test]
    fn display_honors_precision_and_rounds_half_away_from_zero() {
        let v = FixedPoint::from_raw(105_050); // 10.505
        assert_eq!(v.to_string(), "10.5050");
        assert_eq!(format!("{v:.2}"), "10.51");
        assert_eq!(format!("{v:.0}"), "11");
        assert_eq!(format!("{v:.6}"), "10.505000");

        let n = FixedPoint::from_raw(-105_050);
        assert_eq!(format!("{n:.2}"), "-10.51");

        let tiny = FixedPoint::from_raw(-4);
        assert_eq!(format!("{tiny:.2}"), "0.00");
    }

    #[test]
    fn milli_units_convert_exactly() {
        let cost = MilliUnits(34_559);
        assert_eq!(cost.to_fixed_point(), Some(FixedPoint::from_raw(345_590)));
        assert_eq!(format!("{cost:.2}"), "34.56");
        assert_eq!((cost + MilliUnits(36_228)).0, 70_787);
    }

    #[test]
    fn milli_units_overflow_is_reported_not_clamped() {
        let big = MilliUnits(i64::MAX / 2 + 1);
        assert_eq!(big.checked_add(big), None);
        assert_eq!(big.to_fixed_point(), None);
        assert_eq!(MilliUnits(1).checked_add(MilliUnits(2)), Some(MilliUnits(3)));
        assert_eq!(format!("{:.2}", MilliUnits(i64::MAX)), "9223372036854775.81");
    }

    #[test]
    fn sum_of_fixed_points_is_exact() {
        let total: FixedPoint = std::iter::repeat(FixedPoint::from_raw(1)).take(10_000).sum();
        assert_eq!(total, FixedPoint::from_raw(10_000));
        assert_eq!(format!("{total:.2}"), "1.00");
    }
}
