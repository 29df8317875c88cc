use usage_model::FixedPoint;

/// Cost of `energy` kWh at `rate` per kWh, computed on scaled integers.
///
/// Both operands are converted to [`FixedPoint`] before multiplying, so the
/// result is exact to four decimals. A missing or unrepresentable operand
/// yields `None` rather than zero.
pub fn cost(energy: Option<f64>, rate: Option<f64>) -> Option<FixedPoint> {
    let energy = FixedPoint::from_f64(energy?)?;
    cost_fixed(energy, rate)
}

/// Same as [`cost`] for energy that is already fixed point (e.g. whole Wh).
pub fn cost_fixed(energy: FixedPoint, rate: Option<f64>) -> Option<FixedPoint> {
    let rate = FixedPoint::from_f64(rate?)?;
    energy.checked_mul(rate)
}
