//! Li-ion battery charge estimate from terminal voltage.

/// Fully charged terminal voltage.
pub const FULL_VOLTS: f32 = 4.20;
/// Cut-off voltage treated as empty.
pub const EMPTY_VOLTS: f32 = 3.50;

/// Charge in percent from a quartic fit of the cell's discharge curve,
/// clamped to 100 at or above [`FULL_VOLTS`] and 0 at or below
/// [`EMPTY_VOLTS`].
pub fn percentage(volts: f32) -> u8 {
    if volts >= FULL_VOLTS {
        return 100;
    }
    if volts <= EMPTY_VOLTS {
        return 0;
    }
    let v = f64::from(volts);
    let pct = 2836.9625 * v.powi(4) - 43987.4889 * v.powi(3) + 255_233.8134 * v.powi(2)
        - 656_689.7123 * v
        + 632_041.7303;
    pct.clamp(0.0, 100.0) as u8
}
