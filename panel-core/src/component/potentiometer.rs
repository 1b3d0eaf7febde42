//! Potentiometer scaling and smoothing.

use serde::{Deserialize, Serialize};

use crate::error::{PanelError, Result};

/// EMA weight of the newest sample.
pub const SMOOTHING_ALPHA: f64 = 0.1;

/// Resolution of the raw reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// 10-bit ADC counts, `0..=1023`.
    #[default]
    TenBit,
    /// Already normalized, `0.0..=1.0`.
    Normalized,
}

impl Granularity {
    /// Raw reading at full deflection.
    pub const fn full_scale(self) -> f64 {
        match self {
            Self::TenBit => 1023.0,
            Self::Normalized => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PotentiometerState {
    raw: f64,
    filtered: Option<f64>,
    smoothing: bool,
    granularity: Granularity,
}

impl PotentiometerState {
    pub fn new(granularity: Granularity, smoothing: bool) -> Self {
        Self {
            raw: 0.0,
            filtered: None,
            smoothing,
            granularity,
        }
    }

    /// Record a raw reading and advance the filter. The first reading
    /// seeds the filter.
    pub fn update(&mut self, raw: f64) {
        self.raw = raw;
        self.filtered = Some(match self.filtered {
            Some(prev) => SMOOTHING_ALPHA * raw + (1.0 - SMOOTHING_ALPHA) * prev,
            None => raw,
        });
    }

    pub fn set_smoothing(&mut self, smoothing: bool) {
        self.smoothing = smoothing;
    }

    pub fn raw(&self) -> f64 {
        self.raw
    }

    pub fn filtered(&self) -> f64 {
        self.filtered.unwrap_or(self.raw)
    }

    /// Reading used for scaling: filtered when smoothing is on.
    pub fn level(&self) -> f64 {
        if self.smoothing {
            self.filtered()
        } else {
            self.raw
        }
    }

    /// Position as a fraction of full scale, clamped to `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        (self.level() / self.granularity.full_scale()).clamp(0.0, 1.0)
    }

    /// Reading mapped linearly into `[min, max]`, rounded to 3 decimals.
    pub fn value(&self, min: f64, max: f64) -> Result<f64> {
        check_range(min, max)?;
        Ok(self.scaled(min, max))
    }

    /// Reading mapped into `[min, max]` and rounded to the nearest
    /// integer, ties to even.
    pub fn value_int(&self, min: f64, max: f64) -> Result<i64> {
        check_range(min, max)?;
        Ok(self.linear(min, max).round_ties_even() as i64)
    }

    /// [`value`](Self::value) for a range the caller has already checked.
    pub(crate) fn scaled(&self, min: f64, max: f64) -> f64 {
        round3(self.linear(min, max))
    }

    pub(crate) fn linear(&self, min: f64, max: f64) -> f64 {
        min + self.fraction() * (max - min)
    }
}

/// `max` must exceed `min` strictly; NaN bounds are rejected.
pub fn check_range(min: f64, max: f64) -> Result<()> {
    if max > min {
        Ok(())
    } else {
        Err(PanelError::InvalidRange { min, max })
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pot(raw: f64) -> PotentiometerState {
        let mut pot = PotentiometerState::new(Granularity::TenBit, false);
        pot.update(raw);
        pot
    }

    #[test]
    fn test_scaling_endpoints() {
        assert_eq!(pot(0.0).value(10.0, 20.0).unwrap(), 10.0);
        assert_eq!(pot(1023.0).value(10.0, 20.0).unwrap(), 20.0);
        assert_eq!(pot(511.5).value(-1.0, 1.0).unwrap(), 0.0);
    }

    #[test]
    fn test_rounds_to_three_decimals() {
        let value = pot(100.0).value(0.0, 1.0).unwrap();
        assert_eq!(value, 0.098);
    }

    #[test]
    fn test_invalid_range() {
        assert!(matches!(
            pot(10.0).value(5.0, 5.0),
            Err(PanelError::InvalidRange { .. })
        ));
        assert!(pot(10.0).value(6.0, 5.0).is_err());
        assert!(pot(10.0).value(f64::NAN, 5.0).is_err());
        assert!(pot(10.0).value_int(1.0, 1.0).is_err());
    }

    #[test]
    fn test_value_int_inclusive() {
        assert_eq!(pot(0.0).value_int(0.0, 4.0).unwrap(), 0);
        assert_eq!(pot(1023.0).value_int(0.0, 4.0).unwrap(), 4);
        assert_eq!(pot(600.0).value_int(0.0, 4.0).unwrap(), 2);
    }

    #[test]
    fn test_value_int_rounds_unrounded_reading() {
        // 2.4996 shows as 2.5 but is still closer to 2
        let pot = pot(639.27);
        assert_eq!(pot.value(0.0, 4.0).unwrap(), 2.5);
        assert_eq!(pot.value_int(0.0, 4.0).unwrap(), 2);
    }

    #[test]
    fn test_value_int_ties_to_even() {
        assert_eq!(pot(511.5).value_int(0.0, 1.0).unwrap(), 0);
        assert_eq!(pot(511.5).value_int(0.0, 3.0).unwrap(), 2);
        assert_eq!(pot(511.5).value_int(-5.0, 0.0).unwrap(), -2);
    }

    #[test]
    fn test_out_of_scale_readings_clamp() {
        assert_eq!(pot(2000.0).value(0.0, 1.0).unwrap(), 1.0);
        assert_eq!(pot(-5.0).value(0.0, 1.0).unwrap(), 0.0);
    }

    #[test]
    fn test_normalized_granularity() {
        let mut pot = PotentiometerState::new(Granularity::Normalized, false);
        pot.update(0.25);
        assert_eq!(pot.value(0.0, 100.0).unwrap(), 25.0);
    }

    #[test]
    fn test_ema_smoothing() {
        let mut pot = PotentiometerState::new(Granularity::TenBit, true);
        pot.update(1000.0);
        assert_eq!(pot.filtered(), 1000.0);
        pot.update(0.0);
        assert!((pot.filtered() - 900.0).abs() < 1e-9);
        pot.update(0.0);
        assert!((pot.filtered() - 810.0).abs() < 1e-9);
        assert_eq!(pot.raw(), 0.0);
        assert!((pot.level() - 810.0).abs() < 1e-9);

        pot.set_smoothing(false);
        assert_eq!(pot.level(), 0.0);
    }
}
