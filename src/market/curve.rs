use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Day-count conventions supported by the built-in curves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayCount {
    #[default]
    Actual360,
    Actual365Fixed,
}

impl DayCount {
    /// Year fraction between two dates. Negative when `to` precedes `from`.
    pub fn year_fraction(self, from: NaiveDate, to: NaiveDate) -> f64 {
        let days = (to - from).num_days() as f64;
        match self {
            DayCount::Actual360 => days / 360.0,
            DayCount::Actual365Fixed => days / 365.0,
        }
    }
}

/// Discount-curve interface consumed by the calibrator, the simulator and the
/// payoff evaluator.
///
/// Implementations must return factors in `(0, 1]` for dates on or after the
/// reference date, non-increasing in date.
pub trait YieldCurve: Send + Sync {
    fn reference_date(&self) -> NaiveDate;

    fn day_count(&self) -> DayCount;

    /// Discount factor from the reference date to `date`.
    fn discount(&self, date: NaiveDate) -> f64;

    /// Year fraction from the reference date to `date`.
    fn year_fraction(&self, date: NaiveDate) -> f64 {
        self.day_count().year_fraction(self.reference_date(), date)
    }

    /// Continuously compounded forward rate between two dates, measured with
    /// this curve's day count.
    fn forward_rate(&self, from: NaiveDate, to: NaiveDate) -> f64 {
        let tau = self.day_count().year_fraction(from, to);
        if tau <= 0.0 {
            return 0.0;
        }
        (self.discount(from) / self.discount(to)).ln() / tau
    }
}

/// Flat continuously compounded curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlatForward {
    pub reference_date: NaiveDate,
    pub rate: f64,
    #[serde(default)]
    pub day_count: DayCount,
}

impl FlatForward {
    pub fn new(reference_date: NaiveDate, rate: f64, day_count: DayCount) -> Result<Self> {
        if !rate.is_finite() {
            return Err(Error::market(format!("flat forward rate must be finite, got {rate}")));
        }
        Ok(Self {
            reference_date,
            rate,
            day_count,
        })
    }
}

impl YieldCurve for FlatForward {
    fn reference_date(&self) -> NaiveDate {
        self.reference_date
    }

    fn day_count(&self) -> DayCount {
        self.day_count
    }

    fn discount(&self, date: NaiveDate) -> f64 {
        // Dates before the reference date are already settled.
        let t = self.year_fraction(date).max(0.0);
        (-self.rate * t).exp()
    }
}
