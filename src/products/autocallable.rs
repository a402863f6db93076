//! Memory-coupon autocallable notes (Athena / Phoenix).
//!
//! On every coupon date the observed level is compared with the barriers,
//! all expressed as fractions of the strike:
//!
//! - final date: coupon barrier hit pays principal plus the coupon (and any
//!   remembered coupons); otherwise the protection barrier returns principal;
//!   below it the note redeems through the [`RedemptionFormula`].
//! - earlier dates: the autocall barrier redeems early with the coupon, the
//!   coupon barrier pays the coupon, and a miss is remembered for later.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::market::curve::YieldCurve;
use crate::market::schedule::CouponSchedule;
use crate::products::valuation::{AnomalyPolicy, NoteStatus, NoteValuation, PathAccumulator};
use crate::simulation::path_simulator::ScenarioPath;

/// Recorded closing levels by date.
pub type PastFixings = BTreeMap<NaiveDate, f64>;

/// Fraction of notional repaid at maturity when the final level ends below
/// the protection barrier. Every formula receives the ratio `level / strike`.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RedemptionFormula {
    /// Redeem `level / strike`
    #[default]
    LinearRatio,
    /// Redeem `max(level / strike, floor)`
    Floored { floor: f64 },
    /// Arbitrary mapping from ratio to redemption fraction
    #[serde(skip)]
    Custom(Arc<dyn Fn(f64) -> f64 + Send + Sync>),
}

impl RedemptionFormula {
    pub fn custom(f: impl Fn(f64) -> f64 + Send + Sync + 'static) -> Self {
        RedemptionFormula::Custom(Arc::new(f))
    }

    pub fn redeem(&self, ratio: f64) -> f64 {
        match self {
            RedemptionFormula::LinearRatio => ratio,
            RedemptionFormula::Floored { floor } => ratio.max(*floor),
            RedemptionFormula::Custom(f) => f(ratio),
        }
    }
}

impl fmt::Debug for RedemptionFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedemptionFormula::LinearRatio => write!(f, "LinearRatio"),
            RedemptionFormula::Floored { floor } => {
                f.debug_struct("Floored").field("floor", floor).finish()
            }
            RedemptionFormula::Custom(_) => write!(f, "Custom(<fn>)"),
        }
    }
}

impl PartialEq for RedemptionFormula {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RedemptionFormula::LinearRatio, RedemptionFormula::LinearRatio) => true,
            (RedemptionFormula::Floored { floor: a }, RedemptionFormula::Floored { floor: b }) => {
                a == b
            }
            (RedemptionFormula::Custom(a), RedemptionFormula::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Terms of an autocallable note. Barriers are fractions of `strike`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSpec {
    pub strike: f64,
    pub autocall_barrier: f64,
    pub coupon_barrier: f64,
    pub protection_barrier: f64,
    /// Coupon per observation period, as a fraction of notional
    pub coupon_rate: f64,
    pub notional: f64,
    /// Missed coupons are paid on the next coupon hit
    #[serde(default = "default_has_memory")]
    pub has_memory: bool,
    #[serde(default)]
    pub final_redemption: RedemptionFormula,
}

fn default_has_memory() -> bool {
    true
}

impl ProductSpec {
    /// Athena: coupons are only paid alongside an autocall (coupon barrier =
    /// autocall barrier = 100%). 5% memory coupon, 60% protection, 1m notional.
    pub fn athena(strike: f64) -> Self {
        Self {
            strike,
            autocall_barrier: 1.0,
            coupon_barrier: 1.0,
            protection_barrier: 0.6,
            coupon_rate: 0.05,
            notional: 1_000_000.0,
            has_memory: true,
            final_redemption: RedemptionFormula::LinearRatio,
        }
    }

    /// Phoenix: coupons are paid from a 70% barrier, autocall at 100%.
    pub fn phoenix(strike: f64) -> Self {
        Self {
            coupon_barrier: 0.7,
            ..Self::athena(strike)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.strike.is_finite() || self.strike <= 0.0 {
            return Err(Error::product(format!("strike must be > 0, got {}", self.strike)));
        }
        if !self.notional.is_finite() || self.notional <= 0.0 {
            return Err(Error::product(format!("notional must be > 0, got {}", self.notional)));
        }
        if !self.coupon_rate.is_finite() || self.coupon_rate < 0.0 {
            return Err(Error::product(format!(
                "coupon rate must be >= 0, got {}",
                self.coupon_rate
            )));
        }
        if !self.autocall_barrier.is_finite() {
            return Err(Error::product("autocall barrier must be finite"));
        }
        if !(self.protection_barrier > 0.0 && self.protection_barrier <= self.coupon_barrier) {
            return Err(Error::product(format!(
                "barriers must satisfy 0 < protection ({}) <= coupon ({})",
                self.protection_barrier, self.coupon_barrier
            )));
        }
        if !self.coupon_barrier.is_finite() {
            return Err(Error::product("coupon barrier must be finite"));
        }
        Ok(())
    }

    /// Coupon paid on a hit, including remembered ones.
    fn coupon(&self, unpaid_coupons: u32) -> f64 {
        let memory = if self.has_memory { unpaid_coupons as f64 } else { 0.0 };
        self.coupon_rate * (1.0 + memory)
    }
}

/// A product together with its observation schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutocallableNote {
    pub spec: ProductSpec,
    pub schedule: CouponSchedule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathState {
    Accruing,
    AutoCalled,
    Expired,
}

/// Everything that is identical for all paths of one valuation: the
/// recorded levels for past coupon dates and the discount factor of each
/// future one.
#[derive(Debug, Clone)]
pub(crate) struct PreparedNote<'a> {
    note: &'a AutocallableNote,
    past_levels: Vec<f64>,
    /// `None` for dates on or before the valuation date
    discounts: Vec<Option<f64>>,
}

impl PreparedNote<'_> {
    /// Number of simulated levels a path must provide after its anchor.
    pub(crate) fn future_len(&self) -> usize {
        self.discounts.len() - self.past_levels.len()
    }

    /// Present value of one path; `future` holds the simulated levels for the
    /// coupon dates after the valuation date.
    pub(crate) fn path_value(&self, future: &[f64]) -> f64 {
        let spec = &self.note.spec;
        let last = self.discounts.len() - 1;
        let levels = self.past_levels.iter().chain(future.iter());

        let mut state = PathState::Accruing;
        let mut unpaid_coupons = 0u32;
        let mut pv = 0.0;

        for (i, (&level, discount)) in levels.zip(self.discounts.iter()).enumerate() {
            if state != PathState::Accruing {
                break;
            }
            let index = level / spec.strike;

            let payoff = if i == last {
                state = PathState::Expired;
                if index >= spec.coupon_barrier {
                    spec.notional * (1.0 + spec.coupon(unpaid_coupons))
                } else if index >= spec.protection_barrier {
                    spec.notional
                } else {
                    spec.notional * spec.final_redemption.redeem(index)
                }
            } else if index >= spec.autocall_barrier {
                state = PathState::AutoCalled;
                spec.notional * (1.0 + spec.coupon(unpaid_coupons))
            } else if index >= spec.coupon_barrier {
                let paid = spec.notional * spec.coupon(unpaid_coupons);
                unpaid_coupons = 0;
                paid
            } else {
                unpaid_coupons += 1;
                0.0
            };

            if let Some(df) = discount {
                pv += payoff * df;
            }
        }
        pv
    }
}

impl AutocallableNote {
    pub fn new(spec: ProductSpec, schedule: CouponSchedule) -> Result<Self> {
        spec.validate()?;
        Ok(Self { spec, schedule })
    }

    /// Whether the note is still live at `valuation_date`.
    pub fn status(&self, past_fixings: &PastFixings, valuation_date: NaiveDate) -> NoteStatus {
        if valuation_date >= self.schedule.final_date() {
            return NoteStatus::Matured;
        }
        if valuation_date >= self.schedule.first_date() {
            let max_fixing = past_fixings
                .range(..=valuation_date)
                .map(|(_, &level)| level)
                .fold(f64::NEG_INFINITY, f64::max);
            if max_fixing >= self.spec.autocall_barrier * self.spec.strike {
                return NoteStatus::AutoCalledInPast;
            }
        }
        NoteStatus::Live
    }

    /// Resolves past fixings and discount factors for `valuation_date`.
    pub(crate) fn prepare(
        &self,
        past_fixings: &PastFixings,
        valuation_date: NaiveDate,
        curve: &dyn YieldCurve,
    ) -> Result<PreparedNote<'_>> {
        let past_levels = self
            .schedule
            .past_dates(valuation_date)
            .iter()
            .map(|date| {
                past_fixings
                    .get(date)
                    .copied()
                    .ok_or(Error::MissingFixing { date: *date })
            })
            .collect::<Result<Vec<f64>>>()?;

        let discounts = self
            .schedule
            .dates()
            .iter()
            .map(|&date| (date > valuation_date).then(|| curve.discount(date)))
            .collect();

        Ok(PreparedNote {
            note: self,
            past_levels,
            discounts,
        })
    }

    /// Mean discounted payoff over `paths`.
    ///
    /// Each path must be aligned with `[valuation_date] + future coupon
    /// dates`; its anchor level is ignored. Paths with non-finite levels or
    /// payoffs are excluded and counted, subject to `policy`.
    pub fn price(
        &self,
        paths: &[ScenarioPath],
        past_fixings: &PastFixings,
        valuation_date: NaiveDate,
        curve: &dyn YieldCurve,
        policy: &AnomalyPolicy,
    ) -> Result<NoteValuation> {
        let status = self.status(past_fixings, valuation_date);
        if status != NoteStatus::Live {
            debug!(?status, %valuation_date, "note already settled");
            return Ok(NoteValuation::settled(status, self.spec.notional));
        }
        if paths.is_empty() {
            return Err(Error::InvalidPathCount { requested: 0 });
        }

        let prepared = self.prepare(past_fixings, valuation_date, curve)?;
        let expected = prepared.future_len() + 1;

        let mut acc = PathAccumulator::default();
        for (position, path) in paths.iter().enumerate() {
            if path.levels.len() != expected {
                return Err(Error::grid_at(
                    position,
                    format!(
                        "path {} has {} levels, schedule needs {}",
                        path.index,
                        path.levels.len(),
                        expected
                    ),
                ));
            }
            if path.anomaly.is_some() || path.levels.iter().any(|l| !l.is_finite()) {
                acc.exclude(path.index, "non-finite simulated level");
                continue;
            }
            let pv = prepared.path_value(&path.levels[1..]);
            if pv.is_finite() {
                acc.add(pv);
            } else {
                acc.exclude(path.index, "non-finite payoff");
            }
        }

        acc.finish(policy, self.spec.notional)
    }

    /// [`price`](Self::price) returning only the present value.
    pub fn price_value(
        &self,
        paths: &[ScenarioPath],
        past_fixings: &PastFixings,
        valuation_date: NaiveDate,
        curve: &dyn YieldCurve,
        policy: &AnomalyPolicy,
    ) -> Result<f64> {
        self.price(paths, past_fixings, valuation_date, curve, policy)
            .map(|v| v.present_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::curve::{DayCount, FlatForward};
    use approx::assert_relative_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn schedule() -> CouponSchedule {
        CouponSchedule::new(vec![
            date(2025, 1, 20),
            date(2025, 7, 20),
            date(2026, 1, 20),
            date(2026, 7, 20),
        ])
        .unwrap()
    }

    fn curve() -> FlatForward {
        FlatForward::new(date(2024, 7, 20), 0.02, DayCount::Actual360).unwrap()
    }

    fn path(levels: &[f64]) -> ScenarioPath {
        ScenarioPath {
            index: 0,
            levels: levels.to_vec(),
            anomaly: None,
        }
    }

    fn note(spec: ProductSpec) -> AutocallableNote {
        AutocallableNote::new(spec, schedule()).unwrap()
    }

    #[test]
    fn test_redemption_formulas_take_ratio() {
        assert_eq!(RedemptionFormula::LinearRatio.redeem(0.4), 0.4);
        assert_eq!(RedemptionFormula::Floored { floor: 0.5 }.redeem(0.4), 0.5);
        assert_eq!(RedemptionFormula::custom(|r| r * r).redeem(0.5), 0.25);
    }

    #[test]
    fn test_product_validation() {
        assert!(ProductSpec::athena(100.0).validate().is_ok());
        assert!(ProductSpec::phoenix(100.0).validate().is_ok());

        let inverted = ProductSpec {
            protection_barrier: 0.8,
            ..ProductSpec::phoenix(100.0)
        };
        assert!(matches!(inverted.validate(), Err(Error::InvalidProduct { .. })));
        let zero_strike = ProductSpec {
            strike: 0.0,
            ..ProductSpec::athena(100.0)
        };
        assert!(zero_strike.validate().is_err());
        let negative_coupon = ProductSpec {
            coupon_rate: -0.01,
            ..ProductSpec::athena(100.0)
        };
        assert!(negative_coupon.validate().is_err());
    }

    #[test]
    fn test_no_memory_ignores_missed_coupons() {
        let spec = ProductSpec {
            has_memory: false,
            ..ProductSpec::phoenix(100.0)
        };
        let note = note(spec);
        let c = curve();
        let valuation = date(2024, 7, 20);
        let p = note
            .price(
                &[path(&[100.0, 60.0, 60.0, 75.0, 65.0])],
                &PastFixings::new(),
                valuation,
                &c,
                &AnomalyPolicy::default(),
            )
            .unwrap();

        let n = 1_000_000.0;
        let expected = n * 0.05 * c.discount(date(2026, 1, 20)) + n * c.discount(date(2026, 7, 20));
        assert_relative_eq!(p.present_value, expected, max_relative = 1e-12);
    }

    #[test]
    fn test_memory_survives_past_fixings() {
        // Two missed coupons in the past, paid with the first future hit
        let note = note(ProductSpec::phoenix(100.0));
        let c = curve();
        let valuation = date(2025, 9, 1);
        let fixings = PastFixings::from([(date(2025, 1, 20), 50.0), (date(2025, 7, 20), 60.0)]);

        let pv = note
            .price_value(
                &[path(&[65.0, 80.0, 90.0])],
                &fixings,
                valuation,
                &c,
                &AnomalyPolicy::default(),
            )
            .unwrap();

        let n = 1_000_000.0;
        let expected = n * 0.05 * 3.0 * c.discount(date(2026, 1, 20))
            + n * (1.0 + 0.05) * c.discount(date(2026, 7, 20));
        assert_relative_eq!(pv, expected, max_relative = 1e-12);
    }

    #[test]
    fn test_missing_fixing_and_misaligned_path() {
        let note = note(ProductSpec::phoenix(100.0));
        let c = curve();
        let valuation = date(2025, 9, 1);
        let fixings = PastFixings::from([(date(2025, 1, 20), 50.0)]);

        let paths = [path(&[65.0, 80.0, 90.0])];
        assert_eq!(
            note.price(&paths, &fixings, valuation, &c, &AnomalyPolicy::default())
                .unwrap_err(),
            Error::MissingFixing {
                date: date(2025, 7, 20)
            }
        );

        let fixings = PastFixings::from([(date(2025, 1, 20), 50.0), (date(2025, 7, 20), 60.0)]);
        assert!(matches!(
            note.price(&[path(&[65.0, 80.0])], &fixings, valuation, &c, &AnomalyPolicy::default()),
            Err(Error::InvalidGrid { index: Some(0), .. })
        ));
    }

    #[test]
    fn test_fixings_after_valuation_do_not_trigger_autocall() {
        let note = note(ProductSpec::athena(100.0));
        let fixings = PastFixings::from([(date(2025, 1, 20), 90.0), (date(2025, 3, 1), 130.0)]);
        assert_eq!(note.status(&fixings, date(2025, 2, 1)), NoteStatus::Live);
        assert_eq!(note.status(&fixings, date(2025, 3, 1)), NoteStatus::AutoCalledInPast);
    }
}
