use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Ordered coupon observation dates. The last date is the final redemption date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<NaiveDate>", into = "Vec<NaiveDate>")]
pub struct CouponSchedule {
    dates: Vec<NaiveDate>,
}

impl CouponSchedule {
    /// Build a schedule from explicit dates, which must be strictly increasing.
    pub fn new(dates: Vec<NaiveDate>) -> Result<Self> {
        if dates.is_empty() {
            return Err(Error::product("coupon schedule must contain at least one date"));
        }
        for (i, pair) in dates.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(Error::product(format!(
                    "coupon dates must be strictly increasing: {} at position {} does not follow {}",
                    pair[1],
                    i + 1,
                    pair[0]
                )));
            }
        }
        Ok(Self { dates })
    }

    /// Unadjusted periodic schedule generated forward from `first` every
    /// `months` months, closing exactly on `last`.
    ///
    /// Dates are anchored on `first` (first + k·months) so month-end rolls do
    /// not drift. Business-day adjustment is left to the caller.
    pub fn periodic(first: NaiveDate, last: NaiveDate, months: u32) -> Result<Self> {
        if months == 0 {
            return Err(Error::product("coupon period must be at least one month"));
        }
        if last < first {
            return Err(Error::product(format!(
                "last coupon date {last} precedes first coupon date {first}"
            )));
        }

        let mut dates = Vec::new();
        let mut k = 0u32;
        loop {
            let date = first
                .checked_add_months(Months::new(k * months))
                .ok_or_else(|| Error::product("coupon date out of calendar range"))?;
            if date >= last {
                break;
            }
            dates.push(date);
            k += 1;
        }
        dates.push(last);
        Self::new(dates)
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn first_date(&self) -> NaiveDate {
        self.dates[0]
    }

    pub fn final_date(&self) -> NaiveDate {
        self.dates[self.dates.len() - 1]
    }

    /// Number of observation dates on or before `valuation_date`.
    pub fn observed_count(&self, valuation_date: NaiveDate) -> usize {
        self.dates.partition_point(|d| *d <= valuation_date)
    }

    /// Observation dates on or before `valuation_date`.
    pub fn past_dates(&self, valuation_date: NaiveDate) -> &[NaiveDate] {
        &self.dates[..self.observed_count(valuation_date)]
    }

    /// Observation dates strictly after `valuation_date`.
    pub fn future_dates(&self, valuation_date: NaiveDate) -> &[NaiveDate] {
        &self.dates[self.observed_count(valuation_date)..]
    }
}

impl TryFrom<Vec<NaiveDate>> for CouponSchedule {
    type Error = Error;

    fn try_from(dates: Vec<NaiveDate>) -> Result<Self> {
        Self::new(dates)
    }
}

impl From<CouponSchedule> for Vec<NaiveDate> {
    fn from(schedule: CouponSchedule) -> Self {
        schedule.dates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_periodic_semiannual_schedule() {
        let schedule = CouponSchedule::periodic(date(2025, 1, 20), date(2029, 7, 20), 6).unwrap();
        assert_eq!(schedule.len(), 10);
        assert_eq!(schedule.first_date(), date(2025, 1, 20));
        assert_eq!(schedule.dates()[1], date(2025, 7, 20));
        assert_eq!(schedule.final_date(), date(2029, 7, 20));
    }

    #[test]
    fn test_periodic_schedule_with_stub() {
        let schedule = CouponSchedule::periodic(date(2025, 1, 31), date(2025, 6, 15), 3).unwrap();
        assert_eq!(
            schedule.dates(),
            &[date(2025, 1, 31), date(2025, 4, 30), date(2025, 6, 15)]
        );
    }

    #[test]
    fn test_rejects_unordered_dates() {
        assert!(CouponSchedule::new(vec![]).is_err());
        assert!(CouponSchedule::new(vec![date(2025, 1, 1), date(2025, 1, 1)]).is_err());
        assert!(CouponSchedule::new(vec![date(2025, 2, 1), date(2025, 1, 1)]).is_err());
    }

    #[test]
    fn test_past_and_future_split() {
        let schedule = CouponSchedule::new(vec![
            date(2025, 1, 20),
            date(2025, 7, 20),
            date(2026, 1, 20),
        ])
        .unwrap();

        let valuation = date(2025, 7, 20);
        assert_eq!(schedule.past_dates(valuation).len(), 2);
        assert_eq!(schedule.future_dates(valuation), &[date(2026, 1, 20)]);
        assert_eq!(schedule.observed_count(date(2024, 12, 31)), 0);
    }
}
