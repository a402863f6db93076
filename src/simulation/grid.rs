use chrono::NaiveDate;

use crate::error::{Error, Result};
use crate::market::curve::DayCount;
use crate::market::schedule::CouponSchedule;

/// Observation dates of a simulation. The first date is the anchor at which
/// every path starts from spot.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationGrid {
    dates: Vec<NaiveDate>,
    /// Year fractions from the anchor
    times: Vec<f64>,
}

impl SimulationGrid {
    /// Requires at least two strictly increasing dates.
    pub fn new(dates: Vec<NaiveDate>, day_count: DayCount) -> Result<Self> {
        if dates.len() < 2 {
            return Err(Error::grid(format!(
                "grid needs an anchor and at least one observation, got {} date(s)",
                dates.len()
            )));
        }
        if let Some(i) = dates.windows(2).position(|w| w[0] >= w[1]) {
            return Err(Error::grid_at(
                i + 1,
                format!(
                    "grid dates must be strictly increasing ({} then {})",
                    dates[i],
                    dates[i + 1]
                ),
            ));
        }

        let anchor = dates[0];
        let times = dates
            .iter()
            .map(|&d| day_count.year_fraction(anchor, d))
            .collect();
        Ok(Self { dates, times })
    }

    /// `[valuation_date] + coupon dates strictly after it`.
    pub fn for_schedule(
        valuation_date: NaiveDate,
        schedule: &CouponSchedule,
        day_count: DayCount,
    ) -> Result<Self> {
        let mut dates = Vec::with_capacity(schedule.len() + 1);
        dates.push(valuation_date);
        dates.extend_from_slice(schedule.future_dates(valuation_date));
        Self::new(dates, day_count)
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn anchor(&self) -> NaiveDate {
        self.dates[0]
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_grid_validation() {
        assert!(matches!(
            SimulationGrid::new(vec![date(2024, 7, 20)], DayCount::Actual360),
            Err(Error::InvalidGrid { index: None, .. })
        ));
        assert!(matches!(
            SimulationGrid::new(
                vec![date(2024, 7, 20), date(2025, 1, 20), date(2025, 1, 20)],
                DayCount::Actual360
            ),
            Err(Error::InvalidGrid { index: Some(2), .. })
        ));
    }

    #[test]
    fn test_times_measured_from_anchor() {
        let grid = SimulationGrid::new(
            vec![date(2024, 7, 20), date(2025, 1, 16), date(2025, 7, 15)],
            DayCount::Actual360,
        )
        .unwrap();
        assert_eq!(grid.times()[0], 0.0);
        assert_relative_eq!(grid.times()[1], 180.0 / 360.0, epsilon = 1e-12);
        assert_relative_eq!(grid.times()[2], 360.0 / 360.0, epsilon = 1e-12);
    }

    #[test]
    fn test_grid_for_schedule_keeps_only_future_dates() {
        let schedule = CouponSchedule::new(vec![
            date(2025, 1, 20),
            date(2025, 7, 20),
            date(2026, 1, 20),
        ])
        .unwrap();

        let grid =
            SimulationGrid::for_schedule(date(2025, 3, 1), &schedule, DayCount::Actual360).unwrap();
        assert_eq!(grid.dates(), &[date(2025, 3, 1), date(2025, 7, 20), date(2026, 1, 20)]);

        // On the final date nothing is left to simulate
        let valuation = date(2026, 1, 20);
        assert!(SimulationGrid::for_schedule(valuation, &schedule, DayCount::Actual360).is_err());
    }
}
