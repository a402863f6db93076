use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// How a note stands at the valuation date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteStatus {
    /// Observations remain; value comes from the simulated paths
    Live,
    /// Valuation date is on or after the final coupon date
    Matured,
    /// A recorded fixing already reached the autocall barrier
    AutoCalledInPast,
}

/// Monte Carlo estimate of a note's present value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteValuation {
    pub present_value: f64,
    pub paths_used: usize,
    pub paths_excluded: usize,
    pub status: NoteStatus,
    pub notional: f64,
}

impl NoteValuation {
    pub(crate) fn settled(status: NoteStatus, notional: f64) -> Self {
        Self {
            present_value: 0.0,
            paths_used: 0,
            paths_excluded: 0,
            status,
            notional,
        }
    }

    /// Present value as a percentage of notional (the purchase price quote).
    pub fn percent_of_notional(&self) -> f64 {
        self.present_value / self.notional * 100.0
    }
}

/// Tolerance for paths with non-finite levels or payoffs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyPolicy {
    /// Largest fraction of excluded paths that is still accepted. With the
    /// default of 0 a single anomalous path fails the valuation.
    #[serde(default)]
    pub max_excluded_fraction: f64,
}

impl Default for AnomalyPolicy {
    fn default() -> Self {
        Self {
            max_excluded_fraction: 0.0,
        }
    }
}

impl AnomalyPolicy {
    /// Accept up to `fraction` of paths being dropped.
    pub fn tolerant(fraction: f64) -> Self {
        Self {
            max_excluded_fraction: fraction,
        }
    }
}

/// Streaming sum of per-path present values.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct PathAccumulator {
    sum: f64,
    used: usize,
    excluded: usize,
    first_excluded: Option<usize>,
    first_reason: Option<&'static str>,
}

impl PathAccumulator {
    pub(crate) fn add(&mut self, pv: f64) {
        self.sum += pv;
        self.used += 1;
    }

    pub(crate) fn exclude(&mut self, path_index: usize, reason: &'static str) {
        self.excluded += 1;
        if self.first_excluded.map_or(true, |first| path_index < first) {
            self.first_excluded = Some(path_index);
            self.first_reason = Some(reason);
        }
    }

    /// Folds `other` into `self`; merging in a fixed order keeps the sum
    /// reproducible.
    pub(crate) fn merge(mut self, other: PathAccumulator) -> PathAccumulator {
        self.sum += other.sum;
        self.used += other.used;
        if let Some(index) = other.first_excluded {
            if self.first_excluded.map_or(true, |first| index < first) {
                self.first_excluded = Some(index);
                self.first_reason = other.first_reason;
            }
        }
        self.excluded += other.excluded;
        self
    }

    /// Applies `policy` and turns the running sum into a mean.
    pub(crate) fn finish(self, policy: &AnomalyPolicy, notional: f64) -> Result<NoteValuation> {
        let total = self.used + self.excluded;
        if self.excluded > 0 {
            let first_path = self.first_excluded.unwrap_or(0);
            let reason = self.first_reason.unwrap_or("non-finite value").to_string();
            let fraction = self.excluded as f64 / total as f64;
            if self.used == 0 || fraction > policy.max_excluded_fraction {
                return Err(Error::NumericalDivergence {
                    anomalous: self.excluded,
                    total,
                    first_path,
                    reason,
                });
            }
            warn!(
                excluded = self.excluded,
                total,
                first_path,
                reason = %reason,
                "excluded anomalous paths from the valuation"
            );
        }

        Ok(NoteValuation {
            present_value: self.sum / self.used as f64,
            paths_used: self.used,
            paths_excluded: self.excluded,
            status: NoteStatus::Live,
            notional,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_first_excluded_path() {
        let mut a = PathAccumulator::default();
        a.add(1.0);
        a.exclude(9, "late");
        let mut b = PathAccumulator::default();
        b.add(3.0);
        b.exclude(4, "early");

        let merged = a.merge(b);
        let err = merged.finish(&AnomalyPolicy::default(), 1.0).unwrap_err();
        assert_eq!(
            err,
            Error::NumericalDivergence {
                anomalous: 2,
                total: 4,
                first_path: 4,
                reason: "early".to_string(),
            }
        );

        let valuation = merged.finish(&AnomalyPolicy::tolerant(0.5), 1.0).unwrap();
        assert_eq!(valuation.present_value, 2.0);
        assert_eq!(valuation.paths_used, 2);
        assert_eq!(valuation.paths_excluded, 2);
    }

    #[test]
    fn test_all_excluded_always_fails() {
        let mut acc = PathAccumulator::default();
        acc.exclude(0, "nan");
        assert!(acc.finish(&AnomalyPolicy::tolerant(1.0), 1.0).is_err());
    }

    #[test]
    fn test_percent_of_notional() {
        let mut acc = PathAccumulator::default();
        acc.add(950_000.0);
        let valuation = acc.finish(&AnomalyPolicy::default(), 1_000_000.0).unwrap();
        assert!((valuation.percent_of_notional() - 95.0).abs() < 1e-12);
    }
}
