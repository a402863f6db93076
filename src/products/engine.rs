//! Streaming Monte Carlo valuation: paths are generated and priced one at a
//! time inside parallel chunks, so memory stays at one buffer per worker no
//! matter how many paths are requested.

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::market::curve::YieldCurve;
use crate::models::heston::heston_model::HestonParameters;
use crate::products::autocallable::{AutocallableNote, PastFixings};
use crate::products::valuation::{AnomalyPolicy, NoteStatus, NoteValuation, PathAccumulator};
use crate::simulation::grid::SimulationGrid;
use crate::simulation::path_simulator::{PathSimulator, SimulationConfig};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloEngine {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub anomaly_policy: AnomalyPolicy,
}

impl MonteCarloEngine {
    pub fn new(simulation: SimulationConfig, anomaly_policy: AnomalyPolicy) -> Self {
        Self {
            simulation,
            anomaly_policy,
        }
    }

    /// Simulates `simulation.num_paths` Heston paths from `valuation_date` over
    /// the note's remaining coupon dates and returns the mean discounted
    /// payoff.
    ///
    /// Chunk sums are reduced in chunk order, so the result is reproducible
    /// for a fixed seed regardless of the thread pool size.
    #[allow(clippy::too_many_arguments)]
    pub fn price(
        &self,
        note: &AutocallableNote,
        params: &HestonParameters,
        spot: f64,
        curve: &dyn YieldCurve,
        dividend_curve: &dyn YieldCurve,
        past_fixings: &PastFixings,
        valuation_date: NaiveDate,
    ) -> Result<NoteValuation> {
        let status = note.status(past_fixings, valuation_date);
        if status != NoteStatus::Live {
            debug!(?status, %valuation_date, "note already settled");
            return Ok(NoteValuation::settled(status, note.spec.notional));
        }

        let num_paths = self.simulation.num_paths;
        if num_paths == 0 {
            return Err(Error::InvalidPathCount { requested: 0 });
        }

        let prepared = note.prepare(past_fixings, valuation_date, curve)?;
        let grid = SimulationGrid::for_schedule(valuation_date, &note.schedule, curve.day_count())?;
        let simulator =
            PathSimulator::new(&grid, *params, spot, curve, dividend_curve, self.simulation)?;

        let chunk_size = self.simulation.chunk_size;
        let chunks = num_paths.div_ceil(chunk_size);
        let len = simulator.path_len();

        info!(
            paths = num_paths,
            chunks,
            observations = prepared.future_len(),
            scheme = ?self.simulation.scheme,
            "pricing autocallable note"
        );

        let partials: Vec<PathAccumulator> = (0..chunks)
            .into_par_iter()
            .map(|chunk| {
                let mut levels = vec![0.0; len];
                let mut acc = PathAccumulator::default();
                let start = chunk * chunk_size;
                let end = (start + chunk_size).min(num_paths);
                for index in start..end {
                    if simulator.fill_path(index, &mut levels).is_some() {
                        acc.exclude(index, "non-finite simulated level");
                        continue;
                    }
                    let pv = prepared.path_value(&levels[1..]);
                    if pv.is_finite() {
                        acc.add(pv);
                    } else {
                        acc.exclude(index, "non-finite payoff");
                    }
                }
                acc
            })
            .collect();

        let total = partials
            .into_iter()
            .fold(PathAccumulator::default(), PathAccumulator::merge);
        let valuation = total.finish(&self.anomaly_policy, note.spec.notional)?;

        info!(
            present_value = valuation.present_value,
            percent = valuation.percent_of_notional(),
            excluded = valuation.paths_excluded,
            "note priced"
        );
        Ok(valuation)
    }
}
