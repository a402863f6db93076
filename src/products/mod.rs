//! Structured products priced on simulated paths.

pub mod autocallable;
pub mod engine;
pub mod valuation;

pub use autocallable::{AutocallableNote, PastFixings, ProductSpec, RedemptionFormula};
pub use engine::MonteCarloEngine;
pub use valuation::{AnomalyPolicy, NoteStatus, NoteValuation};
