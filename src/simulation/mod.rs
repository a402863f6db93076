//! Monte Carlo simulation of Heston asset paths.

pub mod grid;
pub mod path_simulator;
pub mod rng;
pub mod scheme;

pub use grid::SimulationGrid;
pub use path_simulator::{simulate, PathAnomaly, PathSimulator, ScenarioPath, SimulationConfig};
pub use scheme::VarianceScheme;
