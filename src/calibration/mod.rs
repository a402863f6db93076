pub mod config;
pub mod differential_evolution;
pub mod optimizer;
pub mod pipeline;
pub mod types;

pub use differential_evolution::DifferentialEvolution;
pub use optimizer::{build_optimizer, CmaesOptimizer, Objective, OptimizationOutcome, Optimizer};
