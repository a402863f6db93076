pub mod heston_calibrator;
pub mod heston_model;
pub mod heston_pricer;

pub use heston_calibrator::{CalibrationHelper, HestonModelCalibrator, HestonParamBounds};
pub use heston_model::HestonParameters;
pub use heston_pricer::{FourierHestonPricer, HestonPricer, OptionSpec};
