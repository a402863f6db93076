pub mod bs;
pub mod heston;
