//! Market-side collaborators: discount curves and observation schedules.
//!
//! Curve construction proper (bootstrapping, calendars, business-day rolling)
//! lives outside this crate. What is here is the interface the pricing
//! pipeline consumes plus the minimal flat curve needed to drive it.

pub mod curve;
pub mod schedule;

pub use curve::{DayCount, FlatForward, YieldCurve};
pub use schedule::CouponSchedule;
