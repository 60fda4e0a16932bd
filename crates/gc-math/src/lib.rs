//! Numerical utilities for pulse-rate confidence bounds.

pub mod math;

pub use math::chi_squared::*;
pub use math::stable::*;
