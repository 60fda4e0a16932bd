//! Core math modules.

pub mod chi_squared;
pub mod stable;
