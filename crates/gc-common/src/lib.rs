//! geiger-cpm common types and errors.
//!
//! This crate provides foundational types shared across the workspace:
//! - The unified error type with stable codes and categories
//! - Output format specifications for rendered readings

pub mod error;
pub mod output;

pub use error::{Error, ErrorCategory, Result, StructuredError};
pub use output::OutputFormat;
