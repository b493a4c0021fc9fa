//! Utility functions
//!
//! Number formatting and character classes shared by the conversions.

pub mod dtoa;
pub mod unicode;
