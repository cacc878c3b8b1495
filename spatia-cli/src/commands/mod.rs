//! Command implementations

pub mod capabilities;
pub mod simulate;
