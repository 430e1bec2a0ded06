//! Command implementations.

pub mod config;
pub mod ops;
pub mod run;
