//! CLI command implementations.

pub mod check;
pub mod resolve;
pub mod run;
