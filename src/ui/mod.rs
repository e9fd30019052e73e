//! Terminal output for parallel runs.

pub mod display;

pub use display::ParallelDisplay;
