//! Built-in coprocessors.

pub mod statistics;

pub use statistics::StatisticsObserver;
