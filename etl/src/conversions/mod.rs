//! Conversions of raw record values into the shapes the store expects.

pub mod row;
