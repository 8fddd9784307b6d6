//! Command implementations for seqorder.

pub mod sort;

pub use sort::{SortCommand, SortKey};
