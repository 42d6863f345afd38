//! Dirty-bit change tracking.
//!
//! [`DirtyBits`] says what changed on one primitive, [`ChangeTracker`] holds
//! the bits for every primitive between sync passes.

mod bits;
mod counters;
mod tracker;

pub use bits::DirtyBits;
pub use counters::{DirtyCounters, DirtySummary};
pub use tracker::ChangeTracker;
