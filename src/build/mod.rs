//! Build-monitoring core: fuzzy job resolution, triggering, and the
//! per-build polling tracker.

pub mod matcher;
pub mod tracker;
pub mod trigger;
