//! Upgrade status tracking: a thread-safe record of one upgrade's progress
//! that broadcasts every change to registered observers, plus the text codec
//! used for its download rate.

pub mod details;
pub mod rate;
