//! Request types accepted by the planner.

pub mod requests;

pub use requests::*;
