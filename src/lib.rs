//! Weekly course timetabling as a mixed-integer model.
//!
//! A [`data::SchedulingRequest`] is indexed, turned into per-meeting decision
//! variables, constrained, handed to a [`engine::SolvingEngine`] and decoded
//! back into a validated [`data::SolveResult`].

pub mod config;
pub mod constraints;
pub mod data;
pub mod diagnose;
pub mod engine;
pub mod error;
pub mod extract;
pub mod index;
pub mod model;
pub mod objective;
pub mod server;
pub mod solver;
pub mod validate;
pub mod variables;

#[cfg(test)]
mod test_utils;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use solver::{solve, solve_with};
