//! dashstash workflow orchestration.
//!
//! This crate composes the core building blocks into the supervisory control loop
//! and wires production collaborators from configuration.

pub mod control_loop;
pub mod phase;
pub mod preflight;
pub mod wiring;

#[cfg(test)]
mod test_env;
