//! dashstash core library.
//!
//! `dashstash-core` holds config, logging, and the building blocks the control loop
//! composes: mount reliability, archive reachability, the gadget lifecycle, archiving,
//! the status LED, and snapshots.

#![allow(clippy::too_many_arguments)] // Archiver wiring has many collaborators.

pub mod archive;
pub mod collaborators;
pub mod config;
pub mod errors;
pub mod gadget;
pub mod host;
pub mod logging;
pub mod mounts;
pub mod ownership;
pub mod reachability;
pub mod retry;
pub mod singleton;
pub mod snapshots;
pub mod status_led;
pub mod volumes;
pub mod waiter;
