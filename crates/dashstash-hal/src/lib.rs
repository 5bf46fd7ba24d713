//! dashstash Hardware Abstraction Layer (HAL).
//!
//! Everything that touches the host (mount table, loop devices, kernel modules, external
//! commands, network probes, sysfs/procfs) goes through the traits in [`hal`] so the
//! supervisory logic can be exercised against [`FakeHal`] without root or hardware.

pub mod error;
pub mod hal;
pub mod path;
pub mod procfs;
pub mod sysfs;

pub use error::{HalError, HalResult};
pub use hal::*;
