pub use dashstash_error::{HalError, HalResult};
