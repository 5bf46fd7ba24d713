//! Network reachability probes.

use std::time::Duration;

/// Single-shot probes. A probe never errors: anything other than a positive answer is
/// "unreachable".
pub trait NetOps {
    /// TCP connect to `host:port` within `timeout`.
    fn tcp_reachable(&self, host: &str, port: u16, timeout: Duration) -> bool;

    /// One ICMP echo to `host` within `timeout`.
    fn ping(&self, host: &str, timeout: Duration) -> bool;
}
