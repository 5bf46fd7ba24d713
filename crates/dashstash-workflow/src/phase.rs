use dashstash_core::status_led::BlinkPattern;

/// High-level phase of the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Booting,
    /// Images are with the host; waiting for the archive to appear.
    AwaitingArchive,
    /// Images are local; repairing and archiving.
    Maintaining,
    /// Maintenance done; handing the images back to the host.
    Reattaching,
    /// Images are with the host; waiting for the archive to go away.
    AwaitingDeparture,
}

impl LoopPhase {
    /// LED pattern shown on entering this phase. `None` keeps the current one.
    pub fn pattern(self) -> Option<BlinkPattern> {
        match self {
            LoopPhase::Booting | LoopPhase::AwaitingDeparture => None,
            LoopPhase::AwaitingArchive => Some(BlinkPattern::Slow),
            LoopPhase::Maintaining => Some(BlinkPattern::Fast),
            LoopPhase::Reattaching => Some(BlinkPattern::Double),
        }
    }
}

impl std::fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoopPhase::Booting => "booting",
            LoopPhase::AwaitingArchive => "awaiting-archive",
            LoopPhase::Maintaining => "maintaining",
            LoopPhase::Reattaching => "reattaching",
            LoopPhase::AwaitingDeparture => "awaiting-departure",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waiting_phases_map_to_patterns() {
        assert_eq!(LoopPhase::AwaitingArchive.pattern(), Some(BlinkPattern::Slow));
        assert_eq!(LoopPhase::Maintaining.pattern(), Some(BlinkPattern::Fast));
        assert_eq!(LoopPhase::Reattaching.pattern(), Some(BlinkPattern::Double));
        assert_eq!(LoopPhase::AwaitingDeparture.pattern(), None);
    }
}
