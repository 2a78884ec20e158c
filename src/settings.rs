use std::time::Duration;

use crate::fileopen::BomProbe;

/// Timing knobs shared by every tailer a registry launches.
#[derive(Debug, Clone, Copy)]
pub struct TailSettings {
    /// Delay between polls while a file is missing or has no new data.
    pub poll_interval: Duration,
    pub bom_probe: BomProbe,
    /// Most bytes taken from a file per read, so a large backlog arrives in slices.
    pub read_limit: usize,
    /// How long the process tailer waits for more output before flushing.
    pub coalesce_timeout: Duration,
    /// Flush a coalesced chunk early once it grows past this many bytes.
    pub coalesce_limit: usize,
    pub mock_count: usize,
    pub mock_delay: Duration,
    /// Chunks a tailer may produce ahead of its consumer.
    pub channel_capacity: usize,
}

impl Default for TailSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            bom_probe: BomProbe::default(),
            read_limit: 64 * 1024,
            coalesce_timeout: Duration::from_millis(100),
            coalesce_limit: 64 * 1024,
            mock_count: 40,
            mock_delay: Duration::from_millis(200),
            channel_capacity: 16,
        }
    }
}
