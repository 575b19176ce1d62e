//! Cache operation counters for monitoring and debugging.

/// Snapshot of a bin's operation counters.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Reads served from the write-behind overlay.
    pub overlay_hits: u64,
    /// Reads served from disk.
    pub disk_hits: u64,
    /// Reads that found nothing, including decode failures.
    pub misses: u64,
    /// Writes accepted (queued or completed inline).
    pub writes: u64,
    /// Writes that failed at the file-system or codec level.
    pub write_failures: u64,
    /// Successful removes.
    pub removes: u64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of reads served from the overlay or disk.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.overlay_hits + self.disk_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub(crate) fn record_overlay_hit(&mut self) {
        self.overlay_hits += 1;
    }

    pub(crate) fn record_disk_hit(&mut self) {
        self.disk_hits += 1;
    }

    pub(crate) fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub(crate) fn record_write(&mut self) {
        self.writes += 1;
    }

    pub(crate) fn record_write_failure(&mut self) {
        self.write_failures += 1;
    }

    pub(crate) fn record_remove(&mut self) {
        self.removes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stats_are_zero() {
        let stats = CacheStats::new();
        assert_eq!(stats.overlay_hits, 0);
        assert_eq!(stats.disk_hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.writes, 0);
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate() {
        let mut stats = CacheStats::new();
        stats.record_disk_hit();
        stats.record_overlay_hit();
        stats.record_miss();
        stats.record_miss();

        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }
}
