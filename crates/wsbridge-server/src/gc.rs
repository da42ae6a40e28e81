use wsbridge_common::config::{BridgeConfig, GcMode};

/// When to collect after a completed request cycle, and how hard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcPolicy {
    freq: u64,
    mode: GcMode,
}

impl GcPolicy {
    pub fn new(freq: u64, mode: GcMode) -> Self {
        Self { freq, mode }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.gc_freq, config.gc_mode)
    }

    /// Whether the cycle that brought the counter to `count` should collect.
    /// A frequency of 0 collects after every cycle.
    pub fn should_collect(&self, count: u64) -> bool {
        self.freq == 0 || count % self.freq == 0
    }

    pub fn mode(&self) -> GcMode {
        self.mode
    }

    pub fn freq(&self) -> u64 {
        self.freq
    }
}

impl Default for GcPolicy {
    fn default() -> Self {
        Self::from_config(&BridgeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_nth_cycle() {
        let policy = GcPolicy::new(3, GcMode::Step);
        let hits: Vec<u64> = (1..=9).filter(|n| policy.should_collect(*n)).collect();
        assert_eq!(hits, vec![3, 6, 9]);
    }

    #[test]
    fn test_zero_collects_always() {
        let policy = GcPolicy::new(0, GcMode::Full);
        assert!((1..=5).all(|n| policy.should_collect(n)));
        assert_eq!(policy.mode(), GcMode::Full);
    }

    #[test]
    fn test_from_config() {
        let config = BridgeConfig::new().with_gc(10, GcMode::Full);
        let policy = GcPolicy::from_config(&config);
        assert_eq!(policy.freq(), 10);
        assert!(!policy.should_collect(9));
        assert!(policy.should_collect(10));
    }
}
