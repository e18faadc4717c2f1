use tracing::{info, warn};

/// Connectivity tracked by the time of the last answer from the device.
///
/// Individual failed requests never flip the status; only a full
/// `offline_timeout_ms` of silence does, and any response restores it.
#[derive(Debug, Clone)]
pub struct ConnectivityWatchdog {
    offline_timeout_ms: u64,
    online: bool,
    last_success_ms: u64,
}

impl ConnectivityWatchdog {
    /// Starts online, with the grace period running from `now_ms`.
    pub fn new(offline_timeout_ms: u64, now_ms: u64) -> Self {
        Self {
            offline_timeout_ms,
            online: true,
            last_success_ms: now_ms,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn last_success_ms(&self) -> u64 {
        self.last_success_ms
    }

    pub fn silence_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_success_ms)
    }

    /// Records a response. Returns `true` when this brings the device back online.
    pub fn mark_success(&mut self, now_ms: u64) -> bool {
        self.last_success_ms = now_ms;
        if self.online {
            return false;
        }

        self.online = true;
        info!("charger connection restored");
        true
    }

    /// Returns `true` exactly once per outage, on the tick the timeout is exceeded.
    pub fn check_timeout(&mut self, now_ms: u64, reason: &str) -> bool {
        if !self.online || self.silence_ms(now_ms) <= self.offline_timeout_ms {
            return false;
        }

        self.online = false;
        warn!("charger offline: {reason}");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_online_within_grace_period() {
        let mut watchdog = ConnectivityWatchdog::new(45_000, 1_000);

        assert!(watchdog.is_online());
        assert!(!watchdog.check_timeout(46_000, "Timeout"));
        assert!(watchdog.is_online());
    }

    #[test]
    fn goes_offline_once_after_silence() {
        let mut watchdog = ConnectivityWatchdog::new(45_000, 0);

        assert!(watchdog.check_timeout(45_001, "Timeout"));
        assert!(!watchdog.is_online());
        assert!(!watchdog.check_timeout(50_000, "Timeout"));
        assert!(!watchdog.check_timeout(500_000, "Timeout"));
    }

    #[test]
    fn any_success_restores_and_resets_clock() {
        let mut watchdog = ConnectivityWatchdog::new(45_000, 0);
        assert!(watchdog.check_timeout(60_000, "Timeout"));

        assert!(watchdog.mark_success(61_000));
        assert!(watchdog.is_online());
        assert!(!watchdog.mark_success(62_000));
        assert_eq!(watchdog.last_success_ms(), 62_000);
        assert!(!watchdog.check_timeout(107_000, "Timeout"));
        assert!(watchdog.check_timeout(107_001, "Timeout"));
    }
}
