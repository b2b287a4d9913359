use std::time::Duration;

use url::Url;

/// One monitored chain: its RPC endpoints (tried in order during
/// `Initializing`) and an optional override for the starting block.
#[derive(Debug, Clone)]
pub struct ChainSettings {
    pub chain_id: u64,
    pub name: String,
    pub rpc_urls: Vec<Url>,
    pub start_block_override: Option<u64>,
}

/// The adaptive-pacing and retry knobs shared by every chain monitor.
/// Mirrors the flat env-var table: `BLOCK_PAUSE_FACTOR`,
/// `BLOCK_PAUSE_UPPER_LIMIT`, `BLOCK_PAUSE_LOWER_LIMIT`, `WEB3_TIMEOUT`,
/// `GET_BYTECODE_RETRY_PAUSE`, `GET_BLOCK_PAUSE`, `INITIAL_GET_BYTECODE_TRIES`.
#[derive(Debug, Clone)]
pub struct PacingSettings {
    pub block_pause_factor: f64,
    pub block_pause_upper_limit: Duration,
    pub block_pause_lower_limit: Duration,
    pub web3_timeout: Duration,
    pub get_bytecode_retry_pause: Duration,
    pub get_block_pause: Duration,
    pub initial_get_bytecode_tries: u32,
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            block_pause_factor: 1.1,
            block_pause_upper_limit: Duration::from_secs(30),
            block_pause_lower_limit: Duration::from_millis(500),
            web3_timeout: Duration::from_secs(3),
            get_bytecode_retry_pause: Duration::from_secs(5),
            get_block_pause: Duration::from_secs(10),
            initial_get_bytecode_tries: 3,
        }
    }
}

impl PacingSettings {
    /// `block_pause_factor` must be strictly greater than 1; asserted at
    /// startup, not at every use.
    pub fn assert_valid(&self) {
        assert!(
            self.block_pause_factor > 1.0,
            "BLOCK_PAUSE_FACTOR must be strictly greater than 1, got {}",
            self.block_pause_factor
        );
    }

    pub fn increase(&self, pause: Duration) -> Duration {
        self.clamp(pause.mul_f64(self.block_pause_factor))
    }

    pub fn decrease(&self, pause: Duration) -> Duration {
        self.clamp(pause.div_f64(self.block_pause_factor))
    }

    fn clamp(&self, pause: Duration) -> Duration {
        pause
            .max(self.block_pause_lower_limit)
            .min(self.block_pause_upper_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn pause_stays_within_clamps_after_many_increases() {
        let pacing = PacingSettings::default();
        let mut pause = pacing.get_block_pause;
        for _ in 0..100 {
            pause = pacing.increase(pause);
        }
        assert_eq!(pause, pacing.block_pause_upper_limit);
    }

    #[test]
    fn pause_stays_within_clamps_after_many_decreases() {
        let pacing = PacingSettings::default();
        let mut pause = pacing.get_block_pause;
        for _ in 0..100 {
            pause = pacing.decrease(pause);
        }
        assert_eq!(pause, pacing.block_pause_lower_limit);
    }

    #[test]
    fn decrease_then_increase_is_the_inverse_operation() {
        let pacing = PacingSettings::default();
        let pause = Duration::from_secs(10);
        let round_tripped = pacing.increase(pacing.decrease(pause));
        let delta = round_tripped.as_secs_f64() - pause.as_secs_f64();
        assert!(delta.abs() < 0.001);
    }

    #[test]
    #[should_panic(expected = "must be strictly greater than 1")]
    fn rejects_factor_not_greater_than_one() {
        let mut pacing = PacingSettings::default();
        pacing.block_pause_factor = 1.0;
        pacing.assert_valid();
    }
}
