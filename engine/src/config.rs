use std::time::Duration;

use shared::errors::{MinerError, MinerResult};

pub const DEFAULT_BULK_SIZE: u64 = 100_000;
pub const DEFAULT_MIN_BALANCE: u64 = 100_000_000;

/// Per identity search settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// search threads spawned for every identity
    pub threads: usize,
    /// nonces handed to a worker per job
    pub bulk_size: u64,
    /// pin worker `i` to core `i % cores`
    pub pin_cores: bool,
    /// how often the pool reports its hash rate
    pub progress_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threads: num_cpus::get().max(1),
            bulk_size: DEFAULT_BULK_SIZE,
            pin_cores: false,
            progress_interval: Duration::from_secs(10),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> MinerResult<()> {
        if self.threads == 0 {
            return Err(MinerError::Configuration("thread count must be at least 1".to_string()));
        }
        if self.bulk_size == 0 {
            return Err(MinerError::Configuration("bulk size must be at least 1".to_string()));
        }
        if self.progress_interval.is_zero() {
            return Err(MinerError::Configuration("progress interval must be non zero".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// wallets below this balance are skipped
    pub min_balance: u64,
    /// poll interval for chain head changes while mining
    pub refresh_interval: Duration,
    /// pause between failed chain requests
    pub retry_delay: Duration,
    /// log interval while waiting for the chain to move past a solved round
    pub round_wait: Duration,
    /// stop a wallet after this many accepted proofs
    pub max_solutions: Option<u64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            min_balance: DEFAULT_MIN_BALANCE,
            refresh_interval: Duration::from_secs(30),
            retry_delay: Duration::from_secs(2),
            round_wait: Duration::from_secs(30),
            max_solutions: None,
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> MinerResult<()> {
        if self.refresh_interval.is_zero() {
            return Err(MinerError::Configuration("refresh interval must be non zero".to_string()));
        }
        if self.retry_delay.is_zero() {
            return Err(MinerError::Configuration("retry delay must be non zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.threads >= 1);
        assert_eq!(config.bulk_size, 100_000);
        assert!(config.validate().is_ok());
        assert!(RunnerConfig::default().validate().is_ok());
    }

    #[test]
    fn reject_zero_threads_and_bulk() {
        let config = EngineConfig { threads: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(MinerError::Configuration(_))));

        let config = EngineConfig { bulk_size: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(MinerError::Configuration(_))));

        let config = RunnerConfig { refresh_interval: Duration::ZERO, ..Default::default() };
        assert!(config.validate().is_err());
    }
}
