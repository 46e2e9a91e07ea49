use std::{fs::File, path::Path, time::Duration};

use anyhow::Context;
use engine::{EngineConfig, RunnerConfig};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AppConfig {
    /// chain gateway base url
    pub rpc: String,
    pub threads: Option<usize>,
    pub bulk_size: Option<u64>,
    pub min_balance: Option<u64>,
    pub refresh_secs: Option<u64>,
    /// unix milliseconds, mining is refused before this
    pub start_time: Option<i64>,
    #[serde(default)]
    pub pin_cores: bool,
}

impl AppConfig {
    pub fn engine_config(&self, threads: Option<usize>, bulk_size: Option<u64>) -> EngineConfig {
        let default = EngineConfig::default();
        EngineConfig {
            threads: threads.or(self.threads).unwrap_or(default.threads),
            bulk_size: bulk_size.or(self.bulk_size).unwrap_or(default.bulk_size),
            pin_cores: self.pin_cores,
            ..default
        }
    }

    pub fn runner_config(&self, max_solutions: Option<u64>) -> RunnerConfig {
        let default = RunnerConfig::default();
        RunnerConfig {
            min_balance: self.min_balance.unwrap_or(default.min_balance),
            refresh_interval: self
                .refresh_secs
                .map(Duration::from_secs)
                .unwrap_or(default.refresh_interval),
            max_solutions,
            ..default
        }
    }

    /// false while `start_time` lies in the future
    pub fn has_started(&self, now: i64) -> bool {
        self.start_time.map_or(true, |start| now >= start)
    }
}

pub fn load_config_file(config_file: impl AsRef<Path>) -> anyhow::Result<AppConfig> {
    let path = config_file.as_ref();
    let file =
        File::open(path).with_context(|| format!("{} config file not found", path.display()))?;
    let config = serde_json::from_reader(file)
        .with_context(|| format!("fail to parse config file {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_values_override_file() {
        let config: AppConfig = serde_json::from_str(
            r#"{"rpc": "http://127.0.0.1:8080", "threads": 4, "bulk_size": 500, "refresh_secs": 5}"#,
        )
        .unwrap();

        let engine = config.engine_config(Some(2), None);
        assert_eq!(engine.threads, 2);
        assert_eq!(engine.bulk_size, 500);
        assert!(!engine.pin_cores);

        let runner = config.runner_config(Some(3));
        assert_eq!(runner.refresh_interval, Duration::from_secs(5));
        assert_eq!(runner.min_balance, engine::config::DEFAULT_MIN_BALANCE);
        assert_eq!(runner.max_solutions, Some(3));
    }

    #[test]
    fn start_time_gate() {
        let mut config: AppConfig = serde_json::from_str(r#"{"rpc": "http://localhost"}"#).unwrap();
        assert!(config.has_started(0));

        config.start_time = Some(1_000);
        assert!(!config.has_started(999));
        assert!(config.has_started(1_000));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_config_file("./no-such-config.json").unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }
}
