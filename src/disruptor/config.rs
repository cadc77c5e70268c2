//! Configuration
//!
//! Serializable description of a ring buffer: its size, producer type and
//! wait strategy, loadable from JSON.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::disruptor::wait_strategy::{
    BlockingWaitStrategy, BusySpinWaitStrategy, SleepingWaitStrategy, SpinWaitWaitStrategy,
    TimeoutBlockingWaitStrategy, WaitStrategy, YieldingWaitStrategy,
};
use crate::disruptor::{is_power_of_two, DisruptorError, ProducerType, Result};

/// Wait strategy selection and tunables
///
/// Tagged by `kind` in JSON, e.g. `{"kind": "sleeping", "retries": 200}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaitStrategyConfig {
    #[default]
    Blocking,
    BusySpin,
    Yielding {
        #[serde(default = "default_spin_tries")]
        spin_tries: u32,
    },
    Sleeping {
        #[serde(default = "default_retries")]
        retries: u32,
        #[serde(default = "default_sleep_nanos")]
        sleep_nanos: u64,
    },
    SpinWait,
    TimeoutBlocking {
        timeout_ms: u64,
    },
}

fn default_spin_tries() -> u32 {
    100
}

fn default_retries() -> u32 {
    200
}

fn default_sleep_nanos() -> u64 {
    0
}

impl WaitStrategyConfig {
    pub fn build(&self) -> Arc<dyn WaitStrategy> {
        match *self {
            WaitStrategyConfig::Blocking => Arc::new(BlockingWaitStrategy::new()),
            WaitStrategyConfig::BusySpin => Arc::new(BusySpinWaitStrategy::new()),
            WaitStrategyConfig::Yielding { spin_tries } => {
                Arc::new(YieldingWaitStrategy::with_spin_tries(spin_tries))
            }
            WaitStrategyConfig::Sleeping {
                retries,
                sleep_nanos,
            } => Arc::new(SleepingWaitStrategy::with_retries_and_sleep(
                retries,
                Duration::from_nanos(sleep_nanos),
            )),
            WaitStrategyConfig::SpinWait => Arc::new(SpinWaitWaitStrategy::new()),
            WaitStrategyConfig::TimeoutBlocking { timeout_ms } => Arc::new(
                TimeoutBlockingWaitStrategy::new(Duration::from_millis(timeout_ms)),
            ),
        }
    }
}

/// Ring buffer configuration
///
/// The default is a 1024-slot single-producer buffer with the blocking
/// strategy. Note that this differs from [`ProducerType::default`], which is
/// `Multi`: a missing `producer_type` in JSON means `single`, while a
/// `ProducerType` built on its own means `multi`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisruptorConfig {
    /// Number of slots, a power of two
    pub buffer_size: usize,
    pub producer_type: ProducerType,
    pub wait_strategy: WaitStrategyConfig,
}

impl Default for DisruptorConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            producer_type: ProducerType::Single,
            wait_strategy: WaitStrategyConfig::default(),
        }
    }
}

impl DisruptorConfig {
    /// Parse and validate a JSON configuration
    ///
    /// Missing fields take their default values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: DisruptorConfig = serde_json::from_str(json)
            .map_err(|e| DisruptorError::Config(format!("invalid configuration JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !is_power_of_two(self.buffer_size) {
            return Err(DisruptorError::InvalidBufferSize(self.buffer_size));
        }
        if let WaitStrategyConfig::TimeoutBlocking { timeout_ms: 0 } = self.wait_strategy {
            return Err(DisruptorError::Config(
                "timeout_blocking wait strategy needs a timeout_ms above zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn build_wait_strategy(&self) -> Arc<dyn WaitStrategy> {
        self.wait_strategy.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DisruptorConfig::default();
        assert_eq!(config.buffer_size, 1024);
        assert_eq!(config.producer_type, ProducerType::Single);
        assert_eq!(config.wait_strategy, WaitStrategyConfig::Blocking);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_producer_type_means_single() {
        let config = DisruptorConfig::from_json_str(r#"{"buffer_size": 8}"#).unwrap();
        assert_eq!(config.producer_type, ProducerType::Single);
        assert_ne!(config.producer_type, ProducerType::default());
    }

    #[test]
    fn test_parse_full_config() {
        let config = DisruptorConfig::from_json_str(
            r#"{
                "buffer_size": 64,
                "producer_type": "multi",
                "wait_strategy": {"kind": "sleeping", "retries": 50}
            }"#,
        )
        .unwrap();

        assert_eq!(config.buffer_size, 64);
        assert_eq!(config.producer_type, ProducerType::Multi);
        assert_eq!(
            config.wait_strategy,
            WaitStrategyConfig::Sleeping {
                retries: 50,
                sleep_nanos: 0
            }
        );
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config =
            DisruptorConfig::from_json_str(r#"{"wait_strategy": {"kind": "yielding"}}"#).unwrap();
        assert_eq!(config.buffer_size, 1024);
        assert_eq!(
            config.wait_strategy,
            WaitStrategyConfig::Yielding { spin_tries: 100 }
        );
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            DisruptorConfig::from_json_str(r#"{"buffer_size": 1000}"#),
            Err(DisruptorError::InvalidBufferSize(1000))
        ));
        assert!(matches!(
            DisruptorConfig::from_json_str(
                r#"{"wait_strategy": {"kind": "timeout_blocking", "timeout_ms": 0}}"#
            ),
            Err(DisruptorError::Config(_))
        ));
        assert!(matches!(
            DisruptorConfig::from_json_str(r#"{"wait_strategy": {"kind": "hybrid"}}"#),
            Err(DisruptorError::Config(_))
        ));
        assert!(matches!(
            DisruptorConfig::from_json_str("not json"),
            Err(DisruptorError::Config(_))
        ));
    }

    #[test]
    fn test_json_round_trip() {
        let config = DisruptorConfig {
            buffer_size: 256,
            producer_type: ProducerType::Multi,
            wait_strategy: WaitStrategyConfig::TimeoutBlocking { timeout_ms: 5 },
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"kind\":\"timeout_blocking\""));
        assert_eq!(DisruptorConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_builds_each_wait_strategy() {
        let kinds = [
            WaitStrategyConfig::Blocking,
            WaitStrategyConfig::BusySpin,
            WaitStrategyConfig::Yielding { spin_tries: 10 },
            WaitStrategyConfig::Sleeping {
                retries: 10,
                sleep_nanos: 1,
            },
            WaitStrategyConfig::SpinWait,
            WaitStrategyConfig::TimeoutBlocking { timeout_ms: 1 },
        ];
        let names = [
            "BlockingWaitStrategy",
            "BusySpinWaitStrategy",
            "YieldingWaitStrategy",
            "SleepingWaitStrategy",
            "SpinWaitWaitStrategy",
            "TimeoutBlockingWaitStrategy",
        ];

        for (kind, name) in kinds.iter().zip(names) {
            let strategy = kind.build();
            assert!(format!("{strategy:?}").starts_with(name), "{kind:?}");
        }
    }
}
