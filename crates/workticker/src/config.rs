//! Pool configuration
//!
//! [`PoolConfig`] is read once when a pool is built and never changes
//! afterward. It can be assembled with builders, deserialized (durations are
//! milliseconds), or loaded from `WORKTICKER_*` environment variables.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConfigError;

/// How the dispatcher waits for an idle worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum DispatchPolicy {
    /// Wait up to `max_worker_wait`, then reject the item with
    /// [`WorkError::NoAvailableWorkers`](crate::WorkError::NoAvailableWorkers)
    BoundedWait {
        #[serde(with = "duration_millis")]
        max_worker_wait: Duration,
    },

    /// Block until a worker is idle; every dequeued item eventually runs
    WaitForever,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self::BoundedWait {
            max_worker_wait: Duration::from_secs(5),
        }
    }
}

/// Work ticker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Name used in logs and attached to every reported error
    pub name: String,

    /// Number of workers, and so the maximum concurrent handler invocations
    pub num_workers: usize,

    /// Handler sub-operations allowed per second across the pool (0 = unlimited)
    pub rate_limit_per_second: u32,

    /// Interval between retrieval rounds
    #[serde(with = "duration_millis")]
    pub tick_frequency: Duration,

    /// Dispatch policy
    #[serde(default)]
    pub dispatch: DispatchPolicy,

    /// Capacity of the job queue between producers and the dispatcher
    #[serde(default = "default_job_queue_capacity")]
    pub job_queue_capacity: usize,
}

fn default_job_queue_capacity() -> usize {
    1
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: format!("workticker-{}", Uuid::now_v7()),
            num_workers: 10,
            rate_limit_per_second: 10,
            tick_frequency: Duration::from_secs(5),
            dispatch: DispatchPolicy::default(),
            job_queue_capacity: default_job_queue_capacity(),
        }
    }
}

impl PoolConfig {
    /// Create a configuration with the given name and defaults for the rest
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Create configuration from environment variables
    ///
    /// Environment variables (all optional, defaults as in [`Default`]):
    /// - `WORKTICKER_NAME`: Pool name
    /// - `WORKTICKER_NUM_WORKERS`: Number of workers
    /// - `WORKTICKER_RATE_LIMIT_PER_SECOND`: Rate limit (0 = unlimited)
    /// - `WORKTICKER_TICK_FREQUENCY_MS`: Tick interval in milliseconds
    /// - `WORKTICKER_MAX_WORKER_WAIT_MS`: Bounded dispatch wait; 0 waits forever
    /// - `WORKTICKER_JOB_QUEUE_CAPACITY`: Job queue capacity
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(name) = lookup("WORKTICKER_NAME") {
            config.name = name;
        }
        if let Some(num_workers) = parse_var(&lookup, "WORKTICKER_NUM_WORKERS")? {
            config.num_workers = num_workers;
        }
        if let Some(rate) = parse_var(&lookup, "WORKTICKER_RATE_LIMIT_PER_SECOND")? {
            config.rate_limit_per_second = rate;
        }
        if let Some(ms) = parse_var(&lookup, "WORKTICKER_TICK_FREQUENCY_MS")? {
            config.tick_frequency = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "WORKTICKER_MAX_WORKER_WAIT_MS")? {
            config.dispatch = if ms == 0 {
                DispatchPolicy::WaitForever
            } else {
                DispatchPolicy::BoundedWait {
                    max_worker_wait: Duration::from_millis(ms),
                }
            };
        }
        if let Some(capacity) = parse_var(&lookup, "WORKTICKER_JOB_QUEUE_CAPACITY")? {
            config.job_queue_capacity = capacity;
        }

        Ok(config)
    }

    /// Set the pool name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the number of workers
    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    /// Set the rate limit (0 = unlimited)
    pub fn with_rate_limit_per_second(mut self, rate: u32) -> Self {
        self.rate_limit_per_second = rate;
        self
    }

    /// Set the tick frequency
    pub fn with_tick_frequency(mut self, frequency: Duration) -> Self {
        self.tick_frequency = frequency;
        self
    }

    /// Use bounded-wait dispatch with the given maximum wait
    pub fn with_max_worker_wait(mut self, wait: Duration) -> Self {
        self.dispatch = DispatchPolicy::BoundedWait {
            max_worker_wait: wait,
        };
        self
    }

    /// Set the dispatch policy
    pub fn with_dispatch_policy(mut self, policy: DispatchPolicy) -> Self {
        self.dispatch = policy;
        self
    }

    /// Set the job queue capacity
    pub fn with_job_queue_capacity(mut self, capacity: usize) -> Self {
        self.job_queue_capacity = capacity;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.num_workers == 0 {
            return Err(ConfigError::Zero {
                field: "num_workers",
            });
        }
        if self.tick_frequency.is_zero() {
            return Err(ConfigError::Zero {
                field: "tick_frequency",
            });
        }
        if self.job_queue_capacity == 0 {
            return Err(ConfigError::Zero {
                field: "job_queue_capacity",
            });
        }
        if let DispatchPolicy::BoundedWait { max_worker_wait } = self.dispatch {
            if max_worker_wait.is_zero() {
                return Err(ConfigError::Zero {
                    field: "max_worker_wait",
                });
            }
        }
        Ok(())
    }
}

fn parse_var<V: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<V>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                key: key.to_string(),
                value,
            }),
    }
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert!(config.name.starts_with("workticker-"));
        assert_eq!(config.num_workers, 10);
        assert_eq!(config.rate_limit_per_second, 10);
        assert_eq!(config.tick_frequency, Duration::from_secs(5));
        assert_eq!(
            config.dispatch,
            DispatchPolicy::BoundedWait {
                max_worker_wait: Duration::from_secs(5)
            }
        );
        assert_eq!(config.job_queue_capacity, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = PoolConfig::new("orders")
            .with_num_workers(4)
            .with_rate_limit_per_second(0)
            .with_tick_frequency(Duration::from_millis(250))
            .with_max_worker_wait(Duration::from_millis(50))
            .with_job_queue_capacity(8);

        assert_eq!(config.name, "orders");
        assert_eq!(config.num_workers, 4);
        assert_eq!(config.rate_limit_per_second, 0);
        assert_eq!(config.tick_frequency, Duration::from_millis(250));
        assert_eq!(
            config.dispatch,
            DispatchPolicy::BoundedWait {
                max_worker_wait: Duration::from_millis(50)
            }
        );
        assert_eq!(config.job_queue_capacity, 8);

        let config = config.with_dispatch_policy(DispatchPolicy::WaitForever);
        assert_eq!(config.dispatch, DispatchPolicy::WaitForever);
    }

    #[test]
    fn test_config_validation() {
        assert_eq!(
            PoolConfig::new("x").with_num_workers(0).validate(),
            Err(ConfigError::Zero {
                field: "num_workers"
            })
        );
        assert_eq!(
            PoolConfig::new("x")
                .with_tick_frequency(Duration::ZERO)
                .validate(),
            Err(ConfigError::Zero {
                field: "tick_frequency"
            })
        );
        assert_eq!(
            PoolConfig::new("x")
                .with_max_worker_wait(Duration::ZERO)
                .validate(),
            Err(ConfigError::Zero {
                field: "max_worker_wait"
            })
        );
        assert_eq!(
            PoolConfig::new("x").with_job_queue_capacity(0).validate(),
            Err(ConfigError::Zero {
                field: "job_queue_capacity"
            })
        );
        assert_eq!(
            PoolConfig::new("  ").validate(),
            Err(ConfigError::EmptyName)
        );
        assert!(PoolConfig::new("x")
            .with_dispatch_policy(DispatchPolicy::WaitForever)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_from_lookup() {
        let config = PoolConfig::from_lookup(lookup_from(&[
            ("WORKTICKER_NAME", "invoices"),
            ("WORKTICKER_NUM_WORKERS", "3"),
            ("WORKTICKER_RATE_LIMIT_PER_SECOND", "0"),
            ("WORKTICKER_TICK_FREQUENCY_MS", "1500"),
            ("WORKTICKER_MAX_WORKER_WAIT_MS", "0"),
            ("WORKTICKER_JOB_QUEUE_CAPACITY", " 16 "),
        ]))
        .unwrap();

        assert_eq!(config.name, "invoices");
        assert_eq!(config.num_workers, 3);
        assert_eq!(config.rate_limit_per_second, 0);
        assert_eq!(config.tick_frequency, Duration::from_millis(1500));
        assert_eq!(config.dispatch, DispatchPolicy::WaitForever);
        assert_eq!(config.job_queue_capacity, 16);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = PoolConfig::from_lookup(lookup_from(&[("WORKTICKER_NUM_WORKERS", "many")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidEnv {
                key: "WORKTICKER_NUM_WORKERS".into(),
                value: "many".into(),
            }
        );
    }

    #[test]
    fn test_serde_durations_in_millis() {
        let config = PoolConfig::new("orders")
            .with_tick_frequency(Duration::from_millis(100))
            .with_max_worker_wait(Duration::from_millis(20));

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["tick_frequency"], 100);
        assert_eq!(json["dispatch"]["policy"], "bounded_wait");
        assert_eq!(json["dispatch"]["max_worker_wait"], 20);

        let parsed: PoolConfig = serde_json::from_value(serde_json::json!({
            "name": "orders",
            "num_workers": 2,
            "rate_limit_per_second": 5,
            "tick_frequency": 100,
        }))
        .unwrap();
        assert_eq!(parsed.dispatch, DispatchPolicy::default());
        assert_eq!(parsed.job_queue_capacity, 1);
    }
}
