use crate::unit::Unit;
use common::config::SchedulerConfig;
use common::{Error, Result};
use std::time::Duration;
use tracing::{info, warn};

/// Per-unit execution budget: a timeout on every attempt and a fixed delay
/// between retries of transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
    pub timeout: Duration,
}

#[derive(Debug)]
pub struct UnitOutcome {
    pub attempts: u32,
    pub result: Result<()>,
}

impl RetryPolicy {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            retries: config.retries,
            delay: config.retry_delay(),
            timeout: config.unit_timeout(),
        }
    }

    pub async fn execute(&self, unit: &dyn Unit) -> UnitOutcome {
        let mut attempts = 0;

        loop {
            attempts += 1;
            info!(unit = unit.name(), attempt = attempts, "Running unit");

            let error = match tokio::time::timeout(self.timeout, unit.run()).await {
                Ok(Ok(())) => {
                    return UnitOutcome {
                        attempts,
                        result: Ok(()),
                    };
                }
                Ok(Err(e)) => e,
                Err(_) => Error::Timeout {
                    unit: unit.name().to_string(),
                    secs: self.timeout.as_secs(),
                },
            };

            if !error.is_retryable() || attempts > self.retries {
                return UnitOutcome {
                    attempts,
                    result: Err(error),
                };
            }

            warn!(
                unit = unit.name(),
                attempt = attempts,
                error = %error,
                delay_secs = self.delay.as_secs(),
                "Unit attempt failed, retrying"
            );
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{UnitKind, UnitSpec};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns the scripted results in order, then succeeds.
    struct Scripted {
        spec: UnitSpec,
        script: Mutex<Vec<Result<()>>>,
        hang: bool,
    }

    impl Scripted {
        fn new(script: Vec<Result<()>>) -> Self {
            Self {
                spec: UnitSpec::new("scripted", UnitKind::Load),
                script: Mutex::new(script),
                hang: false,
            }
        }
    }

    #[async_trait]
    impl Unit for Scripted {
        fn spec(&self) -> &UnitSpec {
            &self.spec
        }

        async fn run(&self) -> Result<()> {
            if self.hang {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Ok(())
            } else {
                script.remove(0)
            }
        }
    }

    fn policy(retries: u32) -> RetryPolicy {
        RetryPolicy {
            retries,
            delay: Duration::ZERO,
            timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let unit = Scripted::new(vec![Err(Error::Storage("reset".into()))]);
        let outcome = policy(2).execute(&unit).await;

        assert!(outcome.result.is_ok());
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn test_exhausting_retries_is_terminal() {
        let unit = Scripted::new(vec![
            Err(Error::Storage("1".into())),
            Err(Error::Storage("2".into())),
            Err(Error::Storage("3".into())),
        ]);
        let outcome = policy(2).execute(&unit).await;

        assert_eq!(outcome.attempts, 3);
        assert!(matches!(outcome.result, Err(Error::Storage(ref m)) if m == "3"));
    }

    #[tokio::test]
    async fn test_parse_failure_is_not_retried() {
        let unit = Scripted::new(vec![Err(Error::SchemaValidation("bad row".into()))]);
        let outcome = policy(2).execute(&unit).await;

        assert_eq!(outcome.attempts, 1);
        assert!(matches!(outcome.result, Err(Error::SchemaValidation(_))));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failed_attempt() {
        let mut unit = Scripted::new(Vec::new());
        unit.hang = true;
        let outcome = policy(1).execute(&unit).await;

        assert_eq!(outcome.attempts, 2);
        assert!(matches!(outcome.result, Err(Error::Timeout { .. })));
    }
}
