use crate::error::{Error, Result};
use std::time::Duration;

/// Base throttle unit: worker `i` pauses `(i % 128) * throttle` between drain
/// passes, and a pool of `n` workers sets its queue lock's throttle to
/// `n * throttle`.
pub const DEFAULT_THROTTLE: Duration = Duration::from_nanos(8_388_608);

#[derive(Debug, Clone)]
pub struct Config {
    pub num_threads: Option<usize>,
    pub throttle: Duration,
    pub thread_name_prefix: String,
    pub stack_size: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_threads: None,
            throttle: DEFAULT_THROTTLE,
            thread_name_prefix: "defer-worker".to_string(),
            stack_size: Some(2 * 1024 * 1024),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(n) = self.num_threads {
            if n == 0 {
                return Err(Error::config("num_threads must be > 0"));
            }
        }

        if self.thread_name_prefix.contains('\0') {
            return Err(Error::config("thread_name_prefix must not contain NUL"));
        }

        if let Some(size) = self.stack_size {
            if size == 0 {
                return Err(Error::config("stack_size must be > 0"));
            }
        }

        Ok(())
    }

    pub fn worker_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(num_cpus::get)
    }

    /// Copy of this config with the worker count replaced.
    pub fn with_num_threads(&self, n: usize) -> Self {
        Self {
            num_threads: Some(n),
            ..self.clone()
        }
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn num_threads(mut self, n: usize) -> Self {
        self.config.num_threads = Some(n);
        self
    }

    pub fn throttle(mut self, throttle: Duration) -> Self {
        self.config.throttle = throttle;
        self
    }

    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.throttle, DEFAULT_THROTTLE);
        assert!(config.worker_threads() >= 1);
    }

    #[test]
    fn test_builder_rejects_zero_threads() {
        let result = Config::builder().num_threads(0).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_large_thread_counts_are_accepted() {
        let config = Config::builder().num_threads(4096).build().unwrap();
        assert_eq!(config.worker_threads(), 4096);
        assert!(Config::default().with_num_threads(1100).validate().is_ok());
    }

    #[test]
    fn test_with_num_threads_keeps_other_fields() {
        let config = Config::builder()
            .throttle(Duration::from_micros(50))
            .thread_name_prefix("fork")
            .build()
            .unwrap();

        let sized = config.with_num_threads(3);
        assert_eq!(sized.worker_threads(), 3);
        assert_eq!(sized.throttle, Duration::from_micros(50));
        assert_eq!(sized.thread_name_prefix, "fork");
    }
}
