use crate::error::{QueueError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Default folder, relative to the store root, holding every queue directory.
pub const DEFAULT_QUEUE_FOLDER: &str = "RecipeQueue";

/// Retry policy for index allocation.
///
/// When two producers enqueue into the same execution at the same time they
/// can compute the same next index. The loser of the exclusive create
/// rescans the directory and tries again according to this policy.
///
/// # Examples
///
/// ```
/// use stepqueue::RetryPolicy;
/// use std::time::Duration;
///
/// // No retry: a collision fails the enqueue
/// let policy = RetryPolicy::None;
///
/// // Fixed delay: retry 3 times with 5ms delay
/// let policy = RetryPolicy::fixed(3, Duration::from_millis(5));
///
/// // Exponential backoff: retry 8 times starting at 1ms
/// let policy = RetryPolicy::exponential(8, Duration::from_millis(1));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// No retry - fail on the first collision.
    #[default]
    None,
    /// Fixed delay between retries.
    Fixed {
        /// Maximum number of retry attempts
        max_retries: u32,
        /// Delay between each retry
        delay: Duration,
    },
    /// Exponential backoff with configurable parameters.
    ExponentialBackoff {
        /// Maximum number of retry attempts
        max_retries: u32,
        /// Initial delay before first retry
        initial_delay: Duration,
        /// Maximum delay cap
        max_delay: Duration,
        /// Multiplier for each retry (e.g., 2 doubles the delay)
        multiplier: u32,
    },
}

impl RetryPolicy {
    /// Creates a fixed retry policy.
    ///
    /// ```
    /// use stepqueue::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::fixed(3, Duration::from_millis(5));
    /// assert_eq!(policy.max_retries(), 3);
    /// assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(5)));
    /// ```
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        RetryPolicy::Fixed { max_retries, delay }
    }

    /// Creates an exponential backoff policy doubling up to one second.
    ///
    /// ```
    /// use stepqueue::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::exponential(5, Duration::from_millis(1));
    ///
    /// // Delays: 1ms, 2ms, 4ms, 8ms, 16ms
    /// assert_eq!(policy.delay_for_attempt(0), Some(Duration::from_millis(1)));
    /// assert_eq!(policy.delay_for_attempt(3), Some(Duration::from_millis(8)));
    /// ```
    pub fn exponential(max_retries: u32, initial_delay: Duration) -> Self {
        RetryPolicy::ExponentialBackoff {
            max_retries,
            initial_delay,
            max_delay: Duration::from_secs(1),
            multiplier: 2,
        }
    }

    /// Creates an exponential backoff policy with custom settings.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Configuration`] if `multiplier` is 0 or greater
    /// than 10, or if `max_delay` is less than `initial_delay`.
    pub fn exponential_backoff(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: u32,
    ) -> Result<Self> {
        if multiplier == 0 {
            return Err(QueueError::Configuration(
                "multiplier must be greater than 0".to_string(),
            ));
        }
        if multiplier > 10 {
            return Err(QueueError::Configuration(
                "multiplier must be 10 or less to avoid overflow".to_string(),
            ));
        }
        if max_delay < initial_delay {
            return Err(QueueError::Configuration(
                "max_delay must be >= initial_delay".to_string(),
            ));
        }
        Ok(RetryPolicy::ExponentialBackoff {
            max_retries,
            initial_delay,
            max_delay,
            multiplier,
        })
    }

    /// Returns the maximum number of retries for this policy.
    pub fn max_retries(&self) -> u32 {
        match self {
            RetryPolicy::None => 0,
            RetryPolicy::Fixed { max_retries, .. } => *max_retries,
            RetryPolicy::ExponentialBackoff { max_retries, .. } => *max_retries,
        }
    }

    /// Calculates the delay before the given retry attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            RetryPolicy::None => None,
            RetryPolicy::Fixed { delay, .. } => Some(*delay),
            RetryPolicy::ExponentialBackoff {
                initial_delay,
                max_delay,
                multiplier,
                ..
            } => {
                let factor = (*multiplier as u64).saturating_pow(attempt);
                let delay = (initial_delay.as_millis() as u64).saturating_mul(factor);
                Some(Duration::from_millis(
                    delay.min(max_delay.as_millis() as u64),
                ))
            }
        }
    }
}

/// Queue configuration.
///
/// # Examples
///
/// ```
/// use stepqueue::{QueueConfig, RetryPolicy};
///
/// let config = QueueConfig::default();
/// assert_eq!(config.queue_folder.to_str(), Some("RecipeQueue"));
/// assert_eq!(config.collision_retry.max_retries(), 8);
///
/// let strict = QueueConfig {
///     collision_retry: RetryPolicy::None,
///     ..QueueConfig::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Folder, relative to the store root, holding one directory per execution.
    /// Default: `RecipeQueue`.
    pub queue_folder: PathBuf,
    /// What to do when a concurrent producer takes the computed index.
    /// Default: exponential backoff, 8 retries from 1ms.
    pub collision_retry: RetryPolicy,
    /// Filter directive for the binary's log output. Default: `info`.
    pub log_level: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_folder: PathBuf::from(DEFAULT_QUEUE_FOLDER),
            collision_retry: RetryPolicy::exponential(8, Duration::from_millis(1)),
            log_level: "info".to_string(),
        }
    }
}

impl QueueConfig {
    /// Loads configuration from environment variables, falling back to the
    /// defaults for anything unset.
    ///
    /// - `STEPQ_QUEUE_FOLDER` - queue folder
    /// - `STEPQ_COLLISION_RETRIES` - retry count; `0` disables retries
    /// - `STEPQ_COLLISION_DELAY_MS` - fixed delay between retries; when unset
    ///   retries back off exponentially from 1ms
    /// - `STEPQ_LOG_LEVEL` - log filter
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Configuration`] if a numeric variable does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(folder) = lookup("STEPQ_QUEUE_FOLDER") {
            config.queue_folder = PathBuf::from(folder);
        }

        let retries = lookup("STEPQ_COLLISION_RETRIES")
            .map(|v| parse_var::<u32>("STEPQ_COLLISION_RETRIES", &v))
            .transpose()?;
        let delay_ms = lookup("STEPQ_COLLISION_DELAY_MS")
            .map(|v| parse_var::<u64>("STEPQ_COLLISION_DELAY_MS", &v))
            .transpose()?;
        config.collision_retry = match (retries, delay_ms) {
            (Some(0), _) => RetryPolicy::None,
            (retries, Some(ms)) => {
                RetryPolicy::fixed(retries.unwrap_or(8), Duration::from_millis(ms))
            }
            (Some(n), None) => RetryPolicy::exponential(n, Duration::from_millis(1)),
            (None, None) => config.collision_retry.clone(),
        };

        if let Some(level) = lookup("STEPQ_LOG_LEVEL") {
            config.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks that the queue folder stays inside the store root.
    pub fn validate(&self) -> Result<()> {
        if self.queue_folder.is_absolute() {
            return Err(QueueError::Configuration(format!(
                "queue folder '{}' must be relative to the store root",
                self.queue_folder.display()
            )));
        }
        if self
            .queue_folder
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(QueueError::Configuration(format!(
                "queue folder '{}' must not leave the store root",
                self.queue_folder.display()
            )));
        }
        // execution directories must not share the store root itself
        if !self
            .queue_folder
            .components()
            .any(|c| matches!(c, std::path::Component::Normal(_)))
        {
            return Err(QueueError::Configuration(format!(
                "queue folder '{}' must name a directory below the store root",
                self.queue_folder.display()
            )));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| QueueError::Configuration(format!("{name}={value:?}: {e}")))
}
