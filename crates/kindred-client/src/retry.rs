use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// How many times a network call is attempted before its error is surfaced.
///
/// The default is a single attempt: neither the history request nor the
/// channel connect is retried unless a policy is configured explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryPolicy {
    #[default]
    None,
    Fixed { attempts: u32, delay: Duration },
}

impl RetryPolicy {
    /// Builds a policy from an attempt count; one attempt (or zero) means no retry.
    pub fn fixed(attempts: u32, delay: Duration) -> Self {
        if attempts <= 1 {
            Self::None
        } else {
            Self::Fixed { attempts, delay }
        }
    }

    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::Fixed { attempts, .. } => (*attempts).max(1),
        }
    }

    /// Run `op` until it succeeds or the attempts are used up.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let max = self.max_attempts();
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max => {
                    warn!("{} failed (attempt {}/{}): {}", what, attempt, max, e);
                    if let Self::Fixed { delay, .. } = self {
                        tokio::time::sleep(*delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Pause before a dropped link opens a new socket, unless configured otherwise.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// What a live link does after its socket drops or fails to open.
///
/// Reconnecting is on by default: the link keeps opening new sockets and
/// reports `Connected` again on each one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconnect {
    Never,
    After {
        delay: Duration,
        /// Consecutive failed sockets tolerated; `None` keeps trying.
        max_attempts: Option<u32>,
    },
}

impl Default for Reconnect {
    fn default() -> Self {
        Self::after(DEFAULT_RECONNECT_DELAY)
    }
}

impl Reconnect {
    /// Keep reconnecting, waiting `delay` before each new socket.
    pub fn after(delay: Duration) -> Self {
        Self::After {
            delay,
            max_attempts: None,
        }
    }

    /// Delay before reconnect number `attempt` (1-based), or `None` to give up.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::Never => None,
            Self::After { max_attempts: Some(max), .. } if attempt > *max => None,
            Self::After { delay, .. } => Some(*delay),
        }
    }
}
