use std::time::Duration;

use url::Url;

use crate::clock::TimeDisplay;
use crate::error::{ChatError, Result};
use crate::retry::{DEFAULT_RECONNECT_DELAY, Reconnect, RetryPolicy};
use crate::session::{Credentials, DEFAULT_COOKIE_NAME};

const DEFAULT_API_URL: &str = "http://localhost:3000";
const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// Client configuration, read from `KINDRED_*` environment variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: Url,
    pub socket_url: Url,
    pub credentials: Credentials,
    pub retry: RetryPolicy,
    /// What the channel does after its socket drops. Reconnects by default.
    pub reconnect: Reconnect,
    /// No timeout unless configured.
    pub request_timeout: Option<Duration>,
    pub time_display: TimeDisplay,
}

impl ClientConfig {
    /// Defaults for an API at `api_url`, with the channel at `/socket` on the same host.
    pub fn new(api_url: Url) -> Result<Self> {
        let socket_url = socket_url_for(&api_url)?;
        Ok(Self {
            api_url,
            socket_url,
            credentials: Credentials::default(),
            retry: RetryPolicy::None,
            reconnect: Reconnect::default(),
            request_timeout: None,
            time_display: TimeDisplay::Local,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_url = Url::parse(&var("KINDRED_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into()))?;
        let mut config = Self::new(api_url)?;

        if let Some(socket) = var("KINDRED_SOCKET_URL") {
            config.socket_url = Url::parse(&socket)?;
        }

        config.credentials = Credentials {
            cookie_name: var("KINDRED_SESSION_COOKIE").unwrap_or_else(|| DEFAULT_COOKIE_NAME.into()),
            token: var("KINDRED_SESSION_TOKEN"),
        };

        let attempts: u32 = parse_var(&var, "KINDRED_RETRY_ATTEMPTS")?.unwrap_or(1);
        let delay_ms: u64 =
            parse_var(&var, "KINDRED_RETRY_DELAY_MS")?.unwrap_or(DEFAULT_RETRY_DELAY_MS);
        config.retry = RetryPolicy::fixed(attempts, Duration::from_millis(delay_ms));

        let reconnect_ms: Option<u64> = parse_var(&var, "KINDRED_RECONNECT_DELAY_MS")?;
        let reconnect_delay = reconnect_ms.map_or(DEFAULT_RECONNECT_DELAY, Duration::from_millis);
        config.reconnect = match parse_var::<u32, _>(&var, "KINDRED_RECONNECT_ATTEMPTS")? {
            Some(0) => Reconnect::Never,
            max_attempts => Reconnect::After {
                delay: reconnect_delay,
                max_attempts,
            },
        };

        config.request_timeout =
            parse_var::<u64, _>(&var, "KINDRED_REQUEST_TIMEOUT_SECS")?.map(Duration::from_secs);

        if let Some(minutes) = parse_var::<i32, _>(&var, "KINDRED_UTC_OFFSET_MINUTES")? {
            config.time_display = TimeDisplay::from_offset_minutes(minutes).ok_or_else(|| {
                ChatError::Config(format!("KINDRED_UTC_OFFSET_MINUTES out of range: {}", minutes))
            })?;
        }

        Ok(config)
    }

    /// HTTP client shared by the history and profile requests.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }
}

fn parse_var<T, F>(var: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| ChatError::Config(format!("{} = {:?}: {}", key, raw, e)))
        })
        .transpose()
}

/// `http(s)://host[/prefix]` -> `ws(s)://host/socket`.
fn socket_url_for(api_url: &Url) -> Result<Url> {
    let scheme = match api_url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(ChatError::Config(format!("unsupported api scheme: {}", other))),
    };

    let mut url = api_url.clone();
    url.set_scheme(scheme)
        .map_err(|_| ChatError::Config(format!("cannot derive socket url from {}", api_url)))?;
    url.set_path("/socket");
    url.set_query(None);
    Ok(url)
}
