use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Upper bound the backend enforces on one message page.
pub const MAX_MESSAGE_LIMIT: usize = 200;

/// How the active channel stays current after its snapshot is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveUpdate {
    /// The backend pushes a full replacement list on every change.
    Push,
    /// The controller re-fetches the snapshot on a fixed interval.
    Poll { interval: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub live_update: LiveUpdate,
    /// Page size of every snapshot fetch.
    pub message_limit: usize,
    /// Whether the sender's own echo raises a new-message notification.
    pub notify_own_echo: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            live_update: LiveUpdate::Push,
            message_limit: 50,
            notify_own_echo: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationConfig {
    /// Quiet period before an availability lookup is issued.
    pub check_debounce: Duration,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            check_debounce: Duration::from_millis(300),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_url: String,
    pub gateway_url: String,
    pub sync: SyncConfig,
    pub registration: RegistrationConfig,
}

impl ClientConfig {
    /// Reads `ANUBIS_*` variables, falling back to local-development defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_url = var("ANUBIS_API_URL")
            .unwrap_or_else(|| "http://localhost:3000".into())
            .trim_end_matches('/')
            .to_string();
        let gateway_url = match var("ANUBIS_GATEWAY_URL") {
            Some(url) => url,
            None => default_gateway_url(&api_url)?,
        };

        let poll_secs: u64 = var("ANUBIS_POLL_INTERVAL_SECS")
            .unwrap_or_else(|| "3".into())
            .parse()
            .context("ANUBIS_POLL_INTERVAL_SECS must be a whole number of seconds")?;
        if poll_secs == 0 {
            bail!("ANUBIS_POLL_INTERVAL_SECS must be at least 1");
        }

        let live_update = match var("ANUBIS_SYNC_MODE").as_deref().unwrap_or("push") {
            "push" => LiveUpdate::Push,
            "poll" => LiveUpdate::Poll {
                interval: Duration::from_secs(poll_secs),
            },
            other => bail!("ANUBIS_SYNC_MODE must be `push` or `poll`, got `{}`", other),
        };

        let message_limit: usize = var("ANUBIS_MESSAGE_LIMIT")
            .unwrap_or_else(|| "50".into())
            .parse()
            .context("ANUBIS_MESSAGE_LIMIT must be a number")?;

        let notify_own_echo = var("ANUBIS_NOTIFY_OWN_ECHO")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let debounce_ms: u64 = var("ANUBIS_CHECK_DEBOUNCE_MS")
            .unwrap_or_else(|| "300".into())
            .parse()
            .context("ANUBIS_CHECK_DEBOUNCE_MS must be a number of milliseconds")?;

        Ok(Self {
            api_url,
            gateway_url,
            sync: SyncConfig {
                live_update,
                message_limit: message_limit.clamp(1, MAX_MESSAGE_LIMIT),
                notify_own_echo,
            },
            registration: RegistrationConfig {
                check_debounce: Duration::from_millis(debounce_ms),
            },
        })
    }
}

fn default_gateway_url(api_url: &str) -> Result<String> {
    if let Some(rest) = api_url.strip_prefix("https://") {
        Ok(format!("wss://{}/gateway", rest))
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        Ok(format!("ws://{}/gateway", rest))
    } else {
        bail!("ANUBIS_API_URL must start with http:// or https://, got `{}`", api_url)
    }
}
