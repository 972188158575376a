//! Webhook delivery transports.
//!
//! A transport performs exactly one delivery attempt; retry policy lives
//! in the dispatcher. The standalone [`NoOpTransport`] is selected
//! explicitly through [`DeliveryMode`], never as an implicit default.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use meridian_core::envelope::EventEnvelope;

/// Why a single delivery attempt failed. Timeouts, connection errors, and
/// non-2xx responses are all retried identically.
#[derive(Debug, Clone, Error)]
pub enum DeliveryFailure {
    /// The attempt exceeded the per-attempt timeout.
    #[error("delivery attempt timed out")]
    Timeout,

    /// The request could not be completed (DNS, connect, malformed URL).
    #[error("transport error: {0}")]
    Transport(String),

    /// The callback answered with a non-2xx status.
    #[error("callback rejected delivery with status {0}")]
    Rejected(u16),
}

impl DeliveryFailure {
    /// Short classification stored as a dead letter's exception type.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "Timeout",
            Self::Transport(_) => "Transport",
            Self::Rejected(_) => "Rejected",
        }
    }
}

/// A single webhook delivery attempt.
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    /// POSTs the envelope to the callback URL.
    async fn deliver(
        &self,
        callback_url: &str,
        envelope: &EventEnvelope,
    ) -> Result<(), DeliveryFailure>;

    /// Name reported by the dispatcher so operators and tests can assert
    /// which mode is active.
    fn name(&self) -> &'static str;
}

/// How deliveries leave the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Real HTTP delivery.
    Http,
    /// Standalone operation: accept everything without I/O.
    NoOp,
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(Self::Http),
            "noop" => Ok(Self::NoOp),
            other => Err(format!("unknown delivery mode: {other}")),
        }
    }
}

impl DeliveryMode {
    /// Builds the transport for this mode.
    #[must_use]
    pub fn transport(self, timeout: Duration) -> Arc<dyn DeliveryTransport> {
        match self {
            Self::Http => Arc::new(HttpTransport::new(timeout)),
            Self::NoOp => Arc::new(NoOpTransport),
        }
    }
}

/// HTTP delivery: a POST of the JSON envelope with a per-attempt timeout.
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Creates a transport with the given per-attempt timeout.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl DeliveryTransport for HttpTransport {
    async fn deliver(
        &self,
        callback_url: &str,
        envelope: &EventEnvelope,
    ) -> Result<(), DeliveryFailure> {
        let response = self
            .client
            .post(callback_url)
            .timeout(self.timeout)
            .json(envelope)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => Ok(()),
            Ok(resp) => Err(DeliveryFailure::Rejected(resp.status().as_u16())),
            Err(err) if err.is_timeout() => Err(DeliveryFailure::Timeout),
            Err(err) => Err(DeliveryFailure::Transport(err.to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Standalone transport: accepts every delivery without touching the
/// network.
pub struct NoOpTransport;

#[async_trait]
impl DeliveryTransport for NoOpTransport {
    async fn deliver(
        &self,
        _callback_url: &str,
        envelope: &EventEnvelope,
    ) -> Result<(), DeliveryFailure> {
        tracing::debug!(event_id = %envelope.event_id, "no-op delivery");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_mode_parses_known_names() {
        assert_eq!("http".parse::<DeliveryMode>().unwrap(), DeliveryMode::Http);
        assert_eq!("noop".parse::<DeliveryMode>().unwrap(), DeliveryMode::NoOp);
        assert!("carrier-pigeon".parse::<DeliveryMode>().is_err());
    }

    #[test]
    fn test_mode_selects_observable_transport() {
        let timeout = Duration::from_secs(5);
        assert_eq!(DeliveryMode::Http.transport(timeout).name(), "http");
        assert_eq!(DeliveryMode::NoOp.transport(timeout).name(), "noop");
    }
}
