//! Test transport — a `DeliveryTransport` with scripted outcomes.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use meridian_core::envelope::EventEnvelope;
use meridian_dispatch::{DeliveryFailure, DeliveryTransport};
use uuid::Uuid;

type Outcome = Result<(), DeliveryFailure>;

/// A transport that records every delivery attempt and answers from a
/// per-URL script. When a URL's script runs out (or none was set), the
/// default outcome applies.
pub struct ScriptedTransport {
    default: Outcome,
    scripts: Mutex<HashMap<String, VecDeque<Outcome>>>,
    attempts: Mutex<Vec<(String, EventEnvelope)>>,
}

impl ScriptedTransport {
    /// A transport where every attempt succeeds.
    #[must_use]
    pub fn always_ok() -> Self {
        Self::with_default(Ok(()))
    }

    /// A transport where every attempt fails with the given failure.
    #[must_use]
    pub fn always_failing(failure: DeliveryFailure) -> Self {
        Self::with_default(Err(failure))
    }

    /// A transport with the given default outcome.
    #[must_use]
    pub fn with_default(default: Outcome) -> Self {
        Self {
            default,
            scripts: Mutex::new(HashMap::new()),
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// Queue outcomes for one URL, consumed in order before the default
    /// applies.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn script(&self, url: impl Into<String>, outcomes: Vec<Outcome>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(url.into())
            .or_default()
            .extend(outcomes);
    }

    /// Every attempt made so far, in order: `(url, envelope)`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn attempts(&self) -> Vec<(String, EventEnvelope)> {
        self.attempts.lock().unwrap().clone()
    }

    /// Event IDs attempted against one URL, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn attempted_event_ids(&self, url: &str) -> Vec<Uuid> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|(attempted_url, _)| attempted_url == url)
            .map(|(_, envelope)| envelope.event_id)
            .collect()
    }
}

#[async_trait]
impl DeliveryTransport for ScriptedTransport {
    async fn deliver(
        &self,
        callback_url: &str,
        envelope: &EventEnvelope,
    ) -> Result<(), DeliveryFailure> {
        self.attempts
            .lock()
            .unwrap()
            .push((callback_url.to_owned(), envelope.clone()));

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(callback_url)
            .and_then(VecDeque::pop_front);

        scripted.unwrap_or_else(|| self.default.clone())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
