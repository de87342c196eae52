//! One worker thread per provider, results gathered over a channel.
//!
//! ```text
//!            ┌─► worker(codex)  ─┐
//! message ───┤                   ├─► channel ─► BTreeMap<Provider, DispatchResult>
//!            └─► worker(gemini) ─┘
//! ```
//!
//! A worker owns its communicator for the whole exchange; nothing mutable is
//! shared between providers. A failing or slow provider only ever affects
//! its own entry.

use crossbeam_channel::unbounded;
use serde::Serialize;
use std::collections::BTreeMap;
use std::thread;
use std::time::{Duration, Instant};

use super::error::DispatchError;
use crate::comm::{AskError, Communicator};
use crate::types::Provider;
use crate::{debug_event, log_event};

const TIMEOUT_MESSAGE: &str = "Timeout waiting for reply";

/// Outcome for one provider in a fan-out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchResult {
    pub provider: Provider,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Message delivered without waiting for the reply.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub sent: bool,
    pub elapsed_seconds: f64,
}

impl DispatchResult {
    fn replied(provider: Provider, reply: String, started: Instant) -> Self {
        Self {
            provider,
            success: true,
            reply: Some(reply),
            error: None,
            sent: false,
            elapsed_seconds: seconds_since(started),
        }
    }

    fn sent(provider: Provider, started: Instant) -> Self {
        Self {
            provider,
            success: true,
            reply: None,
            error: None,
            sent: true,
            elapsed_seconds: seconds_since(started),
        }
    }

    fn failed(provider: Provider, error: impl Into<String>, started: Instant) -> Self {
        Self {
            provider,
            success: false,
            reply: None,
            error: Some(error.into()),
            sent: false,
            elapsed_seconds: seconds_since(started),
        }
    }
}

fn seconds_since(started: Instant) -> f64 {
    (started.elapsed().as_secs_f64() * 10.0).round() / 10.0
}

/// Every provider's result, keyed by provider.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub results: BTreeMap<Provider, DispatchResult>,
    pub elapsed_seconds: f64,
}

impl DispatchReport {
    /// True when at least one provider ran and none failed.
    pub fn all_succeeded(&self) -> bool {
        !self.results.is_empty() && self.results.values().all(|result| result.success)
    }

    pub fn get(&self, provider: Provider) -> Option<&DispatchResult> {
        self.results.get(&provider)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Results in provider order.
    pub fn iter(&self) -> impl Iterator<Item = &DispatchResult> {
        self.results.values()
    }

    /// Providers that failed, in provider order.
    pub fn failures(&self) -> impl Iterator<Item = &DispatchResult> {
        self.results.values().filter(|result| !result.success)
    }
}

/// Fans a message out through communicators built by a factory.
pub struct Dispatcher<'o, F> {
    factory: F,
    unlimited_cap: Duration,
    observer: Option<Box<dyn Fn(&DispatchResult) + 'o>>,
}

impl<'o, F> Dispatcher<'o, F>
where
    F: Fn(Provider) -> Result<Communicator, AskError> + Sync,
{
    /// `factory` is called once per provider, on that provider's worker thread.
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            unlimited_cap: Duration::from_secs(600),
            observer: None,
        }
    }

    /// Effective timeout when asked to wait without limit.
    pub fn with_unlimited_cap(mut self, cap: Duration) -> Self {
        self.unlimited_cap = cap;
        self
    }

    /// Called on the collecting thread as each provider finishes.
    pub fn with_observer(mut self, observer: impl Fn(&DispatchResult) + 'o) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Send `message` to every provider concurrently.
    ///
    /// With `wait`, each worker waits up to `timeout` (`0` means the
    /// unlimited cap) for a reply; without it, workers return once the
    /// message is delivered.
    pub fn parallel_ask(
        &self,
        message: &str,
        providers: &[Provider],
        timeout: Duration,
        wait: bool,
    ) -> Result<DispatchReport, DispatchError> {
        if message.trim().is_empty() {
            return Err(DispatchError::EmptyMessage);
        }
        let mut unique: Vec<Provider> = Vec::with_capacity(providers.len());
        for provider in providers {
            if !unique.contains(provider) {
                unique.push(*provider);
            }
        }
        if unique.is_empty() {
            return Err(DispatchError::EmptyProviders);
        }

        let timeout = if timeout.is_zero() {
            self.unlimited_cap
        } else {
            timeout
        };
        log_event!(
            "dispatch",
            "started",
            "{} provider(s), timeout {}s, wait {wait}",
            unique.len(),
            timeout.as_secs()
        );

        let started = Instant::now();
        let (result_tx, result_rx) = unbounded();
        let mut results = BTreeMap::new();

        thread::scope(|scope| {
            let handles: Vec<_> = unique
                .iter()
                .map(|&provider| {
                    let result_tx = result_tx.clone();
                    let factory = &self.factory;
                    let handle = scope.spawn(move || {
                        let result = run_provider(factory, provider, message, timeout, wait);
                        // Receiver outlives every worker
                        let _ = result_tx.send(result);
                    });
                    (provider, handle)
                })
                .collect();
            drop(result_tx);

            for result in result_rx.iter() {
                debug_event!(
                    "dispatch",
                    "result",
                    "{} success={} in {:.1}s",
                    result.provider,
                    result.success,
                    result.elapsed_seconds
                );
                if let Some(observer) = self.observer.as_ref() {
                    observer(&result);
                }
                results.entry(result.provider).or_insert(result);
            }

            // Wait for all threads; a panicked worker still gets an entry
            for (provider, handle) in handles {
                if handle.join().is_err() {
                    tracing::error!("[dispatch] worker for {provider} panicked");
                    results
                        .entry(provider)
                        .or_insert_with(|| DispatchResult::failed(provider, "Worker panicked", started));
                }
            }
        });

        let report = DispatchReport {
            results,
            elapsed_seconds: seconds_since(started),
        };
        log_event!(
            "dispatch",
            "finished",
            "{}/{} succeeded in {:.1}s",
            report.iter().filter(|result| result.success).count(),
            report.len(),
            report.elapsed_seconds
        );
        Ok(report)
    }
}

fn run_provider<F>(
    factory: &F,
    provider: Provider,
    message: &str,
    timeout: Duration,
    wait: bool,
) -> DispatchResult
where
    F: Fn(Provider) -> Result<Communicator, AskError>,
{
    let started = Instant::now();
    let mut comm = match factory(provider) {
        Ok(comm) => comm,
        Err(e) => return DispatchResult::failed(provider, e.to_string(), started),
    };

    if !wait {
        return match comm.ask_async(message) {
            Ok(_) => DispatchResult::sent(provider, started),
            Err(e) => DispatchResult::failed(provider, e.to_string(), started),
        };
    }

    match comm.send_and_wait(message, timeout) {
        Ok(Some(reply)) => DispatchResult::replied(provider, reply.text, started),
        Ok(None) => DispatchResult::failed(provider, TIMEOUT_MESSAGE, started),
        Err(e) => DispatchResult::failed(provider, e.to_string(), started),
    }
}
