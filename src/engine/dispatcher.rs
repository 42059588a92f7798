//! Dispatcher - the per-envelope processing sequence and the worker loop.
//!
//! Order for one inbound envelope:
//!   expiry guard → function → result parser → resolver → test filter → send
//!
//! Failures after the expiry guard travel up as `Failure` (error plus the
//! inbound envelope) and are translated exactly once, at the top. Transport
//! failures are the exception: they go back to the caller untranslated.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::expiry::is_expired;
use super::parser::parse_function_result;
use super::recovery::with_recovery_async;
use super::resolver::{Resolved, RoutingResolver};
use super::translator::ErrorTranslator;
use crate::envelope::{to_json, Envelope};
use crate::function::ComputeFunction;
use crate::transport::{Inbound, Transport};
use crate::types::{Config, Error, Failure, Result};

/// What processing one inbound envelope produced.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// Envelopes sent to their resolved destination.
    pub delivered: usize,
    /// Test envelopes diverted to the filtered-test-messages destination.
    pub filtered: usize,
    /// Error envelopes sent.
    pub errors: usize,
    /// The inbound envelope had expired and was dropped.
    pub expired: bool,
}

impl DispatchReport {
    pub fn expired() -> Self {
        Self {
            expired: true,
            ..Self::default()
        }
    }
}

/// Totals over a `Dispatcher::run` session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: u64,
    pub delivered: u64,
    pub filtered: u64,
    pub errors: u64,
    pub expired: u64,
    /// Envelopes whose processing ended in a transport failure or task panic.
    pub aborted: u64,
}

impl RunSummary {
    fn record(&mut self, outcome: Result<DispatchReport>) {
        self.processed += 1;
        match outcome {
            Ok(report) => {
                self.delivered += report.delivered as u64;
                self.filtered += report.filtered as u64;
                self.errors += report.errors as u64;
                self.expired += u64::from(report.expired);
            }
            Err(_) => self.aborted += 1,
        }
    }
}

/// Routes inbound envelopes through the compute function to the transport.
///
/// Cheap to clone; clones share the transport, function and configuration.
#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<Config>,
    transport: Arc<dyn Transport>,
    function: Arc<dyn ComputeFunction>,
    resolver: RoutingResolver,
    translator: ErrorTranslator,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("destinations", &self.config.destinations)
            .field("resolver", &self.resolver)
            .field("translator", &self.translator)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(
        config: Arc<Config>,
        transport: Arc<dyn Transport>,
        function: Arc<dyn ComputeFunction>,
    ) -> Self {
        let resolver = RoutingResolver::new(config.destinations.default_output.clone());
        let translator = ErrorTranslator::new(config.engine.source_name.clone());
        Self {
            config,
            transport,
            function,
            resolver,
            translator,
        }
    }

    /// Process one inbound envelope against the current time.
    pub async fn process(&self, inbound: Inbound) -> Result<DispatchReport> {
        self.process_at(inbound, Utc::now()).await
    }

    /// Process one inbound envelope, judging expiry against `now`.
    ///
    /// Returns `Err` only for transport failures; every other failure becomes
    /// an error envelope and is reported in `DispatchReport::errors`.
    pub async fn process_at(&self, inbound: Inbound, now: DateTime<Utc>) -> Result<DispatchReport> {
        let Inbound { key, envelope } = inbound;

        if is_expired(&envelope, now) {
            tracing::debug!(
                envelope_id = %envelope.id,
                expiry_date = ?envelope.expiry_date,
                "envelope expired, dropping"
            );
            return Ok(DispatchReport::expired());
        }

        let mut report = DispatchReport::default();
        match self.route(key.as_deref(), &envelope, &mut report).await {
            Ok(()) => Ok(report),
            Err(failure) if failure.error.is_transport() => {
                tracing::error!(
                    envelope_id = %failure.envelope.id,
                    error = %failure.error,
                    "transport send failed"
                );
                Err(failure.error)
            }
            Err(failure) => {
                self.send_error(key.as_deref(), failure).await?;
                report.errors += 1;
                Ok(report)
            }
        }
    }

    async fn route(
        &self,
        key: Option<&str>,
        inbound: &Envelope,
        report: &mut DispatchReport,
    ) -> std::result::Result<(), Failure> {
        let fail = |error: Error| Failure::new(error, inbound.clone());

        let input = to_json(inbound).map_err(fail)?;
        let raw = with_recovery_async(move || self.function.invoke(input), "invoke")
            .await
            .map_err(fail)?;
        let parsed = parse_function_result(raw.as_deref(), inbound).map_err(fail)?;

        // Resolve everything before the first send so a bad slip on one
        // output cannot leave the others half delivered.
        let mut resolved: Vec<Resolved> = Vec::with_capacity(parsed.len());
        for envelope in parsed {
            resolved.extend(self.resolver.resolve(envelope, inbound).map_err(fail)?);
        }

        for Resolved {
            envelope,
            destination,
        } in resolved
        {
            if envelope.is_filter_out_necessary(&destination) {
                let diverted = &self.config.destinations.filtered_test_messages;
                tracing::info!(
                    envelope_id = %envelope.id,
                    suppressed = %destination,
                    diverted_to = %diverted,
                    "test message filtered"
                );
                self.send(diverted, key, &envelope).await.map_err(fail)?;
                report.filtered += 1;
            } else {
                self.send(&destination, key, &envelope).await.map_err(fail)?;
                report.delivered += 1;
            }
        }

        Ok(())
    }

    async fn send_error(&self, key: Option<&str>, failure: Failure) -> Result<()> {
        let destination = self
            .config
            .destinations
            .for_failure(failure.error.failure_kind());

        tracing::warn!(
            envelope_id = %failure.envelope.id,
            correlation_id = ?failure.envelope.correlation_id,
            error = %failure.error,
            destination,
            "processing failed, emitting error envelope"
        );

        let error_envelope = self
            .translator
            .to_error_envelope(&failure.error, Some(&failure.envelope));
        self.send(destination, key, &error_envelope).await
    }

    /// Send through the transport; any error it reports counts as a transport failure.
    async fn send(&self, destination: &str, key: Option<&str>, envelope: &Envelope) -> Result<()> {
        self.transport
            .send(destination, key, envelope)
            .await
            .map_err(|e| match e {
                e @ Error::Transport { .. } => e,
                other => Error::transport(destination, other.to_string()),
            })
    }

    /// Consume `inbound` until it closes or `shutdown` fires, processing up to
    /// `engine.max_in_flight` envelopes concurrently. In-flight work is
    /// finished before returning.
    pub async fn run(
        &self,
        mut inbound: mpsc::Receiver<Inbound>,
        shutdown: CancellationToken,
    ) -> Result<RunSummary> {
        let semaphore = Arc::new(Semaphore::new(self.config.engine.max_in_flight));
        let mut tasks: JoinSet<Result<DispatchReport>> = JoinSet::new();
        let mut summary = RunSummary::default();

        tracing::info!(
            input = %self.config.destinations.default_input,
            max_in_flight = self.config.engine.max_in_flight,
            "dispatcher started"
        );

        loop {
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => permit
                    .map_err(|_| Error::internal("dispatcher semaphore closed"))?,
            };

            let message = tokio::select! {
                _ = shutdown.cancelled() => break,
                message = inbound.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            let dispatcher = self.clone();
            let span = tracing::info_span!(
                "dispatch",
                envelope_id = %message.envelope.id,
                correlation_id = ?message.envelope.correlation_id,
            );
            tasks.spawn(
                async move {
                    let _permit = permit;
                    dispatcher.process(message).await
                }
                .instrument(span),
            );

            while let Some(joined) = tasks.try_join_next() {
                summary.record(flatten(joined));
            }
        }

        while let Some(joined) = tasks.join_next().await {
            summary.record(flatten(joined));
        }

        tracing::info!(
            processed = summary.processed,
            delivered = summary.delivered,
            filtered = summary.filtered,
            errors = summary.errors,
            expired = summary.expired,
            aborted = summary.aborted,
            "dispatcher stopped"
        );

        Ok(summary)
    }
}

fn flatten(
    joined: std::result::Result<Result<DispatchReport>, tokio::task::JoinError>,
) -> Result<DispatchReport> {
    match joined {
        Ok(outcome) => outcome,
        Err(join_err) => {
            tracing::error!(error = %join_err, "dispatch task failed");
            Err(Error::internal(format!("dispatch task failed: {}", join_err)))
        }
    }
}
