use crate::config::BackendsConfig;
use crate::errors::{RelayError, Result, SinkError};
use crate::event::WebhookEvent;
use crate::influx::InfluxSink;
use crate::metrics_defs::{BACKEND_DURATION, COUNTER_SEND_FAILED, EVENTS, TIME_SERIES_WRITE_FAILED};
use crate::normalize::{CounterEmission, MEASUREMENT, derive_metrics};
use crate::sink::{CounterSink, TimeSeriesSink};
use crate::stathat::StatHatSink;
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Upper bound on events of one batch relayed at the same time.
const MAX_CONCURRENT_EVENTS: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Metrics were handed to every configured backend.
    Sent,
    /// Ping event without a record; nothing to send.
    Skipped,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Turns webhook events into metrics and fans them out to the configured backends.
///
/// Either backend may be absent. With both present, the time-series write
/// happens first and a rejected write returns before any counter is sent.
#[derive(Clone)]
pub struct MetricsRelay {
    time_series: Option<Arc<dyn TimeSeriesSink>>,
    counters: Option<Arc<dyn CounterSink>>,
}

impl MetricsRelay {
    pub fn new(
        time_series: Option<Arc<dyn TimeSeriesSink>>,
        counters: Option<Arc<dyn CounterSink>>,
    ) -> Self {
        MetricsRelay {
            time_series,
            counters,
        }
    }

    /// Build HTTP sinks for every enabled backend.
    pub fn from_config(config: &BackendsConfig) -> Result<Self> {
        let time_series = match config.influxdb.enabled {
            true => {
                let sink = InfluxSink::new(&config.influxdb).map_err(RelayError::BackendSetup)?;
                Some(Arc::new(sink) as Arc<dyn TimeSeriesSink>)
            }
            false => None,
        };

        let counters = match config.stathat.enabled {
            true => {
                let sink = StatHatSink::new(&config.stathat).map_err(RelayError::BackendSetup)?;
                Some(Arc::new(sink) as Arc<dyn CounterSink>)
            }
            false => None,
        };

        Ok(Self::new(time_series, counters))
    }

    pub fn is_enabled(&self) -> bool {
        self.time_series.is_some() || self.counters.is_some()
    }

    /// Derive the point and counters for one event and send them.
    ///
    /// Resolves once the time-series write has completed and every counter
    /// increment has settled. Counter failures are logged, not returned.
    pub async fn process_and_send_metrics(&self, event: &WebhookEvent) -> Result<Outcome> {
        let Some((category, record)) = event.category()? else {
            return Ok(Outcome::Skipped);
        };
        let derived = derive_metrics(category, record)?;

        if let Some(sink) = &self.time_series {
            let start = Instant::now();
            let result = sink
                .write_points(MEASUREMENT, std::slice::from_ref(&derived.point))
                .await;
            histogram!(BACKEND_DURATION, "backend" => sink.name())
                .record(start.elapsed().as_secs_f64());

            if let Err(e) = result {
                counter!(TIME_SERIES_WRITE_FAILED, "backend" => sink.name()).increment(1);
                return Err(RelayError::BackendWrite(e));
            }
        }

        if let Some(sink) = &self.counters {
            send_counters(sink.clone(), derived.counters).await;
        }

        Ok(Outcome::Sent)
    }

    /// Relay every event of one webhook delivery, continuing past failures.
    ///
    /// Elements are decoded one by one so a malformed event only fails itself.
    /// Events are relayed concurrently, at most `MAX_CONCURRENT_EVENTS` at a time.
    pub async fn process_batch(&self, events: Vec<serde_json::Value>) -> BatchSummary {
        let mut summary = BatchSummary::default();
        let mut join_set = JoinSet::new();
        let permits = Arc::new(Semaphore::new(MAX_CONCURRENT_EVENTS));

        for raw in events {
            let event = match serde_json::from_value::<WebhookEvent>(raw) {
                Ok(event) => event,
                Err(e) => {
                    tracing::error!("Failed to decode webhook event: {e}");
                    summary.failed += 1;
                    continue;
                }
            };

            let relay = self.clone();
            let permits = permits.clone();
            join_set.spawn(async move {
                // The semaphore is never closed
                let _permit = permits.acquire_owned().await.ok();
                relay.process_and_send_metrics(&event).await
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(Outcome::Sent)) => summary.sent += 1,
                Ok(Ok(Outcome::Skipped)) => summary.skipped += 1,
                Ok(Err(e)) => {
                    tracing::error!("Failed to relay webhook event: {e}");
                    summary.failed += 1;
                }
                Err(e) => {
                    tracing::error!("Task panicked: {}", e);
                    summary.failed += 1;
                }
            }
        }

        counter!(EVENTS, "outcome" => "sent").increment(summary.sent as u64);
        counter!(EVENTS, "outcome" => "skipped").increment(summary.skipped as u64);
        counter!(EVENTS, "outcome" => "failed").increment(summary.failed as u64);

        summary
    }
}

/// Send all increments concurrently and wait for each one to settle.
async fn send_counters(sink: Arc<dyn CounterSink>, counters: Vec<CounterEmission>) {
    let mut join_set = JoinSet::new();

    for emission in counters {
        let sink = sink.clone();
        join_set.spawn(async move {
            let start = Instant::now();
            let result = sink
                .increment(&emission.name, emission.value, emission.timestamp)
                .await;
            histogram!(BACKEND_DURATION, "backend" => sink.name())
                .record(start.elapsed().as_secs_f64());
            (emission.name, result)
        });
    }

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((_, Ok(()))) => {}
            Ok((name, Err(e))) => report_counter_failure(sink.name(), &name, &e),
            Err(e) => tracing::error!("Task panicked: {}", e),
        }
    }
}

fn report_counter_failure(backend: &'static str, name: &str, error: &SinkError) {
    tracing::warn!("Counter {name} was not accepted by {backend}: {error}");
    counter!(COUNTER_SEND_FAILED, "backend" => backend).increment(1);
}
