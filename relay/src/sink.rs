use crate::errors::SinkError;
use crate::normalize::NormalizedPoint;
use async_trait::async_trait;

/// A time-series store accepting points for a named measurement.
#[async_trait]
pub trait TimeSeriesSink: Send + Sync {
    fn name(&self) -> &'static str;

    /// Write all `points` to `measurement` in a single request.
    async fn write_points(
        &self,
        measurement: &str,
        points: &[NormalizedPoint],
    ) -> Result<(), SinkError>;
}

/// A counter aggregation service accepting named increments.
#[async_trait]
pub trait CounterSink: Send + Sync {
    fn name(&self) -> &'static str;

    /// Increment counter `name` by `value` at `timestamp` (Unix seconds).
    async fn increment(&self, name: &str, value: u64, timestamp: i64) -> Result<(), SinkError>;
}
