use shared::metrics_defs::{MetricDef, MetricType};

pub const EVENTS: MetricDef = MetricDef {
    name: "relay.events",
    metric_type: MetricType::Counter,
    description: "Webhook events handled. Tagged with outcome (sent, skipped, failed).",
};

pub const BACKEND_DURATION: MetricDef = MetricDef {
    name: "relay.backend.duration",
    metric_type: MetricType::Histogram,
    description: "Time spent in a single backend call in seconds. Tagged with backend.",
};

pub const TIME_SERIES_WRITE_FAILED: MetricDef = MetricDef {
    name: "relay.timeseries.failed",
    metric_type: MetricType::Counter,
    description: "Rejected time-series writes. Tagged with backend.",
};

pub const COUNTER_SEND_FAILED: MetricDef = MetricDef {
    name: "relay.counter.failed",
    metric_type: MetricType::Counter,
    description: "Counter increments the counter backend did not accept. Tagged with backend.",
};

pub const WEBHOOK_REQUESTS: MetricDef = MetricDef {
    name: "webhook.requests",
    metric_type: MetricType::Counter,
    description: "Webhook HTTP requests. Tagged with status.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    EVENTS,
    BACKEND_DURATION,
    TIME_SERIES_WRITE_FAILED,
    COUNTER_SEND_FAILED,
    WEBHOOK_REQUESTS,
];
