//! Metrics definitions for the downloader.

use shared::metrics_defs::{MetricDef, MetricType};

pub const TRANSFER_REQUESTS: MetricDef = MetricDef {
    name: "transfer.requests",
    metric_type: MetricType::Counter,
    description: "Number of transfer requests received",
};

pub const TRANSFER_FAILURES: MetricDef = MetricDef {
    name: "transfer.failures",
    metric_type: MetricType::Counter,
    description: "Number of transfers that failed, tagged by failing stage",
};

pub const TRANSFER_DURATION: MetricDef = MetricDef {
    name: "transfer.duration",
    metric_type: MetricType::Histogram,
    description: "Time to complete a transfer in seconds",
};

pub const TRANSFER_RECORDS: MetricDef = MetricDef {
    name: "transfer.records",
    metric_type: MetricType::Histogram,
    description: "Number of NDJSON records written per transfer",
};

pub const TRANSFER_BYTES: MetricDef = MetricDef {
    name: "transfer.bytes",
    metric_type: MetricType::Histogram,
    description: "Raw bytes downloaded from the source API per transfer",
};

pub const RETRY_ATTEMPTS_FAILED: MetricDef = MetricDef {
    name: "retry.attempts_failed",
    metric_type: MetricType::Counter,
    description: "Failed attempts of retried network operations, tagged by operation",
};

pub const ALL_METRICS: &[MetricDef] = &[
    TRANSFER_REQUESTS,
    TRANSFER_FAILURES,
    TRANSFER_DURATION,
    TRANSFER_RECORDS,
    TRANSFER_BYTES,
    RETRY_ATTEMPTS_FAILED,
];
