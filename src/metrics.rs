// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for satchel-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for choosing the exporter
//! (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `satchel_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//! - `_bytes` suffix for size histograms
//!
//! # Labels
//! - `tier`: memory, disk
//! - `operation`: store, retrieve, remove, cleanup, trim
//! - `status`: hit, miss, success, error

use std::time::Duration;

use metrics::{counter, histogram};

/// Record a cache operation outcome
pub fn record_cache_operation(tier: &str, operation: &str, status: &str) {
    counter!(
        "satchel_cache_operations_total",
        "tier" => tier.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record payload size flowing through the cache
pub fn record_payload_bytes(operation: &str, bytes: usize) {
    histogram!(
        "satchel_cache_payload_bytes",
        "operation" => operation.to_string()
    )
    .record(bytes as f64);
}

/// Record an eviction (memory overflow, expiry, trim, corruption)
pub fn record_eviction(tier: &str, reason: &str) {
    counter!(
        "satchel_cache_evictions_total",
        "tier" => tier.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record a completed sync attempt
pub fn record_sync_attempt(outcome: &str) {
    counter!(
        "satchel_sync_attempts_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record sync attempt latency
pub fn record_sync_duration(duration: Duration) {
    histogram!("satchel_sync_seconds").record(duration.as_secs_f64());
}

/// Record a connectivity edge transition
pub fn record_connectivity_transition(edge: &str) {
    counter!(
        "satchel_connectivity_transitions_total",
        "edge" => edge.to_string()
    )
    .increment(1);
}
