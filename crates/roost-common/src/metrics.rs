//! Metrics registry for Roost observability
//!
//! Provides OpenTelemetry metrics for:
//! - Instance lifecycle (per-phase occupancy, reconcile outcome and latency)
//! - Update engine (checks, applies, rollbacks)
//! - Data-mover transfers (backups, restores)
//! - Self-configuration requests (applied, denied, failed)

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};

/// Global meter for Roost metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("roost"));

// ============================================================================
// Instance Lifecycle Metrics
// ============================================================================

/// Gauge tracking total instances by phase
///
/// Labels:
/// - `phase`: pending, provisioning, running, updating, failed, terminating,
///   backing_up, restoring
pub static INSTANCES_TOTAL: Lazy<Gauge<i64>> = Lazy::new(|| {
    METER
        .i64_gauge("roost_instances_total")
        .with_description("Total number of instances by phase")
        .with_unit("{instances}")
        .build()
});

/// Histogram of instance reconciliation duration
///
/// Labels:
/// - `result`: success, error, requeue
pub static RECONCILE_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("roost_reconcile_duration_seconds")
        .with_description("Duration of instance reconciliation in seconds")
        .with_unit("s")
        .build()
});

/// Counter of reconciliation outcomes
///
/// Labels:
/// - `controller`: instance, config_request
/// - `result`: success, error
pub static RECONCILE_TOTAL: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("roost_reconcile_total")
        .with_description("Total number of reconcile invocations by outcome")
        .with_unit("{reconciles}")
        .build()
});

// ============================================================================
// Update Engine Metrics
// ============================================================================

/// Counter of update checks against the version registry
///
/// Labels:
/// - `outcome`: accepted, no_newer, blocked, skipped
pub static UPDATE_CHECKS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("roost_update_checks_total")
        .with_description("Total number of update checks by outcome")
        .with_unit("{checks}")
        .build()
});

/// Counter of applied version changes
pub static UPDATE_APPLIES: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("roost_update_applies_total")
        .with_description("Total number of version patches applied")
        .with_unit("{updates}")
        .build()
});

/// Counter of rollbacks after failed health checks
pub static UPDATE_ROLLBACKS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("roost_update_rollbacks_total")
        .with_description("Total number of automatic version rollbacks")
        .with_unit("{rollbacks}")
        .build()
});

// ============================================================================
// Transfer (Backup/Restore) Metrics
// ============================================================================

/// Counter of data-mover job completions
///
/// Labels:
/// - `direction`: backup, restore
/// - `result`: succeeded, failed
pub static TRANSFERS_TOTAL: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("roost_transfers_total")
        .with_description("Total number of completed data-mover jobs by result")
        .with_unit("{jobs}")
        .build()
});

// ============================================================================
// Self-Configuration Metrics
// ============================================================================

/// Counter of configuration change request outcomes
///
/// Labels:
/// - `outcome`: applied, denied, failed
pub static CONFIG_REQUESTS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("roost_config_requests_total")
        .with_description("Total number of terminal configuration change requests by outcome")
        .with_unit("{requests}")
        .build()
});
