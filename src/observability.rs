use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "roombook_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "roombook_query_duration_seconds";

// ── Domain metrics ──────────────────────────────────────────────

/// Counter: reservations successfully created.
pub const RESERVATIONS_CREATED_TOTAL: &str = "roombook_reservations_created_total";

/// Counter: creations refused because the slot was already taken.
pub const RESERVATION_CONFLICTS_TOTAL: &str = "roombook_reservation_conflicts_total";

/// Counter: lifecycle transitions applied. Labels: transition.
pub const TRANSITIONS_TOTAL: &str = "roombook_transitions_total";

/// Counter: reservations completed by the background sweeper.
pub const SWEEPER_COMPLETED_TOTAL: &str = "roombook_sweeper_completed_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "roombook_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "roombook_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "roombook_connections_rejected_total";

/// Counter: startup/auth failures.
pub const AUTH_FAILURES_TOTAL: &str = "roombook_auth_failures_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "roombook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "roombook_wal_flush_batch_size";

/// Gauge: WAL entries written since startup.
pub const WAL_APPENDS: &str = "roombook_wal_appends";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertReservation { .. } => "insert_reservation",
        Command::CancelReservation { .. } => "cancel_reservation",
        Command::Approve { .. } => "approve",
        Command::Reject { .. } => "reject",
        Command::Complete { .. } => "complete",
        Command::SelectReservations { .. } => "select_reservations",
        Command::SelectEvents { .. } => "select_events",
        Command::SelectAvailableSlots { .. } => "select_available_slots",
        Command::SelectStats => "select_stats",
    }
}
