//! # Telemetry
//!
//! Tracing subscriber setup and the gateway's counters. Counters go through
//! the `metrics` facade; without an installed recorder they are no-ops.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Install the global subscriber. `RUST_LOG` overrides the default `info`
/// filter. Returns an error if a subscriber is already installed.
pub fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?,
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()?,
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

pub fn record_envelope(direction: Direction, outcome: &'static str) {
    metrics::counter!(
        "satp_envelopes_total",
        "direction" => direction.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_transition(status: &'static str) {
    metrics::counter!("satp_transitions_total", "status" => status).increment(1);
}

pub fn record_rollback(outcome: &'static str) {
    metrics::counter!("satp_rollbacks_total", "outcome" => outcome).increment(1);
}
