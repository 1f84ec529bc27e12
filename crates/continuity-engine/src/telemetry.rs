//! Fire-and-forget telemetry and logging setup.
//!
//! The engine reports pack metrics, governor actions, and safeguard
//! outcomes through a [`TelemetrySink`]; the default sink forwards them as
//! structured `tracing` events. Nothing downstream may depend on delivery.

use anyhow::Result;
use continuity_core::governor::GovernorAction;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// One engine telemetry event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryEvent {
    PackMetrics {
        sub_session_id: String,
        provider: String,
        mode: String,
        cache_hit: bool,
        reused_percent: u8,
        injected_bytes: u64,
    },
    GovernorAction {
        sub_session_id: String,
        action: GovernorAction,
        reasons: Vec<String>,
    },
    Safeguard {
        sub_session_id: String,
        allowed: bool,
        branch: String,
    },
}

pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

/// Default sink: structured `tracing` events at info level.
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn emit(&self, event: TelemetryEvent) {
        match event {
            TelemetryEvent::PackMetrics {
                sub_session_id,
                provider,
                mode,
                cache_hit,
                reused_percent,
                injected_bytes,
            } => tracing::info!(
                sub_session_id,
                provider,
                mode,
                cache_hit,
                reused_percent,
                injected_bytes,
                "pack_metrics"
            ),
            TelemetryEvent::GovernorAction {
                sub_session_id,
                action,
                reasons,
            } => tracing::info!(
                sub_session_id,
                action = %action,
                reasons = reasons.join(";"),
                "governor_action"
            ),
            TelemetryEvent::Safeguard {
                sub_session_id,
                allowed,
                branch,
            } => tracing::info!(sub_session_id, allowed, branch, "safeguard"),
        }
    }
}

/// Sink that records events for assertions in tests.
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl TelemetrySink for CollectingSink {
    fn emit(&self, event: TelemetryEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Initialize console logging for binaries embedding the engine.
///
/// `RUST_LOG` overrides `filter` when set. Call once at startup; library
/// code never installs a subscriber on its own.
pub fn init_logging(json_logs: bool, filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let console_layer = if json_logs {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .init();
    Ok(())
}
