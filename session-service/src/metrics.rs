use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, TextEncoder};

pub static ACTIVE_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "session_service_active_connections",
        "Currently connected WebSocket clients",
    )
    .expect("failed to create session_service_active_connections");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register session_service_active_connections");
    gauge
});

pub static COMMANDS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "session_service_commands_total",
            "Client commands dispatched, by command type and outcome",
        ),
        &["command", "outcome"],
    )
    .expect("failed to create session_service_commands_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register session_service_commands_total");
    counter
});

pub static MESSAGES_ROUTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "session_service_messages_routed_total",
        "Chat messages persisted and fanned out",
    )
    .expect("failed to create session_service_messages_routed_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register session_service_messages_routed_total");
    counter
});

pub static RATE_LIMITED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "session_service_rate_limited_total",
        "Commands rejected by the per-connection rate limiter",
    )
    .expect("failed to create session_service_rate_limited_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register session_service_rate_limited_total");
    counter
});

/// Force registration of every collector. Lazy statics only register on
/// first touch; a scrape before any traffic should still see the gauges.
pub fn init() {
    Lazy::force(&ACTIVE_CONNECTIONS);
    Lazy::force(&COMMANDS_TOTAL);
    Lazy::force(&MESSAGES_ROUTED_TOTAL);
    Lazy::force(&RATE_LIMITED_TOTAL);
}

pub async fn metrics_handler() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::default_registry().gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
