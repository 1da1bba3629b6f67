//! Prometheus registry for the gateway (spec §2 Manager/Archiver/Assistant
//! counters), grounded on the teacher's `stream-node::metrics`: a
//! `Lazy<Registry>` plus one `Lazy` metric per counter/gauge, rendered
//! through the standard `TextEncoder`.

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static STREAMS_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::new("streams_running", "Number of streams currently Started").unwrap();
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

pub static STREAMS_STARTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("streams_started_total", "Total successful stream starts").unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static STREAMS_RESTARTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new(
        "streams_restarts_total",
        "Total watchdog-driven restart attempts",
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static ASSISTANT_TICK_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new(
        "assistant_tick_errors_total",
        "Total Assistant ticks that logged and swallowed an error",
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static ARCHIVE_DAYS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new(
        "archive_days_total",
        "Total (stream, day) pairs successfully archived",
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static ARCHIVE_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("archive_errors_total", "Total failed archive_day runs").unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

/// Render the registry for a `/metrics` scrape.
pub fn render() -> String {
    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder.encode(&metric_families, &mut buf).ok();
    String::from_utf8(buf).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_registered_metrics() {
        STREAMS_RUNNING.set(2);
        let out = render();
        assert!(out.contains("streams_running"));
    }
}
