use lazy_static::lazy_static;

lazy_static! {
    /// Shared Prometheus registry. Binaries register their own metrics into
    /// this registry and scrape it through [`encode_metrics`] at `/metrics`.
    pub static ref REGISTRY: prometheus::Registry = prometheus::Registry::new();
}

/// Encode the shared registry's metric families for a Prometheus scrape.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("failed to convert metrics to UTF-8: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::IntGauge;

    #[test]
    fn test_encode_metrics_succeeds() {
        let gauge = IntGauge::new("telemetry_test_gauge", "test gauge").unwrap();
        REGISTRY.register(Box::new(gauge.clone())).ok();
        gauge.set(1);
        let encoded = encode_metrics().expect("metrics should encode");
        assert!(encoded.contains("telemetry_test_gauge"));
    }
}
