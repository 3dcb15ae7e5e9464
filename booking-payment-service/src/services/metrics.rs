use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use prometheus::{IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
pub static PROMETHEUS_REGISTRY: OnceLock<Registry> = OnceLock::new();
pub static BOOKING_PAYMENTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static BOOKING_PAYMENT_AMOUNT_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Install the Prometheus recorder and the payment counters.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_metrics() -> anyhow::Result<()> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    if METRICS_HANDLE.set(handle).is_err() {
        return Ok(());
    }

    let registry = Registry::new();

    // Outcomes per rail: success, failed, refunded, collected
    let payments_counter = IntCounterVec::new(
        Opts::new(
            "booking_payments_total",
            "Booking payment outcomes by rail",
        ),
        &["rail", "outcome"],
    )?;

    let amount_counter = IntCounterVec::new(
        Opts::new(
            "booking_payment_amount_minor_total",
            "Confirmed booking payment volume by rail (minor units)",
        ),
        &["rail"],
    )?;

    registry.register(Box::new(payments_counter.clone()))?;
    registry.register(Box::new(amount_counter.clone()))?;

    let _ = PROMETHEUS_REGISTRY.set(registry);
    let _ = BOOKING_PAYMENTS_TOTAL.set(payments_counter);
    let _ = BOOKING_PAYMENT_AMOUNT_TOTAL.set(amount_counter);
    Ok(())
}

pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string());

    if let Some(registry) = PROMETHEUS_REGISTRY.get() {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).ok();
        if let Ok(custom_metrics) = String::from_utf8(buffer) {
            output.push_str(&custom_metrics);
        }
    }

    output
}

/// Count a payment outcome. No-op until [`init_metrics`] has run.
pub fn record_outcome(rail: &str, outcome: &str) {
    if let Some(counter) = BOOKING_PAYMENTS_TOTAL.get() {
        counter.with_label_values(&[rail, outcome]).inc();
    }
}

/// Add confirmed volume for a rail.
pub fn record_amount(rail: &str, amount_minor: i64) {
    if amount_minor <= 0 {
        return;
    }
    if let Some(counter) = BOOKING_PAYMENT_AMOUNT_TOTAL.get() {
        counter
            .with_label_values(&[rail])
            .inc_by(amount_minor as u64);
    }
}
