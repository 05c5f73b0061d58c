//! Prometheus metrics exposition
//!
//! Service-level metrics. Pool internals (`key_pool_*`) are emitted by the
//! `key-pool` crate into the same recorder.
//!
//! - `gateway_requests_total` (counter): label `outcome`
//! - `gateway_request_duration_seconds` (histogram): label `outcome`

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_BUCKETS: &[f64] = &[
    0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0,
];

fn builder() -> PrometheusBuilder {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("gateway_request_duration_seconds".to_string()),
            DURATION_BUCKETS,
        )
        .expect("failed to set histogram buckets")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Buckets reach past the two-attempt worst case of a 60s attempt timeout.
pub fn install_recorder() -> PrometheusHandle {
    builder()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a finished `/v1/generate` request.
///
/// `outcome` is `generated`, `fallback`, `invalid` or `error`.
pub fn record_request(outcome: &'static str, duration_secs: f64) {
    metrics::counter!("gateway_requests_total", "outcome" => outcome).increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "outcome" => outcome)
        .record(duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_request("generated", 0.2);
    }

    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = builder().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn record_request_renders_counter_and_histogram() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request("generated", 0.4);
        record_request("fallback", 0.01);

        let output = handle.render();
        assert!(output.contains("gateway_requests_total"));
        assert!(output.contains("outcome=\"generated\""));
        assert!(output.contains("outcome=\"fallback\""));
        assert!(
            output.contains("gateway_request_duration_seconds_bucket"),
            "histogram must render _bucket lines"
        );
    }
}
