//! Prometheus metrics exposition
//!
//! - `auth_logins_total` (counter): labels `flow` (web, mobile), `outcome`
//! - `auth_session_checks_total` (counter): label `outcome`
//! - `auth_provider_errors_total` (counter): label `stage`
//! - `auth_provider_request_duration_seconds` (histogram): label `stage`

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const PROVIDER_DURATION: &str = "auth_provider_request_duration_seconds";

/// Buckets from 5ms to 10s, the provider request timeout ceiling.
const PROVIDER_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(PROVIDER_DURATION.to_string()), PROVIDER_BUCKETS)
}

/// Install the global Prometheus recorder and return a handle for rendering.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// A handle backed by a recorder that is not installed globally.
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

pub fn record_login(flow: &'static str, outcome: &'static str) {
    metrics::counter!("auth_logins_total", "flow" => flow, "outcome" => outcome).increment(1);
}

pub fn record_session_check(outcome: &'static str) {
    metrics::counter!("auth_session_checks_total", "outcome" => outcome).increment(1);
}

/// `stage` is `token_exchange` or `profile`.
pub fn record_provider_call(stage: &'static str, duration_secs: f64, ok: bool) {
    metrics::histogram!(PROVIDER_DURATION, "stage" => stage).record(duration_secs);
    if !ok {
        metrics::counter!("auth_provider_errors_total", "stage" => stage).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_login("web", "success");
        record_session_check("rejected");
        record_provider_call("profile", 0.1, false);
    }

    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = builder().unwrap().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn counters_carry_labels() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_login("web", "success");
        record_login("mobile", "provider_error");
        record_session_check("authenticated");

        let output = handle.render();
        assert!(output.contains("auth_logins_total"));
        assert!(output.contains("flow=\"web\""));
        assert!(output.contains("outcome=\"provider_error\""));
        assert!(output.contains("auth_session_checks_total"));
        assert!(output.contains("outcome=\"authenticated\""));
    }

    #[test]
    fn provider_calls_render_histogram_buckets() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_provider_call("token_exchange", 0.003, true);
        record_provider_call("profile", 12.0, false);

        let output = handle.render();
        assert!(output.contains("auth_provider_request_duration_seconds_bucket"));
        assert!(output.contains("le=\"0.005\""));
        assert!(output.contains("le=\"10\""));
        assert!(output.contains("le=\"+Inf\""));
        assert!(output.contains("auth_provider_errors_total{stage=\"profile\"} 1"));
        assert!(!output.contains("auth_provider_errors_total{stage=\"token_exchange\"}"));
    }
}
