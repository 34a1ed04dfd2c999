use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::info;

use crate::utils::logging::TIMING_TARGET;

/// Tracks one HTTP request from arrival to response.
#[derive(Debug)]
pub struct RequestTimer {
    endpoint: String,
    user_id: Option<i64>,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    status: String,
    detail: Option<String>,
    completed: bool,
}

impl RequestTimer {
    pub fn new(endpoint: &str, user_id: Option<i64>) -> Self {
        RequestTimer {
            endpoint: endpoint.to_string(),
            user_id,
            started_at: Utc::now(),
            started_perf: Instant::now(),
            status: "success".to_string(),
            detail: None,
            completed: false,
        }
    }

    pub fn log_received(&self) {
        info!(
            target: TIMING_TARGET,
            "event=request_received endpoint={} user_id={:?} received_at={}",
            self.endpoint,
            self.user_id,
            self.started_at.to_rfc3339()
        );
    }

    pub fn mark_status(&mut self, status: &str, detail: Option<String>) {
        self.status = status.to_string();
        self.detail = detail;
    }

    /// Marks the request failed when `result` is an error.
    pub fn record_result<T, E: std::fmt::Display>(&mut self, result: &Result<T, E>) {
        if let Err(err) = result {
            self.mark_status("error", Some(err.to_string()));
        }
    }

    pub fn log_completed(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        let completed_at = Utc::now();
        let duration = self.started_perf.elapsed().as_secs_f64();
        info!(
            target: TIMING_TARGET,
            "event=request_completed endpoint={} user_id={:?} started_at={} completed_at={} duration_s={:.3} status={} detail={}",
            self.endpoint,
            self.user_id,
            self.started_at.to_rfc3339(),
            completed_at.to_rfc3339(),
            duration,
            self.status,
            self.detail.clone().unwrap_or_default()
        );
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        self.log_completed();
    }
}

pub fn start_request_timer(endpoint: &str, user_id: Option<i64>) -> RequestTimer {
    let timer = RequestTimer::new(endpoint, user_id);
    timer.log_received();
    timer
}

pub async fn log_llm_timing<T, E, F, Fut>(
    provider: &str,
    model: &str,
    operation: &str,
    metadata: Option<JsonValue>,
    call: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let started_at = Utc::now();
    let started_perf = Instant::now();
    let metadata_text = metadata
        .as_ref()
        .map(|value| value.to_string())
        .unwrap_or_else(|| "{}".to_string());
    info!(
        target: TIMING_TARGET,
        "event=llm_request provider={} model={} operation={} started_at={} metadata={}",
        provider,
        model,
        operation,
        started_at.to_rfc3339(),
        metadata_text
    );

    let result = call().await;
    let status = if result.is_ok() { "success" } else { "error" };

    let completed_at = Utc::now();
    let duration = started_perf.elapsed().as_secs_f64();
    info!(
        target: TIMING_TARGET,
        "event=llm_response provider={} model={} operation={} completed_at={} duration_s={:.3} status={} metadata={}",
        provider,
        model,
        operation,
        completed_at.to_rfc3339(),
        duration,
        status,
        metadata_text
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn llm_timing_passes_results_through() {
        let ok: Result<u32, anyhow::Error> =
            log_llm_timing("gemini", "test-model", "unit", None, || async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err: Result<u32, anyhow::Error> = log_llm_timing(
            "replicate",
            "sdxl",
            "unit",
            Some(serde_json::json!({ "attempt": 1 })),
            || async { Err(anyhow::anyhow!("boom")) },
        )
        .await;
        assert_eq!(err.unwrap_err().to_string(), "boom");
    }

    #[test]
    fn completing_twice_is_harmless() {
        let mut timer = RequestTimer::new("POST /chat", Some(3));
        timer.mark_status("error", Some("bad request".to_string()));
        timer.log_completed();
        timer.log_completed();
        assert!(timer.completed);
        assert_eq!(timer.status, "error");
    }

    #[test]
    fn handler_results_set_the_outcome() {
        let mut timer = RequestTimer::new("GET /users/:id", Some(9));
        timer.record_result(&Ok::<_, String>(()));
        assert_eq!(timer.status, "success");
        assert!(timer.detail.is_none());

        timer.record_result(&Err::<(), _>("Пользователь 9 не найден."));
        assert_eq!(timer.status, "error");
        assert_eq!(timer.detail.as_deref(), Some("Пользователь 9 не найден."));
    }
}
