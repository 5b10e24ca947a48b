use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;

/// What one transport attempt produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptResult {
    Success,
    Empty,
    Failure,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TransportStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub empty_responses: u64,
    pub failed_requests: u64,
    pub average_response_ms: f64,
    pub last_request_time: Option<SystemTime>,
}

impl TransportStats {
    fn update(&mut self, result: AttemptResult, response_time: Duration) {
        let previous_total = self.total_requests as f64;
        self.total_requests += 1;
        self.last_request_time = Some(SystemTime::now());
        self.average_response_ms = (self.average_response_ms * previous_total
            + response_time.as_secs_f64() * 1000.0)
            / self.total_requests as f64;

        match result {
            AttemptResult::Success => self.successful_requests += 1,
            AttemptResult::Empty => self.empty_responses += 1,
            AttemptResult::Failure => self.failed_requests += 1,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64
        }
    }
}

/// Per-transport request counters, keyed by transport name.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    transports: RwLock<HashMap<String, TransportStats>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, transport: &str, result: AttemptResult, response_time: Duration) {
        let mut transports = self.transports.write().await;
        transports
            .entry(transport.to_string())
            .or_default()
            .update(result, response_time);
    }

    pub async fn snapshot(&self) -> HashMap<String, TransportStats> {
        self.transports.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_collection() {
        let collector = MetricsCollector::new();

        collector
            .record("api", AttemptResult::Success, Duration::from_millis(100))
            .await;
        collector
            .record("api", AttemptResult::Failure, Duration::from_millis(300))
            .await;
        collector
            .record("scrape", AttemptResult::Empty, Duration::from_millis(50))
            .await;

        let snapshot = collector.snapshot().await;
        let api = &snapshot["api"];
        assert_eq!(api.total_requests, 2);
        assert_eq!(api.successful_requests, 1);
        assert_eq!(api.failed_requests, 1);
        assert!((api.average_response_ms - 200.0).abs() < 1.0);
        assert_eq!(api.success_rate(), 0.5);

        let scrape = &snapshot["scrape"];
        assert_eq!(scrape.empty_responses, 1);
        assert!(scrape.last_request_time.is_some());
    }

    #[tokio::test]
    async fn test_snapshot_serializes() {
        let collector = MetricsCollector::new();
        collector
            .record("scrape", AttemptResult::Success, Duration::from_millis(10))
            .await;

        let exported = serde_json::to_string(&collector.snapshot().await).unwrap();
        assert!(exported.contains("total_requests"));
    }
}
