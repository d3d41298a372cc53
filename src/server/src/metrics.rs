use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Node metrics
#[derive(Clone)]
pub struct Metrics {
    pub total_writes: Arc<AtomicUsize>,
    pub total_votes: Arc<AtomicUsize>,
    pub rejected_votes: Arc<AtomicUsize>,
    pub total_commits: Arc<AtomicUsize>,
    pub total_applies: Arc<AtomicUsize>,
    pub total_aborts: Arc<AtomicUsize>,
    pub start_time: std::time::Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            total_writes: Arc::new(AtomicUsize::new(0)),
            total_votes: Arc::new(AtomicUsize::new(0)),
            rejected_votes: Arc::new(AtomicUsize::new(0)),
            total_commits: Arc::new(AtomicUsize::new(0)),
            total_applies: Arc::new(AtomicUsize::new(0)),
            total_aborts: Arc::new(AtomicUsize::new(0)),
            start_time: std::time::Instant::now(),
        }
    }

    /// Generate Prometheus-format metrics
    pub fn to_prometheus(&self, store_keys: usize) -> String {
        let uptime_secs = self.start_time.elapsed().as_secs();

        let mut output = String::new();

        output.push_str("# HELP pact_operations_total Total number of 2PC operations by type\n");
        output.push_str("# TYPE pact_operations_total counter\n");
        output.push_str(&format!(
            "pact_operations_total{{type=\"write\"}} {}\n",
            self.total_writes.load(Ordering::SeqCst)
        ));
        output.push_str(&format!(
            "pact_operations_total{{type=\"vote\"}} {}\n",
            self.total_votes.load(Ordering::SeqCst)
        ));
        output.push_str(&format!(
            "pact_operations_total{{type=\"commit\"}} {}\n",
            self.total_commits.load(Ordering::SeqCst)
        ));
        output.push_str(&format!(
            "pact_operations_total{{type=\"apply\"}} {}\n",
            self.total_applies.load(Ordering::SeqCst)
        ));
        output.push_str(&format!(
            "pact_operations_total{{type=\"abort\"}} {}\n",
            self.total_aborts.load(Ordering::SeqCst)
        ));

        output.push_str(
            "# HELP pact_rejected_votes_total Votes rejected after the lock retry budget\n",
        );
        output.push_str("# TYPE pact_rejected_votes_total counter\n");
        output.push_str(&format!(
            "pact_rejected_votes_total {}\n",
            self.rejected_votes.load(Ordering::SeqCst)
        ));

        output.push_str("# HELP pact_store_keys Current number of applied keys\n");
        output.push_str("# TYPE pact_store_keys gauge\n");
        output.push_str(&format!("pact_store_keys {}\n", store_keys));

        output.push_str("# HELP pact_uptime_seconds Node uptime in seconds\n");
        output.push_str("# TYPE pact_uptime_seconds counter\n");
        output.push_str(&format!("pact_uptime_seconds {}\n", uptime_secs));

        output
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prometheus_output() {
        let metrics = Metrics::new();
        metrics.total_votes.fetch_add(3, Ordering::SeqCst);
        metrics.total_writes.fetch_add(1, Ordering::SeqCst);

        let text = metrics.to_prometheus(7);
        assert!(text.contains("pact_operations_total{type=\"vote\"} 3"));
        assert!(text.contains("pact_operations_total{type=\"write\"} 1"));
        assert!(text.contains("pact_store_keys 7"));
    }
}
