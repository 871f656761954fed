use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct RpcMetrics {
    pub requests_sent: u64,
    pub replies_received: u64,
    pub rpc_failures: u64,
    pub requests_served: u64,
    pub requests_rejected: u64,
    pub datagrams_dropped: u64,
    pub uptime: Duration,
    pub start_time: Instant,
}

impl Default for RpcMetrics {
    fn default() -> Self {
        Self {
            requests_sent: 0,
            replies_received: 0,
            rpc_failures: 0,
            requests_served: 0,
            requests_rejected: 0,
            datagrams_dropped: 0,
            uptime: Duration::new(0, 0),
            start_time: Instant::now(),
        }
    }
}

impl fmt::Display for RpcMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Uptime: {:.2?}", self.uptime)?;
        writeln!(
            f,
            "Outbound: {} requests, {} replies, {} failures",
            self.requests_sent, self.replies_received, self.rpc_failures
        )?;
        write!(
            f,
            "Inbound: {} served, {} rejected, {} dropped",
            self.requests_served, self.requests_rejected, self.datagrams_dropped
        )
    }
}

/// Shared RPC counters, cheap to clone.
#[derive(Clone, Default)]
pub struct MetricsCollector {
    metrics: Arc<RwLock<RpcMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_request_sent(&self) {
        self.metrics.write().await.requests_sent += 1;
    }

    pub async fn record_reply_received(&self) {
        self.metrics.write().await.replies_received += 1;
    }

    pub async fn record_rpc_failure(&self) {
        self.metrics.write().await.rpc_failures += 1;
    }

    pub async fn record_request_served(&self) {
        self.metrics.write().await.requests_served += 1;
    }

    pub async fn record_request_rejected(&self) {
        self.metrics.write().await.requests_rejected += 1;
    }

    pub async fn record_datagram_dropped(&self) {
        self.metrics.write().await.datagrams_dropped += 1;
    }

    pub async fn get_metrics(&self) -> RpcMetrics {
        let mut metrics = self.metrics.read().await.clone();
        metrics.uptime = metrics.start_time.elapsed();
        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counters_accumulate() {
        let collector = MetricsCollector::new();
        collector.record_request_sent().await;
        collector.record_request_sent().await;
        collector.record_rpc_failure().await;
        collector.record_datagram_dropped().await;

        let clone = collector.clone();
        clone.record_reply_received().await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.requests_sent, 2);
        assert_eq!(metrics.replies_received, 1);
        assert_eq!(metrics.rpc_failures, 1);
        assert_eq!(metrics.datagrams_dropped, 1);
        assert_eq!(metrics.requests_served, 0);
    }
}
