//! ## blockpool-telemetry::metrics
//! **Prometheus metrics for pool workloads**
//!
//! ### Components:
//! - `blockpool_operations_total{op, outcome}`: counter per operation result
//! - `blockpool_used_bytes`, `blockpool_blocks`: current pool occupancy
//! - `blockpool_request_size_bytes`: histogram of requested sizes

use prometheus::{Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub operations: IntCounterVec,
    pub used_bytes: IntGauge,
    pub blocks: IntGauge,
    pub request_size: Histogram,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let operations = IntCounterVec::new(
            Opts::new("blockpool_operations_total", "Pool operations by result"),
            &["op", "outcome"],
        )?;
        let used_bytes = IntGauge::new("blockpool_used_bytes", "Bytes held by used blocks")?;
        let blocks = IntGauge::new("blockpool_blocks", "Descriptors in the block chain")?;
        let request_size = Histogram::with_opts(
            HistogramOpts::new("blockpool_request_size_bytes", "Requested allocation sizes")
                .buckets(vec![16.0, 64.0, 256.0, 1024.0, 4096.0, 65536.0]),
        )?;

        registry.register(Box::new(operations.clone()))?;
        registry.register(Box::new(used_bytes.clone()))?;
        registry.register(Box::new(blocks.clone()))?;
        registry.register(Box::new(request_size.clone()))?;

        Ok(Self {
            registry,
            operations,
            used_bytes,
            blocks,
            request_size,
        })
    }

    pub fn record_operation(&self, op: &str, outcome: &str) {
        self.operations.with_label_values(&[op, outcome]).inc();
    }

    pub fn observe_request(&self, size: usize) {
        self.request_size.observe(size as f64);
    }

    pub fn set_pool_usage(&self, used_bytes: usize, blocks: usize) {
        self.used_bytes.set(used_bytes as i64);
        self.blocks.set(blocks as i64);
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_exposition() {
        let metrics = MetricsRecorder::new().unwrap();
        metrics.record_operation("alloc", "ok");
        metrics.record_operation("alloc", "ok");
        metrics.record_operation("free", "double_free");
        metrics.observe_request(100);
        metrics.set_pool_usage(100, 2);

        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains(r#"blockpool_operations_total{op="alloc",outcome="ok"} 2"#));
        assert!(text.contains(r#"blockpool_operations_total{op="free",outcome="double_free"} 1"#));
        assert!(text.contains("blockpool_used_bytes 100"));
        assert!(text.contains("blockpool_blocks 2"));
        assert!(text.contains("blockpool_request_size_bytes_count 1"));
    }
}
