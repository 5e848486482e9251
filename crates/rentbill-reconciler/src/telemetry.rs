//! Prometheus metrics for the reconciler

use crate::scheduler::PassReport;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};

/// Counters fed from every [`PassReport`]
#[derive(Clone)]
pub struct ReconcilerMetrics {
    pub passes_total: IntCounter,
    pub passes_skipped_total: IntCounter,
    pub pass_errors_total: IntCounter,
    pub pass_duration_seconds: Histogram,
    pub live_orders: IntGauge,
    pub charges_total: IntCounter,
    pub charged_amount_total: IntCounter,
    pub warnings_total: IntCounter,
    pub suspensions_total: IntCounter,
    pub deletions_total: IntCounter,
    pub resumes_total: IntCounter,
    pub provider_failures_total: IntCounter,
    pub order_failures_total: IntCounter,
}

impl ReconcilerMetrics {
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            passes_total: IntCounter::new(
                "rentbill_reconciler_passes_total",
                "Reconciliation passes that ran",
            )?,
            passes_skipped_total: IntCounter::new(
                "rentbill_reconciler_passes_skipped_total",
                "Passes skipped because billing was disabled or the flag was unreadable",
            )?,
            pass_errors_total: IntCounter::new(
                "rentbill_reconciler_pass_errors_total",
                "Passes aborted before processing orders",
            )?,
            pass_duration_seconds: Histogram::with_opts(
                HistogramOpts::new(
                    "rentbill_reconciler_pass_duration_seconds",
                    "Wall time of a reconciliation pass",
                )
                .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0]),
            )?,
            live_orders: IntGauge::new(
                "rentbill_reconciler_live_orders",
                "Live orders seen by the last pass",
            )?,
            charges_total: IntCounter::new(
                "rentbill_reconciler_charges_total",
                "Hourly debits committed",
            )?,
            charged_amount_total: IntCounter::new(
                "rentbill_reconciler_charged_amount_total",
                "Sum of hourly debits in minor units",
            )?,
            warnings_total: IntCounter::new(
                "rentbill_reconciler_warnings_total",
                "Low-balance warnings sent",
            )?,
            suspensions_total: IntCounter::new(
                "rentbill_reconciler_suspensions_total",
                "Orders suspended",
            )?,
            deletions_total: IntCounter::new(
                "rentbill_reconciler_deletions_total",
                "Orders deleted",
            )?,
            resumes_total: IntCounter::new(
                "rentbill_reconciler_resumes_total",
                "Balance-suspended orders resumed after a top-up",
            )?,
            provider_failures_total: IntCounter::new(
                "rentbill_reconciler_provider_failures_total",
                "Failed or timed out provider calls",
            )?,
            order_failures_total: IntCounter::new(
                "rentbill_reconciler_order_failures_total",
                "Orders whose reconciliation failed",
            )?,
        })
    }

    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.passes_total.clone()))?;
        registry.register(Box::new(self.passes_skipped_total.clone()))?;
        registry.register(Box::new(self.pass_errors_total.clone()))?;
        registry.register(Box::new(self.pass_duration_seconds.clone()))?;
        registry.register(Box::new(self.live_orders.clone()))?;
        registry.register(Box::new(self.charges_total.clone()))?;
        registry.register(Box::new(self.charged_amount_total.clone()))?;
        registry.register(Box::new(self.warnings_total.clone()))?;
        registry.register(Box::new(self.suspensions_total.clone()))?;
        registry.register(Box::new(self.deletions_total.clone()))?;
        registry.register(Box::new(self.resumes_total.clone()))?;
        registry.register(Box::new(self.provider_failures_total.clone()))?;
        registry.register(Box::new(self.order_failures_total.clone()))?;
        Ok(())
    }

    pub fn record_pass(&self, report: &PassReport, elapsed_secs: f64) {
        if report.skipped {
            self.passes_skipped_total.inc();
            return;
        }
        self.passes_total.inc();
        self.pass_duration_seconds.observe(elapsed_secs);
        self.live_orders.set(report.seen as i64);
        self.charges_total.inc_by(report.charged as u64);
        self.charged_amount_total
            .inc_by(report.charged_amount.max(0) as u64);
        self.warnings_total.inc_by(report.warned as u64);
        self.suspensions_total.inc_by(report.suspended as u64);
        self.deletions_total.inc_by(report.deleted as u64);
        self.provider_failures_total
            .inc_by(report.provider_failures as u64);
        self.order_failures_total.inc_by(report.failures as u64);
    }

    /// Text exposition of everything in `registry`
    pub fn render(registry: &Registry) -> String {
        use prometheus::Encoder;

        let mut buf = Vec::new();
        let encoder = prometheus::TextEncoder::new();
        if encoder.encode(&registry.gather(), &mut buf).is_err() {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_record() {
        let registry = Registry::new();
        let metrics = ReconcilerMetrics::new().unwrap();
        metrics.register(&registry).unwrap();

        let report = PassReport {
            seen: 3,
            charged: 2,
            charged_amount: 1_500,
            suspended: 1,
            ..Default::default()
        };
        metrics.record_pass(&report, 0.2);

        assert_eq!(metrics.passes_total.get(), 1);
        assert_eq!(metrics.live_orders.get(), 3);
        assert_eq!(metrics.charged_amount_total.get(), 1_500);

        let text = ReconcilerMetrics::render(&registry);
        assert!(text.contains("rentbill_reconciler_suspensions_total 1"));
    }

    #[test]
    fn test_skipped_pass_only_counts_skip() {
        let metrics = ReconcilerMetrics::new().unwrap();
        metrics.record_pass(&PassReport::skipped(), 0.0);

        assert_eq!(metrics.passes_skipped_total.get(), 1);
        assert_eq!(metrics.passes_total.get(), 0);
    }
}
