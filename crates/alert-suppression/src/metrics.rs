//! Prometheus metrics surface. Names and labels are the stable external
//! contract; a process-wide [`OnceLock`]-memoized [`Registry`] backs a set
//! of label-carrying counters, gauges, and histograms.

use std::sync::OnceLock;

use prometheus::{Encoder, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Registry, TextEncoder};

use crate::error::{Error, Result};

struct Metrics {
	registry: Registry,
	silence_operations_total: IntCounterVec,
	silence_operation_duration_seconds: HistogramVec,
	silence_errors_total: IntCounterVec,
	silence_active_silences: IntGaugeVec,
	silence_cache_operations_total: IntCounterVec,
	silence_gc_runs_total: IntCounterVec,
	silence_gc_cleaned_total: IntCounterVec,
	silence_sync_runs_total: prometheus::IntCounter,
	inhibition_cache_hits_total: IntCounterVec,
	inhibition_cache_misses_total: IntCounterVec,
	inhibition_cache_evictions_total: prometheus::IntCounter,
	inhibition_cache_size: IntGauge,
	inhibition_state_active: IntGauge,
	inhibition_state_records_total: IntCounterVec,
	inhibition_state_removals_total: IntCounterVec,
	inhibition_state_expired_total: prometheus::IntCounter,
	inhibition_state_operation_duration_seconds: HistogramVec,
	inhibition_state_redis_errors_total: IntCounterVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

fn metrics() -> &'static Metrics {
	METRICS.get_or_init(init)
}

fn init() -> Metrics {
	let registry = Registry::new();

	macro_rules! register {
		($ctor:expr) => {{
			let m = $ctor.expect("metric construction");
			registry.register(Box::new(m.clone())).expect("metric registration");
			m
		}};
	}

	let silence_operations_total = register!(IntCounterVec::new(
		prometheus::opts!("silence_manager_operations_total", "Silence manager operations"),
		&["operation", "status"]
	));
	let silence_operation_duration_seconds = register!(HistogramVec::new(
		prometheus::histogram_opts!(
			"silence_manager_operation_duration_seconds",
			"Silence manager operation latency"
		),
		&["operation"]
	));
	let silence_errors_total = register!(IntCounterVec::new(
		prometheus::opts!("silence_manager_errors_total", "Silence manager errors"),
		&["operation", "type"]
	));
	let silence_active_silences = register!(IntGaugeVec::new(
		prometheus::opts!("silence_manager_active_silences", "Silences by status"),
		&["status"]
	));
	let silence_cache_operations_total = register!(IntCounterVec::new(
		prometheus::opts!("silence_manager_cache_operations_total", "Silence cache hit/miss"),
		&["type", "operation"]
	));
	let silence_gc_runs_total = register!(IntCounterVec::new(
		prometheus::opts!("silence_manager_gc_runs_total", "Silence GC runs"),
		&["phase"]
	));
	let silence_gc_cleaned_total = register!(IntCounterVec::new(
		prometheus::opts!("silence_manager_gc_cleaned_total", "Silences touched by GC"),
		&["phase"]
	));
	let silence_sync_runs_total = {
		let m = prometheus::IntCounter::new("silence_manager_sync_runs_total", "Silence sync runs")
			.expect("metric construction");
		registry.register(Box::new(m.clone())).expect("metric registration");
		m
	};
	let inhibition_cache_hits_total = register!(IntCounterVec::new(
		prometheus::opts!("inhibition_cache_hits_total", "Active alert cache hits"),
		&["tier"]
	));
	let inhibition_cache_misses_total = register!(IntCounterVec::new(
		prometheus::opts!("inhibition_cache_misses_total", "Active alert cache misses"),
		&["tier"]
	));
	let inhibition_cache_evictions_total = {
		let m = prometheus::IntCounter::new("inhibition_cache_evictions_total", "L1 evictions")
			.expect("metric construction");
		registry.register(Box::new(m.clone())).expect("metric registration");
		m
	};
	let inhibition_cache_size = {
		let m = IntGauge::new("inhibition_cache_size", "Current L1 size").expect("metric construction");
		registry.register(Box::new(m.clone())).expect("metric registration");
		m
	};
	let inhibition_state_active = {
		let m = IntGauge::new("inhibition_state_active", "Currently active inhibitions")
			.expect("metric construction");
		registry.register(Box::new(m.clone())).expect("metric registration");
		m
	};
	let inhibition_state_records_total = register!(IntCounterVec::new(
		prometheus::opts!("inhibition_state_records_total", "Inhibitions recorded"),
		&["rule_name"]
	));
	let inhibition_state_removals_total = register!(IntCounterVec::new(
		prometheus::opts!("inhibition_state_removals_total", "Inhibitions removed"),
		&["reason"]
	));
	let inhibition_state_expired_total = {
		let m = prometheus::IntCounter::new("inhibition_state_expired_total", "Inhibitions expired")
			.expect("metric construction");
		registry.register(Box::new(m.clone())).expect("metric registration");
		m
	};
	let inhibition_state_operation_duration_seconds = register!(HistogramVec::new(
		prometheus::histogram_opts!(
			"inhibition_state_operation_duration_seconds",
			"Inhibition state manager operation latency"
		),
		&["operation"]
	));
	let inhibition_state_redis_errors_total = register!(IntCounterVec::new(
		prometheus::opts!("inhibition_state_redis_errors_total", "L2 errors, never surfaced"),
		&["operation"]
	));

	Metrics {
		registry,
		silence_operations_total,
		silence_operation_duration_seconds,
		silence_errors_total,
		silence_active_silences,
		silence_cache_operations_total,
		silence_gc_runs_total,
		silence_gc_cleaned_total,
		silence_sync_runs_total,
		inhibition_cache_hits_total,
		inhibition_cache_misses_total,
		inhibition_cache_evictions_total,
		inhibition_cache_size,
		inhibition_state_active,
		inhibition_state_records_total,
		inhibition_state_removals_total,
		inhibition_state_expired_total,
		inhibition_state_operation_duration_seconds,
		inhibition_state_redis_errors_total,
	}
}

pub fn record_silence_operation(operation: &str, ok: bool, elapsed: std::time::Duration) {
	let m = metrics();
	let status = if ok { "success" } else { "error" };
	m.silence_operations_total.with_label_values(&[operation, status]).inc();
	m.silence_operation_duration_seconds
		.with_label_values(&[operation])
		.observe(elapsed.as_secs_f64());
}

pub fn record_silence_error(operation: &str, kind: &str) {
	metrics().silence_errors_total.with_label_values(&[operation, kind]).inc();
}

pub fn set_active_silences(status: &str, count: i64) {
	metrics().silence_active_silences.with_label_values(&[status]).set(count);
}

pub fn record_cache_op(hit: bool, operation: &str) {
	let kind = if hit { "hit" } else { "miss" };
	metrics().silence_cache_operations_total.with_label_values(&[kind, operation]).inc();
}

pub fn record_gc_run(phase: &str) {
	metrics().silence_gc_runs_total.with_label_values(&[phase]).inc();
}

pub fn record_gc_cleaned(phase: &str, count: usize) {
	metrics()
		.silence_gc_cleaned_total
		.with_label_values(&[phase])
		.inc_by(count as u64);
}

pub fn record_sync_run() {
	metrics().silence_sync_runs_total.inc();
}

pub fn record_cache_hit(tier: &str) {
	metrics().inhibition_cache_hits_total.with_label_values(&[tier]).inc();
}

pub fn record_cache_miss(tier: &str) {
	metrics().inhibition_cache_misses_total.with_label_values(&[tier]).inc();
}

pub fn record_cache_eviction() {
	metrics().inhibition_cache_evictions_total.inc();
}

pub fn set_cache_size(size: usize) {
	metrics().inhibition_cache_size.set(size as i64);
}

pub fn set_inhibition_state_active(count: i64) {
	metrics().inhibition_state_active.set(count);
}

pub fn record_inhibition_recorded(rule_name: &str) {
	metrics().inhibition_state_records_total.with_label_values(&[rule_name]).inc();
}

pub fn record_inhibition_removed(reason: &str) {
	metrics().inhibition_state_removals_total.with_label_values(&[reason]).inc();
}

pub fn record_inhibition_expired() {
	metrics().inhibition_state_expired_total.inc();
}

pub fn record_inhibition_state_operation(operation: &str, elapsed: std::time::Duration) {
	metrics()
		.inhibition_state_operation_duration_seconds
		.with_label_values(&[operation])
		.observe(elapsed.as_secs_f64());
}

pub fn record_redis_error(operation: &str) {
	metrics().inhibition_state_redis_errors_total.with_label_values(&[operation]).inc();
}

/// Render the registry in the Prometheus text exposition format. The HTTP
/// endpoint that serves this is an external collaborator; we
/// only own producing the payload.
pub fn gather() -> Result<String> {
	let families = metrics().registry.gather();
	let encoder = TextEncoder::new();
	let mut buffer = Vec::new();
	encoder
		.encode(&families, &mut buffer)
		.map_err(|e| Error::Repository {
			operation: "metrics_gather",
			cause: Box::new(e),
		})?;
	String::from_utf8(buffer).map_err(|e| Error::Repository {
		operation: "metrics_gather",
		cause: Box::new(e),
	})
}
