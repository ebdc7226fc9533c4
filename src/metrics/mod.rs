//! Prometheus counters for quote lifecycle operations, exported as text at `/metrics`.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::error;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new_custom(Some("quote_engine".into()), None)
        .expect("registry can be created");
    static ref QUOTE_TRANSITIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("quote_transitions_total", "Committed quote status transitions"),
        &["event"]
    )
    .expect("metric can be created");
    static ref QUOTE_OPERATIONS_REJECTED: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "quote_operations_rejected_total",
            "Quote operations refused with a typed error"
        ),
        &["operation", "code"]
    )
    .expect("metric can be created");
    static ref QUOTE_CONVERSIONS: IntCounter = IntCounter::new(
        "quote_conversions_total",
        "Quotes converted into sales orders"
    )
    .expect("metric can be created");
    static ref CONVERSION_COMPENSATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "conversion_compensations_total",
            "Compensating actions run after a failed conversion step"
        ),
        &["action"]
    )
    .expect("metric can be created");
    static ref PURCHASE_ORDERS_GENERATED: IntCounter = IntCounter::new(
        "purchase_orders_generated_total",
        "Purchase orders generated for quote stock shortfalls"
    )
    .expect("metric can be created");
    static ref CAS_CONFLICTS: IntCounter = IntCounter::new(
        "quote_version_conflicts_total",
        "Quote writes that lost a version compare-and-set"
    )
    .expect("metric can be created");
}

/// Registers all counters with [`REGISTRY`]. Safe to call more than once.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(QUOTE_TRANSITIONS.clone()),
        Box::new(QUOTE_OPERATIONS_REJECTED.clone()),
        Box::new(QUOTE_CONVERSIONS.clone()),
        Box::new(CONVERSION_COMPENSATIONS.clone()),
        Box::new(PURCHASE_ORDERS_GENERATED.clone()),
        Box::new(CAS_CONFLICTS.clone()),
    ];
    for collector in collectors {
        if let Err(e) = register(&REGISTRY, collector) {
            error!(error = %e, "Failed to register metric collector");
        }
    }
}

/// `Ok(false)` when the collector is already registered.
fn register(
    registry: &Registry,
    collector: Box<dyn prometheus::core::Collector>,
) -> Result<bool, prometheus::Error> {
    match registry.register(collector) {
        Ok(()) => Ok(true),
        Err(prometheus::Error::AlreadyReg) => Ok(false),
        Err(e) => Err(e),
    }
}

pub fn record_transition(event: &str) {
    QUOTE_TRANSITIONS.with_label_values(&[event]).inc();
}

pub fn record_rejected(operation: &str, code: &str) {
    QUOTE_OPERATIONS_REJECTED
        .with_label_values(&[operation, code])
        .inc();
}

pub fn record_conversion() {
    QUOTE_CONVERSIONS.inc();
}

pub fn record_compensation(action: &str) {
    CONVERSION_COMPENSATIONS.with_label_values(&[action]).inc();
}

pub fn record_purchase_order() {
    PURCHASE_ORDERS_GENERATED.inc();
}

pub fn record_version_conflict() {
    CAS_CONFLICTS.inc();
}

/// Renders every registered metric in the Prometheus text format.
pub fn render() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| format!("Metrics are not valid UTF-8: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_output_contains_counters() {
        register_metrics();
        record_transition("send");
        record_rejected("convert", "not_convertible");

        let text = render().unwrap();
        assert!(text.contains("quote_engine_quote_transitions_total"));
        assert!(text.contains("not_convertible"));
    }

    #[test]
    fn repeated_registration_is_tolerated_but_conflicts_are_reported() {
        let registry = Registry::new();
        let counter = || IntCounter::new("widgets_total", "Widgets seen").unwrap();

        assert!(register(&registry, Box::new(counter())).unwrap());
        assert!(!register(&registry, Box::new(counter())).unwrap());

        let conflicting = IntCounter::new("widgets_total", "Different help").unwrap();
        assert!(register(&registry, Box::new(conflicting)).is_err());
    }
}
