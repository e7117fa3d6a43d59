use once_cell::sync::Lazy;
use prometheus::{register_int_counter, Encoder, IntCounter, TextEncoder};

// Prometheus metrics (default registry)
pub static STATE_WRITES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "state_store_writes_total",
        "Total acknowledged writes, both state and listener namespaces"
    )
    .expect("register writes_total")
});

pub static STATE_WRITE_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "state_store_write_failures_total",
        "Total writes rejected by the persistence backend"
    )
    .expect("register write_failures_total")
});

pub static CHANGE_EVENTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "state_store_change_events_total",
        "Total change events published"
    )
    .expect("register change_events_total")
});

pub static HANDLER_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "state_store_handler_failures_total",
        "Total change handlers that returned an error"
    )
    .expect("register handler_failures_total")
});

pub static CALLBACK_INVOCATIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "state_store_callback_invocations_total",
        "Total listener callbacks invoked"
    )
    .expect("register callback_invocations_total")
});

pub static CALLBACK_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "state_store_callback_failures_total",
        "Total listener callbacks that failed or timed out"
    )
    .expect("register callback_failures_total")
});

/// Render the default registry in the Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    // touch every counter so the families show up before the first event
    for counter in [
        &STATE_WRITES_TOTAL,
        &STATE_WRITE_FAILURES_TOTAL,
        &CHANGE_EVENTS_TOTAL,
        &HANDLER_FAILURES_TOTAL,
        &CALLBACK_INVOCATIONS_TOTAL,
        &CALLBACK_FAILURES_TOTAL,
    ] {
        Lazy::force(counter);
    }
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_all_families() {
        let text = encode_metrics().expect("encode");
        assert!(text.contains("state_store_writes_total"));
        assert!(text.contains("state_store_callback_failures_total"));
    }
}
