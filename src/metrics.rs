use envoy_toggle_rs::coordinator::Coordinator;
use envoy_toggle_rs::Error;
use prometheus::{Encoder, GaugeVec, TextEncoder};

lazy_static! {
    static ref CURRENT_POWER_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("current_power", "current production reported by the Envoy (in W)",),
        &["host"],
    )
    .unwrap();
    static ref IS_PRODUCING_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("is_producing", "1 while the Envoy reports production above 0 W",),
        &["host"],
    )
    .unwrap();
    static ref PRODUCTION_ENABLED_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("production_enabled", "1 while production is enabled",),
        &["host"],
    )
    .unwrap();
    static ref UPDATE_SUCCESS_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("update_success", "1 if the last update from the Envoy succeeded",),
        &["host"],
    )
    .unwrap();
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Feed the coordinator's latest snapshot to Prometheus gauges. Without a
/// snapshot only `update_success` is set.
pub fn record(host: &str, coordinator: &Coordinator) {
    UPDATE_SUCCESS_GAUGE
        .with_label_values(&[host])
        .set(flag(coordinator.last_update_success()));

    if let Some(data) = coordinator.data() {
        CURRENT_POWER_GAUGE
            .with_label_values(&[host])
            .set(data.current_power);
        IS_PRODUCING_GAUGE
            .with_label_values(&[host])
            .set(flag(data.is_producing));
        PRODUCTION_ENABLED_GAUGE
            .with_label_values(&[host])
            .set(flag(data.production_enabled));
    } else {
        log::debug!("No snapshot available yet for {}", host);
    }
}

/// Read metrics from Prometheus exporter registry.
pub fn read() -> Result<String, Error> {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    encoder
        .encode(&metric_families, &mut buffer)
        .or(Err(Error::FormatError))?;
    String::from_utf8(buffer).or(Err(Error::FormatError))
}
