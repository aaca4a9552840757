//! `tracing`-backed [`TelemetryPort`]: metrics and events are
//! emitted as structured `tracing` records rather than pushed to a metrics
//! backend, matching how the rest of this crate logs.

use tracing::info;

use crate::domain::ports::TelemetryPort;

pub struct TracingTelemetryAdapter;

impl TelemetryPort for TracingTelemetryAdapter {
    fn emit_metric(&self, name: &str, value: f64) {
        info!(metric = name, value, "metric");
    }

    fn emit_event(&self, name: &str, fields: &[(&str, &str)]) {
        let rendered: String = fields.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(" ");
        info!(event = name, fields = %rendered, "event");
    }
}
