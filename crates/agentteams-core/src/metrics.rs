use once_cell::sync::OnceCell;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{KeyValue, global};
use tracing::info;

struct TeamMetrics {
    decisions: Counter<u64>,
    worker_runs: Counter<u64>,
    worker_duration_ms: Histogram<f64>,
    tool_calls: Counter<u64>,
    tasks: Counter<u64>,
}

static METRICS: OnceCell<TeamMetrics> = OnceCell::new();

fn handles() -> &'static TeamMetrics {
    METRICS.get_or_init(|| {
        let meter: Meter = global::meter("agentteams");
        TeamMetrics {
            decisions: meter
                .u64_counter("supervisor_decisions_total")
                .with_description("Routing decisions by graph and chosen node")
                .init(),
            worker_runs: meter
                .u64_counter("worker_runs_total")
                .with_description("Worker executions by status")
                .init(),
            worker_duration_ms: meter
                .f64_histogram("worker_duration_ms")
                .with_description("Worker runtime in milliseconds")
                .init(),
            tool_calls: meter
                .u64_counter("tool_calls_total")
                .with_description("Tool invocations by tool and status")
                .init(),
            tasks: meter
                .u64_counter("tasks_total")
                .with_description("Agent tasks by final status")
                .init(),
        }
    })
}

/// Hint to operators that OTEL metrics export can be configured externally.
pub fn init_metrics_from_env(service_name: &str) {
    if std::env::var("AGENTTEAMS_OTEL_METRICS_ENDPOINT").is_ok() {
        info!(
            target = "telemetry",
            "AGENTTEAMS_OTEL_METRICS_ENDPOINT detected for {service_name}. Configure an OTLP meter provider in your deployment to export team metrics."
        );
    }
}

pub fn record_decision(graph: &str, next: &str) {
    handles().decisions.add(
        1,
        &[
            KeyValue::new("graph", graph.to_string()),
            KeyValue::new("next", next.to_string()),
        ],
    );
}

pub fn record_worker_run(worker: &str, status: &str, duration_ms: u64) {
    let metrics = handles();
    let attrs = [
        KeyValue::new("worker", worker.to_string()),
        KeyValue::new("status", status.to_string()),
    ];
    metrics.worker_runs.add(1, &attrs);
    metrics.worker_duration_ms.record(duration_ms as f64, &attrs);
}

pub fn record_tool_call(tool: &str, status: &str) {
    handles().tool_calls.add(
        1,
        &[
            KeyValue::new("tool", tool.to_string()),
            KeyValue::new("status", status.to_string()),
        ],
    );
}

pub fn record_task(status: &str) {
    handles()
        .tasks
        .add(1, &[KeyValue::new("status", status.to_string())]);
}
