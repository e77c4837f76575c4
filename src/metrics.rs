use tracing::trace;

// Counters and histograms land in the Prometheus recorder installed at
// startup and are mirrored as trace events.

pub fn inc_requests(route: &'static str) {
    ::metrics::counter!("vibe_requests_total", "route" => route).increment(1);
    trace!(target = "vibe.metrics", route = route, "requests_total_inc");
}

pub fn remote_call_elapsed(stage: &'static str, elapsed_ms: u128, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    ::metrics::histogram!("vibe_remote_call_ms", "stage" => stage, "outcome" => outcome)
        .record(elapsed_ms as f64);
    trace!(
        target = "vibe.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        ok = ok,
        "remote_call_elapsed"
    );
}

pub fn task_transition(task_id: &str, from: &'static str, to: &'static str) {
    ::metrics::counter!("vibe_task_transitions_total", "from" => from, "to" => to).increment(1);
    trace!(
        target = "vibe.metrics",
        task_id = task_id,
        from = from,
        to = to,
        "task_transition"
    );
}
