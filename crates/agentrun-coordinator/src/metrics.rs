//! Prometheus metrics collection and formatting.
//!
//! This module provides metrics in Prometheus text exposition format.

use std::fmt::Write;

use agentrun_core::{TaskResultStatus, WorkerStatus};

use crate::coordinator::Coordinator;

/// Collect all metrics from the coordinator and format as Prometheus text.
pub async fn collect_metrics(coordinator: &Coordinator) -> String {
    let mut output = String::new();

    collect_worker_metrics(coordinator, &mut output).await;
    collect_queue_metrics(coordinator, &mut output).await;
    collect_result_metrics(coordinator, &mut output).await;

    output
}

async fn collect_worker_metrics(coordinator: &Coordinator, output: &mut String) {
    let mut idle = 0u64;
    let mut busy = 0u64;
    let mut dead = 0u64;

    for worker in coordinator.list_workers().await {
        match worker.status {
            WorkerStatus::Idle => idle += 1,
            WorkerStatus::Busy => busy += 1,
            WorkerStatus::Dead => dead += 1,
        }
    }

    writeln!(
        output,
        "# HELP agentrun_workers Number of registered workers by status"
    )
    .ok();
    writeln!(output, "# TYPE agentrun_workers gauge").ok();
    writeln!(output, "agentrun_workers{{status=\"idle\"}} {idle}").ok();
    writeln!(output, "agentrun_workers{{status=\"busy\"}} {busy}").ok();
    writeln!(output, "agentrun_workers{{status=\"dead\"}} {dead}").ok();
}

async fn collect_queue_metrics(coordinator: &Coordinator, output: &mut String) {
    let queue = coordinator.queue();
    let depth = queue.len().await.unwrap_or_default();
    let dead_letters = queue.dead_letters().await.map(|d| d.len()).unwrap_or_default();

    writeln!(output).ok();
    writeln!(output, "# HELP agentrun_queue_depth Tasks waiting for delivery").ok();
    writeln!(output, "# TYPE agentrun_queue_depth gauge").ok();
    writeln!(output, "agentrun_queue_depth {depth}").ok();

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP agentrun_dead_letters Tasks that exhausted their retry budget"
    )
    .ok();
    writeln!(output, "# TYPE agentrun_dead_letters gauge").ok();
    writeln!(output, "agentrun_dead_letters {dead_letters}").ok();
}

async fn collect_result_metrics(coordinator: &Coordinator, output: &mut String) {
    let mut completed = 0u64;
    let mut failed = 0u64;

    for result in coordinator.results().await {
        match result.status {
            TaskResultStatus::Completed => completed += 1,
            TaskResultStatus::Failed => failed += 1,
        }
    }

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP agentrun_task_results Terminal task results by status"
    )
    .ok();
    writeln!(output, "# TYPE agentrun_task_results gauge").ok();
    writeln!(
        output,
        "agentrun_task_results{{status=\"completed\"}} {completed}"
    )
    .ok();
    writeln!(output, "agentrun_task_results{{status=\"failed\"}} {failed}").ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use agentrun_core::Heartbeat;

    use crate::coordinator::SubmitOptions;
    use crate::queue::MemoryTaskQueue;
    use crate::Config;

    #[tokio::test]
    async fn test_collect_metrics_empty_state() {
        let coord = Coordinator::new(Config::default(), Arc::new(MemoryTaskQueue::new(4)));
        let output = collect_metrics(&coord).await;

        assert!(output.contains("agentrun_workers{status=\"idle\"} 0"));
        assert!(output.contains("agentrun_queue_depth 0"));
        assert!(output.contains("agentrun_task_results{status=\"failed\"} 0"));
    }

    #[tokio::test]
    async fn test_collect_metrics_counts() {
        let coord = Coordinator::new(Config::default(), Arc::new(MemoryTaskQueue::new(4)));
        coord.heartbeat(Heartbeat::new("w1", WorkerStatus::Busy)).await;
        coord.submit("g", SubmitOptions::new()).await.unwrap();

        let output = collect_metrics(&coord).await;
        assert!(output.contains("agentrun_workers{status=\"busy\"} 1"));
        assert!(output.contains("agentrun_queue_depth 1"));
    }
}
