use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// An ongoing phase being tracked
#[derive(Debug)]
struct TrackedOperation {
    start_time: Instant,
    parent: Option<String>,
}

/// A completed phase with timing information
#[derive(Debug, Clone)]
pub struct TimingInfo {
    pub name: String,
    pub duration_ms: u64,
    pub parent: Option<String>,
    pub children: Vec<String>,
}

impl TimingInfo {
    fn new(name: String, duration: Duration, parent: Option<String>) -> Self {
        Self {
            name,
            duration_ms: duration.as_millis() as u64,
            parent,
            children: Vec::new(),
        }
    }
}

/// Duration sink for one reconciliation pass
///
/// Cheap to clone; clones share the same recordings. Handed to the
/// orchestrator explicitly rather than living in a global.
#[derive(Debug, Clone, Default)]
pub struct PassTimer {
    operations: Arc<Mutex<HashMap<String, TrackedOperation>>>,
    completed: Arc<Mutex<HashMap<String, TimingInfo>>>,
    operation_sequence: Arc<Mutex<Vec<String>>>,
}

impl PassTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every recorded phase, finished or not
    pub async fn reset(&self) {
        self.operations.lock().await.clear();
        self.completed.lock().await.clear();
        self.operation_sequence.lock().await.clear();
    }

    /// Start timing a phase
    pub async fn start_operation(&self, operation_name: &str, parent: Option<&str>) {
        let mut operations = self.operations.lock().await;
        operations.insert(
            operation_name.to_string(),
            TrackedOperation {
                start_time: Instant::now(),
                parent: parent.map(|p| p.to_string()),
            },
        );
    }

    /// End timing for a phase and record it
    pub async fn end_operation(&self, operation_name: &str) {
        let now = Instant::now();
        let mut operations = self.operations.lock().await;
        let mut completed = self.completed.lock().await;
        let mut sequence = self.operation_sequence.lock().await;

        if let Some(operation) = operations.remove(operation_name) {
            let duration = now.duration_since(operation.start_time);
            let timing_info =
                TimingInfo::new(operation_name.to_string(), duration, operation.parent.clone());

            sequence.push(operation_name.to_string());
            completed.insert(operation_name.to_string(), timing_info);
        }
    }

    pub async fn timing(&self, operation_name: &str) -> Option<TimingInfo> {
        self.completed.lock().await.get(operation_name).cloned()
    }

    /// Render all completed phases as an indented tree
    pub async fn generate_report(&self) -> String {
        let mut completed = self.completed.lock().await.clone();
        let sequence = self.operation_sequence.lock().await;

        // Children finish before their parent, so link them after the fact.
        for name in sequence.iter() {
            let parent = completed.get(name).and_then(|op| op.parent.clone());
            if let Some(parent_info) = parent.and_then(|p| completed.get_mut(&p)) {
                parent_info.children.push(name.clone());
            }
        }

        let mut report = String::new();
        for name in sequence.iter() {
            if let Some(op) = completed.get(name) {
                let is_root = op
                    .parent
                    .as_ref()
                    .map_or(true, |p| !completed.contains_key(p));
                if is_root {
                    build_hierarchy_report(&mut report, op, &completed, 0);
                }
            }
        }
        report
    }
}

fn build_hierarchy_report(
    report: &mut String,
    operation: &TimingInfo,
    all_operations: &HashMap<String, TimingInfo>,
    depth: usize,
) {
    let indent = "  ".repeat(depth);
    report.push_str(&format!(
        "{}{} - {} ms\n",
        indent, operation.name, operation.duration_ms
    ));

    for child_name in &operation.children {
        if let Some(child) = all_operations.get(child_name) {
            build_hierarchy_report(report, child, all_operations, depth + 1);
        }
    }
}

/// Times a future under `name`
pub async fn time_operation<F, T>(
    timer: &PassTimer,
    name: &str,
    parent: Option<&str>,
    operation: F,
) -> T
where
    F: std::future::Future<Output = T>,
{
    timer.start_operation(name, parent).await;
    let result = operation.await;
    timer.end_operation(name).await;
    result
}
