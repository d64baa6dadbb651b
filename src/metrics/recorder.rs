//! The controller's metrics handle.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use prometheus::{Counter, CounterVec, Gauge, Histogram};
use tracing::{debug, warn};

use super::descriptor::{Descriptor, DescriptorTable};
use super::error::RegistrationError;
use super::instrument::{fq_name, new_counter, new_gauge, new_histogram, Instrument};
use super::log_hook::{new_log_counter, LogCounterLayer};
use super::registry::RegistryState;
use super::workqueue::{
    QUEUE_ADDS_HELP, QUEUE_ADDS_NAME, QUEUE_DEPTH_HELP, QUEUE_DEPTH_NAME, QUEUE_LATENCY_HELP,
    QUEUE_LATENCY_NAME,
};
use crate::utils::log_throttle::LogThrottle;

const REGISTRATION_WARNING_INTERVAL: Duration = Duration::from_secs(60);

/// Trait for recording controller events on the built-in instruments.
pub trait MetricsRecorder: Clone + Send + Sync + 'static {
    /// Counts one processed workflow update.
    fn workflow_processed(&self);

    /// Records how long one reconciliation took.
    fn operation_completed(&self, duration_secs: f64);

    /// Sets how many workflows currently sit in `phase`.
    fn set_workflow_phase_gauge(&self, phase: WorkflowPhase, count: usize);

    fn operation_panic(&self);

    fn cron_workflow_submission_error(&self);

    fn update_pod_deletion_latency(&self, latency_ms: i64);

    fn increment_pod_gc_added_to_queue(&self);

    fn increment_pod_gc_removed_from_queue(&self);

    fn increment_pod_informer_add_pod(&self);

    fn increment_pod_informer_update_pod(&self);

    fn increment_pod_informer_delete_pod(&self);

    fn update_process_next_item_duration(&self, latency_ms: i64);

    fn update_workflow_queue_depth(&self, depth: usize);

    fn update_pod_queue_depth(&self, depth: usize);

    fn increment_deadline_exceeded(&self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkflowPhase {
    Pending,
    Running,
    Succeeded,
    Skipped,
    Failed,
    Error,
}

impl WorkflowPhase {
    pub const ALL: [WorkflowPhase; 6] = [
        WorkflowPhase::Pending,
        WorkflowPhase::Running,
        WorkflowPhase::Succeeded,
        WorkflowPhase::Skipped,
        WorkflowPhase::Failed,
        WorkflowPhase::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowPhase::Pending => "Pending",
            WorkflowPhase::Running => "Running",
            WorkflowPhase::Succeeded => "Succeeded",
            WorkflowPhase::Skipped => "Skipped",
            WorkflowPhase::Failed => "Failed",
            WorkflowPhase::Error => "Error",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorCause {
    OperationPanic,
    CronWorkflowSubmissionError,
}

impl ErrorCause {
    pub const ALL: [ErrorCause; 2] = [
        ErrorCause::OperationPanic,
        ErrorCause::CronWorkflowSubmissionError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCause::OperationPanic => "OperationPanic",
            ErrorCause::CronWorkflowSubmissionError => "CronWorkflowSubmissionError",
        }
    }
}

/// Instruments declared at startup.
pub(crate) struct Builtins {
    pub workflows_processed: Counter,
    pub operation_durations: Histogram,
    pub workflows_by_phase: BTreeMap<WorkflowPhase, Gauge>,
    pub errors: BTreeMap<ErrorCause, Counter>,

    // Pod and queue bookkeeping
    pub pod_deletion_latency: Gauge,
    pub pod_gc_added_to_queue: Counter,
    pub pod_gc_removed_from_queue: Counter,
    pub pod_informer_add_pod: Counter,
    pub pod_informer_update_pod: Counter,
    pub pod_informer_delete_pod: Counter,
    pub process_next_item_duration: Gauge,
    pub workflow_queue_depth: Gauge,
    pub pod_queue_depth: Gauge,
    pub deadline_exceeded: Counter,
}

impl Builtins {
    fn new() -> Self {
        let counter = |name: &str, help: &str| {
            new_counter(name, help, &[]).unwrap_or_else(|e| panic!("Failed to create {name}: {e}"))
        };
        let gauge = |name: &str, help: &str| {
            new_gauge(name, help, &[]).unwrap_or_else(|e| panic!("Failed to create {name}: {e}"))
        };

        let workflows_by_phase = WorkflowPhase::ALL
            .into_iter()
            .map(|phase| {
                let gauge = new_gauge(
                    "count",
                    "Number of Workflows currently accessible by the controller by status",
                    &[("status", phase.as_str())],
                )
                .expect("Failed to create workflow phase gauge");
                (phase, gauge)
            })
            .collect();

        let errors = ErrorCause::ALL
            .into_iter()
            .map(|cause| {
                let counter = new_counter(
                    "error_count",
                    "Number of errors encountered by the controller by cause",
                    &[("cause", cause.as_str())],
                )
                .expect("Failed to create error counter");
                (cause, counter)
            })
            .collect();

        Builtins {
            workflows_processed: counter(
                "workflows_processed_count",
                "Number of workflow updates processed",
            ),
            operation_durations: new_histogram(
                "operation_duration_seconds",
                "Histogram of durations of operations",
                &[],
                vec![0.1, 0.25, 0.5, 0.75, 1.0, 1.25, 1.5, 1.75, 2.0, 2.5, 3.0],
            )
            .expect("Failed to create operation_duration_seconds"),
            workflows_by_phase,
            errors,
            pod_deletion_latency: gauge(
                "wcustom_pod_deletion_latency",
                "Latency for pod deletion (ms)",
            ),
            pod_gc_added_to_queue: counter(
                "wcustom_pod_gc_added_to_queue",
                "Pod GC requests added to queue",
            ),
            pod_gc_removed_from_queue: counter(
                "wcustom_pod_gc_removed_from_queue",
                "Pod GC requests removed from queue",
            ),
            pod_informer_add_pod: counter(
                "wcustom_pod_informer_add_pod",
                "Pod informer notified that a pod was added",
            ),
            pod_informer_update_pod: counter(
                "wcustom_pod_informer_update_pod",
                "Pod informer notified that a pod was updated",
            ),
            pod_informer_delete_pod: counter(
                "wcustom_pod_informer_delete_pod",
                "Pod informer notified that a pod was deleted",
            ),
            process_next_item_duration: gauge(
                "wcustom_process_next_item_duration",
                "Latency for processing the next queue item (ms)",
            ),
            workflow_queue_depth: gauge(
                "wcustom_workflow_queue_depth",
                "Depth of workflow queue",
            ),
            pod_queue_depth: gauge("wcustom_pod_queue_depth", "Depth of pod queue"),
            deadline_exceeded: counter("wcustom_deadline_exceeded", "Deadline exceeded"),
        }
    }

    /// Every built-in instrument, the fixed ones first.
    pub fn instruments(&self) -> Vec<Instrument> {
        let mut all: Vec<Instrument> = vec![
            self.workflows_processed.clone().into(),
            self.operation_durations.clone().into(),
            self.pod_deletion_latency.clone().into(),
            self.pod_gc_added_to_queue.clone().into(),
            self.pod_gc_removed_from_queue.clone().into(),
            self.pod_informer_add_pod.clone().into(),
            self.pod_informer_update_pod.clone().into(),
            self.pod_informer_delete_pod.clone().into(),
            self.process_next_item_duration.clone().into(),
            self.workflow_queue_depth.clone().into(),
            self.pod_queue_depth.clone().into(),
            self.deadline_exceeded.clone().into(),
        ];
        all.extend(self.workflows_by_phase.values().cloned().map(Instrument::from));
        all.extend(self.errors.values().cloned().map(Instrument::from));
        all
    }
}

pub(crate) struct Inner {
    pub builtins: Builtins,
    pub log_messages: CounterVec,
    defaults: DescriptorTable,
    state: RwLock<RegistryState>,
    throttle: LogThrottle,
}

/// Shared handle to the controller's instruments.
///
/// Cloning is cheap; every clone sees the same registry. Separate calls to
/// [`Metrics::new`] produce independent registries.
#[derive(Clone)]
pub struct Metrics {
    pub(crate) inner: Arc<Inner>,
}

impl Metrics {
    /// Creates the built-in instruments and the empty dynamic registry.
    pub fn new() -> Self {
        let builtins = Builtins::new();
        let log_messages = new_log_counter();

        let mut descriptors: Vec<Descriptor> = builtins
            .instruments()
            .iter()
            .map(|instrument| Descriptor::of(instrument))
            .collect();
        descriptors.push(Descriptor::of(&log_messages));

        let mut state = RegistryState::default();
        for descriptor in &descriptors {
            state.helps.seed(descriptor);
        }
        for (name, help) in [
            (QUEUE_DEPTH_NAME, QUEUE_DEPTH_HELP),
            (QUEUE_ADDS_NAME, QUEUE_ADDS_HELP),
            (QUEUE_LATENCY_NAME, QUEUE_LATENCY_HELP),
        ] {
            state.helps.seed_name(&fq_name(name), help);
        }

        Metrics {
            inner: Arc::new(Inner {
                builtins,
                log_messages,
                defaults: DescriptorTable::from_descriptors(descriptors),
                state: RwLock::new(state),
                throttle: LogThrottle::new(REGISTRATION_WARNING_INTERVAL),
            }),
        }
    }

    pub(crate) fn read_state(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.inner.state.read()
    }

    pub(crate) fn write_state(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.inner.state.write()
    }

    /// Layer to attach to the tracing subscriber so log events are counted.
    pub fn log_layer(&self) -> LogCounterLayer {
        LogCounterLayer::new(self.inner.log_messages.clone())
    }

    /// Registers or replaces the custom metric stored under `key`.
    ///
    /// With `realtime` set the key is tied to `owner_key` and goes away with
    /// [`Metrics::stop_realtime_metrics_for_key`]. Rejected registrations
    /// leave the registry unchanged.
    pub fn upsert_custom_metric(
        &self,
        key: &str,
        owner_key: &str,
        instrument: Instrument,
        realtime: bool,
    ) -> Result<(), RegistrationError> {
        let descriptor = Descriptor::of(&instrument);
        let result = self.write_state().register(
            &self.inner.defaults,
            &descriptor,
            key,
            owner_key,
            instrument,
            realtime,
        );

        match &result {
            Ok(()) => debug!(key, owner_key, realtime, metric = %descriptor.name, "Upserted custom metric"),
            Err(err) => {
                if let Some(suppressed) = self.inner.throttle.should_emit(&descriptor.name) {
                    warn!(key, owner_key, suppressed, "Rejected custom metric: {}", err);
                }
            }
        }
        result
    }

    /// The custom metric stored under `key`, if any.
    pub fn get_custom_metric(&self, key: &str) -> Option<Instrument> {
        self.read_state()
            .custom
            .get(key)
            .map(|entry| entry.instrument.clone())
    }

    pub fn custom_metric_last_updated(&self, key: &str) -> Option<DateTime<Utc>> {
        self.read_state().custom.get(key).map(|entry| entry.last_updated)
    }

    /// Realtime keys currently tied to `owner_key`, in registration order.
    pub fn realtime_metric_keys(&self, owner_key: &str) -> Vec<String> {
        self.read_state().custom.owned_keys(owner_key).to_vec()
    }

    /// Drops every realtime metric owned by `owner_key`. Unknown owners are a no-op.
    pub fn stop_realtime_metrics_for_key(&self, owner_key: &str) {
        let removed = self.write_state().custom.remove_owner(owner_key);
        if removed > 0 {
            debug!(owner_key, removed, "Stopped realtime metrics");
        }
    }

    /// Copy of the live custom instruments.
    pub fn snapshot(&self) -> Vec<Instrument> {
        self.read_state().custom.instruments().cloned().collect()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder for Metrics {
    fn workflow_processed(&self) {
        self.inner.builtins.workflows_processed.inc();
    }

    fn operation_completed(&self, duration_secs: f64) {
        self.inner.builtins.operation_durations.observe(duration_secs);
    }

    fn set_workflow_phase_gauge(&self, phase: WorkflowPhase, count: usize) {
        if let Some(gauge) = self.inner.builtins.workflows_by_phase.get(&phase) {
            gauge.set(count as f64);
        }
    }

    fn operation_panic(&self) {
        if let Some(counter) = self.inner.builtins.errors.get(&ErrorCause::OperationPanic) {
            counter.inc();
        }
    }

    fn cron_workflow_submission_error(&self) {
        if let Some(counter) = self
            .inner
            .builtins
            .errors
            .get(&ErrorCause::CronWorkflowSubmissionError)
        {
            counter.inc();
        }
    }

    fn update_pod_deletion_latency(&self, latency_ms: i64) {
        self.inner.builtins.pod_deletion_latency.set(latency_ms as f64);
    }

    fn increment_pod_gc_added_to_queue(&self) {
        self.inner.builtins.pod_gc_added_to_queue.inc();
    }

    fn increment_pod_gc_removed_from_queue(&self) {
        self.inner.builtins.pod_gc_removed_from_queue.inc();
    }

    fn increment_pod_informer_add_pod(&self) {
        self.inner.builtins.pod_informer_add_pod.inc();
    }

    fn increment_pod_informer_update_pod(&self) {
        self.inner.builtins.pod_informer_update_pod.inc();
    }

    fn increment_pod_informer_delete_pod(&self) {
        self.inner.builtins.pod_informer_delete_pod.inc();
    }

    fn update_process_next_item_duration(&self, latency_ms: i64) {
        self.inner
            .builtins
            .process_next_item_duration
            .set(latency_ms as f64);
    }

    fn update_workflow_queue_depth(&self, depth: usize) {
        self.inner.builtins.workflow_queue_depth.set(depth as f64);
    }

    fn update_pod_queue_depth(&self, depth: usize) {
        self.inner.builtins.pod_queue_depth.set(depth as f64);
    }

    fn increment_deadline_exceeded(&self) {
        self.inner.builtins.deadline_exceeded.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom_gauge(name: &str, help: &str) -> Instrument {
        new_gauge(name, help, &[]).unwrap().into()
    }

    #[test]
    fn test_builtin_descriptors_are_claimed() {
        let metrics = Metrics::new();
        for builtin in metrics.inner.builtins.instruments() {
            let err = metrics
                .upsert_custom_metric("clash", "", builtin, false)
                .unwrap_err();
            assert!(matches!(err, RegistrationError::DescriptorCollision { .. }));
        }

        let rebuilt: Instrument = new_counter(
            "workflows_processed_count",
            "Number of workflow updates processed",
            &[],
        )
        .unwrap()
        .into();
        assert!(metrics
            .upsert_custom_metric("clash", "", rebuilt, false)
            .is_err());
        assert!(metrics.get_custom_metric("clash").is_none());
    }

    #[test]
    fn test_phase_gauge_collision() {
        let metrics = Metrics::new();
        let clash: Instrument = new_gauge(
            "count",
            "Number of Workflows currently accessible by the controller by status",
            &[("status", "Running")],
        )
        .unwrap()
        .into();
        assert!(matches!(
            metrics.upsert_custom_metric("k", "", clash, false),
            Err(RegistrationError::DescriptorCollision { .. })
        ));

        // Same family, unused label value: allowed.
        let fresh: Instrument = new_gauge(
            "count",
            "Number of Workflows currently accessible by the controller by status",
            &[("status", "Archived")],
        )
        .unwrap()
        .into();
        assert!(metrics.upsert_custom_metric("k", "", fresh, false).is_ok());
    }

    #[test]
    fn test_builtin_help_is_enforced() {
        let metrics = Metrics::new();
        let wrong_help: Instrument = new_counter(
            "workflows_processed_count",
            "Something else entirely",
            &[("extra", "label")],
        )
        .unwrap()
        .into();
        assert!(matches!(
            metrics.upsert_custom_metric("k", "", wrong_help, false),
            Err(RegistrationError::HelpTextMismatch { .. })
        ));
    }

    #[test]
    fn test_help_mismatch_keeps_first_instrument() {
        let metrics = Metrics::new();
        let first = custom_gauge("duration", "Duration of the workflow");
        first.as_gauge().unwrap().set(7.0);
        metrics
            .upsert_custom_metric("first", "run-a", first, true)
            .unwrap();

        let second = custom_gauge("duration", "A different help");
        assert!(metrics
            .upsert_custom_metric("second", "run-a", second, true)
            .is_err());

        let kept = metrics.get_custom_metric("first").unwrap();
        assert_eq!(kept.as_gauge().unwrap().get(), 7.0);
        assert!(metrics.get_custom_metric("second").is_none());
        assert_eq!(metrics.realtime_metric_keys("run-a"), vec!["first".to_string()]);
    }

    #[test]
    fn test_last_updated_moves_forward() {
        let metrics = Metrics::new();
        metrics
            .upsert_custom_metric("k", "", custom_gauge("g", "G"), false)
            .unwrap();
        let first = metrics.custom_metric_last_updated("k").unwrap();
        metrics
            .upsert_custom_metric("k", "", custom_gauge("g", "G"), false)
            .unwrap();
        let second = metrics.custom_metric_last_updated("k").unwrap();
        assert!(second >= first);
        assert!(metrics.custom_metric_last_updated("missing").is_none());
    }

    #[test]
    fn test_recorder_updates_builtins() {
        let metrics = Metrics::new();
        metrics.workflow_processed();
        metrics.workflow_processed();
        metrics.operation_completed(0.3);
        metrics.set_workflow_phase_gauge(WorkflowPhase::Running, 4);
        metrics.operation_panic();
        metrics.update_pod_queue_depth(9);

        let builtins = &metrics.inner.builtins;
        assert_eq!(builtins.workflows_processed.get(), 2.0);
        assert_eq!(builtins.operation_durations.get_sample_count(), 1);
        assert_eq!(
            builtins.workflows_by_phase[&WorkflowPhase::Running].get(),
            4.0
        );
        assert_eq!(builtins.errors[&ErrorCause::OperationPanic].get(), 1.0);
        assert_eq!(
            builtins.errors[&ErrorCause::CronWorkflowSubmissionError].get(),
            0.0
        );
        assert_eq!(builtins.pod_queue_depth.get(), 9.0);
    }

    #[test]
    fn test_instances_are_independent() {
        let a = Metrics::new();
        let b = Metrics::new();
        a.upsert_custom_metric("k", "", custom_gauge("g", "G"), false)
            .unwrap();
        assert!(a.get_custom_metric("k").is_some());
        assert!(b.get_custom_metric("k").is_none());
    }
}
