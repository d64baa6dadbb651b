//! Metrics registry for the workflow controller.
//!
//! [`Metrics`] owns the built-in instruments, the dynamic registry of custom
//! metrics registered per workflow, and the instruments handed to work
//! queues through [`MetricsProvider`]. Everything is exposed for scraping
//! through [`Metrics::gather`] and [`Metrics::render`].

mod collector;
mod descriptor;
mod error;
mod instrument;
mod log_hook;
mod recorder;
mod registry;
mod workqueue;

pub use collector::{encode_families, merge_families};
pub use descriptor::{Descriptor, DescriptorTable, HelpRegistry};
pub use error::{InstrumentError, RegistrationError, RenderError};
pub use instrument::{
    fq_name, new_counter, new_gauge, new_histogram, Instrument, InstrumentKind, NAMESPACE,
    SUBSYSTEM,
};
pub use log_hook::{LogCounterLayer, COUNTED_LEVELS, LOG_MESSAGES_NAME};
pub use recorder::{ErrorCause, Metrics, MetricsRecorder, WorkflowPhase};
pub use registry::{CustomMetric, CustomMetrics};
pub use workqueue::{
    CounterMetric, GaugeMetric, HistogramMetric, MetricsProvider, NoopMetric, QueueMetricKind,
    SettableGaugeMetric, QUEUE_LATENCY_BUCKETS,
};
