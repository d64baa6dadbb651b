//! Work-queue instrumentation.
//!
//! A work queue asks its [`MetricsProvider`] for one instrument per concern
//! when it is created. Depth, adds and latency are backed by real
//! instruments, memoized per queue name; the remaining accessors hand out
//! [`NoopMetric`] so the queue can call them freely.

use std::collections::HashMap;

use prometheus::{Counter, Gauge, Histogram};
use tracing::warn;

use super::descriptor::Descriptor;
use super::instrument::{
    fq_name, new_counter, new_gauge, new_histogram, Instrument, InstrumentKind,
};
use super::recorder::Metrics;

pub const QUEUE_DEPTH_NAME: &str = "queue_depth_count";
pub const QUEUE_DEPTH_HELP: &str = "Depth of the queue";
pub const QUEUE_ADDS_NAME: &str = "queue_adds_count";
pub const QUEUE_ADDS_HELP: &str = "Adds to the queue";
pub const QUEUE_LATENCY_NAME: &str = "queue_latency";
pub const QUEUE_LATENCY_HELP: &str = "Time objects spend waiting in the queue";
pub const QUEUE_LATENCY_BUCKETS: [f64; 5] = [1.0, 5.0, 20.0, 60.0, 180.0];

pub trait GaugeMetric: Send + Sync {
    fn inc(&self);
    fn dec(&self);
}

pub trait SettableGaugeMetric: Send + Sync {
    fn set(&self, value: f64);
}

pub trait CounterMetric: Send + Sync {
    fn inc(&self);
}

pub trait HistogramMetric: Send + Sync {
    fn observe(&self, value: f64);
}

/// The instruments a work queue needs, looked up by queue name.
pub trait MetricsProvider: Send + Sync {
    fn new_depth_metric(&self, name: &str) -> Box<dyn GaugeMetric>;
    fn new_adds_metric(&self, name: &str) -> Box<dyn CounterMetric>;
    fn new_latency_metric(&self, name: &str) -> Box<dyn HistogramMetric>;
    fn new_work_duration_metric(&self, name: &str) -> Box<dyn HistogramMetric>;
    fn new_unfinished_work_seconds_metric(&self, name: &str) -> Box<dyn SettableGaugeMetric>;
    fn new_longest_running_processor_seconds_metric(
        &self,
        name: &str,
    ) -> Box<dyn SettableGaugeMetric>;
    fn new_retries_metric(&self, name: &str) -> Box<dyn CounterMetric>;
}

impl GaugeMetric for Gauge {
    fn inc(&self) {
        Gauge::inc(self)
    }

    fn dec(&self) {
        Gauge::dec(self)
    }
}

impl CounterMetric for Counter {
    fn inc(&self) {
        Counter::inc(self)
    }
}

impl HistogramMetric for Histogram {
    fn observe(&self, value: f64) {
        Histogram::observe(self, value)
    }
}

/// Accepts every call and reports nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetric;

impl GaugeMetric for NoopMetric {
    fn inc(&self) {}
    fn dec(&self) {}
}

impl SettableGaugeMetric for NoopMetric {
    fn set(&self, _value: f64) {}
}

impl CounterMetric for NoopMetric {
    fn inc(&self) {}
}

impl HistogramMetric for NoopMetric {
    fn observe(&self, _value: f64) {}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueueMetricKind {
    Depth,
    Adds,
    Latency,
}

impl QueueMetricKind {
    pub const ALL: [QueueMetricKind; 3] = [
        QueueMetricKind::Depth,
        QueueMetricKind::Adds,
        QueueMetricKind::Latency,
    ];

    /// Unqualified instrument name.
    pub fn name(self) -> &'static str {
        match self {
            QueueMetricKind::Depth => QUEUE_DEPTH_NAME,
            QueueMetricKind::Adds => QUEUE_ADDS_NAME,
            QueueMetricKind::Latency => QUEUE_LATENCY_NAME,
        }
    }

    fn build(self, queue_name: &str) -> Result<Instrument, super::error::InstrumentError> {
        let labels = [("queue_name", queue_name)];
        let instrument = match self {
            QueueMetricKind::Depth => new_gauge(QUEUE_DEPTH_NAME, QUEUE_DEPTH_HELP, &labels)?.into(),
            QueueMetricKind::Adds => new_counter(QUEUE_ADDS_NAME, QUEUE_ADDS_HELP, &labels)?.into(),
            QueueMetricKind::Latency => new_histogram(
                QUEUE_LATENCY_NAME,
                QUEUE_LATENCY_HELP,
                &labels,
                QUEUE_LATENCY_BUCKETS.to_vec(),
            )?
            .into(),
        };
        Ok(instrument)
    }
}

/// Memoized queue instruments keyed by (queue name, kind).
#[derive(Debug, Default)]
pub struct QueueMetrics {
    instruments: HashMap<(String, QueueMetricKind), Instrument>,
}

impl QueueMetrics {
    pub fn get(&self, queue_name: &str, kind: QueueMetricKind) -> Option<&Instrument> {
        self.instruments.get(&(queue_name.to_string(), kind))
    }

    /// Returns the stored instrument, building it on first request.
    pub fn get_or_create(
        &mut self,
        queue_name: &str,
        kind: QueueMetricKind,
    ) -> Result<Instrument, super::error::InstrumentError> {
        let key = (queue_name.to_string(), kind);
        if let Some(existing) = self.instruments.get(&key) {
            return Ok(existing.clone());
        }
        let instrument = kind.build(queue_name)?;
        self.instruments.insert(key, instrument.clone());
        Ok(instrument)
    }

    /// True when `descriptor` uses a queue instrument name. Queue names are
    /// reserved whether or not a queue has asked for the instrument yet.
    pub fn reserves(descriptor: &Descriptor) -> bool {
        QueueMetricKind::ALL
            .iter()
            .any(|kind| fq_name(kind.name()) == descriptor.name)
    }

    pub fn instruments(&self) -> impl Iterator<Item = &Instrument> {
        self.instruments.values()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.instruments.len()
    }
}

impl Metrics {
    /// Looks up an already created queue instrument.
    pub fn queue_metric(&self, queue_name: &str, kind: QueueMetricKind) -> Option<Instrument> {
        self.read_state().queues.get(queue_name, kind).cloned()
    }

    fn queue_instrument(&self, queue_name: &str, kind: QueueMetricKind) -> Option<Instrument> {
        if let Some(existing) = self.queue_metric(queue_name, kind) {
            return Some(existing);
        }
        let created = self.write_state().queues.get_or_create(queue_name, kind);
        match created {
            Ok(instrument) => Some(instrument),
            Err(err) => {
                warn!(queue = queue_name, ?kind, "Failed to create queue metric: {}", err);
                None
            }
        }
    }
}

impl MetricsProvider for Metrics {
    fn new_depth_metric(&self, name: &str) -> Box<dyn GaugeMetric> {
        match self.queue_instrument(name, QueueMetricKind::Depth) {
            Some(Instrument::Gauge(gauge)) => Box::new(gauge),
            _ => Box::new(NoopMetric),
        }
    }

    fn new_adds_metric(&self, name: &str) -> Box<dyn CounterMetric> {
        match self.queue_instrument(name, QueueMetricKind::Adds) {
            Some(Instrument::Counter(counter)) => Box::new(counter),
            _ => Box::new(NoopMetric),
        }
    }

    fn new_latency_metric(&self, name: &str) -> Box<dyn HistogramMetric> {
        match self.queue_instrument(name, QueueMetricKind::Latency) {
            Some(Instrument::Histogram(histogram)) => Box::new(histogram),
            _ => Box::new(NoopMetric),
        }
    }

    // Not exposed.
    fn new_work_duration_metric(&self, _name: &str) -> Box<dyn HistogramMetric> {
        Box::new(NoopMetric)
    }

    fn new_unfinished_work_seconds_metric(&self, _name: &str) -> Box<dyn SettableGaugeMetric> {
        Box::new(NoopMetric)
    }

    fn new_longest_running_processor_seconds_metric(
        &self,
        _name: &str,
    ) -> Box<dyn SettableGaugeMetric> {
        Box::new(NoopMetric)
    }

    fn new_retries_metric(&self, _name: &str) -> Box<dyn CounterMetric> {
        Box::new(NoopMetric)
    }
}

impl From<QueueMetricKind> for InstrumentKind {
    fn from(kind: QueueMetricKind) -> Self {
        match kind {
            QueueMetricKind::Depth => InstrumentKind::Gauge,
            QueueMetricKind::Adds => InstrumentKind::Counter,
            QueueMetricKind::Latency => InstrumentKind::Histogram,
        }
    }
}
