//! Instrument factory.
//!
//! Builds the counters, gauges and histograms handed to the registry. Every
//! instrument lives under the controller namespace, so a name of `count`
//! is exposed as `argo_workflows_count`.

use std::collections::HashMap;

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Counter, Gauge, Histogram, HistogramOpts, Opts};

use super::error::InstrumentError;

pub const NAMESPACE: &str = "argo";
pub const SUBSYSTEM: &str = "workflows";

/// A single measurement object.
///
/// Cloning an instrument yields another handle to the same underlying value.
#[derive(Clone, Debug)]
pub enum Instrument {
    Counter(Counter),
    Gauge(Gauge),
    Histogram(Histogram),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstrumentKind {
    Counter,
    Gauge,
    Histogram,
}

impl Instrument {
    pub fn kind(&self) -> InstrumentKind {
        match self {
            Instrument::Counter(_) => InstrumentKind::Counter,
            Instrument::Gauge(_) => InstrumentKind::Gauge,
            Instrument::Histogram(_) => InstrumentKind::Histogram,
        }
    }

    /// Fully qualified name of the instrument.
    pub fn name(&self) -> &str {
        self.desc()
            .into_iter()
            .next()
            .map(|desc| desc.fq_name.as_str())
            .unwrap_or_default()
    }

    pub fn as_counter(&self) -> Option<&Counter> {
        match self {
            Instrument::Counter(counter) => Some(counter),
            _ => None,
        }
    }

    pub fn as_gauge(&self) -> Option<&Gauge> {
        match self {
            Instrument::Gauge(gauge) => Some(gauge),
            _ => None,
        }
    }

    pub fn as_histogram(&self) -> Option<&Histogram> {
        match self {
            Instrument::Histogram(histogram) => Some(histogram),
            _ => None,
        }
    }

    /// True when both values are handles to the same underlying instrument.
    pub fn shares_value_with(&self, other: &Instrument) -> bool {
        match (self.desc().into_iter().next(), other.desc().into_iter().next()) {
            (Some(a), Some(b)) => std::ptr::eq(a, b),
            _ => false,
        }
    }
}

impl Collector for Instrument {
    fn desc(&self) -> Vec<&Desc> {
        match self {
            Instrument::Counter(counter) => counter.desc(),
            Instrument::Gauge(gauge) => gauge.desc(),
            Instrument::Histogram(histogram) => histogram.desc(),
        }
    }

    fn collect(&self) -> Vec<MetricFamily> {
        match self {
            Instrument::Counter(counter) => counter.collect(),
            Instrument::Gauge(gauge) => gauge.collect(),
            Instrument::Histogram(histogram) => histogram.collect(),
        }
    }
}

impl From<Counter> for Instrument {
    fn from(counter: Counter) -> Self {
        Instrument::Counter(counter)
    }
}

impl From<Gauge> for Instrument {
    fn from(gauge: Gauge) -> Self {
        Instrument::Gauge(gauge)
    }
}

impl From<Histogram> for Instrument {
    fn from(histogram: Histogram) -> Self {
        Instrument::Histogram(histogram)
    }
}

/// Exposed name for `name` once the namespace is applied.
pub fn fq_name(name: &str) -> String {
    format!("{NAMESPACE}_{SUBSYSTEM}_{name}")
}

fn const_labels(labels: &[(&str, &str)]) -> HashMap<String, String> {
    labels
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

fn invalid(name: &str) -> impl FnOnce(prometheus::Error) -> InstrumentError + '_ {
    move |source| InstrumentError {
        name: name.to_string(),
        source,
    }
}

fn opts(name: &str, help: &str, labels: &[(&str, &str)]) -> Opts {
    Opts::new(name, help)
        .namespace(NAMESPACE)
        .subsystem(SUBSYSTEM)
        .const_labels(const_labels(labels))
}

/// Creates a counter with constant labels.
pub fn new_counter(
    name: &str,
    help: &str,
    labels: &[(&str, &str)],
) -> Result<Counter, InstrumentError> {
    Counter::with_opts(opts(name, help, labels)).map_err(invalid(name))
}

/// Creates a gauge with constant labels.
pub fn new_gauge(
    name: &str,
    help: &str,
    labels: &[(&str, &str)],
) -> Result<Gauge, InstrumentError> {
    Gauge::with_opts(opts(name, help, labels)).map_err(invalid(name))
}

/// Creates a histogram with constant labels and explicit bucket bounds.
pub fn new_histogram(
    name: &str,
    help: &str,
    labels: &[(&str, &str)],
    buckets: Vec<f64>,
) -> Result<Histogram, InstrumentError> {
    let opts = HistogramOpts::new(name, help)
        .namespace(NAMESPACE)
        .subsystem(SUBSYSTEM)
        .const_labels(const_labels(labels))
        .buckets(buckets);
    Histogram::with_opts(opts).map_err(invalid(name))
}
