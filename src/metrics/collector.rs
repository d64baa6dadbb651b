//! Scrape facade: enumerates every live instrument and renders it.

use std::collections::{BTreeMap, HashSet};

use prometheus::core::Collector;
use prometheus::proto::{Metric, MetricFamily};
use prometheus::{Encoder, TextEncoder};
use tracing::warn;

use super::error::RenderError;
use super::instrument::Instrument;
use super::recorder::Metrics;

impl Metrics {
    /// Built-in, queue and custom instruments, read under one lock
    /// acquisition so a scrape never sees a half-applied registration.
    pub fn all_metrics(&self) -> Vec<Instrument> {
        let state = self.read_state();
        let mut all = self.inner.builtins.instruments();
        all.extend(state.queues.instruments().cloned());
        all.extend(state.custom.instruments().cloned());
        all
    }

    /// Raw families of every instrument plus the log counter, one per
    /// instrument, not yet merged.
    pub fn collect_families(&self) -> Vec<MetricFamily> {
        let mut families: Vec<MetricFamily> = self
            .all_metrics()
            .iter()
            .flat_map(|instrument| instrument.collect())
            .collect();
        families.extend(self.inner.log_messages.collect());
        families
    }

    /// Merged families, one per name, sorted by name. See [`merge_families`]
    /// for how duplicate series are handled.
    pub fn gather(&self, ignore_errors: bool) -> Result<Vec<MetricFamily>, RenderError> {
        merge_families(self.collect_families(), ignore_errors)
    }

    /// Renders every instrument in the Prometheus text format. Fails on
    /// duplicate series.
    pub fn render(&self) -> Result<String, RenderError> {
        encode_families(&self.gather(false)?, false)
    }
}

/// Folds families sharing a name into one and drops empty ones.
///
/// A series whose label set was already seen under the same name, or a
/// family whose type differs from the first one of that name, is an error.
/// With `ignore_errors` it is logged and left out instead.
pub fn merge_families(
    families: Vec<MetricFamily>,
    ignore_errors: bool,
) -> Result<Vec<MetricFamily>, RenderError> {
    let mut merged: BTreeMap<String, (MetricFamily, HashSet<String>)> = BTreeMap::new();
    for mut family in families {
        let metrics = family.take_metric();
        if metrics.is_empty() {
            continue;
        }
        let (target, seen) = merged
            .entry(family.get_name().to_string())
            .or_insert_with(|| (family.clone(), HashSet::new()));

        if target.get_field_type() != family.get_field_type() {
            skip_or_fail(
                RenderError::InconsistentType {
                    name: family.get_name().to_string(),
                },
                ignore_errors,
            )?;
            continue;
        }
        for metric in metrics {
            let labels = series_labels(&metric);
            if seen.contains(&labels) {
                skip_or_fail(
                    RenderError::DuplicateSeries {
                        name: family.get_name().to_string(),
                        labels,
                    },
                    ignore_errors,
                )?;
                continue;
            }
            seen.insert(labels);
            target.mut_metric().push(metric);
        }
    }
    Ok(merged.into_values().map(|(family, _)| family).collect())
}

// {a="1",b="2"} with pairs sorted by name.
fn series_labels(metric: &Metric) -> String {
    let mut pairs: Vec<String> = metric
        .get_label()
        .iter()
        .map(|pair| format!("{}={:?}", pair.get_name(), pair.get_value()))
        .collect();
    pairs.sort();
    format!("{{{}}}", pairs.join(","))
}

fn skip_or_fail(err: RenderError, ignore_errors: bool) -> Result<(), RenderError> {
    if ignore_errors {
        warn!("Skipping metric series: {}", err);
        Ok(())
    } else {
        Err(err)
    }
}

/// Encodes families one at a time. With `ignore_errors` a family that fails
/// to encode is logged and skipped instead of failing the whole scrape.
pub fn encode_families(
    families: &[MetricFamily],
    ignore_errors: bool,
) -> Result<String, RenderError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    for family in families {
        let mut encoded = Vec::new();
        match encoder.encode(std::slice::from_ref(family), &mut encoded) {
            Ok(()) => buffer.extend(encoded),
            Err(err) if ignore_errors => {
                warn!(family = family.get_name(), "Skipping metric family: {}", err);
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(String::from_utf8(buffer)?)
}
