//! Dynamic metric registry.
//!
//! Holds the custom instruments registered while the controller runs and the
//! owner index used to drop every realtime metric of a workflow at once.
//! Nothing in here locks; [`RegistryState`] lives behind the single
//! `RwLock` owned by [`Metrics`](super::Metrics).

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::descriptor::{Descriptor, DescriptorTable, HelpRegistry};
use super::error::RegistrationError;
use super::instrument::Instrument;
use super::workqueue::QueueMetrics;

/// A dynamically registered instrument.
#[derive(Clone, Debug)]
pub struct CustomMetric {
    pub instrument: Instrument,
    pub owner_key: String,
    pub realtime: bool,
    pub last_updated: DateTime<Utc>,
}

/// Registration key → instrument, plus owner key → realtime keys.
///
/// Every key listed under an owner exists in `entries`, and a key is listed
/// under at most one owner, at most once.
#[derive(Debug, Default)]
pub struct CustomMetrics {
    entries: HashMap<String, CustomMetric>,
    owners: HashMap<String, Vec<String>>,
}

impl CustomMetrics {
    /// Stores `instrument` under `key`, replacing any previous entry.
    pub fn upsert(&mut self, key: &str, owner_key: &str, instrument: Instrument, realtime: bool) {
        let previous_owner = self
            .entries
            .get(key)
            .filter(|entry| entry.realtime)
            .map(|entry| entry.owner_key.clone());
        if let Some(previous_owner) = previous_owner {
            if !realtime || previous_owner != owner_key {
                self.unindex(&previous_owner, key);
            }
        }

        self.entries.insert(
            key.to_string(),
            CustomMetric {
                instrument,
                owner_key: owner_key.to_string(),
                realtime,
                last_updated: Utc::now(),
            },
        );

        if realtime {
            let keys = self.owners.entry(owner_key.to_string()).or_default();
            if !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&CustomMetric> {
        self.entries.get(key)
    }

    /// Drops every realtime entry owned by `owner_key`. Returns how many were
    /// removed; zero for an unknown owner.
    pub fn remove_owner(&mut self, owner_key: &str) -> usize {
        let Some(keys) = self.owners.remove(owner_key) else {
            return 0;
        };
        for key in &keys {
            self.entries.remove(key);
        }
        keys.len()
    }

    pub fn owned_keys(&self, owner_key: &str) -> &[String] {
        self.owners
            .get(owner_key)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn instruments(&self) -> impl Iterator<Item = &Instrument> {
        self.entries.values().map(|entry| &entry.instrument)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn unindex(&mut self, owner_key: &str, key: &str) {
        if let Some(keys) = self.owners.get_mut(owner_key) {
            keys.retain(|k| k != key);
            if keys.is_empty() {
                self.owners.remove(owner_key);
            }
        }
    }
}

/// Everything guarded by the registry lock.
#[derive(Debug, Default)]
pub struct RegistryState {
    pub custom: CustomMetrics,
    pub queues: QueueMetrics,
    pub helps: HelpRegistry,
}

impl RegistryState {
    /// Validates `instrument` against the system descriptors, the reserved
    /// queue names and the help registry, then stores it. Nothing changes on error.
    pub fn register(
        &mut self,
        defaults: &DescriptorTable,
        descriptor: &Descriptor,
        key: &str,
        owner_key: &str,
        instrument: Instrument,
        realtime: bool,
    ) -> Result<(), RegistrationError> {
        if defaults.is_claimed(descriptor) || QueueMetrics::reserves(descriptor) {
            return Err(RegistrationError::DescriptorCollision {
                descriptor: descriptor.to_string(),
            });
        }
        self.helps.claim(descriptor)?;
        self.custom.upsert(key, owner_key, instrument, realtime);
        Ok(())
    }
}
