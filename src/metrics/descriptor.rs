//! Descriptor uniqueness table and help registry.

use std::collections::{HashMap, HashSet};
use std::fmt;

use prometheus::core::{Collector, Desc};

use super::error::RegistrationError;

/// Identity of an instrument: fully qualified name plus its canonicalised
/// label set. Help text travels alongside but is not part of the identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Descriptor {
    pub name: String,
    pub help: String,
    key: String,
}

impl Descriptor {
    pub fn of(collector: &dyn Collector) -> Self {
        let descs = collector.desc();
        let (name, help) = descs
            .first()
            .map(|desc| (desc.fq_name.clone(), desc.help.clone()))
            .unwrap_or_default();
        let key = descs
            .iter()
            .map(|desc| canonical(desc))
            .collect::<Vec<_>>()
            .join(";");
        Descriptor { name, help, key }
    }

    /// Canonical string used for equality lookups.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

// name{const="value",...}[variable,...] with both label lists sorted.
fn canonical(desc: &Desc) -> String {
    let mut const_labels: Vec<String> = desc
        .const_label_pairs
        .iter()
        .map(|pair| format!("{}={:?}", pair.get_name(), pair.get_value()))
        .collect();
    const_labels.sort();
    let mut variable_labels = desc.variable_labels.clone();
    variable_labels.sort();
    format!(
        "{}{{{}}}[{}]",
        desc.fq_name,
        const_labels.join(","),
        variable_labels.join(",")
    )
}

/// Descriptors claimed by built-in instruments. Built once, never mutated.
#[derive(Debug, Default)]
pub struct DescriptorTable {
    claimed: HashSet<String>,
}

impl DescriptorTable {
    pub fn from_descriptors<I>(descriptors: I) -> Self
    where
        I: IntoIterator<Item = Descriptor>,
    {
        DescriptorTable {
            claimed: descriptors.into_iter().map(|d| d.key).collect(),
        }
    }

    pub fn is_claimed(&self, descriptor: &Descriptor) -> bool {
        self.claimed.contains(descriptor.key())
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.claimed.len()
    }
}

/// First help text seen for every instrument name.
#[derive(Debug, Default)]
pub struct HelpRegistry {
    helps: HashMap<String, String>,
}

impl HelpRegistry {
    /// Records the help for a name without checking it.
    pub fn seed(&mut self, descriptor: &Descriptor) {
        self.helps
            .entry(descriptor.name.clone())
            .or_insert_with(|| descriptor.help.clone());
    }

    pub fn seed_name(&mut self, name: &str, help: &str) {
        self.helps
            .entry(name.to_string())
            .or_insert_with(|| help.to_string());
    }

    /// Fails if the name is known under different help; otherwise records it.
    pub fn claim(&mut self, descriptor: &Descriptor) -> Result<(), RegistrationError> {
        match self.helps.get(&descriptor.name) {
            Some(existing) if *existing != descriptor.help => {
                Err(RegistrationError::HelpTextMismatch {
                    name: descriptor.name.clone(),
                    help: descriptor.help.clone(),
                    existing: existing.clone(),
                })
            }
            Some(_) => Ok(()),
            None => {
                self.helps
                    .insert(descriptor.name.clone(), descriptor.help.clone());
                Ok(())
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn help_for(&self, name: &str) -> Option<&str> {
        self.helps.get(name).map(String::as_str)
    }
}
