// src/core/elasticsearch/settings.rs

//! Models the cluster's shard-allocation exclusion settings.
//!
//! The cluster stores four parallel exclusion criteria (by node name, host,
//! ip, and arbitrary node attribute). Each is serialized on the wire as a
//! comma-joined string under a fixed dotted key; clearing a criterion
//! requires writing an explicit JSON `null`.

use crate::core::errors::ScaleGuardError;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// The dotted-key prefix all exclusion settings live under.
pub const EXCLUDE_PREFIX: &str = "cluster.routing.allocation.exclude";

/// A point-in-time snapshot of the cluster's shard-allocation exclusions.
///
/// Lists are kept sorted and deduplicated at all times so that writes are
/// deterministic and idempotency checks are a binary search away.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardAllocationExcludeSettings {
    pub name: Vec<String>,
    pub host: Vec<String>,
    pub ip: Vec<String>,
    pub attr: BTreeMap<String, Vec<String>>,
}

impl ShardAllocationExcludeSettings {
    /// Parses a `GET /_cluster/settings` response body filtered to the
    /// exclusion subtree. Both the `persistent` and `transient` blocks are
    /// read; transient values win per key.
    pub fn from_settings_body(body: &Value) -> Result<Self, ScaleGuardError> {
        let mut settings = Self::default();
        for block in ["persistent", "transient"] {
            if let Some(exclude) = body
                .get(block)
                .and_then(|v| v.get("cluster"))
                .and_then(|v| v.get("routing"))
                .and_then(|v| v.get("allocation"))
                .and_then(|v| v.get("exclude"))
            {
                settings.apply_exclude_object(exclude)?;
            }
        }
        Ok(settings)
    }

    fn apply_exclude_object(&mut self, exclude: &Value) -> Result<(), ScaleGuardError> {
        let Some(map) = exclude.as_object() else {
            return Err(ScaleGuardError::InconsistentNodes(format!(
                "exclusion settings are not an object: {exclude}"
            )));
        };
        for (key, value) in map {
            let list = match value {
                Value::Null => Vec::new(),
                Value::String(s) => parse_exclusion_list(s),
                other => {
                    return Err(ScaleGuardError::InconsistentNodes(format!(
                        "exclusion setting '{key}' has non-string value: {other}"
                    )));
                }
            };
            match key.as_str() {
                "_name" => self.name = list,
                "_host" => self.host = list,
                "_ip" => self.ip = list,
                attr => {
                    self.attr.insert(attr.to_string(), list);
                }
            }
        }
        Ok(())
    }

    /// True when no criterion excludes anything.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
            && self.host.is_empty()
            && self.ip.is_empty()
            && self.attr.values().all(|v| v.is_empty())
    }

    pub fn contains_name(&self, node_name: &str) -> bool {
        self.name.binary_search_by(|n| n.as_str().cmp(node_name)).is_ok()
    }

    /// Inserts `node_name` into the sorted name list. Returns false when the
    /// name was already present (no change made).
    pub fn insert_name(&mut self, node_name: &str) -> bool {
        match self.name.binary_search_by(|n| n.as_str().cmp(node_name)) {
            Ok(_) => false,
            Err(idx) => {
                self.name.insert(idx, node_name.to_string());
                true
            }
        }
    }

    /// Removes `node_name` from the name list. Returns false when the name
    /// was absent (no change made).
    pub fn remove_name(&mut self, node_name: &str) -> bool {
        match self.name.binary_search_by(|n| n.as_str().cmp(node_name)) {
            Ok(idx) => {
                self.name.remove(idx);
                true
            }
            Err(_) => false,
        }
    }

    /// Whether a node with the given identity falls within any exclusion
    /// criterion.
    pub fn excludes(
        &self,
        name: &str,
        host: &str,
        ip: &str,
        attributes: &std::collections::HashMap<String, String>,
    ) -> bool {
        if self.contains_name(name)
            || self.host.iter().any(|h| h == host)
            || self.ip.iter().any(|i| i == ip)
        {
            return true;
        }
        self.attr.iter().any(|(attr, values)| {
            attributes
                .get(attr)
                .is_some_and(|v| values.iter().any(|x| x == v))
        })
    }

    /// Builds the `PUT /_cluster/settings` body that installs this
    /// snapshot's name list.
    ///
    /// Only `_name` carries a value. `_host`, `_ip`, and every attribute key
    /// observed in the current settings are written as explicit nulls so a
    /// criterion cleared by other tooling is never resurrected by this write.
    pub fn transient_name_update(&self) -> Value {
        let mut transient = Map::new();
        transient.insert(
            format!("{EXCLUDE_PREFIX}._name"),
            join_exclusion_list(&self.name),
        );
        transient.insert(format!("{EXCLUDE_PREFIX}._host"), Value::Null);
        transient.insert(format!("{EXCLUDE_PREFIX}._ip"), Value::Null);
        for attr in self.attr.keys() {
            transient.insert(format!("{EXCLUDE_PREFIX}.{attr}"), Value::Null);
        }
        json!({ "transient": Value::Object(transient) })
    }
}

/// Splits a comma-joined exclusion string into a sorted, deduplicated list.
pub fn parse_exclusion_list(raw: &str) -> Vec<String> {
    let mut list: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    list.sort();
    list.dedup();
    list
}

/// Joins a sorted list back into the wire form; an empty list becomes the
/// JSON null that requests removal of the setting.
pub fn join_exclusion_list(list: &[String]) -> Value {
    if list.is_empty() {
        Value::Null
    } else {
        Value::String(list.join(","))
    }
}
