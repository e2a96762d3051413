// Capabilities module
// Loads the capability table from TOML and detects which capabilities a task needs


use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Config;
use crate::context::ContextMap;
use crate::{RagError, Result};

const DEFAULT_TABLE: &str = include_str!("default_capabilities.toml");

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Lower-cased substrings matched against the task description
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Context keys whose presence implies the capability
    #[serde(default)]
    pub context_hints: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Force-adds a capability when a context key holds a recognised value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodOverride {
    pub context_key: String,
    /// Lower-cased value to capability id
    #[serde(default)]
    pub choices: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityTable {
    #[serde(default)]
    pub capabilities: BTreeMap<String, CapabilitySpec>,
    #[serde(default)]
    pub overrides: Vec<MethodOverride>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

impl CapabilityTable {
    /// The table compiled into the binary
    #[inline]
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(DEFAULT_TABLE)
    }

    /// Parse, normalize and validate a table.
    #[inline]
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut table: Self = toml::from_str(content)
            .map_err(|e| RagError::Capability(format!("Invalid capability table: {}", e)))?;
        table.normalize();
        table.validate()?;
        Ok(table)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read capability table: {}", path.display()))?;
        let table = Self::from_toml_str(&content)?;
        info!(
            "Loaded {} capabilities from {}",
            table.capabilities.len(),
            path.display()
        );
        Ok(table)
    }

    /// `<base_dir>/capabilities.toml` when present, else the built-in table
    #[inline]
    pub fn load_for(config: &Config) -> Result<Self> {
        let path = config.capabilities_path();
        if path.exists() {
            Self::load(path)
        } else {
            debug!("No capability table at {}, using built-in", path.display());
            Self::builtin()
        }
    }

    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.capabilities.contains_key(id)
    }

    fn normalize(&mut self) {
        for spec in self.capabilities.values_mut() {
            for keyword in &mut spec.keywords {
                *keyword = keyword.trim().to_lowercase();
            }
            spec.keywords.retain(|k| !k.is_empty());
        }
        for rule in &mut self.overrides {
            rule.choices = std::mem::take(&mut rule.choices)
                .into_iter()
                .map(|(value, target)| (value.trim().to_lowercase(), target))
                .collect();
        }
    }

    /// Reject unknown dependency ids, unknown override targets and
    /// dependency cycles.
    #[inline]
    pub fn validate(&self) -> Result<()> {
        for (id, spec) in &self.capabilities {
            if let Some(missing) = spec.dependencies.iter().find(|dep| !self.contains(dep)) {
                return Err(RagError::Capability(format!(
                    "Capability '{}' depends on unknown capability '{}'",
                    id, missing
                )));
            }
        }

        for rule in &self.overrides {
            if let Some((value, target)) =
                rule.choices.iter().find(|(_, target)| !self.contains(target))
            {
                return Err(RagError::Capability(format!(
                    "Override '{}' = '{}' targets unknown capability '{}'",
                    rule.context_key, value, target
                )));
            }
        }

        let mut state = HashMap::new();
        let mut path = Vec::new();
        for id in self.capabilities.keys() {
            self.visit(id, &mut state, &mut path)?;
        }

        Ok(())
    }

    fn visit<'a>(
        &'a self,
        id: &'a str,
        state: &mut HashMap<&'a str, Visit>,
        path: &mut Vec<&'a str>,
    ) -> Result<()> {
        match state.get(id) {
            Some(Visit::Done) => return Ok(()),
            Some(Visit::InProgress) => {
                let start = path.iter().position(|p| *p == id).unwrap_or(0);
                let mut cycle: Vec<&str> = path.get(start..).unwrap_or_default().to_vec();
                cycle.push(id);
                return Err(RagError::Capability(format!(
                    "Dependency cycle: {}",
                    cycle.join(" -> ")
                )));
            }
            None => {}
        }

        state.insert(id, Visit::InProgress);
        path.push(id);
        if let Some(spec) = self.capabilities.get(id) {
            for dep in &spec.dependencies {
                self.visit(dep, state, path)?;
            }
        }
        path.pop();
        state.insert(id, Visit::Done);
        Ok(())
    }
}

/// Infers which capabilities a task needs.
#[derive(Debug, Clone)]
pub struct CapabilityDetector {
    table: CapabilityTable,
}

impl CapabilityDetector {
    #[inline]
    pub fn new(table: CapabilityTable) -> Self {
        Self { table }
    }

    #[inline]
    pub fn table(&self) -> &CapabilityTable {
        &self.table
    }

    /// Detect capabilities from the task text and the context keys.
    ///
    /// Keywords are matched as substrings of the lower-cased task, context
    /// hints by key presence, and method overrides by the trimmed,
    /// case-insensitive string value of their key. Overrides only ever add.
    /// The result includes every transitive dependency and is sorted.
    #[inline]
    pub fn detect(&self, task: &str, context: &ContextMap) -> Vec<String> {
        let task_lower = task.to_lowercase();
        let mut detected = BTreeSet::new();

        for (id, spec) in &self.table.capabilities {
            let keyword = spec.keywords.iter().find(|k| task_lower.contains(k.as_str()));
            let hint = spec.context_hints.iter().find(|h| context.contains_key(*h));
            if let Some(keyword) = keyword {
                debug!("Capability '{}' matched keyword '{}'", id, keyword);
                detected.insert(id.clone());
            } else if let Some(hint) = hint {
                debug!("Capability '{}' matched context key '{}'", id, hint);
                detected.insert(id.clone());
            }
        }

        for rule in &self.table.overrides {
            let Some(value) = context.get(&rule.context_key).and_then(|v| v.as_str()) else {
                continue;
            };
            if let Some(target) = rule.choices.get(&value.trim().to_lowercase()) {
                debug!(
                    "Override '{}' = '{}' adds capability '{}'",
                    rule.context_key, value, target
                );
                detected.insert(target.clone());
            }
        }

        self.dependency_closure(detected).into_iter().collect()
    }

    /// Expand a set with every capability it transitively depends on.
    #[inline]
    pub fn dependency_closure(&self, seeds: BTreeSet<String>) -> BTreeSet<String> {
        let mut closure = seeds;
        let mut pending: Vec<String> = closure.iter().cloned().collect();

        while let Some(id) = pending.pop() {
            let Some(spec) = self.table.capabilities.get(&id) else {
                continue;
            };
            for dep in &spec.dependencies {
                if closure.insert(dep.clone()) {
                    pending.push(dep.clone());
                }
            }
        }

        closure
    }
}
