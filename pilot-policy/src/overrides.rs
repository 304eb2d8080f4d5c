//! Operator override directives.
//!
//! Overrides let operators force or suppress the automated retire/promote
//! flags for a specific entity. They are persisted as a flat JSON object
//! mapping entity id to directive:
//!
//! ```json
//! {
//!     "entityA": "force_retire",
//!     "entityB": "ignore_promote"
//! }
//! ```
//!
//! The file is consulted (never mutated) by the upstream scoring
//! collaborator on each run and updated whenever an operator sets or clears
//! an override through the management API.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use pilot_common::{Error, Result};

/// Automated flag assigned to an entity by the scoring collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityFlag {
    Retire,
    Promote,
    Watch,
}

/// An operator directive for a single entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideDirective {
    /// Always retire the entity regardless of score
    ForceRetire,
    /// Always promote the entity regardless of score
    ForcePromote,
    /// Suppress a retire flag if one would normally be set
    IgnoreRetire,
    /// Suppress a promote flag if one would normally be set
    IgnorePromote,
}

impl OverrideDirective {
    /// The persisted string form of the directive.
    pub fn as_str(self) -> &'static str {
        match self {
            OverrideDirective::ForceRetire => "force_retire",
            OverrideDirective::ForcePromote => "force_promote",
            OverrideDirective::IgnoreRetire => "ignore_retire",
            OverrideDirective::IgnorePromote => "ignore_promote",
        }
    }

    /// Resolve this directive against an automated flag.
    pub fn apply(self, flag: Option<EntityFlag>) -> Option<EntityFlag> {
        match self {
            OverrideDirective::ForceRetire => Some(EntityFlag::Retire),
            OverrideDirective::ForcePromote => Some(EntityFlag::Promote),
            OverrideDirective::IgnoreRetire if flag == Some(EntityFlag::Retire) => None,
            OverrideDirective::IgnorePromote if flag == Some(EntityFlag::Promote) => None,
            _ => flag,
        }
    }
}

impl FromStr for OverrideDirective {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "force_retire" => Ok(OverrideDirective::ForceRetire),
            "force_promote" => Ok(OverrideDirective::ForcePromote),
            "ignore_retire" => Ok(OverrideDirective::IgnoreRetire),
            "ignore_promote" => Ok(OverrideDirective::IgnorePromote),
            other => Err(format!("invalid override directive: {other}")),
        }
    }
}

/// Persisted map of entity id to operator directive.
pub struct OverrideStore {
    path: PathBuf,
}

impl OverrideStore {
    /// Create a store over the given file path. The file is created on
    /// first write.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load all overrides from disk.
    ///
    /// Returns an empty map if the file does not exist or cannot be parsed.
    /// Unknown directive values are dropped with a warning, never fatal.
    pub fn load(&self) -> BTreeMap<String, OverrideDirective> {
        if !self.path.exists() {
            return BTreeMap::new();
        }
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read overrides file");
                return BTreeMap::new();
            }
        };
        let entries: BTreeMap<String, String> = match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to parse overrides file");
                return BTreeMap::new();
            }
        };

        let mut overrides = BTreeMap::new();
        for (entity_id, directive) in entries {
            match directive.parse::<OverrideDirective>() {
                Ok(parsed) => {
                    overrides.insert(entity_id, parsed);
                }
                Err(_) => {
                    tracing::warn!(
                        entity_id = %entity_id,
                        directive = %directive,
                        "Dropping invalid override directive"
                    );
                }
            }
        }
        overrides
    }

    /// Return the directive for a given entity, if any.
    pub fn get(&self, entity_id: &str) -> Option<OverrideDirective> {
        self.load().get(entity_id).copied()
    }

    /// Set or update an override for an entity.
    pub fn set(&self, entity_id: &str, directive: OverrideDirective) -> Result<()> {
        let mut overrides = self.load();
        overrides.insert(entity_id.to_string(), directive);
        self.save(&overrides)
    }

    /// Parse and set an override from its string form.
    pub fn set_str(&self, entity_id: &str, directive: &str) -> Result<()> {
        let parsed = directive
            .parse::<OverrideDirective>()
            .map_err(Error::InvalidInput)?;
        self.set(entity_id, parsed)
    }

    /// Remove an override for an entity. Returns false if none was set.
    pub fn clear(&self, entity_id: &str) -> Result<bool> {
        let mut overrides = self.load();
        if overrides.remove(entity_id).is_none() {
            return Ok(false);
        }
        self.save(&overrides)?;
        Ok(true)
    }

    /// Persist overrides atomically (temporary file, then rename).
    fn save(&self, overrides: &BTreeMap<String, OverrideDirective>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let serialized: BTreeMap<&str, &str> = overrides
            .iter()
            .map(|(id, directive)| (id.as_str(), directive.as_str()))
            .collect();
        let raw = serde_json::to_string_pretty(&serialized)?;
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, raw)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}
