//! Rename and move operations and the lookup index built from them.
//!
//! Operations identify a symbol by the module it is imported from and its
//! original name. The index is built once per run and shared read-only by every
//! file transform; whether an operation matched inside a particular file is
//! tracked by a per-file [`FileOperations`] session.

use std::path::Path;

use anyhow::{Context, Result};
use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Rename `from_name` imported from `module_target` to `to_name`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameOperation {
    #[serde(rename = "from")]
    pub from_name: String,
    #[serde(rename = "to")]
    pub to_name: String,
    #[serde(rename = "module")]
    pub module_target: String,
}

/// Move the import of `target_name` from `module_target` to `to_module`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOperation {
    #[serde(rename = "name")]
    pub target_name: String,
    #[serde(rename = "to")]
    pub to_module: String,
    #[serde(rename = "module")]
    pub module_target: String,
}

impl RenameOperation {
    pub fn new(
        from_name: impl Into<String>,
        to_name: impl Into<String>,
        module_target: impl Into<String>,
    ) -> Self {
        Self {
            from_name: from_name.into(),
            to_name: to_name.into(),
            module_target: module_target.into(),
        }
    }
}

impl MoveOperation {
    pub fn new(
        target_name: impl Into<String>,
        to_module: impl Into<String>,
        module_target: impl Into<String>,
    ) -> Self {
        Self {
            target_name: target_name.into(),
            to_module: to_module.into(),
            module_target: module_target.into(),
        }
    }
}

/// The full set of operations for one run.
///
/// Loaded from TOML as:
///
/// ```toml
/// [[rename]]
/// from = "createExportMachine"
/// to = "create_export_machine"
/// module = "exports.machine"
///
/// [[move]]
/// name = "Machine"
/// to = "exports.types"
/// module = "exports.machine"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationConfig {
    pub rename: Vec<RenameOperation>,
    #[serde(rename = "move")]
    pub moves: Vec<MoveOperation>,
}

impl OperationConfig {
    pub fn is_empty(&self) -> bool {
        self.rename.is_empty() && self.moves.is_empty()
    }

    /// Parse an operation set from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse operation set")
    }

    /// Load an operation set from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read operation file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid operation file {}", path.display()))
    }

    /// Append the operations of `other`, keeping order
    pub fn extend(&mut self, other: Self) {
        self.rename.extend(other.rename);
        self.moves.extend(other.moves);
    }
}

/// Build the lookup key for a symbol imported from a module
pub fn operation_key(module: &str, name: &str) -> String {
    format!("{module}:{name}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameDetail {
    pub to_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveDetail {
    pub to_module: String,
}

/// Lookup maps keyed by `"{module}:{name}"`.
///
/// Names are not validated: a malformed module or symbol produces a key that
/// never matches an import.
#[derive(Debug, Clone, Default)]
pub struct OperationIndex {
    renames: FxHashMap<String, RenameDetail>,
    moves: FxHashMap<String, MoveDetail>,
}

impl OperationIndex {
    pub fn new(config: &OperationConfig) -> Self {
        let mut renames = FxHashMap::default();
        for op in &config.rename {
            let key = operation_key(&op.module_target, &op.from_name);
            if renames
                .insert(
                    key.clone(),
                    RenameDetail {
                        to_name: op.to_name.clone(),
                    },
                )
                .is_some()
            {
                debug!("Rename operation for {key} overrides an earlier one");
            }
        }

        let mut moves = FxHashMap::default();
        for op in &config.moves {
            let key = operation_key(&op.module_target, &op.target_name);
            if moves
                .insert(
                    key.clone(),
                    MoveDetail {
                        to_module: op.to_module.clone(),
                    },
                )
                .is_some()
            {
                debug!("Move operation for {key} overrides an earlier one");
            }
        }

        Self { renames, moves }
    }

    pub fn is_empty(&self) -> bool {
        self.renames.is_empty() && self.moves.is_empty()
    }

    /// Start a per-file working copy with all applied flags cleared
    pub fn session(&self) -> FileOperations<'_> {
        FileOperations {
            index: self,
            applied_renames: FxHashSet::default(),
            applied_moves: FxHashSet::default(),
        }
    }
}

/// Per-file view of an [`OperationIndex`] that records which operations matched
#[derive(Debug)]
pub struct FileOperations<'a> {
    index: &'a OperationIndex,
    applied_renames: FxHashSet<&'a str>,
    applied_moves: FxHashSet<&'a str>,
}

impl<'a> FileOperations<'a> {
    /// Look up the rename for `key` and mark it applied if present
    pub fn apply_rename(&mut self, key: &str) -> Option<&'a RenameDetail> {
        let (stored_key, detail) = self.index.renames.get_key_value(key)?;
        self.applied_renames.insert(stored_key.as_str());
        Some(detail)
    }

    /// Look up the move for `key` and mark it applied if present
    pub fn apply_move(&mut self, key: &str) -> Option<&'a MoveDetail> {
        let (stored_key, detail) = self.index.moves.get_key_value(key)?;
        self.applied_moves.insert(stored_key.as_str());
        Some(detail)
    }

    pub fn applied_count(&self) -> usize {
        self.applied_renames.len() + self.applied_moves.len()
    }
}
