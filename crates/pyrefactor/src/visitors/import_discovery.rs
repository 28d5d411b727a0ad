//! Collects the imports of a module for the project graph, nested ones
//! included, since any of them makes the file a consumer.

use ruff_python_ast::{
    Stmt, StmtImport, StmtImportFrom,
    visitor::{Visitor, walk_stmt},
};

use crate::types::resolve_relative_module;

/// One `import` or `from ... import` statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredImport {
    /// The module being imported, `None` for `from . import x`
    pub module_name: Option<String>,
    /// Imported names with their aliases
    pub names: Vec<(String, Option<String>)>,
    /// Whether this came from `import ...` rather than `from ... import ...`
    pub is_plain_import: bool,
    /// Leading dots of a relative import
    pub level: u32,
}

impl DiscoveredImport {
    /// Candidate module names this import may load, absolute ones only.
    ///
    /// `from pkg import sub` may import the submodule `pkg.sub`, so both are
    /// listed; the caller keeps the ones that exist.
    pub fn candidate_modules(&self, package: Option<&str>) -> Vec<String> {
        let Some(base) = self.resolve_base(package) else {
            return Vec::new();
        };

        if self.is_plain_import {
            return vec![base];
        }

        let mut candidates = Vec::with_capacity(self.names.len() + 1);
        if !base.is_empty() {
            candidates.push(base.clone());
        }
        for (name, _) in &self.names {
            if name == "*" {
                continue;
            }
            if base.is_empty() {
                candidates.push(name.clone());
            } else {
                candidates.push(format!("{base}.{name}"));
            }
        }
        candidates
    }

    /// Resolve the module part against the importing file's package
    fn resolve_base(&self, package: Option<&str>) -> Option<String> {
        resolve_relative_module(self.module_name.as_deref(), self.level, package)
    }
}

/// Visitor that discovers all imports in a Python module
#[derive(Debug, Default)]
pub struct ImportDiscoveryVisitor {
    /// Imports in source order
    imports: Vec<DiscoveredImport>,
}

impl ImportDiscoveryVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the visitor, returning what it found
    pub fn into_imports(self) -> Vec<DiscoveredImport> {
        self.imports
    }

    fn record_import(&mut self, import: &StmtImport) {
        for alias in &import.names {
            self.imports.push(DiscoveredImport {
                module_name: Some(alias.name.to_string()),
                names: Vec::new(),
                is_plain_import: true,
                level: 0,
            });
        }
    }

    fn record_import_from(&mut self, import_from: &StmtImportFrom) {
        let names = import_from
            .names
            .iter()
            .map(|alias| {
                (
                    alias.name.to_string(),
                    alias.asname.as_ref().map(ToString::to_string),
                )
            })
            .collect();

        self.imports.push(DiscoveredImport {
            module_name: import_from.module.as_ref().map(ToString::to_string),
            names,
            is_plain_import: false,
            level: import_from.level,
        });
    }
}

impl<'a> Visitor<'a> for ImportDiscoveryVisitor {
    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        match stmt {
            Stmt::Import(import) => self.record_import(import),
            Stmt::ImportFrom(import_from) => self.record_import_from(import_from),
            _ => walk_stmt(self, stmt),
        }
    }
}
