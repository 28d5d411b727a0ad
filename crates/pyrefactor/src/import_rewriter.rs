//! Import rewriting for rename and move operations.
//!
//! One pass over the module-level `from ... import ...` declarations decides,
//! for every named specifier, whether it is renamed, moved or both. Renamed
//! specifiers are rewritten in place, moved ones are collected per destination
//! module and merged at the end: appended to an existing declaration of the
//! destination, or prepended as a new declaration.

use log::debug;
use ruff_python_ast::{Alias, ExceptHandler, Identifier, ModModule, Stmt, StmtImportFrom};
use ruff_python_codegen::Stylist;
use ruff_text_size::{Ranged, TextLen, TextSize};

use crate::{
    ast_builder,
    code_generator::{Edit, removal_range, render_statement},
    operations::{FileOperations, operation_key},
    types::{FxIndexMap, import_from_module_path, resolve_relative_module},
};

/// Result of rewriting one module's imports
#[derive(Debug, Default)]
pub struct ImportRewrite {
    /// Edits for changed, removed and inserted import declarations
    pub edits: Vec<Edit>,
    /// `(old local name, new local name)` pairs to rename throughout the module
    pub scope_renames: Vec<(String, String)>,
    /// Whether anything changed
    pub dirty: bool,
}

/// A top-level declaration kept in memory until moved specifiers are merged
#[derive(Debug)]
struct PendingImport<'ast> {
    stmt: &'ast StmtImportFrom,
    module_path: String,
    names: Vec<Alias>,
    changed: bool,
}

/// Outcome of processing the specifiers of one declaration
struct SpecifierRewrite {
    retained: Vec<Alias>,
    changed: bool,
}

/// Applies a file's rename and move operations to its import declarations
#[derive(Debug)]
pub struct ImportRewriter<'ops, 'src> {
    source: &'src str,
    stylist: &'src Stylist<'src>,
    operations: FileOperations<'ops>,
    /// Package of the file, used to resolve relative declarations
    package: Option<&'src str>,
    /// Specifiers moved away, keyed by destination module path
    moved: FxIndexMap<String, Vec<Alias>>,
    scope_renames: Vec<(String, String)>,
    edits: Vec<Edit>,
    dirty: bool,
}

impl<'ops, 'src> ImportRewriter<'ops, 'src> {
    pub fn new(
        source: &'src str,
        stylist: &'src Stylist<'src>,
        operations: FileOperations<'ops>,
    ) -> Self {
        Self {
            source,
            stylist,
            operations,
            package: None,
            moved: FxIndexMap::default(),
            scope_renames: Vec::new(),
            edits: Vec::new(),
            dirty: false,
        }
    }

    /// Also match relative declarations by their absolute module, resolved
    /// against `package`
    #[must_use]
    pub fn with_package(mut self, package: Option<&'src str>) -> Self {
        self.package = package;
        self
    }

    /// Rewrite the module's imports and merge moved specifiers
    pub fn rewrite_module(mut self, module: &ModModule) -> ImportRewrite {
        let mut pending = Vec::new();
        for stmt in &module.body {
            match stmt {
                Stmt::ImportFrom(import_from) => {
                    let module_path = declaration_module_path(import_from);
                    let rewrite = self.rewrite_specifiers(import_from, &module_path);
                    pending.push(PendingImport {
                        stmt: import_from,
                        module_path,
                        names: rewrite.retained,
                        changed: rewrite.changed,
                    });
                }
                _ => self.rewrite_nested(stmt),
            }
        }

        self.merge_moved(&mut pending, module);

        for import in pending {
            if !import.changed {
                continue;
            }
            if import.names.is_empty() {
                self.edits.push(Edit::deletion(removal_range(
                    self.source,
                    import.stmt.range(),
                )));
            } else {
                let content = self.render(import.stmt, import.names);
                self.edits
                    .push(Edit::range_replacement(content, import.stmt.range()));
            }
        }

        debug!(
            "Import rewrite applied {} operation(s), dirty: {}",
            self.operations.applied_count(),
            self.dirty
        );

        ImportRewrite {
            edits: self.edits,
            scope_renames: self.scope_renames,
            dirty: self.dirty,
        }
    }

    /// Decide the fate of every named specifier of one declaration
    fn rewrite_specifiers(
        &mut self,
        import_from: &StmtImportFrom,
        module_path: &str,
    ) -> SpecifierRewrite {
        let mut retained = Vec::with_capacity(import_from.names.len());
        let mut changed = false;
        let absolute_path = self
            .package
            .filter(|_| import_from.level > 0)
            .and_then(|package| {
                resolve_relative_module(
                    import_from.module.as_ref().map(Identifier::as_str),
                    import_from.level,
                    Some(package),
                )
            })
            .filter(|path| !path.is_empty());

        for alias in &import_from.names {
            let imported = alias.name.as_str();
            if imported == "*" {
                retained.push(alias.clone());
                continue;
            }

            let key = operation_key(module_path, imported);
            let absolute_key = absolute_path
                .as_deref()
                .map(|path| operation_key(path, imported));
            let rename = self.operations.apply_rename(&key).or_else(|| {
                absolute_key
                    .as_deref()
                    .and_then(|key| self.operations.apply_rename(key))
            });
            let relocation = self.operations.apply_move(&key).or_else(|| {
                absolute_key
                    .as_deref()
                    .and_then(|key| self.operations.apply_move(key))
            });
            if rename.is_none() && relocation.is_none() {
                retained.push(alias.clone());
                continue;
            }
            changed = true;
            self.dirty = true;

            let new_name = rename.map_or(imported, |detail| detail.to_name.as_str());
            let local = alias.asname.as_ref().unwrap_or(&alias.name).as_str();
            let explicit_alias = alias
                .asname
                .as_ref()
                .filter(|asname| asname.as_str() != imported)
                .map(|asname| asname.as_str());

            if rename.is_some() {
                let final_local = explicit_alias.unwrap_or(new_name);
                if local != final_local {
                    self.scope_renames
                        .push((local.to_string(), final_local.to_string()));
                }
            }

            if let Some(relocation) = relocation {
                debug!("Moving {key} to {}", relocation.to_module);
                self.moved
                    .entry(relocation.to_module.clone())
                    .or_default()
                    .push(ast_builder::alias(new_name, explicit_alias));
            } else {
                // `x as x` re-exports keep their redundant alias
                let asname = match explicit_alias {
                    Some(asname) => Some(asname),
                    None if alias.asname.is_some() => Some(new_name),
                    None => None,
                };
                debug!("Renaming {key} to {new_name}");
                retained.push(ast_builder::alias(new_name, asname));
            }
        }

        SpecifierRewrite { retained, changed }
    }

    /// Descend into module-level compound statements, whose imports also bind
    /// at module scope
    fn rewrite_nested(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::If(if_stmt) => {
                self.rewrite_block(&if_stmt.body);
                for clause in &if_stmt.elif_else_clauses {
                    self.rewrite_block(&clause.body);
                }
            }
            Stmt::Try(try_stmt) => {
                self.rewrite_block(&try_stmt.body);
                for handler in &try_stmt.handlers {
                    let ExceptHandler::ExceptHandler(handler) = handler;
                    self.rewrite_block(&handler.body);
                }
                self.rewrite_block(&try_stmt.orelse);
                self.rewrite_block(&try_stmt.finalbody);
            }
            Stmt::With(with_stmt) => self.rewrite_block(&with_stmt.body),
            Stmt::For(for_stmt) => {
                self.rewrite_block(&for_stmt.body);
                self.rewrite_block(&for_stmt.orelse);
            }
            Stmt::While(while_stmt) => {
                self.rewrite_block(&while_stmt.body);
                self.rewrite_block(&while_stmt.orelse);
            }
            Stmt::Match(match_stmt) => {
                for case in &match_stmt.cases {
                    self.rewrite_block(&case.body);
                }
            }
            _ => {}
        }
    }

    fn rewrite_block(&mut self, body: &[Stmt]) {
        let mut removed = Vec::new();
        for stmt in body {
            let Stmt::ImportFrom(import_from) = stmt else {
                self.rewrite_nested(stmt);
                continue;
            };

            let module_path = declaration_module_path(import_from);
            let rewrite = self.rewrite_specifiers(import_from, &module_path);
            if !rewrite.changed {
                continue;
            }

            if rewrite.retained.is_empty() {
                removed.push(import_from.range());
            } else {
                let content = self.render(import_from, rewrite.retained);
                self.edits
                    .push(Edit::range_replacement(content, import_from.range()));
            }
        }

        // a block whose every statement went away keeps a `pass`
        let emptied = !removed.is_empty() && removed.len() == body.len();
        let last = removed.len().saturating_sub(1);
        for (index, range) in removed.into_iter().enumerate() {
            if emptied && index == last {
                let content = render_statement(self.stylist, &ast_builder::pass());
                self.edits.push(Edit::range_replacement(content, range));
            } else {
                self.edits
                    .push(Edit::deletion(removal_range(self.source, range)));
            }
        }
    }

    /// Append moved specifiers to existing top-level declarations of their
    /// destination, and insert new declarations for the rest
    fn merge_moved(&mut self, pending: &mut [PendingImport<'_>], module: &ModModule) {
        let moved = std::mem::take(&mut self.moved);
        let mut synthesized = Vec::new();

        for (destination, aliases) in moved {
            // `from m import *` cannot take further names
            let existing = pending.iter_mut().find(|import| {
                import.module_path == destination
                    && !import.names.is_empty()
                    && !import.names.iter().any(|alias| alias.name.as_str() == "*")
            });

            if let Some(existing) = existing {
                debug!("Merging moved imports into existing `{destination}` import");
                for alias in aliases {
                    if existing.names.iter().any(|present| same_specifier(present, &alias)) {
                        continue;
                    }
                    existing.names.push(alias);
                    existing.changed = true;
                }
            } else {
                debug!("Adding import for `{destination}`");
                synthesized.push(ast_builder::import_from(&destination, aliases));
            }
        }

        if synthesized.is_empty() {
            return;
        }

        let line_ending = self.stylist.line_ending().as_str();
        let (offset, after_last) = self.insertion_point(module);
        let mut content = String::new();
        if after_last && !self.source.is_empty() && !self.source.ends_with(['\n', '\r']) {
            content.push_str(line_ending);
        }
        for stmt in &synthesized {
            content.push_str(&render_statement(self.stylist, stmt));
            content.push_str(line_ending);
        }
        self.edits.push(Edit::insertion(content, offset));
    }

    /// Offset where new declarations go: before the first statement that is
    /// neither the module docstring nor a `__future__` import
    fn insertion_point(&self, module: &ModModule) -> (TextSize, bool) {
        let first = module.body.iter().enumerate().find(|(index, stmt)| {
            !(*index == 0 && is_docstring(stmt)) && !is_future_import(stmt)
        });

        match first {
            Some((_, stmt)) => (stmt.start(), false),
            None => (self.source.text_len(), true),
        }
    }

    fn render(&self, original: &StmtImportFrom, names: Vec<Alias>) -> String {
        let stmt = Stmt::ImportFrom(StmtImportFrom {
            names,
            ..original.clone()
        });
        render_statement(self.stylist, &stmt)
    }
}

fn declaration_module_path(import_from: &StmtImportFrom) -> String {
    import_from_module_path(
        import_from.module.as_ref().map(Identifier::as_str),
        import_from.level,
    )
}

fn same_specifier(left: &Alias, right: &Alias) -> bool {
    left.name.as_str() == right.name.as_str()
        && left.asname.as_ref().map(|name| name.as_str())
            == right.asname.as_ref().map(|name| name.as_str())
}

fn is_docstring(stmt: &Stmt) -> bool {
    matches!(stmt, Stmt::Expr(expr) if expr.value.is_string_literal_expr())
}

fn is_future_import(stmt: &Stmt) -> bool {
    matches!(
        stmt,
        Stmt::ImportFrom(import_from)
            if import_from.level == 0
                && import_from.module.as_ref().map(Identifier::as_str) == Some("__future__")
    )
}
