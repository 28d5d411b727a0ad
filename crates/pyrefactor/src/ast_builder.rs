//! AST builder module for creating synthetic AST nodes
//!
//! Nodes built here don't originate from source files. All synthetic nodes use
//! default ranges to clearly indicate they are generated, which is also how the
//! code generator tells them apart from statements that already have source text.

use ruff_python_ast::{Alias, AtomicNodeIndex, Identifier, Stmt, StmtImportFrom, StmtPass};
use ruff_text_size::TextRange;

use crate::types::split_module_path;

/// Create a synthetic range for generated nodes
fn synthetic_range() -> TextRange {
    TextRange::default()
}

/// Creates an alias node for import statements.
///
/// # Example
/// ```ignore
/// // Creates: `foo as bar`
/// let alias = alias("foo", Some("bar"));
///
/// // Creates: `baz` (no alias)
/// let alias = alias("baz", None);
/// ```
pub fn alias(name: &str, asname: Option<&str>) -> Alias {
    Alias {
        name: Identifier::new(name, synthetic_range()),
        asname: asname.map(|s| Identifier::new(s, synthetic_range())),
        range: synthetic_range(),
        node_index: AtomicNodeIndex::dummy(),
    }
}

/// Creates an import from statement for a module path as written in source.
///
/// Leading dots are turned into the relative import level, so `..pkg` builds
/// `from ..pkg import ...` and `.` builds `from . import ...`.
pub fn import_from(module_path: &str, names: Vec<Alias>) -> Stmt {
    let (module, level) = split_module_path(module_path);
    Stmt::ImportFrom(StmtImportFrom {
        module: module.map(|s| Identifier::new(s, synthetic_range())),
        names,
        level,
        range: synthetic_range(),
        node_index: AtomicNodeIndex::dummy(),
    })
}

/// Creates a pass statement node, used to keep a block valid after its only
/// statement was removed.
pub fn pass() -> Stmt {
    Stmt::Pass(StmtPass {
        range: synthetic_range(),
        node_index: AtomicNodeIndex::dummy(),
    })
}
