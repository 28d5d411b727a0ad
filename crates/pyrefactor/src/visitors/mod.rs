//! AST visitor implementations for pyrefactor
//!
//! Read-only traversals over parsed Python modules: scope collection for the
//! renamer and import discovery for the project graph.

mod import_discovery;
mod scope_collector;

pub use import_discovery::{DiscoveredImport, ImportDiscoveryVisitor};
pub use scope_collector::{Occurrence, OccurrenceKind, Scope, ScopeId, ScopeKind, ScopeTree};
