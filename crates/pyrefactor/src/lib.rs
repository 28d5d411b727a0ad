//! Scope-aware renaming and relocation of imported Python symbols.
//!
//! A run takes a set of rename and move operations, each naming a symbol by
//! the module it is imported from, finds every file that consumes those
//! modules and rewrites their `from ... import ...` declarations and all
//! references bound to them.

pub mod ast_builder;
pub mod code_generator;
pub mod config;
pub mod engine;
pub mod import_rewriter;
pub mod operations;
pub mod pipeline;
pub mod project_graph;
pub mod renamer;
pub mod transform;
pub mod types;
pub mod visitors;
