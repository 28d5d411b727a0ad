//! Project dependency graph used to find the files that consume a module.
//!
//! Every `*.py` and `*.pyi` file under the source roots becomes a module node
//! named the way Python would import it. Imports found in each file become
//! edges from the importing module to the imported one; imported modules that
//! live outside the roots get a node without files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use ignore::{WalkBuilder, overrides::OverrideBuilder};
use log::{debug, trace, warn};
use petgraph::{
    graph::{DiGraph, NodeIndex},
    visit::{Bfs, Reversed},
};
use ruff_python_ast::{PySourceType, visitor::Visitor};
use ruff_python_parser::parse_unchecked_source;
use rustc_hash::FxHashMap;

use crate::visitors::ImportDiscoveryVisitor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleNode {
    pub name: String,
    /// Files defining the module, empty for modules outside the roots
    pub files: Vec<PathBuf>,
}

/// A source file found under one of the roots
#[derive(Debug, Clone)]
struct SourceFile {
    path: PathBuf,
    module_name: String,
    /// Package that relative imports resolve against
    package: Option<String>,
}

#[derive(Debug, Default)]
pub struct ProjectGraph {
    graph: DiGraph<ModuleNode, ()>,
    node_indices: FxHashMap<String, NodeIndex>,
    /// Package each file's relative imports resolve against
    packages: FxHashMap<PathBuf, String>,
}

impl ProjectGraph {
    /// Walk `roots`, skipping paths matching `exclude` globs, and build the graph
    pub fn discover(roots: &[PathBuf], exclude: &[String]) -> Result<Self> {
        let mut sources = Vec::new();
        for root in roots {
            sources.extend(collect_sources(root, exclude)?);
        }
        debug!("Discovered {} Python source file(s)", sources.len());

        let mut graph = Self::default();
        for source in &sources {
            let node = graph.ensure_module(&source.module_name);
            graph.graph[node].files.push(source.path.clone());
            if let Some(package) = &source.package {
                graph.packages.insert(source.path.clone(), package.clone());
            }
        }

        for source in &sources {
            let content = match std::fs::read_to_string(&source.path) {
                Ok(content) => content,
                Err(err) => {
                    warn!("Skipping imports of {}: {err}", source.path.display());
                    continue;
                }
            };
            graph.add_imports(source, &content);
        }

        Ok(graph)
    }

    pub fn module_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn contains(&self, module: &str) -> bool {
        self.node_indices.contains_key(module)
    }

    /// Package of a discovered file, `None` for top-level modules
    pub fn package_of(&self, path: &Path) -> Option<&str> {
        self.packages.get(path).map(String::as_str)
    }

    #[cfg(test)]
    fn module(&self, module: &str) -> Option<&ModuleNode> {
        self.node_indices
            .get(module)
            .map(|&index| &self.graph[index])
    }

    /// Modules imported directly by `module`
    #[cfg(test)]
    fn dependencies(&self, module: &str) -> Vec<&str> {
        let Some(&index) = self.node_indices.get(module) else {
            return Vec::new();
        };
        let mut names: Vec<&str> = self
            .graph
            .neighbors_directed(index, petgraph::Direction::Outgoing)
            .map(|neighbor| self.graph[neighbor].name.as_str())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Files that import `module` directly or through other modules.
    ///
    /// Stub files and the files defining `module` itself are excluded.
    pub fn consumers_of(&self, module: &str) -> Result<Vec<PathBuf>> {
        let Some(&start) = self.node_indices.get(module) else {
            bail!("Module `{module}` was not found in the project");
        };

        let reversed = Reversed(&self.graph);
        let mut bfs = Bfs::new(reversed, start);
        let mut files = Vec::new();
        while let Some(index) = bfs.next(reversed) {
            if index == start {
                continue;
            }
            files.extend(
                self.graph[index]
                    .files
                    .iter()
                    .filter(|path| !is_stub(path))
                    .cloned(),
            );
        }

        files.sort();
        files.dedup();
        debug!("Found {} consumer file(s) of `{module}`", files.len());
        Ok(files)
    }

    fn ensure_module(&mut self, name: &str) -> NodeIndex {
        if let Some(&index) = self.node_indices.get(name) {
            return index;
        }
        let index = self.graph.add_node(ModuleNode {
            name: name.to_string(),
            files: Vec::new(),
        });
        self.node_indices.insert(name.to_string(), index);
        index
    }

    fn add_imports(&mut self, source: &SourceFile, content: &str) {
        let parsed = parse_unchecked_source(content, PySourceType::from(&source.path));
        if let Some(err) = parsed.errors().first() {
            // the recovered tree still carries the imports before the error
            warn!("Syntax error in {}: {err}", source.path.display());
        }

        let mut visitor = ImportDiscoveryVisitor::new();
        visitor.visit_body(&parsed.syntax().body);

        let importer = self.ensure_module(&source.module_name);
        for import in visitor.into_imports() {
            let candidates = import.candidate_modules(source.package.as_deref());
            for (position, candidate) in candidates.into_iter().enumerate() {
                if candidate.is_empty() || candidate == source.module_name {
                    continue;
                }
                // `from pkg import name` only depends on `pkg.name` when it is a module
                let is_base = position == 0;
                if !is_base && !self.contains(&candidate) {
                    continue;
                }
                trace!("{} imports {candidate}", source.module_name);
                let imported = self.ensure_module(&candidate);
                self.graph.update_edge(importer, imported, ());
            }
        }
    }
}

fn collect_sources(root: &Path, exclude: &[String]) -> Result<Vec<SourceFile>> {
    let mut overrides = OverrideBuilder::new(root);
    for pattern in exclude {
        overrides
            .add(&format!("!{pattern}"))
            .with_context(|| format!("Invalid exclude pattern `{pattern}`"))?;
    }
    let overrides = overrides
        .build()
        .context("Failed to build exclude patterns")?;

    let walker = WalkBuilder::new(root)
        .standard_filters(true)
        .hidden(true)
        .overrides(overrides)
        .build();

    let mut sources = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Failed to walk {}: {err}", root.display());
                continue;
            }
        };
        if !entry.file_type().is_some_and(|file_type| file_type.is_file()) {
            continue;
        }
        let path = entry.path();
        if !matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("py" | "pyi")
        ) {
            continue;
        }
        if let Some(source) = source_file(root, path) {
            sources.push(source);
        }
    }
    Ok(sources)
}

/// Derive the module name and package of a file relative to its root
fn source_file(root: &Path, path: &Path) -> Option<SourceFile> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts: Vec<String> = relative
        .parent()
        .into_iter()
        .flat_map(Path::components)
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();
    let stem = relative.file_stem()?.to_str()?;

    let is_package = stem == "__init__";
    if !is_package {
        parts.push(stem.to_string());
    }
    if parts.is_empty() {
        trace!("Ignoring top-level {}", path.display());
        return None;
    }

    let module_name = parts.join(".");
    let package = if is_package {
        Some(module_name.clone())
    } else {
        let parent = &parts[..parts.len() - 1];
        (!parent.is_empty()).then(|| parent.join("."))
    };

    Some(SourceFile {
        path: path.to_path_buf(),
        module_name,
        package,
    })
}

fn is_stub(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "pyi")
}
