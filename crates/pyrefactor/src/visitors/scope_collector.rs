//! Lexical scope collection for Python modules
//!
//! A single traversal builds the tree of module, class, function, lambda and
//! comprehension scopes together with the names each scope binds and its
//! `global`/`nonlocal` declarations. Every name occurrence is recorded with the
//! scope it appears in, so that once the traversal is complete each occurrence
//! can be resolved to the scope whose binding it refers to.

use ruff_python_ast::{
    Comprehension, ExceptHandler, Expr, ExprContext, Identifier, ModModule, Parameters, Pattern,
    Stmt,
    visitor::{self, Visitor},
};
use ruff_text_size::TextRange;
use rustc_hash::{FxHashMap, FxHashSet};

/// Index of a scope in a [`ScopeTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

impl ScopeId {
    const MODULE: Self = Self(0);

    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    Class,
    Function,
    Lambda,
    Comprehension,
}

#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    /// Bound names with the traversal position of their first binding
    bindings: FxHashMap<String, usize>,
    globals: FxHashSet<String>,
    nonlocals: FxHashSet<String>,
}

impl Scope {
    fn new(kind: ScopeKind, parent: Option<ScopeId>) -> Self {
        Self {
            kind,
            parent,
            bindings: FxHashMap::default(),
            globals: FxHashSet::default(),
            nonlocals: FxHashSet::default(),
        }
    }

    pub fn binds(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Whether `name` is already bound when code at `position` runs
    fn binds_before(&self, name: &str, position: usize) -> bool {
        self.bindings
            .get(name)
            .is_some_and(|&first| first <= position)
    }

    pub fn declares_global(&self, name: &str) -> bool {
        self.globals.contains(name)
    }

    pub fn declares_nonlocal(&self, name: &str) -> bool {
        self.nonlocals.contains(name)
    }
}

/// Whether an occurrence is an expression name or a binding identifier
/// (`def`/`class` names, `global` names, `except ... as` and `match` captures)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccurrenceKind {
    Name,
    Identifier,
}

#[derive(Debug, Clone)]
pub struct Occurrence {
    pub name: String,
    pub range: TextRange,
    pub scope: ScopeId,
    pub kind: OccurrenceKind,
    /// Index in traversal order, which follows evaluation order
    position: usize,
}

/// Scopes and name occurrences of one module
#[derive(Debug)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    occurrences: Vec<Occurrence>,
}

impl ScopeTree {
    pub fn build(module: &ModModule) -> Self {
        let mut collector = ScopeCollector::new();
        collector.visit_body(&module.body);
        Self {
            scopes: collector.scopes,
            occurrences: collector.occurrences,
        }
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    pub fn occurrences(&self) -> &[Occurrence] {
        &self.occurrences
    }

    /// Check whether `occurrence` refers to the module-level binding.
    ///
    /// Class scopes only shadow names for code directly in the class body, and
    /// only once the class has bound the name; free names of nested functions
    /// skip them, as in Python.
    pub fn resolves_to_module(&self, occurrence: &Occurrence) -> bool {
        let name = occurrence.name.as_str();
        let origin = self.scope(occurrence.scope);
        if origin.kind == ScopeKind::Module || origin.declares_global(name) {
            return true;
        }
        if origin.declares_nonlocal(name) {
            return false;
        }
        let shadowed = match origin.kind {
            ScopeKind::Class => origin.binds_before(name, occurrence.position),
            _ => origin.binds(name),
        };
        if shadowed {
            return false;
        }

        let mut current = origin.parent;
        while let Some(id) = current {
            let enclosing = self.scope(id);
            match enclosing.kind {
                ScopeKind::Module => return true,
                ScopeKind::Class => {}
                ScopeKind::Function | ScopeKind::Lambda | ScopeKind::Comprehension => {
                    if enclosing.declares_global(name) {
                        return true;
                    }
                    if enclosing.binds(name) || enclosing.declares_nonlocal(name) {
                        return false;
                    }
                }
            }
            current = enclosing.parent;
        }
        true
    }

    /// All occurrences of `name` that refer to the module-level binding
    pub fn module_references<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Occurrence> {
        self.occurrences
            .iter()
            .filter(move |occurrence| occurrence.name == name)
            .filter(move |occurrence| self.resolves_to_module(occurrence))
    }
}

struct ScopeCollector {
    scopes: Vec<Scope>,
    occurrences: Vec<Occurrence>,
    current: ScopeId,
}

impl ScopeCollector {
    fn new() -> Self {
        Self {
            scopes: vec![Scope::new(ScopeKind::Module, None)],
            occurrences: Vec::new(),
            current: ScopeId::MODULE,
        }
    }

    fn push_scope(&mut self, kind: ScopeKind) {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope::new(kind, Some(self.current)));
        self.current = id;
    }

    fn pop_scope(&mut self) {
        if let Some(parent) = self.scopes[self.current.index()].parent {
            self.current = parent;
        }
    }

    fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.index()]
    }

    fn bind(&mut self, scope: ScopeId, name: &str) {
        let position = self.occurrences.len();
        self.scope_mut(scope)
            .bindings
            .entry(name.to_string())
            .or_insert(position);
    }

    fn record(&mut self, scope: ScopeId, name: &str, range: TextRange, kind: OccurrenceKind) {
        let position = self.occurrences.len();
        self.occurrences.push(Occurrence {
            name: name.to_string(),
            range,
            scope,
            kind,
            position,
        });
    }

    fn bind_identifier(&mut self, identifier: &Identifier) {
        let scope = self.current;
        self.bind(scope, identifier.as_str());
        self.record(
            scope,
            identifier.as_str(),
            identifier.range,
            OccurrenceKind::Identifier,
        );
    }

    /// Walrus targets inside comprehensions bind in the enclosing non-comprehension scope
    fn assignment_scope(&self) -> ScopeId {
        let mut id = self.current;
        while self.scopes[id.index()].kind == ScopeKind::Comprehension {
            match self.scopes[id.index()].parent {
                Some(parent) => id = parent,
                None => break,
            }
        }
        id
    }

    /// Default values and annotations are evaluated in the enclosing scope
    fn visit_parameter_defaults<'a>(&mut self, parameters: &'a Parameters) {
        for parameter in parameters
            .posonlyargs
            .iter()
            .chain(&parameters.args)
            .chain(&parameters.kwonlyargs)
        {
            if let Some(default) = &parameter.default {
                self.visit_expr(default);
            }
            if let Some(annotation) = &parameter.parameter.annotation {
                self.visit_annotation(annotation);
            }
        }
        for parameter in parameters.vararg.iter().chain(&parameters.kwarg) {
            if let Some(annotation) = &parameter.annotation {
                self.visit_annotation(annotation);
            }
        }
    }

    fn bind_parameters(&mut self, parameters: &Parameters) {
        let scope = self.current;
        for parameter in parameters
            .posonlyargs
            .iter()
            .chain(&parameters.args)
            .chain(&parameters.kwonlyargs)
        {
            self.bind(scope, parameter.parameter.name.as_str());
        }
        for parameter in parameters.vararg.iter().chain(&parameters.kwarg) {
            self.bind(scope, parameter.name.as_str());
        }
    }

    /// The first iterator is evaluated in the enclosing scope, everything else
    /// in the comprehension's own scope
    fn visit_comprehension_scope<'a>(
        &mut self,
        generators: &'a [Comprehension],
        elements: &[&'a Expr],
    ) {
        let Some((first, rest)) = generators.split_first() else {
            for element in elements {
                self.visit_expr(element);
            }
            return;
        };

        self.visit_expr(&first.iter);
        self.push_scope(ScopeKind::Comprehension);
        self.visit_expr(&first.target);
        for condition in &first.ifs {
            self.visit_expr(condition);
        }
        for generator in rest {
            self.visit_expr(&generator.iter);
            self.visit_expr(&generator.target);
            for condition in &generator.ifs {
                self.visit_expr(condition);
            }
        }
        for element in elements {
            self.visit_expr(element);
        }
        self.pop_scope();
    }
}

impl<'a> Visitor<'a> for ScopeCollector {
    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        match stmt {
            Stmt::FunctionDef(function) => {
                for decorator in &function.decorator_list {
                    self.visit_decorator(decorator);
                }
                self.visit_parameter_defaults(&function.parameters);
                if let Some(returns) = &function.returns {
                    self.visit_annotation(returns);
                }
                self.bind_identifier(&function.name);

                self.push_scope(ScopeKind::Function);
                self.bind_parameters(&function.parameters);
                self.visit_body(&function.body);
                self.pop_scope();
            }
            Stmt::ClassDef(class) => {
                for decorator in &class.decorator_list {
                    self.visit_decorator(decorator);
                }
                if let Some(arguments) = &class.arguments {
                    self.visit_arguments(arguments);
                }
                self.bind_identifier(&class.name);

                self.push_scope(ScopeKind::Class);
                self.visit_body(&class.body);
                self.pop_scope();
            }
            Stmt::Global(global) => {
                let scope = self.current;
                for name in &global.names {
                    self.scope_mut(scope).globals.insert(name.to_string());
                    self.record(scope, name.as_str(), name.range, OccurrenceKind::Identifier);
                }
            }
            Stmt::Nonlocal(nonlocal) => {
                let scope = self.current;
                for name in &nonlocal.names {
                    self.scope_mut(scope).nonlocals.insert(name.to_string());
                }
            }
            Stmt::Import(import) => {
                let scope = self.current;
                for alias in &import.names {
                    let bound = alias.asname.as_ref().map_or_else(
                        || alias.name.as_str().split('.').next().unwrap_or_default(),
                        Identifier::as_str,
                    );
                    self.bind(scope, bound);
                }
            }
            Stmt::ImportFrom(import_from) => {
                let scope = self.current;
                for alias in &import_from.names {
                    if alias.name.as_str() == "*" {
                        continue;
                    }
                    let bound = alias.asname.as_ref().unwrap_or(&alias.name);
                    self.bind(scope, bound.as_str());
                }
            }
            _ => visitor::walk_stmt(self, stmt),
        }
    }

    fn visit_expr(&mut self, expr: &'a Expr) {
        match expr {
            Expr::Name(name) => {
                let scope = self.current;
                if matches!(name.ctx, ExprContext::Store | ExprContext::Del) {
                    self.bind(scope, name.id.as_str());
                }
                self.record(scope, name.id.as_str(), name.range, OccurrenceKind::Name);
            }
            Expr::Named(named) => {
                self.visit_expr(&named.value);
                if let Expr::Name(target) = named.target.as_ref() {
                    let scope = self.assignment_scope();
                    self.bind(scope, target.id.as_str());
                    self.record(scope, target.id.as_str(), target.range, OccurrenceKind::Name);
                } else {
                    self.visit_expr(&named.target);
                }
            }
            Expr::Lambda(lambda) => {
                if let Some(parameters) = &lambda.parameters {
                    self.visit_parameter_defaults(parameters);
                }
                self.push_scope(ScopeKind::Lambda);
                if let Some(parameters) = &lambda.parameters {
                    self.bind_parameters(parameters);
                }
                self.visit_expr(&lambda.body);
                self.pop_scope();
            }
            Expr::ListComp(comp) => self.visit_comprehension_scope(&comp.generators, &[&*comp.elt]),
            Expr::SetComp(comp) => self.visit_comprehension_scope(&comp.generators, &[&*comp.elt]),
            Expr::Generator(comp) => {
                self.visit_comprehension_scope(&comp.generators, &[&*comp.elt]);
            }
            Expr::DictComp(comp) => {
                self.visit_comprehension_scope(&comp.generators, &[&*comp.key, &*comp.value]);
            }
            _ => visitor::walk_expr(self, expr),
        }
    }

    fn visit_except_handler(&mut self, handler: &'a ExceptHandler) {
        let ExceptHandler::ExceptHandler(except) = handler;
        if let Some(name) = &except.name {
            self.bind_identifier(name);
        }
        visitor::walk_except_handler(self, handler);
    }

    fn visit_pattern(&mut self, pattern: &'a Pattern) {
        match pattern {
            Pattern::MatchAs(pattern_as) => {
                if let Some(name) = &pattern_as.name {
                    self.bind_identifier(name);
                }
            }
            Pattern::MatchStar(star) => {
                if let Some(name) = &star.name {
                    self.bind_identifier(name);
                }
            }
            Pattern::MatchMapping(mapping) => {
                if let Some(rest) = &mapping.rest {
                    self.bind_identifier(rest);
                }
            }
            _ => {}
        }
        visitor::walk_pattern(self, pattern);
    }
}
