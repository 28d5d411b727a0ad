//! Shared type definitions for the pyrefactor crate

use std::hash::BuildHasherDefault;

use indexmap::IndexMap;
use rustc_hash::FxHasher;

/// Type alias for IndexMap with FxHasher for better performance
pub type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// Build the module path of a `from ... import` statement as written in source.
///
/// Relative imports keep their leading dots, so `from ..pkg import x` yields `..pkg`
/// and `from . import x` yields `.`.
pub fn import_from_module_path(module: Option<&str>, level: u32) -> String {
    let mut path = ".".repeat(level as usize);
    if let Some(module) = module {
        path.push_str(module);
    }
    path
}

/// Split a written module path back into its dotted module and relative level.
pub fn split_module_path(path: &str) -> (Option<&str>, u32) {
    let module = path.trim_start_matches('.');
    let level = (path.len() - module.len()) as u32;
    let module = if module.is_empty() { None } else { Some(module) };
    (module, level)
}

/// Resolve `from <level dots><module> import ...` to an absolute module name.
///
/// `package` is the package of the importing file. Returns `None` when the
/// dots climb above the top-level package.
pub fn resolve_relative_module(
    module: Option<&str>,
    level: u32,
    package: Option<&str>,
) -> Option<String> {
    if level == 0 {
        return module.map(str::to_string);
    }

    let mut parts: Vec<&str> = package
        .map(|package| package.split('.').filter(|part| !part.is_empty()).collect())
        .unwrap_or_default();
    for _ in 1..level {
        parts.pop()?;
    }
    if let Some(module) = module {
        parts.extend(module.split('.'));
    }
    Some(parts.join("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_path_round_trip_for_relative_imports() {
        assert_eq!(import_from_module_path(Some("pkg.models"), 0), "pkg.models");
        assert_eq!(import_from_module_path(Some("models"), 2), "..models");
        assert_eq!(import_from_module_path(None, 1), ".");

        assert_eq!(split_module_path("..models"), (Some("models"), 2));
        assert_eq!(split_module_path("."), (None, 1));
        assert_eq!(split_module_path("baz"), (Some("baz"), 0));
    }

    #[test]
    fn test_relative_modules_resolve_against_the_package() {
        assert_eq!(
            resolve_relative_module(Some("b"), 1, Some("pkg")).as_deref(),
            Some("pkg.b")
        );
        assert_eq!(
            resolve_relative_module(Some("b"), 2, Some("pkg.sub")).as_deref(),
            Some("pkg.b")
        );
        assert_eq!(
            resolve_relative_module(None, 1, Some("pkg")).as_deref(),
            Some("pkg")
        );
        assert_eq!(
            resolve_relative_module(Some("abs.mod"), 0, Some("pkg")).as_deref(),
            Some("abs.mod")
        );
        assert_eq!(resolve_relative_module(Some("b"), 3, Some("pkg")), None);
    }
}
