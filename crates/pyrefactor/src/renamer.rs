//! Scope-aware renaming of module-level bindings.
//!
//! Given the local names bound by rewritten imports, every occurrence that
//! resolves to the module-scope binding is replaced. Occurrences bound by a
//! shadowing local, parameter, comprehension target or class attribute are left
//! alone. All renames of one file are resolved against the original names in a
//! single batch, so `a -> b` and `b -> c` in the same file never chain.

use log::trace;
use ruff_python_ast::{Expr, ModModule, Stmt};
use ruff_text_size::{Ranged, TextRange};
use rustc_hash::FxHashMap;

use crate::{code_generator::Edit, visitors::ScopeTree};

/// Build the edits renaming each `(old, new)` module binding throughout `module`
pub fn rename_module_bindings(
    module: &ModModule,
    source: &str,
    renames: &[(String, String)],
) -> Vec<Edit> {
    let renames: FxHashMap<&str, &str> = renames
        .iter()
        .filter(|(old, new)| old != new)
        .map(|(old, new)| (old.as_str(), new.as_str()))
        .collect();
    if renames.is_empty() {
        return Vec::new();
    }

    let tree = ScopeTree::build(module);
    let mut edits = Vec::new();
    for occurrence in tree.occurrences() {
        let Some(new_name) = renames.get(occurrence.name.as_str()) else {
            continue;
        };
        if tree.resolves_to_module(occurrence) {
            trace!(
                "Renaming {} to {new_name} at {:?}",
                occurrence.name, occurrence.range
            );
            edits.push(Edit::range_replacement(*new_name, occurrence.range));
        }
    }

    edits.extend(dunder_all_edits(module, source, &renames));
    edits
}

/// Rewrite string entries of a module-level `__all__` that name a renamed binding
fn dunder_all_edits(
    module: &ModModule,
    source: &str,
    renames: &FxHashMap<&str, &str>,
) -> Vec<Edit> {
    let mut edits = Vec::new();
    for stmt in &module.body {
        let value = match stmt {
            Stmt::Assign(assign) if assign.targets.iter().any(is_dunder_all) => &assign.value,
            Stmt::AugAssign(aug_assign) if is_dunder_all(&aug_assign.target) => {
                &aug_assign.value
            }
            Stmt::AnnAssign(ann_assign) if is_dunder_all(&ann_assign.target) => {
                match &ann_assign.value {
                    Some(value) => value,
                    None => continue,
                }
            }
            _ => continue,
        };

        let elements = match value.as_ref() {
            Expr::List(list) => &list.elts,
            Expr::Tuple(tuple) => &tuple.elts,
            _ => continue,
        };

        for element in elements {
            let Expr::StringLiteral(literal) = element else {
                continue;
            };
            if literal.value.is_implicit_concatenated() {
                continue;
            }
            let Some(new_name) = renames.get(literal.value.to_str()) else {
                continue;
            };
            if let Some(replacement) = replace_literal_content(source, literal.range(), new_name)
            {
                edits.push(Edit::range_replacement(replacement, literal.range()));
            }
        }
    }
    edits
}

fn is_dunder_all(expr: &Expr) -> bool {
    matches!(expr, Expr::Name(name) if name.id.as_str() == "__all__")
}

/// Keep the literal's prefix and quotes, swap its content
fn replace_literal_content(source: &str, range: TextRange, new_name: &str) -> Option<String> {
    let text = &source[range];
    let open = text.find(['\'', '"'])?;
    let quote = &text[open..=open];
    let quote_len = if text[open..].starts_with(&quote.repeat(3)) {
        3
    } else {
        1
    };
    let delimiter = &text[open..open + quote_len];
    Some(format!("{}{delimiter}{new_name}{delimiter}", &text[..open]))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use ruff_python_parser::parse_module;

    use super::*;
    use crate::code_generator::apply_edits;

    fn rename(source: &str, renames: &[(&str, &str)]) -> String {
        let parsed = parse_module(source).expect("Failed to parse test module");
        let renames: Vec<(String, String)> = renames
            .iter()
            .map(|(old, new)| ((*old).to_string(), (*new).to_string()))
            .collect();
        let edits = rename_module_bindings(parsed.syntax(), source, &renames);
        apply_edits(source, edits)
    }

    #[test]
    fn test_shadowed_local_keeps_its_name() {
        let source = r"from b import a

def f():
    a = 2
    return a

def g():
    return a
";
        let expected = r"from b import a

def f():
    a = 2
    return a

def g():
    return c
";
        assert_eq!(rename(source, &[("a", "c")]), expected);
    }

    #[test]
    fn test_renames_do_not_chain() {
        let source = "x = a + b\n";
        assert_eq!(rename(source, &[("a", "b"), ("b", "c")]), "x = b + c\n");
    }

    #[test]
    fn test_global_statement_and_stores_are_renamed() {
        let source = "def reset():\n    global a\n    a = None\n";
        assert_eq!(
            rename(source, &[("a", "c")]),
            "def reset():\n    global c\n    c = None\n"
        );
    }

    #[test]
    fn test_dunder_all_entries_follow_the_rename() {
        let source = "__all__ = ['a', \"other\"]\n__all__ += (\"a\",)\n";
        assert_eq!(
            rename(source, &[("a", "c")]),
            "__all__ = ['c', \"other\"]\n__all__ += (\"c\",)\n"
        );
    }

    #[test]
    fn test_identity_rename_produces_no_edits() {
        let parsed = parse_module("x = a\n").expect("Failed to parse test module");
        let edits =
            rename_module_bindings(parsed.syntax(), "x = a\n", &[("a".into(), "a".into())]);
        assert!(edits.is_empty());
    }
}
