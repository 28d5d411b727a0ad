//! The per-file transform: parse, rewrite imports, rename references, splice.

use std::path::PathBuf;

use anyhow::{Context, Result};
use log::trace;
use ruff_python_codegen::Stylist;
use ruff_python_parser::parse_module;

use crate::{
    code_generator::apply_edits, import_rewriter::ImportRewriter, operations::OperationIndex,
    renamer::rename_module_bindings,
};

/// A file's content on its way into a worker
#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub file_path: PathBuf,
    /// Package the file belongs to, for matching relative imports
    pub package: Option<String>,
    pub content: String,
}

/// A worker's answer for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformResult {
    pub file_path: PathBuf,
    pub content: String,
    /// Whether `content` differs from the input
    pub changed: bool,
}

/// Apply every matching operation to one module's source.
///
/// Returns the input unchanged, byte for byte, when no operation matched.
pub fn transform_source(source: &str, operations: &OperationIndex) -> Result<String> {
    transform_package_source(source, None, operations)
}

/// Like [`transform_source`] for a module inside `package`, where relative
/// imports also match operations naming the absolute module
pub fn transform_package_source(
    source: &str,
    package: Option<&str>,
    operations: &OperationIndex,
) -> Result<String> {
    let parsed = parse_module(source).context("Failed to parse module")?;
    let stylist = Stylist::from_tokens(parsed.tokens(), source);

    let rewrite = ImportRewriter::new(source, &stylist, operations.session())
        .with_package(package)
        .rewrite_module(parsed.syntax());
    if !rewrite.dirty {
        return Ok(source.to_string());
    }

    let mut edits = rewrite.edits;
    edits.extend(rename_module_bindings(
        parsed.syntax(),
        source,
        &rewrite.scope_renames,
    ));
    trace!("Applying {} edit(s)", edits.len());

    Ok(apply_edits(source, edits))
}

/// Transform a file's content, carrying its path through to the result
pub fn transform_file(
    request: TransformRequest,
    operations: &OperationIndex,
) -> Result<TransformResult> {
    let TransformRequest {
        file_path,
        package,
        content,
    } = request;
    let transformed = transform_package_source(&content, package.as_deref(), operations)
        .with_context(|| format!("Failed to transform {}", file_path.display()))?;
    let changed = transformed != content;

    Ok(TransformResult {
        file_path,
        content: if changed { transformed } else { content },
        changed,
    })
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::operations::{MoveOperation, OperationConfig, RenameOperation};

    fn index(rename: Vec<RenameOperation>, moves: Vec<MoveOperation>) -> OperationIndex {
        OperationIndex::new(&OperationConfig { rename, moves })
    }

    fn transform(source: &str, operations: &OperationIndex) -> String {
        transform_source(source, operations).expect("transform should succeed")
    }

    #[test]
    fn test_empty_operation_set_returns_input_verbatim() {
        let source = "from b import a   # odd spacing\r\nx=a+1\r\n";
        assert_eq!(transform(source, &OperationIndex::default()), source);
    }

    #[test]
    fn test_rename_rewrites_import_and_references() {
        let operations = index(vec![RenameOperation::new("a", "c", "b")], vec![]);
        assert_snapshot!(
            transform("from b import a\nx = a + 1\n", &operations),
            @r"
        from b import c
        x = c + 1
        "
        );
    }

    #[test]
    fn test_rename_without_references_touches_only_the_import() {
        let operations = index(vec![RenameOperation::new("a", "c", "b")], vec![]);
        let source = "from b import a\nother = 1  # a\n";
        assert_eq!(transform(source, &operations), "from b import c\nother = 1  # a\n");
    }

    #[test]
    fn test_rename_leaves_shadowing_declaration_alone() {
        let operations = index(vec![RenameOperation::new("a", "c", "b")], vec![]);
        let source = r"from b import a


def handler(event):
    a = event.payload
    return a


result = a(1)
";
        let expected = r"from b import c


def handler(event):
    a = event.payload
    return a


result = c(1)
";
        assert_eq!(transform(source, &operations), expected);
    }

    #[test]
    fn test_move_to_new_module() {
        let operations = index(vec![], vec![MoveOperation::new("y", "baz", "foo")]);
        assert_eq!(
            transform("from foo import y, z\n", &operations),
            "from baz import y\nfrom foo import z\n"
        );
    }

    #[test]
    fn test_move_to_module_already_imported() {
        let operations = index(vec![], vec![MoveOperation::new("y", "bar", "foo")]);
        let source = "from foo import y\nfrom bar import x\n\nprint(x, y)\n";
        assert_eq!(
            transform(source, &operations),
            "from bar import x, y\n\nprint(x, y)\n"
        );
    }

    #[test]
    fn test_rename_and_move_uses_final_name() {
        let operations = index(
            vec![RenameOperation::new("y", "w", "foo")],
            vec![MoveOperation::new("y", "baz", "foo")],
        );

        assert_eq!(
            transform("from foo import y\nvalue = y()\n", &operations),
            "from baz import w\nvalue = w()\n"
        );
        assert_eq!(
            transform("from foo import y as q\nvalue = q()\n", &operations),
            "from baz import w as q\nvalue = q()\n"
        );
    }

    #[test]
    fn test_aliased_rename_keeps_references() {
        let operations = index(vec![RenameOperation::new("a", "c", "b")], vec![]);
        assert_eq!(
            transform("from b import a as alias\nalias()\n", &operations),
            "from b import c as alias\nalias()\n"
        );
    }

    #[test]
    fn test_transform_is_idempotent_after_first_pass() {
        let operations = index(
            vec![RenameOperation::new("a", "c", "b")],
            vec![MoveOperation::new("y", "baz", "foo")],
        );
        let once = transform("from foo import y\nfrom b import a\nprint(a, y)\n", &operations);
        assert_eq!(transform(&once, &operations), once);
    }

    #[test]
    fn test_parse_errors_propagate() {
        let operations = index(vec![RenameOperation::new("a", "c", "b")], vec![]);
        let error = transform_source("from b import (a\n", &operations)
            .expect_err("invalid syntax should fail");
        assert!(error.to_string().contains("Failed to parse module"));
    }

    #[test]
    fn test_transform_file_reports_change_and_keeps_path() {
        let operations = index(vec![RenameOperation::new("a", "c", "b")], vec![]);

        let changed = transform_file(
            TransformRequest {
                file_path: PathBuf::from("pkg/mod.py"),
                package: Some("pkg".to_string()),
                content: "from b import a\n".to_string(),
            },
            &operations,
        )
        .expect("transform should succeed");
        assert!(changed.changed);
        assert_eq!(changed.file_path, PathBuf::from("pkg/mod.py"));

        let untouched = transform_file(
            TransformRequest {
                file_path: PathBuf::from("pkg/other.py"),
                package: Some("pkg".to_string()),
                content: "import b\n".to_string(),
            },
            &operations,
        )
        .expect("transform should succeed");
        assert!(!untouched.changed);
        assert_eq!(untouched.content, "import b\n");
    }

    #[test]
    fn test_relative_consumer_inside_package_is_rewritten() {
        let operations = index(vec![RenameOperation::new("a", "c", "pkg.b")], vec![]);
        let source = "from .b import a\nprint(a)\n";

        assert_eq!(
            transform_package_source(source, Some("pkg"), &operations)
                .expect("transform should succeed"),
            "from .b import c\nprint(c)\n"
        );
        assert_eq!(transform(source, &operations), source);
    }

    #[test]
    fn test_class_body_reads_before_class_assignment_follow_the_rename() {
        let operations = index(vec![RenameOperation::new("a", "c", "b")], vec![]);
        let source = "from b import a\nclass C:\n    x = a\n    a = 2\n    y = a\n";
        assert_eq!(
            transform(source, &operations),
            "from b import c\nclass C:\n    x = c\n    a = 2\n    y = a\n"
        );
    }
}
