use std::{fs, path::Path, sync::Arc};

use anyhow::Result;
use pretty_assertions::assert_eq;
use pyrefactor::{
    config::Config,
    engine::{ExecuteOptions, execute},
    operations::{MoveOperation, OperationConfig, RenameOperation},
    pipeline::{ErrorPolicy, NoopHooks},
};
use tempfile::TempDir;

fn create_test_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

fn config_for(root: &Path) -> Config {
    Config {
        src: vec![root.to_path_buf()],
        workers: Some(2),
        ..Config::default()
    }
}

fn project(root: &Path) -> Result<()> {
    create_test_file(&root.join("shop/__init__.py"), "")?;
    create_test_file(
        &root.join("shop/models.py"),
        "class Item:\n    pass\n\n\ndef make_item():\n    return Item()\n",
    )?;
    create_test_file(&root.join("shop/types.py"), "Price = float\n")?;
    create_test_file(
        &root.join("shop/views.py"),
        r#""""Views."""
from shop.models import Item, make_item


def show(item_id):
    item = make_item()
    return item


def legacy(Item):
    return Item
"#,
    )?;
    create_test_file(
        &root.join("shop/api.py"),
        "from shop.types import Price\nfrom shop.models import Item\n\n\ndef price_of(item: Item) -> Price:\n    return 0.0\n",
    )?;
    create_test_file(
        &root.join("shop/api.pyi"),
        "from shop.models import Item\n\ndef price_of(item: Item) -> float: ...\n",
    )?;
    create_test_file(&root.join("scripts/report.py"), "import os\n\nprint(os.getcwd())\n")?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rename_and_move_across_consumers() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let root = temp_dir.path();
    project(root)?;

    let operations = OperationConfig {
        rename: vec![RenameOperation::new("make_item", "build_item", "shop.models")],
        moves: vec![MoveOperation::new("Item", "shop.types", "shop.models")],
    };

    let summary = execute(ExecuteOptions {
        operations,
        config: config_for(root),
        dry_run: false,
        hooks: Arc::new(NoopHooks),
    })
    .await?;

    assert_eq!(summary.files.len(), 2);
    assert_eq!(summary.report.reads, summary.report.writes);
    assert_eq!(summary.report.written, 2);

    assert_eq!(
        fs::read_to_string(root.join("shop/views.py"))?,
        r#""""Views."""
from shop.types import Item
from shop.models import build_item


def show(item_id):
    item = build_item()
    return item


def legacy(Item):
    return Item
"#
    );
    assert_eq!(
        fs::read_to_string(root.join("shop/api.py"))?,
        "from shop.types import Price, Item\n\n\ndef price_of(item: Item) -> Price:\n    return 0.0\n"
    );

    // stubs and the defining module are left alone
    assert_eq!(
        fs::read_to_string(root.join("shop/api.pyi"))?,
        "from shop.models import Item\n\ndef price_of(item: Item) -> float: ...\n"
    );
    assert!(fs::read_to_string(root.join("shop/models.py"))?.contains("def make_item"));
    Ok(())
}

#[tokio::test]
async fn test_relative_consumers_inside_the_package_are_rewritten() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let root = temp_dir.path();
    project(root)?;
    create_test_file(
        &root.join("shop/cart.py"),
        "from .models import Item\n\n\ndef add(item: Item):\n    return [item]\n",
    )?;
    create_test_file(&root.join("shop/admin/__init__.py"), "")?;
    create_test_file(
        &root.join("shop/admin/panel.py"),
        "from ..models import make_item\n\nmake_item()\n",
    )?;

    let summary = execute(ExecuteOptions {
        operations: OperationConfig {
            rename: vec![
                RenameOperation::new("Item", "Product", "shop.models"),
                RenameOperation::new("make_item", "build_item", "shop.models"),
            ],
            moves: vec![],
        },
        config: config_for(root),
        dry_run: false,
        hooks: Arc::new(NoopHooks),
    })
    .await?;

    assert_eq!(summary.report.written, 4);
    assert_eq!(
        fs::read_to_string(root.join("shop/cart.py"))?,
        "from .models import Product\n\n\ndef add(item: Product):\n    return [item]\n"
    );
    assert_eq!(
        fs::read_to_string(root.join("shop/admin/panel.py"))?,
        "from ..models import build_item\n\nbuild_item()\n"
    );
    Ok(())
}

#[tokio::test]
async fn test_dry_run_writes_nothing() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let root = temp_dir.path();
    project(root)?;
    let before = fs::read_to_string(root.join("shop/views.py"))?;

    let summary = execute(ExecuteOptions {
        operations: OperationConfig {
            rename: vec![RenameOperation::new("Item", "Product", "shop.models")],
            moves: vec![],
        },
        config: config_for(root),
        dry_run: true,
        hooks: Arc::new(NoopHooks),
    })
    .await?;

    assert_eq!(summary.would_write.len(), 2);
    assert_eq!(fs::read_to_string(root.join("shop/views.py"))?, before);
    Ok(())
}

#[tokio::test]
async fn test_unknown_module_fails_before_touching_files() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let root = temp_dir.path();
    project(root)?;

    let error = execute(ExecuteOptions {
        operations: OperationConfig {
            rename: vec![
                RenameOperation::new("Item", "Product", "shop.models"),
                RenameOperation::new("x", "y", "shop.missing"),
            ],
            moves: vec![],
        },
        config: config_for(root),
        dry_run: false,
        hooks: Arc::new(NoopHooks),
    })
    .await
    .expect_err("unknown module should fail");

    assert!(format!("{error:#}").contains("shop.missing"));
    assert!(fs::read_to_string(root.join("shop/views.py"))?.contains("import Item"));
    Ok(())
}

#[tokio::test]
async fn test_continue_policy_reports_broken_consumers() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let root = temp_dir.path();
    project(root)?;
    create_test_file(
        &root.join("shop/broken.py"),
        "from shop.models import Item\ndef (:\n",
    )?;

    let summary = execute(ExecuteOptions {
        operations: OperationConfig {
            rename: vec![RenameOperation::new("Item", "Product", "shop.models")],
            moves: vec![],
        },
        config: Config {
            on_error: ErrorPolicy::Continue,
            ..config_for(root)
        },
        dry_run: false,
        hooks: Arc::new(NoopHooks),
    })
    .await?;

    assert_eq!(summary.report.failures.len(), 1);
    assert!(
        summary.report.failures[0]
            .file_path
            .ends_with("shop/broken.py")
    );
    assert!(fs::read_to_string(root.join("shop/views.py"))?.contains("import Product"));
    Ok(())
}
