//! Unit tests for root folder resolution and initialization
//!
//! Uses serial_test to prevent ENV variable race conditions: tests that
//! manipulate RECIPE_ROOT_FOLDER or RECIPE_ROOT are marked with #[serial].

use recipe_common::config::{
    CompiledDefaults, RootFolderInitializer, RootFolderResolver, ROOT_ENV, ROOT_FOLDER_ENV,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;

#[test]
fn test_compiled_defaults_for_current_platform() {
    let defaults = CompiledDefaults::for_current_platform();

    assert!(!defaults.root_folder.as_os_str().is_empty());
    assert_eq!(defaults.log_level, "info");
}

#[test]
#[serial]
fn test_resolver_env_var_root_folder() {
    env::remove_var(ROOT_ENV);
    env::set_var(ROOT_FOLDER_ENV, "/tmp/recipe-test-env-folder");

    let root_folder = RootFolderResolver::new("test-module").resolve();
    assert_eq!(root_folder, PathBuf::from("/tmp/recipe-test-env-folder"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_resolver_root_folder_takes_precedence() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/recipe-priority-1");
    env::set_var(ROOT_ENV, "/tmp/recipe-priority-2");

    let root_folder = RootFolderResolver::new("test-module").resolve();
    assert_eq!(root_folder, PathBuf::from("/tmp/recipe-priority-1"));

    env::remove_var(ROOT_FOLDER_ENV);
    env::remove_var(ROOT_ENV);
}

#[test]
#[serial]
fn test_cli_arg_beats_environment() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/recipe-env");

    let root_folder = RootFolderResolver::new("test-module")
        .with_cli_arg(Some(PathBuf::from("/tmp/recipe-cli")))
        .resolve();
    assert_eq!(root_folder, PathBuf::from("/tmp/recipe-cli"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
fn test_initializer_paths() {
    let root = PathBuf::from("/tmp/recipe-test-root");
    let initializer = RootFolderInitializer::new(root.clone());

    assert_eq!(initializer.database_path(), root.join("recipes.db"));
    assert_eq!(initializer.jobs_path(), root.join("jobs"));
    assert_eq!(
        initializer.module_config_path("recipe-extract"),
        root.join("recipe-extract.toml")
    );
}

#[test]
fn test_initializer_creates_directory_idempotently() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("nested").join("root");

    let initializer = RootFolderInitializer::new(root.clone());
    initializer.ensure_directory_exists().unwrap();
    initializer.ensure_directory_exists().unwrap();

    assert!(root.is_dir());
    assert!(!initializer.database_exists());
}

#[cfg(target_os = "linux")]
#[test]
#[serial]
fn test_bootstrap_file_sets_root_folder_only() {
    let temp = tempfile::tempdir().unwrap();
    let config_home = temp.path().join("config");
    let bootstrap_dir = config_home.join("recipe-extract");
    std::fs::create_dir_all(&bootstrap_dir).unwrap();
    std::fs::write(
        bootstrap_dir.join("test-module.toml"),
        "root_folder = \"/tmp/recipe-bootstrap-root\"\n",
    )
    .unwrap();

    let previous = env::var_os("XDG_CONFIG_HOME");
    env::set_var("XDG_CONFIG_HOME", &config_home);
    env::remove_var(ROOT_FOLDER_ENV);
    env::remove_var(ROOT_ENV);

    let resolver = RootFolderResolver::new("test-module");
    let bootstrap = resolver.bootstrap_config_path().unwrap();
    let root_folder = resolver.resolve();

    match previous {
        Some(value) => env::set_var("XDG_CONFIG_HOME", value),
        None => env::remove_var("XDG_CONFIG_HOME"),
    }

    assert_eq!(bootstrap, bootstrap_dir.join("test-module.toml"));
    assert_eq!(root_folder, PathBuf::from("/tmp/recipe-bootstrap-root"));

    // Settings file is a different file, inside the resolved root
    let settings = RootFolderInitializer::new(root_folder).module_config_path("test-module");
    assert_eq!(settings, PathBuf::from("/tmp/recipe-bootstrap-root/test-module.toml"));
    assert_ne!(settings, bootstrap);
}
