//! Configuration loading and root folder resolution
//!
//! Tests touching OLAB_ROOT_FOLDER are marked #[serial] so they never race on
//! the process environment.

use olab_common::config::{
    BackendConfig, CompiledDefaults, RootFolderInitializer, RootFolderResolver, Theme, TomlConfig,
    ROOT_FOLDER_ENV,
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
fn test_cli_argument_wins_over_env() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/olab-from-env");

    let resolver = RootFolderResolver::new("test-module")
        .with_cli_arg(Some(PathBuf::from("/tmp/olab-from-cli")));
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/olab-from-cli"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_env_var_used_without_cli_argument() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/olab-from-env");

    let resolver = RootFolderResolver::new("test-module");
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/olab-from-env"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_empty_env_var_is_ignored() {
    env::set_var(ROOT_FOLDER_ENV, "");

    let resolver = RootFolderResolver::new("test-module");
    assert_ne!(resolver.resolve(), PathBuf::from(""));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
fn test_initializer_creates_directory_and_names_files() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("nested").join("olab");

    let initializer = RootFolderInitializer::new(root.clone());
    initializer.ensure_directory_exists().unwrap();

    assert!(root.is_dir());
    assert_eq!(initializer.database_path(), root.join("olab.db"));
    assert_eq!(initializer.config_path(), root.join("olab.toml"));
}

#[test]
fn test_missing_config_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = TomlConfig::load_or_default(&dir.path().join("absent.toml"));
    assert_eq!(config, TomlConfig::default());
}

#[test]
fn test_invalid_config_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("olab.toml");
    std::fs::write(&path, "this is = = not toml").unwrap();

    assert!(TomlConfig::load(&path).is_err());
    assert_eq!(TomlConfig::load_or_default(&path), TomlConfig::default());
}

#[test]
fn test_save_then_load_preserves_preferences() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("olab.toml");

    let mut config = TomlConfig::default();
    config.ui.theme = Theme::Light;
    config.ui.active_tab = "history".to_string();
    config.backend = BackendConfig::Hosted {
        url: "https://project.example.co".to_string(),
        api_key: "anon".to_string(),
    };
    config.save(&path).unwrap();

    let loaded = TomlConfig::load(&path).unwrap();
    assert_eq!(loaded.ui.theme, Theme::Light);
    assert_eq!(loaded.ui.active_tab, "history");
    assert_eq!(loaded.backend, config.backend);
}
