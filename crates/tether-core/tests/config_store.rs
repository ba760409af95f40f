use std::path::PathBuf;

use tempfile::TempDir;

use tether_core::config::{ConfigStore, TetherConfig};

#[test]
fn load_missing_names_the_path() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("tether").join("tether.toml");
    let store = ConfigStore::from_path(path.clone());

    assert!(!store.exists());
    let err = store.load().unwrap_err();
    assert!(err.to_string().contains(&path.display().to_string()));
}

#[test]
fn save_then_load_roundtrip() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::from_path(temp.path().join("nested").join("tether.toml"));

    let mut config = TetherConfig::new(
        PathBuf::from("/studio/site"),
        "catalog:primary?id=42&version=v1.4.0",
    );
    config.catalog_dir = Some(PathBuf::from("/studio/catalog"));
    config.default_core = Some("catalog:core?version=v0.19.3".to_string());
    config.pipeline.project_id = Some(123);
    config.pipeline.bundle_cache_fallback_paths = vec![PathBuf::from("/mnt/bundles")];

    store.save(&config).unwrap();
    assert!(store.exists());
    assert_eq!(store.load().unwrap(), config);
}

#[test]
fn save_rejects_invalid_config() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::from_path(temp.path().join("tether.toml"));

    let config = TetherConfig::new(PathBuf::from("/studio/site"), "catalog:primary");
    assert!(store.save(&config).is_err());
    assert!(!store.exists());
}

#[test]
fn unknown_keys_are_reported_with_the_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("tether.toml");
    std::fs::write(
        &path,
        "root = \"/r\"\nconfig = \"path:/c\"\n\n[pipeline]\nproject = 1\n",
    )
    .unwrap();

    let err = ConfigStore::from_path(path).load().unwrap_err();
    let chain = format!("{:#}", err);
    assert!(chain.contains("Failed to parse config file"), "{}", chain);
    assert!(chain.contains("unknown field `project`"), "{}", chain);
}
