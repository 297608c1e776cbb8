use super::*;
use tempfile::tempdir;

#[test]
fn missing_file_yields_defaults() {
    let dir = tempdir().unwrap();
    let config = load_from(&dir.path().join(CONFIG_FILE_NAME)).unwrap();
    assert_eq!(config, EngineConfig::default());
    assert_eq!(config.maturity_threshold, MATURITY_THRESHOLD);
    assert_eq!(config.lock_timeout(), None);
}

#[test]
fn partial_file_fills_defaults_and_clamps() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(
        &path,
        "bucket_namespace = \"contracts\"\nlock_timeout_ms = 250\n\n[online]\nhash_bits = 40\nngram_max = 0\n",
    )
    .unwrap();

    let config = load_from(&path).unwrap();

    assert_eq!(config.bucket_namespace, "contracts");
    assert_eq!(config.lock_timeout(), Some(std::time::Duration::from_millis(250)));
    assert_eq!(config.online.hash_bits, 22);
    assert_eq!(config.online.ngram_max, 1);
    assert_eq!(config.offline, OfflineVectorizerSettings::default());
    assert_eq!(config.flag_vocabulary, EngineConfig::default().flag_vocabulary);
}

#[test]
fn save_then_load_preserves_settings() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
    let mut config = EngineConfig::default();
    config.maturity_threshold = 3;
    config.flag_vocabulary = vec!["heading".into(), "recital".into()];
    config.classifier.seed = 7;

    save_to_path(&config, &path).unwrap();
    let loaded = load_from(&path).unwrap();

    assert_eq!(loaded, config);
}

#[test]
fn invalid_toml_reports_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(&path, "maturity_threshold = \"many\"").unwrap();

    let err = load_from(&path).unwrap_err();

    assert!(matches!(err, ConfigError::ParseToml { path: ref p, .. } if p == &path));
}
