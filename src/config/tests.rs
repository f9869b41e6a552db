use super::*;
use tempfile::tempdir;

#[test]
fn missing_file_yields_defaults() {
    let dir = tempdir().unwrap();
    let settings = load_from_path(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.training.epochs, 10);
    assert_eq!(settings.training.batch_size, 512);
    assert_eq!(settings.training.train_size, 6000);
    assert_eq!(settings.training.test_size, 1000);
    assert_eq!(settings.dataset.source, DatasetSourceKind::Synthetic);
    assert_eq!(settings.backend, BackendChoice::Cpu);
}

#[test]
fn saves_and_reloads_settings() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
    let mut settings = Settings::default();
    settings.training.epochs = 3;
    settings.training.learning_rate = 0.01;
    settings.dataset.source = DatasetSourceKind::Idx;
    settings.dataset.path = Some(std::path::PathBuf::from("data/fashion"));
    settings.backend = BackendChoice::Wgpu;

    save_to_path(&settings, &path).unwrap();
    let loaded = load_from_path(&path).unwrap();
    assert_eq!(loaded, settings);

    let leftovers = std::fs::read_dir(path.parent().unwrap())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().contains(".tmp-"))
        .count();
    assert_eq!(leftovers, 0);
}

#[test]
fn partial_file_fills_missing_fields_and_clamps_zeroes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(
        &path,
        "backend = \"wgpu\"\n[training]\nepochs = 0\nbatch_size = 64\n",
    )
    .unwrap();
    let loaded = load_from_path(&path).unwrap();
    assert_eq!(loaded.backend, BackendChoice::Wgpu);
    assert_eq!(loaded.training.epochs, 1);
    assert_eq!(loaded.training.batch_size, 64);
    assert_eq!(loaded.training.train_size, 6000);
    assert_eq!(loaded.dataset, DatasetSettings::default());
}

#[test]
fn invalid_toml_reports_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(&path, "[training\nepochs = 2").unwrap();
    let err = load_from_path(&path).unwrap_err();
    assert!(matches!(err, ConfigError::ParseToml { .. }));
    assert!(err.to_string().contains(CONFIG_FILE_NAME));
}

#[test]
fn training_settings_map_onto_training_config() {
    let mut settings = TrainingSettings::default();
    settings.epochs = 4;
    settings.seed = 7;
    let config = settings.to_config();
    assert_eq!(config.epochs, 4);
    assert_eq!(config.seed, 7);
    assert_eq!(config.batch_size, 512);
}

#[test]
fn backend_choice_parses_aliases() {
    assert_eq!(BackendChoice::parse("NdArray"), Some(BackendChoice::Cpu));
    assert_eq!(BackendChoice::parse(" vulkan "), Some(BackendChoice::Wgpu));
    assert_eq!(BackendChoice::parse("tpu"), None);
}
