use campus_db::{create_pool, DbRuntimeSettings, RerunPolicy};
use campus_server::{
    bootstrap,
    config::{load_config, ConfigError},
};
use std::io::Write;

#[test]
fn loads_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        [server]
        port = 8123

        [database]
        path = "/var/lib/campus/campus.db"
        pool_max_size = 6
        bootstrap = true
        "#
    )
    .unwrap();

    let config = load_config(file.path().to_str()).unwrap();
    assert_eq!(config.server.port, 8123);
    assert_eq!(config.database.path, "/var/lib/campus/campus.db");
    assert_eq!(config.database.runtime_settings().pool_max_size, 6);
    assert!(config.database.bootstrap);
}

#[test]
fn missing_config_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    let config = load_config(path.to_str()).unwrap();
    assert_eq!(config.database.rerun_policy, RerunPolicy::FailIfExists);
    assert_eq!(config.database.path, "campus.db");
}

#[test]
fn malformed_config_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[server\nport = ").unwrap();

    let result = load_config(file.path().to_str());
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn bootstrap_on_disk_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("campus.db");
    let settings = DbRuntimeSettings {
        pool_max_size: 2,
        ..DbRuntimeSettings::default()
    };
    let pool = create_pool(path.to_str().unwrap(), settings).unwrap();

    let report = bootstrap(&pool, RerunPolicy::FailIfExists)
        .unwrap()
        .expect("first bootstrap should load fixtures");
    assert_eq!(report.students, 5);
    assert_eq!(report.enrollments, 10);

    assert!(bootstrap(&pool, RerunPolicy::FailIfExists)
        .unwrap()
        .is_none());

    let reloaded = bootstrap(&pool, RerunPolicy::DropExisting)
        .unwrap()
        .expect("drop_existing should reload fixtures");
    assert_eq!(reloaded.total(), report.total());
}
